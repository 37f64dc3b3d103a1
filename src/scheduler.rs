//! Cooperative scheduler advancing every channel of a blink run from a single polling loop.

use crate::actuator::{self, Actuator, ActuatorError};
use crate::channel::{ChannelConfig, ChannelId, ChannelState};
use crate::clock::{Clock, StopFlag};
use crate::config::ConfigError;
use crate::waveform::{LogSink, LogWriteError, WaveformLog};
use std::convert::TryFrom;
use std::io::Write;
use std::time::Duration;

/// Logical start and length of a run, and how often channels are polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTiming {
    /// Logical timestamp of the first record, keeping plotted series clear of the origin.
    pub start_offset_ms: u64,
    pub duration: Duration,
    pub poll_interval: Duration,
}

impl RunTiming {
    /// Logical timestamp at which a channel's run is complete. Saturates instead of overflowing.
    pub fn horizon_ms(&self) -> u64 {
        let duration_ms = u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX);
        self.start_offset_ms.saturating_add(duration_ms)
    }
}

impl Default for RunTiming {
    fn default() -> Self {
        Self {
            start_offset_ms: 10_000,
            duration: Duration::from_secs(60),
            poll_interval: Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every channel reached the horizon.
    Completed,
    /// The stop flag was raised before that.
    Cancelled,
}

#[derive(Debug)]
pub struct ChannelSummary {
    pub channel: ChannelId,
    pub transitions: usize,
    pub final_timestamp_ms: u64,
    /// Set when the channel's waveform log degraded during the run.
    pub log_error: Option<LogWriteError>,
}

impl ChannelSummary {
    /// Whether this run wrote the channel's waveform file.
    ///
    /// Without a transition the file is never opened, so whatever an earlier run left there stays.
    pub fn is_recorded(&self) -> bool {
        self.transitions > 0 && self.log_error.is_none()
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub channels: Vec<ChannelSummary>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid run configuration")]
    Configuration(#[from] ConfigError),
    /// `log_errors` holds the waveform logs that had already degraded when the run was aborted.
    #[error("run aborted")]
    Actuator {
        #[source]
        source: ActuatorError,
        log_errors: Vec<LogWriteError>,
    },
}

struct ActiveChannel<W: Write> {
    state: ChannelState,
    log: WaveformLog<W>,
    transitions: usize,
}

fn abort<W: Write>(active: Vec<ActiveChannel<W>>, source: ActuatorError) -> RunError {
    log::error!("run aborted: {}", source);
    let log_errors = active
        .into_iter()
        .filter_map(|channel| channel.log.finish())
        .collect();

    RunError::Actuator { source, log_errors }
}

/// Drives independent per-channel state machines against one clock.
///
/// Each tick visits the channels in order; a channel whose current phase has elapsed flips,
/// is driven through the actuator, and appends the phase it left to its waveform log.
/// Channels never share timers or log entries.
pub struct Scheduler<A, C, S> {
    actuator: A,
    clock: C,
    sink: S,
    timing: RunTiming,
    stop: StopFlag,
}

impl<A, C, S> Scheduler<A, C, S>
where
    A: Actuator,
    C: Clock,
    S: LogSink,
{
    pub fn new(actuator: A, clock: C, sink: S, timing: RunTiming, stop: StopFlag) -> Self {
        Self {
            actuator,
            clock,
            sink,
            timing,
            stop,
        }
    }

    pub fn into_parts(self) -> (A, C, S) {
        (self.actuator, self.clock, self.sink)
    }

    /// Blinks the given channels until all of them reach the horizon or the stop flag is raised.
    ///
    /// A stop request that is already pending cancels the run on its first tick; the flag is
    /// left raised for the caller to clear.
    /// An actuator failure aborts the run immediately, leaving outputs at their last commanded
    /// state. Waveform log failures only degrade the affected channel and are returned in the
    /// report.
    pub fn run(&mut self, channels: &[(ChannelId, ChannelConfig)]) -> Result<RunReport, RunError> {
        for (index, (channel, _)) in channels.iter().enumerate() {
            if channels[..index].iter().any(|(other, _)| other == channel) {
                return Err(ConfigError::DuplicateChannel(*channel).into());
            }
        }

        let horizon_ms = self.timing.horizon_ms();
        let started_at = self.clock.now();

        log::info!(
            "blinking {} channel(s) from {} ms to {} ms",
            channels.len(),
            self.timing.start_offset_ms,
            horizon_ms
        );

        let mut active = Vec::with_capacity(channels.len());
        for (channel, config) in channels {
            let state =
                ChannelState::new(*channel, *config, started_at, self.timing.start_offset_ms);
            let level = state.level();
            let intensity = config.intensity(level);
            if let Err(source) = actuator::drive(&mut self.actuator, *channel, level, intensity) {
                return Err(abort(active, source));
            }

            log::info!(
                "{} channel: {} Hz, duty {}%, brightness {}%",
                channel,
                config.frequency_hz(),
                config.duty_cycle_percent(),
                config.brightness_percent()
            );

            active.push(ActiveChannel {
                state,
                log: WaveformLog::new(*channel),
                transitions: 0,
            });
        }

        let outcome = loop {
            if self.stop.is_requested() {
                log::info!("run cancelled");
                break RunOutcome::Cancelled;
            }

            let now = self.clock.now();
            let mut pending = false;
            let mut failure = None;

            for channel in active.iter_mut() {
                if channel.state.reached(horizon_ms) {
                    continue;
                }
                if channel.state.is_due(now) {
                    if let Err(err) = self.transition(channel, now) {
                        failure = Some(err);
                        break;
                    }
                }
                pending |= !channel.state.reached(horizon_ms);
            }

            if let Some(source) = failure {
                return Err(abort(active, source));
            }
            if !pending {
                break RunOutcome::Completed;
            }

            self.clock.sleep(self.timing.poll_interval);
        };

        let channels = active
            .into_iter()
            .map(|channel| ChannelSummary {
                channel: channel.state.id(),
                transitions: channel.transitions,
                final_timestamp_ms: channel.state.simulated_ms().round() as u64,
                log_error: channel.log.finish(),
            })
            .collect();

        log::info!("run finished: {:?}", outcome);
        Ok(RunReport { outcome, channels })
    }

    fn transition(
        &mut self,
        channel: &mut ActiveChannel<S::Writer>,
        now: Duration,
    ) -> Result<(), ActuatorError> {
        let id = channel.state.id();
        let config = *channel.state.config();
        let next = channel.state.next_level();

        actuator::drive(&mut self.actuator, id, next, config.intensity(next))?;

        if !channel.state.header_written() {
            channel.log.write_header(&mut self.sink, &config);
            channel.state.mark_header_written();
        }

        let record = channel.state.advance(next, now);
        channel.log.append(&record);
        channel.transitions += 1;

        log::debug!(
            "{} channel: {} ms level {} -> {}",
            id,
            record.timestamp_ms,
            record.level,
            next
        );
        Ok(())
    }
}
