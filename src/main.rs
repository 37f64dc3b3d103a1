//! Operator program: blink the LEDs on the configured GPIO pins, record their waveforms and plot
//! them.
//!
//! Usage: `blink-trace [profile.toml]`. Set `RUST_LOG=debug` to trace every transition.

use blink_trace::actuator::{drive_all, GpioActuator};
use blink_trace::channel::{ChannelConfig, ChannelId};
use blink_trace::clock::{StopFlag, SystemClock};
use blink_trace::config::{ConfigError, Profile};
use blink_trace::operator::{MenuChoice, Prompt};
use blink_trace::scheduler::{ChannelSummary, RunError, RunOutcome, Scheduler};
use blink_trace::waveform::LogDirectory;
use blink_trace::{plot, BlinkError, BlinkResult, Device, Level, OutputPin, SoftPwm};
use nix::sys::signal::{SigSet, Signal};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::thread;

type Outputs = GpioActuator<OutputPin>;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let profile = match std::env::args_os().nth(1) {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };

    // Must run before any other thread is spawned so that PWM workers inherit the blocked mask.
    let stop = StopFlag::new();
    watch_signals(stop.clone())?;

    let device = Device::new(profile.board)?;
    let mut outputs = Outputs::new();
    for (channel, pin) in profile.pins()? {
        outputs.attach(channel, SoftPwm::new(device.output_pin(pin)?)?);
        log::info!("{} channel on GPIO {}", channel, pin as u8);
    }

    let stdin = io::stdin();
    let mut session = Session {
        prompt: Prompt::new(stdin.lock(), io::stdout(), profile.prompt.max_attempts),
        outputs,
        profile: &profile,
        logs: LogDirectory::new(&profile.run.output_dir),
        stop,
    };
    let result = session.operate();

    session.shutdown();
    println!("Bye!");

    Ok(result?)
}

/// Turns SIGINT and SIGTERM into a stop request handled by a dedicated thread.
fn watch_signals(stop: StopFlag) -> Result<(), Box<dyn Error>> {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals.thread_block()?;

    thread::Builder::new()
        .name("signals".into())
        .spawn(move || loop {
            match signals.wait() {
                Ok(signal) => {
                    log::info!("received {:?}, stopping", signal);
                    stop.request();
                }
                Err(err) => {
                    log::error!("signal wait failed: {}", err);
                    break;
                }
            }
        })?;

    Ok(())
}

/// Everything the menu loop works with between two operator choices.
struct Session<'p, R, W> {
    prompt: Prompt<R, W>,
    outputs: Outputs,
    profile: &'p Profile,
    logs: LogDirectory,
    stop: StopFlag,
}

impl<R: BufRead, W: Write> Session<'_, R, W> {
    fn operate(&mut self) -> BlinkResult<()> {
        loop {
            let choice = match self.prompt.main_menu() {
                Ok(choice) => choice,
                Err(ConfigError::InputClosed) => return Ok(()),
                Err(err) => return Err(err.into()),
            };

            if self.stop.is_requested() {
                log::info!("interrupt received at menu, exiting");
                return Ok(());
            }

            let result = match choice {
                MenuChoice::TurnOff => self.switch_all(Level::Low),
                MenuChoice::TurnOn => self.switch_all(Level::High),
                MenuChoice::Blink => self.select_one().and_then(|chosen| self.blink(&chosen)),
                MenuChoice::BlinkAll => self.select_all().and_then(|chosen| self.blink(&chosen)),
                MenuChoice::Plot => self.plot_waveforms(),
                MenuChoice::Exit => return Ok(()),
            };

            match result {
                Ok(()) => {}
                Err(BlinkError::ConfigError(ConfigError::InputClosed)) => return Ok(()),
                Err(err @ BlinkError::ConfigError(ConfigError::Input(_))) => return Err(err),
                Err(err) => {
                    log::warn!("{}", error_chain(&err));
                    self.prompt.say(&format!("\n{}", error_chain(&err)))?;
                }
            }
        }
    }

    fn shutdown(&mut self) {
        let channels = self.outputs.channels();
        if let Err(err) = drive_all(&mut self.outputs, &channels, Level::Low) {
            log::error!("failed to turn outputs off: {}", err);
        }
    }

    fn select_one(&mut self) -> BlinkResult<Vec<(ChannelId, ChannelConfig)>> {
        let channel = self.prompt.channel()?;
        let config = self.prompt.channel_config(channel)?;
        Ok(vec![(channel, config)])
    }

    fn select_all(&mut self) -> BlinkResult<Vec<(ChannelId, ChannelConfig)>> {
        let mut selection = Vec::with_capacity(ChannelId::ALL.len());
        for channel in ChannelId::ALL.iter().copied() {
            selection.push((channel, self.prompt.channel_config(channel)?));
        }
        Ok(selection)
    }

    fn plot_waveforms(&mut self) -> BlinkResult<()> {
        plot::render(&self.logs, &self.profile.plot)?;

        let output = self.profile.plot.output.display();
        let text = format!("\nWaveforms plotted to {}", output);
        self.prompt.say(&text)?;
        Ok(())
    }

    fn switch_all(&mut self, level: Level) -> BlinkResult<()> {
        let text = match level {
            Level::High => "\nTurning on all LEDs...",
            Level::Low => "\nTurning off all LEDs...",
        };
        self.prompt.say(text)?;

        let channels = self.outputs.channels();
        Ok(drive_all(&mut self.outputs, &channels, level)?)
    }

    /// Takes back a stop request raised while the operator was answering questions.
    fn interrupted(&mut self) -> BlinkResult<bool> {
        if !self.stop.is_requested() {
            return Ok(false);
        }

        self.stop.clear();
        self.prompt.say("\nInterrupted, back to the menu.")?;
        Ok(true)
    }

    fn blink(&mut self, selection: &[(ChannelId, ChannelConfig)]) -> BlinkResult<()> {
        if self.interrupted()? || !self.prompt.confirm(selection)? || self.interrupted()? {
            return Ok(());
        }
        self.prompt.say("\nBlinking... press Ctrl-C to stop early")?;

        let mut scheduler = Scheduler::new(
            &mut self.outputs,
            SystemClock::new(),
            self.logs.clone(),
            self.profile.timing(),
            self.stop.clone(),
        );

        let run_report = match scheduler.run(selection) {
            Ok(run_report) => run_report,
            Err(err) => {
                if let RunError::Actuator { log_errors, .. } = &err {
                    for log_error in log_errors {
                        let channel = log_error.channel();
                        let text = format!("{} LED: {}", channel, error_chain(log_error));
                        self.prompt.say(&text)?;
                    }
                }
                return Err(err.into());
            }
        };

        if run_report.outcome == RunOutcome::Cancelled {
            self.stop.clear();
            self.prompt.say("Blinking stopped early.")?;
        }
        for summary in &run_report.channels {
            self.prompt.say(&summary_line(summary))?;
        }

        Ok(())
    }
}

fn summary_line(summary: &ChannelSummary) -> String {
    match &summary.log_error {
        Some(err) => format!(
            "{} LED: waveform not recorded ({})",
            summary.channel,
            error_chain(err)
        ),
        None if summary.is_recorded() => format!(
            "{} LED: {} transitions recorded up to {} ms",
            summary.channel, summary.transitions, summary.final_timestamp_ms
        ),
        None => format!(
            "{} LED: no transition, waveform file left untouched",
            summary.channel
        ),
    }
}

/// Error message followed by its chain of causes.
fn error_chain(err: &dyn Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use blink_trace::waveform::LogWriteError;

    fn summary(transitions: usize, log_error: Option<LogWriteError>) -> ChannelSummary {
        ChannelSummary {
            channel: ChannelId::Green,
            transitions,
            final_timestamp_ms: 10_000 + 100 * transitions as u64,
            log_error,
        }
    }

    fn unwritable() -> LogWriteError {
        LogWriteError::Open {
            channel: ChannelId::Green,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        }
    }

    #[test]
    fn error_chain_lists_every_cause() {
        assert_eq!(
            error_chain(&unwritable()),
            "failed to open waveform log of Green channel: read-only"
        );
    }

    #[test]
    fn summary_tells_an_untouched_file_apart() {
        assert_eq!(
            summary_line(&summary(0, None)),
            "Green LED: no transition, waveform file left untouched"
        );
        assert_eq!(
            summary_line(&summary(10, None)),
            "Green LED: 10 transitions recorded up to 11000 ms"
        );

        let line = summary_line(&summary(10, Some(unwritable())));
        assert!(line.starts_with("Green LED: waveform not recorded (failed to open"));
        assert!(line.ends_with("Green channel: read-only)"));
    }

    #[test]
    fn stop_raised_during_prompts_abandons_the_blink() {
        let profile = Profile::default();
        let stop = StopFlag::new();
        stop.request();

        let mut session = Session {
            prompt: Prompt::new(io::Cursor::new(b"1\n".to_vec()), Vec::new(), 3),
            outputs: Outputs::new(),
            profile: &profile,
            logs: LogDirectory::new(std::env::temp_dir()),
            stop: stop.clone(),
        };
        let green = [(ChannelId::Green, ChannelConfig::new(5, 50, 80).unwrap())];

        session.blink(&green).unwrap();
        assert!(!stop.is_requested());

        let output = String::from_utf8(session.prompt.into_output()).unwrap();
        assert!(output.contains("Interrupted, back to the menu."));
        assert!(!output.contains("Confirm"));
        assert!(!output.contains("Blinking..."));
    }
}
