//! Channels, their validated configuration and the per-run state machine.

use crate::config::ConfigError;
use crate::device::Level;
use crate::planner::{self, Phase};
use crate::waveform::WaveformRecord;
use derive_try_from_primitive::TryFromPrimitive;
use std::fmt;
use std::time::Duration;

/// Independently schedulable outputs.
///
/// The discriminant doubles as the number the operator types to select the channel.
#[repr(u8)]
#[derive(TryFromPrimitive, Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ChannelId {
    Green = 0,
    Red = 1,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::Green, ChannelId::Red];

    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Green => "Green",
            ChannelId::Red => "Red",
        }
    }

    /// File the channel's waveform is recorded to, relative to the output directory.
    pub fn waveform_file_name(self) -> &'static str {
        match self {
            ChannelId::Green => "green_waveform_data.csv",
            ChannelId::Red => "red_waveform_data.csv",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Blink parameters of one channel, immutable for a run.
///
/// Duty cycle sets how a cycle is split between on and off; brightness is the PWM intensity while on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    frequency_hz: u32,
    duty_cycle_percent: u8,
    brightness_percent: u8,
}

impl ChannelConfig {
    pub const MAX_FREQUENCY_HZ: u32 = 10;
    pub const MAX_PERCENT: u32 = 100;

    pub fn new(
        frequency_hz: u32,
        duty_cycle_percent: u32,
        brightness_percent: u32,
    ) -> Result<Self, ConfigError> {
        if frequency_hz > Self::MAX_FREQUENCY_HZ {
            return Err(ConfigError::FrequencyOutOfRange(frequency_hz));
        }
        if duty_cycle_percent > Self::MAX_PERCENT {
            return Err(ConfigError::DutyCycleOutOfRange(duty_cycle_percent));
        }
        if brightness_percent > Self::MAX_PERCENT {
            return Err(ConfigError::BrightnessOutOfRange(brightness_percent));
        }

        Ok(Self {
            frequency_hz,
            duty_cycle_percent: duty_cycle_percent as u8,
            brightness_percent: brightness_percent as u8,
        })
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    pub fn duty_cycle_percent(&self) -> u8 {
        self.duty_cycle_percent
    }

    pub fn brightness_percent(&self) -> u8 {
        self.brightness_percent
    }

    pub fn phase(&self) -> Phase {
        planner::plan(self.frequency_hz, self.duty_cycle_percent)
    }

    /// Level the channel starts a run in. A channel that is never off starts on.
    pub fn initial_level(&self) -> Level {
        if self.duty_cycle_percent == 100 {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Intensity commanded for a level: the configured brightness while on, nothing while off.
    pub fn intensity(&self, level: Level) -> u8 {
        match level {
            Level::High => self.brightness_percent,
            Level::Low => 0,
        }
    }

    /// Level entered when leaving `current`. Duty cycles of 0 and 100 are absorbing.
    pub fn next_level(&self, current: Level) -> Level {
        match self.duty_cycle_percent {
            0 => Level::Low,
            100 => Level::High,
            _ => current.toggled(),
        }
    }
}

/// Mutable per-run state of one channel.
///
/// `simulated_ms` is the logical trace clock written to the waveform, independent of wall-clock drift.
#[derive(Debug, Clone)]
pub struct ChannelState {
    id: ChannelId,
    config: ChannelConfig,
    phase: Phase,
    level: Level,
    last_transition_at: Duration,
    simulated_ms: f64,
    header_written: bool,
}

impl ChannelState {
    pub fn new(
        id: ChannelId,
        config: ChannelConfig,
        started_at: Duration,
        start_offset_ms: u64,
    ) -> Self {
        Self {
            id,
            config,
            phase: config.phase(),
            level: config.initial_level(),
            last_transition_at: started_at,
            simulated_ms: start_offset_ms as f64,
            header_written: false,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn simulated_ms(&self) -> f64 {
        self.simulated_ms
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn mark_header_written(&mut self) {
        self.header_written = true;
    }

    pub fn current_duration_ms(&self) -> f64 {
        match self.level {
            Level::High => self.phase.on_ms,
            Level::Low => self.phase.off_ms,
        }
    }

    pub fn is_due(&self, now: Duration) -> bool {
        let elapsed = now.saturating_sub(self.last_transition_at);
        elapsed.as_micros() as f64 / 1000.0 >= self.current_duration_ms()
    }

    pub fn reached(&self, horizon_ms: u64) -> bool {
        self.simulated_ms >= horizon_ms as f64
    }

    /// Level the channel moves to on its next transition.
    pub fn next_level(&self) -> Level {
        self.config.next_level(self.level)
    }

    /// Completes a transition into `next`.
    ///
    /// Returns the record of the phase being left, stamped with the logical time it began,
    /// then moves the logical clock past that phase.
    pub fn advance(&mut self, next: Level, now: Duration) -> WaveformRecord {
        let record = WaveformRecord {
            timestamp_ms: self.simulated_ms.round() as u64,
            level: self.level,
        };

        self.simulated_ms += self.current_duration_ms();
        self.level = next;
        self.last_transition_at = now;

        record
    }
}
