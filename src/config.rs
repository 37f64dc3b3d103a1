//! Run profile loaded from TOML, and configuration errors.

use crate::channel::ChannelId;
use crate::device::Board;
use crate::pin_map::PinId;
use crate::plot::PlotSettings;
use crate::scheduler::RunTiming;
use serde::Deserialize;
use std::convert::TryFrom;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("frequency {0} Hz is outside 0..=10")]
    FrequencyOutOfRange(u32),
    #[error("duty cycle {0}% is outside 0..=100")]
    DutyCycleOutOfRange(u32),
    #[error("brightness {0}% is outside 0..=100")]
    BrightnessOutOfRange(u32),
    #[error("{0} channel is configured more than once")]
    DuplicateChannel(ChannelId),
    #[error("GPIO {0} cannot be used as an output")]
    UnknownPin(u8),
    #[error("no valid answer after {0} attempts")]
    TooManyAttempts(usize),
    #[error("operator input closed")]
    InputClosed,
    #[error("operator terminal I/O failed")]
    Input(#[source] io::Error),
    #[error("failed to read profile {path}")]
    ProfileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse profile")]
    ProfileParse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub duration_secs: u64,
    pub start_offset_ms: u64,
    pub poll_interval_ms: u64,
    pub output_dir: PathBuf,
}

impl Default for RunSection {
    fn default() -> Self {
        let timing = RunTiming::default();
        Self {
            duration_secs: timing.duration.as_secs(),
            start_offset_ms: timing.start_offset_ms,
            poll_interval_ms: timing.poll_interval.as_millis() as u64,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PinsSection {
    pub green: u8,
    pub red: u8,
}

impl Default for PinsSection {
    fn default() -> Self {
        Self { green: 13, red: 27 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptSection {
    pub max_attempts: usize,
}

impl Default for PromptSection {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Everything the binary needs besides the per-run blink parameters, which the operator enters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub board: Board,
    pub run: RunSection,
    pub pins: PinsSection,
    pub prompt: PromptSection,
    pub plot: PlotSettings,
}

impl Profile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ProfileRead {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let profile: Profile = toml::from_str(text)?;
        profile.pins()?;
        Ok(profile)
    }

    pub fn timing(&self) -> RunTiming {
        RunTiming {
            start_offset_ms: self.run.start_offset_ms,
            duration: Duration::from_secs(self.run.duration_secs),
            poll_interval: Duration::from_millis(self.run.poll_interval_ms.max(1)),
        }
    }

    /// GPIO assigned to each channel.
    pub fn pins(&self) -> Result<Vec<(ChannelId, PinId)>, ConfigError> {
        let pin = |number: u8| PinId::try_from(number).map_err(|_| ConfigError::UnknownPin(number));

        Ok(vec![
            (ChannelId::Green, pin(self.pins.green)?),
            (ChannelId::Red, pin(self.pins.red)?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_uses_defaults() {
        let profile = Profile::parse("").unwrap();
        assert_eq!(profile, Profile::default());

        let timing = profile.timing();
        assert_eq!(timing.start_offset_ms, 10_000);
        assert_eq!(timing.horizon_ms(), 70_000);
        let pins = profile.pins().unwrap();
        assert_eq!(pins[0], (ChannelId::Green, PinId::Gpio13));
        assert_eq!(pins[1], (ChannelId::Red, PinId::Gpio27));
        assert_eq!(pins.len(), 2);
    }

    #[test]
    fn sections_override_defaults() {
        let profile = Profile::parse(
            r#"
            board = "bcm2711"

            [run]
            duration_secs = 10
            output_dir = "/tmp/traces"

            [pins]
            green = 17
            "#,
        )
        .unwrap();

        assert_eq!(profile.board, Board::Bcm2711);
        assert_eq!(profile.timing().horizon_ms(), 20_000);
        assert_eq!(profile.run.output_dir, PathBuf::from("/tmp/traces"));
        let pins = profile.pins().unwrap();
        assert_eq!(pins[0], (ChannelId::Green, PinId::Gpio17));
        assert_eq!(profile.pins.red, 27);
    }

    #[test]
    fn unusable_pin_is_rejected() {
        let err = Profile::parse("[pins]\nred = 40\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPin(40)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Profile::parse("[run]\nduration = 3\n"),
            Err(ConfigError::ProfileParse(_))
        ));
    }
}
