//! This crate blinks LEDs wired to Raspberry Pi GPIO pins at a configured frequency, duty cycle and brightness,
//! and records every on/off transition to a per-channel CSV file that can be plotted afterwards.
//!
//! The core is the [`Scheduler`](scheduler::Scheduler): it plans on/off durations for each channel with [`planner::plan`],
//! advances one independent state machine per channel from a single cooperative polling loop, drives outputs through the
//! [`Actuator`](actuator::Actuator) trait and appends each transition to the channel's [`WaveformLog`](waveform::WaveformLog).
//!
//! Outputs on real hardware go through the memory-mapped GPIO [`Device`], whose pins implement
//! [`embedded_hal`](https://crates.io/crates/embedded-hal) digital output traits and are modulated by [`SoftPwm`].
//!
//! Only the BCM283x GPIO block (Raspberry Pi 1 to 4) is supported. Timing is best effort: phases are measured
//! against the wall clock at the polling interval, while the recorded trace uses an exact logical clock.

use thiserror::Error;

pub mod actuator;
pub mod channel;
pub mod clock;
pub mod config;
mod device;
pub mod operator;
mod pin_map;
pub mod planner;
pub mod plot;
pub mod scheduler;
pub mod waveform;

pub use device::error::DeviceError;
pub use device::error::PinError;
pub use device::{Board, Device, Level, OutputPin, SoftPwm};
pub use pin_map::PinId;

/// Main error type for this crate.
///
/// For more details, see the error enums of each module.
#[derive(Error, Debug)]
pub enum BlinkError {
    #[error("error while operating on a pin")]
    PinError(#[from] PinError),
    #[error("error while operating on a device")]
    DeviceError(#[from] DeviceError),
    #[error("invalid configuration")]
    ConfigError(#[from] config::ConfigError),
    #[error("output command failed")]
    ActuatorError(#[from] actuator::ActuatorError),
    #[error("blink run failed")]
    RunError(#[from] scheduler::RunError),
    #[error("failed to plot waveforms")]
    PlotError(#[from] plot::PlotError),
}

pub type BlinkResult<T> = Result<T, BlinkError>;
