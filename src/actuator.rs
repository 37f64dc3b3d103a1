//! Write-only output interface driven by the scheduler, and its GPIO implementation.

use crate::channel::ChannelId;
use crate::device::error::PinError;
use crate::device::{Level, SoftPwm};
use embedded_hal::digital::v2::OutputPin as HalOutputPin;
use embedded_hal::PwmPin;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActuatorCommand {
    SetLevel(Level),
    SetIntensity(u8),
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorCommand::SetLevel(level) => write!(f, "set level {}", level),
            ActuatorCommand::SetIntensity(percent) => write!(f, "set intensity {}%", percent),
        }
    }
}

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("no output attached to {0} channel")]
    Unattached(ChannelId),
    #[error("failed to {command} on {channel} channel")]
    Command {
        channel: ChannelId,
        command: ActuatorCommand,
        #[source]
        source: PinError,
    },
}

impl ActuatorError {
    pub fn channel(&self) -> ChannelId {
        match self {
            ActuatorError::Unattached(channel) | ActuatorError::Command { channel, .. } => *channel,
        }
    }
}

/// Outputs the scheduler drives.
///
/// Commands are never read back; a command is assumed applied unless it returns an error.
pub trait Actuator {
    fn set_level(&mut self, channel: ChannelId, level: Level) -> Result<(), ActuatorError>;

    fn set_intensity(&mut self, channel: ChannelId, percent: u8) -> Result<(), ActuatorError>;
}

impl<A: Actuator + ?Sized> Actuator for &mut A {
    fn set_level(&mut self, channel: ChannelId, level: Level) -> Result<(), ActuatorError> {
        (**self).set_level(channel, level)
    }

    fn set_intensity(&mut self, channel: ChannelId, percent: u8) -> Result<(), ActuatorError> {
        (**self).set_intensity(channel, percent)
    }
}

/// Drives `channel` to `level` at `percent` intensity.
///
/// Intensity goes first so the output never flashes at a stale duty.
pub fn drive<A: Actuator + ?Sized>(
    actuator: &mut A,
    channel: ChannelId,
    level: Level,
    percent: u8,
) -> Result<(), ActuatorError> {
    actuator.set_intensity(channel, percent)?;
    actuator.set_level(channel, level)
}

/// Forces every listed channel fully on or fully off.
pub fn drive_all<A: Actuator + ?Sized>(
    actuator: &mut A,
    channels: &[ChannelId],
    level: Level,
) -> Result<(), ActuatorError> {
    let percent = match level {
        Level::High => 100,
        Level::Low => 0,
    };

    for channel in channels {
        drive(actuator, *channel, level, percent)?;
    }
    Ok(())
}

/// Software-PWM outputs on GPIO pins, one per channel.
///
/// `High` enables the pulse train at the last commanded intensity, `Low` holds the pin low.
pub struct GpioActuator<P: HalOutputPin + Send + 'static> {
    outputs: BTreeMap<ChannelId, SoftPwm<P>>,
}

impl<P> GpioActuator<P>
where
    P: HalOutputPin + Send + 'static,
    P::Error: Debug,
{
    pub fn new() -> Self {
        Self {
            outputs: BTreeMap::new(),
        }
    }

    pub fn attach(&mut self, channel: ChannelId, output: SoftPwm<P>) {
        self.outputs.insert(channel, output);
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.outputs.keys().copied().collect()
    }

    fn output(
        &mut self,
        channel: ChannelId,
        command: ActuatorCommand,
    ) -> Result<&mut SoftPwm<P>, ActuatorError> {
        let output = self
            .outputs
            .get_mut(&channel)
            .ok_or(ActuatorError::Unattached(channel))?;

        output.check().map_err(|source| {
            log::error!("{} channel output failed: {}", channel, source);
            ActuatorError::Command {
                channel,
                command,
                source,
            }
        })?;

        Ok(output)
    }
}

impl<P> Default for GpioActuator<P>
where
    P: HalOutputPin + Send + 'static,
    P::Error: Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Actuator for GpioActuator<P>
where
    P: HalOutputPin + Send + 'static,
    P::Error: Debug,
{
    fn set_level(&mut self, channel: ChannelId, level: Level) -> Result<(), ActuatorError> {
        let output = self.output(channel, ActuatorCommand::SetLevel(level))?;
        match level {
            Level::High => output.enable(),
            Level::Low => output.disable(),
        }
        Ok(())
    }

    fn set_intensity(&mut self, channel: ChannelId, percent: u8) -> Result<(), ActuatorError> {
        let command = ActuatorCommand::SetIntensity(percent);
        self.output(channel, command)?.set_duty(percent);
        Ok(())
    }
}
