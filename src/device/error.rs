use std::io;
use thiserror::Error;

/// Enum representing possible failures when initializing the device.
///
/// Initializing a device can fail in two ways:
/// - DeviceAccessFailed - There is no access to the device file, either because of insufficient permissions or operating system misconfiguration.
/// - MemoryMapFailed - There is an error when trying to create a mmaped piece of memory to represent device file.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open GPIO memory device {path}")]
    DeviceAccessFailed {
        path: &'static str,
        #[source]
        source: nix::Error,
    },
    #[error("failed to map GPIO registers")]
    MemoryMapFailed(#[source] io::Error),
}

/// Enum representing possible failures when working with GPIO pins and the outputs built on them.
///
/// - AlreadyLeased - Client tries to obtain an output pin that is already driven by another output.
/// - LeaseMapPoisoned - A thread panicked while holding the lease map.
/// - PwmWorkerStopped - The software PWM thread of an output exited, so the pin no longer follows commands.
#[derive(Error, Debug)]
pub enum PinError {
    #[error("GPIO {0} is already leased by another output")]
    AlreadyLeased(u8),
    #[error("lease map lock poisoned")]
    LeaseMapPoisoned,
    #[error("software PWM worker stopped: {0}")]
    PwmWorkerStopped(String),
}
