use memmap::{MmapMut, MmapOptions};
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use serde::Deserialize;
use std::fs::File;
use std::sync::Arc;

pub mod error;
mod memory;
mod pin;
mod soft_pwm;

use crate::{pin_map, BlinkResult};
use error::DeviceError;
use memory::Memory;

pub use pin::{Level, OutputPin};
pub use soft_pwm::SoftPwm;

/// SoC families found on Raspberry Pi boards, which differ only in where the peripheral block sits in physical memory.
///
/// The base address matters only when running as root, because `/dev/gpiomem` already starts at the GPIO block.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Board {
    /// Pi 1, Pi Zero.
    Bcm2835,
    /// Pi 2, Pi 3, Zero 2.
    Bcm2837,
    /// Pi 4, Pi 400.
    Bcm2711,
}

impl Board {
    pub fn gpio_base_addr(self) -> u64 {
        match self {
            Board::Bcm2835 => 0x2020_0000,
            Board::Bcm2837 => 0x3F20_0000,
            Board::Bcm2711 => 0xFE20_0000,
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Board::Bcm2837
    }
}

/// The main abstraction for the Raspberry Pi GPIO block.
///
/// This struct owns the memory mapping needed to access GPIO-related registers, together with the file handle for the device file provided by your operating system.
/// Output pins keep the mapping alive on their own, so they can be moved to software PWM worker threads.
#[derive(Debug)]
pub struct Device {
    memory: Arc<Memory>,
}

impl Device {
    const GPIOMEM_PATH: &'static str = "/dev/gpiomem";
    const MEM_PATH: &'static str = "/dev/mem";
    const BLOCK_SIZE: usize = 4096;

    /// Instantiates new device, opening and memory-mapping an appropriate device file.
    ///
    /// Superuser goes through `/dev/mem` at the board's GPIO base, everyone else through `/dev/gpiomem`
    /// (membership in the `gpio` group is enough on Raspberry Pi OS).
    pub fn new(board: Board) -> BlinkResult<Self> {
        use nix::unistd::Uid;

        let (file_handle, map) = if Uid::current().is_root() {
            Self::load_device_file(Self::MEM_PATH, board.gpio_base_addr())
        } else {
            Self::load_device_file(Self::GPIOMEM_PATH, 0)
        }?;

        log::info!("mapped GPIO registers of {:?}", board);

        Ok(Self {
            memory: Arc::new(Memory::new(map, file_handle)),
        })
    }

    /// Lease a physical GPIO pin, configured for writing and driven low.
    ///
    /// This method fails if the pin is already leased by another output of this device.
    pub fn output_pin(&self, pin_id: pin_map::PinId) -> BlinkResult<OutputPin> {
        Ok(OutputPin::lease(pin_id, Arc::clone(&self.memory))?)
    }

    fn load_device_file(path: &'static str, offset: u64) -> Result<(File, MmapMut), DeviceError> {
        use std::os::unix::io::FromRawFd;
        use DeviceError::*;

        let mut open_flags = OFlag::empty();
        open_flags.insert(OFlag::O_RDWR);
        open_flags.insert(OFlag::O_SYNC);
        open_flags.insert(OFlag::O_CLOEXEC);

        let file_fd = open(path, open_flags, Mode::empty())
            .map_err(|source| DeviceAccessFailed { path, source })?;

        // SAFETY: Validity of file_fd is checked by Nix.
        let handle = unsafe { File::from_raw_fd(file_fd) };

        let mut map_opts = MmapOptions::new();
        map_opts.offset(offset);
        map_opts.len(Self::BLOCK_SIZE);

        // SAFETY: File handle is valid at this point.
        let map = unsafe { map_opts.map_mut(&handle).map_err(MemoryMapFailed)? };

        Ok((handle, map))
    }
}
