use super::error::PinError;
use super::memory::Memory;
use crate::pin_map;
use byteorder::{ByteOrder, NativeEndian};
use embedded_hal::digital::v2 as eh;
use std::convert::Infallible;
use std::fmt;
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// Byte offsets of the BCM283x GPIO registers that control a single pin.
///
/// All header pins live in the first bank, but offsets are still computed per bank so that the
/// arithmetic stays the one from the peripheral datasheet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegistersOffsets {
    pin_id: pin_map::PinId,
}

/// Enum representing the commanded state of an output.
///
/// On a GPIO pin this is the electric low/high state. On a PWM output `High` means the pulse train is
/// enabled at its configured duty, `Low` means the output is held low.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    High = 1,
    Low = 0,
}

impl Level {
    pub fn toggled(self) -> Self {
        match self {
            Level::High => Level::Low,
            Level::Low => Level::High,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

#[derive(Copy, Clone, Debug)]
pub enum Direction {
    Input,
    Output,
}

impl RegistersOffsets {
    /* BCM2835 peripheral manual, chapter 6:
     * - GPFSELn holds ten 3-bit function fields, 000 = input, 001 = output.
     * - GPSETn / GPCLRn are write-one registers: writing 1 to bit k drives pin k high / low, zeros are ignored.
     * - GPLEVn reflects the current level.
     * Using SET/CLR keeps writes free of read-modify-write races between threads driving different pins.
     */
    const GPFSEL0: usize = 0x00;
    const GPSET0: usize = 0x1C;
    const GPCLR0: usize = 0x28;
    const FSEL_FIELD_MASK: u32 = 0b111;
    const FSEL_OUTPUT: u32 = 0b001;

    pub fn new(pin_id: pin_map::PinId) -> Self {
        Self { pin_id }
    }

    pub fn id(&self) -> pin_map::PinId {
        self.pin_id
    }

    fn number(&self) -> usize {
        self.pin_id as usize
    }

    fn bank_offset(&self) -> usize {
        (self.number() / 32) * size_of::<u32>()
    }

    pub fn gpfsel(&self) -> usize {
        Self::GPFSEL0 + (self.number() / 10) * size_of::<u32>()
    }

    pub fn gpfsel_shift(&self) -> u32 {
        ((self.number() % 10) * 3) as u32
    }

    pub fn gpset(&self) -> usize {
        Self::GPSET0 + self.bank_offset()
    }

    pub fn gpclr(&self) -> usize {
        Self::GPCLR0 + self.bank_offset()
    }

    pub fn pin_bitmap_offset(&self) -> u32 {
        (self.number() % 32) as u32
    }
}

/// Foundational block of pin abstractions provided by this crate.
///
/// This foundational block is *very* unsafe. It uses direct pointer manipulation on the mapped register block
/// and writes through a shared reference.
///
/// Level writes go through the write-one SET/CLR registers, so different pins may be driven from different threads.
/// Direction changes are read-modify-write on GPFSEL and must only happen while the pin lease is being taken or released.
#[derive(Clone, Debug)]
pub struct UnsafePointerPin {
    memory: Arc<Memory>,
    registers: RegistersOffsets,
}

impl UnsafePointerPin {
    pub fn new(pin_id: pin_map::PinId, memory: Arc<Memory>) -> Self {
        Self {
            registers: RegistersOffsets::new(pin_id),
            memory,
        }
    }

    pub fn direction(&mut self, direction: Direction) {
        let mut fsel_reg = self.reg_ptr(self.registers.gpfsel());
        let fsel = unsafe { fsel_reg.as_mut() };
        let shift = self.registers.gpfsel_shift();

        let cleared = NativeEndian::read_u32(fsel) & !(RegistersOffsets::FSEL_FIELD_MASK << shift);

        match direction {
            Direction::Input => NativeEndian::write_u32(fsel, cleared),
            Direction::Output => {
                NativeEndian::write_u32(fsel, cleared | (RegistersOffsets::FSEL_OUTPUT << shift))
            }
        }
    }

    pub fn write(&mut self, level: Level) {
        let reg_offset = match level {
            Level::High => self.registers.gpset(),
            Level::Low => self.registers.gpclr(),
        };

        let mut reg = self.reg_ptr(reg_offset);
        let reg = unsafe { reg.as_mut() };
        NativeEndian::write_u32(reg, 1 << self.registers.pin_bitmap_offset());
    }

    fn reg_ptr(&self, reg_offset: usize) -> NonNull<[u8]> {
        let base_addr: *const u8 = self.memory.as_ptr();
        unsafe {
            let ptr = base_addr.add(reg_offset) as *mut u8;
            NonNull::new_unchecked(ptr::slice_from_raw_parts_mut(ptr, size_of::<u32>()))
        }
    }
}

/// Abstraction over GPIO pin set to output (writing) direction.
///
/// This is obtainable by using `output_pin` method of `Device` struct.
/// A pin can be leased by one output at a time. Dropping the output drives it low, returns it to input direction
/// and releases the lease, which leaves the header in the state it had before the program started.
#[derive(Debug)]
pub struct OutputPin(UnsafePointerPin);

impl OutputPin {
    pub(crate) fn lease(pin_id: pin_map::PinId, memory: Arc<Memory>) -> Result<Self, PinError> {
        memory.lease(pin_id)?;
        let mut pointer_pin = UnsafePointerPin::new(pin_id, memory);
        pointer_pin.write(Level::Low);
        pointer_pin.direction(Direction::Output);

        Ok(Self(pointer_pin))
    }

    pub fn id(&self) -> pin_map::PinId {
        self.0.registers.id()
    }

    pub fn set_level(&mut self, level: Level) {
        self.0.write(level);
    }
}

impl Drop for OutputPin {
    fn drop(&mut self) {
        self.0.write(Level::Low);
        self.0.direction(Direction::Input);

        if let Err(err) = self.0.memory.release(self.0.registers.id()) {
            log::warn!("failed to release GPIO {}: {}", self.id() as u8, err);
        }
    }
}

impl eh::OutputPin for OutputPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set_level(Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set_level(Level::High);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Level, RegistersOffsets};
    use crate::pin_map::PinId;

    #[test]
    fn function_select_field_follows_pin_number() {
        let green = RegistersOffsets::new(PinId::Gpio13);
        assert_eq!(green.gpfsel(), 0x04);
        assert_eq!(green.gpfsel_shift(), 9);

        let red = RegistersOffsets::new(PinId::Gpio27);
        assert_eq!(red.gpfsel(), 0x08);
        assert_eq!(red.gpfsel_shift(), 21);
    }

    #[test]
    fn header_pins_use_first_set_and_clear_bank() {
        let red = RegistersOffsets::new(PinId::Gpio27);
        assert_eq!(red.gpset(), 0x1C);
        assert_eq!(red.gpclr(), 0x28);
        assert_eq!(red.pin_bitmap_offset(), 27);
    }

    #[test]
    fn level_toggles_and_prints_as_bit() {
        assert_eq!(Level::Low.toggled(), Level::High);
        assert_eq!(Level::High.toggled(), Level::Low);
        assert_eq!(Level::High.to_string(), "1");
        assert_eq!(Level::Low.to_string(), "0");
    }
}
