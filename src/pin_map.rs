use derive_try_from_primitive::TryFromPrimitive;

/// BCM GPIO numbers of the Raspberry Pi 40-pin header that can drive an output.
///
/// These are the numbers printed by `gpio readall` in the BCM column, not the physical pin positions.
/// GPIO 0 and 1 are reserved for the HAT EEPROM and are left out on purpose.
#[repr(u8)]
#[derive(TryFromPrimitive, Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PinId {
    Gpio2 = 2,
    Gpio3 = 3,
    Gpio4 = 4,
    Gpio5 = 5,
    Gpio6 = 6,
    Gpio7 = 7,
    Gpio8 = 8,
    Gpio9 = 9,
    Gpio10 = 10,
    Gpio11 = 11,
    Gpio12 = 12,
    Gpio13 = 13,
    Gpio14 = 14,
    Gpio15 = 15,
    Gpio16 = 16,
    Gpio17 = 17,
    Gpio18 = 18,
    Gpio19 = 19,
    Gpio20 = 20,
    Gpio21 = 21,
    Gpio22 = 22,
    Gpio23 = 23,
    Gpio24 = 24,
    Gpio25 = 25,
    Gpio26 = 26,
    Gpio27 = 27,
}
