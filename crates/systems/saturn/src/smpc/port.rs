//! Parallel I/O ports (PDR1/PDR2) and the serial lines behind PDR1
//!
//! Each port has a data register (PDR) and a direction register (DDR). A set
//! DDR bit makes that pin an output driven from PDR; clear bits are inputs.
//!
//! # PDR1 serial lines
//!
//! - Bit 2: chip select (active low)
//! - Bit 3: clock
//! - Bit 4: data out (to the device)
//! - Bit 0: data in (from the device)
//!
//! # PDR2
//!
//! - Bit 4: sound CPU enable, active low. Writing 0 releases the sound CPU,
//!   writing 1 holds it.

use serde::{Deserialize, Serialize};

pub const PDR1_DATA_IN: u8 = 0x01;
pub const PDR1_CHIP_SELECT: u8 = 0x04;
pub const PDR1_CLOCK: u8 = 0x08;
pub const PDR1_DATA_OUT: u8 = 0x10;

pub const PDR2_SOUND_HALT: u8 = 0x10;

/// Port numbers as used by the register file (0 = port 1)
pub const PORT_COUNT: usize = 2;

/// Line levels presented to a serial device on a PDR1 write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SerialLines {
    /// True when the device is selected (pin low)
    pub chip_select: bool,
    pub clock: bool,
    pub data: bool,
}

impl SerialLines {
    pub fn from_pdr(value: u8) -> Self {
        Self {
            chip_select: value & PDR1_CHIP_SELECT == 0,
            clock: value & PDR1_CLOCK != 0,
            data: value & PDR1_DATA_OUT != 0,
        }
    }
}

/// Bit-banged device on a port (serial EEPROM and the like).
///
/// Storage and its persistence belong to the device.
pub trait SerialDevice {
    /// Called on every data register write with the new line levels
    fn drive(&mut self, lines: SerialLines);
    /// Level of the device's output pin
    fn data_out(&self) -> bool;
}

/// Latched outputs merged with external inputs.
///
/// Pins configured as outputs read back what was written; inputs read
/// `inputs`.
pub fn read_pins(pdr: u8, ddr: u8, inputs: u8) -> u8 {
    (pdr & ddr) | (inputs & !ddr)
}

/// Input pins of port 1 when a device is attached. Unconnected pins pull up.
pub fn device_inputs(device: Option<&dyn SerialDevice>) -> u8 {
    match device {
        Some(device) if !device.data_out() => !PDR1_DATA_IN,
        _ => 0xFF,
    }
}
