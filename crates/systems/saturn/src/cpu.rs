//! Interfaces to the CPUs the chipset drives.
//!
//! The chipset never touches CPU internals. The peripheral controller pulls
//! reset/halt/NMI lines through [`CpuControl`], and the interrupt controller
//! offers leveled, vectored interrupts through [`InterruptSink`]. The host
//! decides what those mean for its CPU cores.

use serde::{Deserialize, Serialize};

/// The three processors whose lifecycle the peripheral controller manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuId {
    /// Primary SH-2
    Master,
    /// Secondary SH-2
    Slave,
    /// 68000 sound CPU
    Sound,
}

/// Dot clock selection, switched by the clock-change commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClockSpeed {
    /// 320-pixel mode, 26.8 MHz master clock
    #[default]
    Dot320,
    /// 352-pixel mode, 28.6 MHz master clock
    Dot352,
}

impl ClockSpeed {
    /// Master CPU clock in Hz (NTSC)
    pub fn master_hz(self) -> u32 {
        match self {
            ClockSpeed::Dot320 => 26_846_587,
            ClockSpeed::Dot352 => 28_636_360,
        }
    }

    /// Sound CPU clock in Hz
    pub fn sound_hz(self) -> u32 {
        match self {
            ClockSpeed::Dot320 => 11_289_600,
            ClockSpeed::Dot352 => 11_454_544,
        }
    }
}

/// Reset, halt and NMI lines of the CPUs
pub trait CpuControl {
    /// Pulse the CPU through reset
    fn reset(&mut self, cpu: CpuId);
    /// Hold the CPU stopped
    fn halt_assert(&mut self, cpu: CpuId);
    /// Let the CPU run
    fn halt_clear(&mut self, cpu: CpuId);
    /// One-shot NMI on the primary CPU
    fn request_nmi(&mut self);
    /// Switch the CPU and sound clock dividers
    fn change_clock(&mut self, _speed: ClockSpeed) {}
}

/// Interrupt acceptance interface of the primary CPU
pub trait InterruptSink {
    /// Offer an interrupt. Returning `false` means the CPU cannot take another
    /// one this cycle; the controller keeps it pending for a later boundary.
    fn accept_interrupt(&mut self, level: u8, vector: u8) -> bool;
}
