//! SCU interrupt controller
//!
//! Every interrupt source has a fixed priority level, vector and bit position
//! in the interrupt mask (IMS) and status (IST) registers:
//!
//! | Source           | Level | Vector | Bit |
//! |------------------|-------|--------|-----|
//! | VBLANK-IN        | 15    | 0x40   | 0   |
//! | VBLANK-OUT       | 14    | 0x41   | 1   |
//! | HBLANK-IN        | 13    | 0x42   | 2   |
//! | Timer 0          | 12    | 0x43   | 3   |
//! | Timer 1          | 11    | 0x44   | 4   |
//! | System manager   | 8     | 0x47   | 7   |
//! | Pad              | 8     | 0x48   | 8   |
//! | Level-2 DMA end  | 6     | 0x49   | 9   |
//! | Level-1 DMA end  | 6     | 0x4A   | 10  |
//! | Level-0 DMA end  | 5     | 0x4B   | 11  |
//! | Sprite draw end  | 2     | 0x4D   | 13  |
//!
//! A set IMS bit suppresses the source: it is neither latched nor delivered.
//! Latched sources wait in IST until the CPU accepts them; delivery walks
//! them in [`InterruptSource::PRIORITY_ORDER`] and stops at the first one the
//! CPU refuses, so nothing is ever dropped.

use crate::cpu::InterruptSink;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// IMS bits that exist in hardware
const IMS_VALID: u32 = 0xBFFF;

/// Static description of an interrupt line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptLine {
    pub level: u8,
    pub vector: u8,
    pub mask_bit: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterruptSource {
    VBlankIn,
    VBlankOut,
    HBlankIn,
    Timer0,
    Timer1,
    /// Peripheral controller command complete
    SystemManager,
    /// External pad latch
    Pad,
    Dma2End,
    Dma1End,
    Dma0End,
    SpriteDrawEnd,
}

impl InterruptSource {
    /// Order in which simultaneously pending sources are offered to the CPU
    pub const PRIORITY_ORDER: [InterruptSource; 11] = [
        InterruptSource::VBlankIn,
        InterruptSource::VBlankOut,
        InterruptSource::Timer0,
        InterruptSource::Timer1,
        InterruptSource::HBlankIn,
        InterruptSource::SpriteDrawEnd,
        InterruptSource::Pad,
        InterruptSource::SystemManager,
        InterruptSource::Dma0End,
        InterruptSource::Dma1End,
        InterruptSource::Dma2End,
    ];

    pub fn line(self) -> InterruptLine {
        let (level, vector, mask_bit) = match self {
            InterruptSource::VBlankIn => (15, 0x40, 0),
            InterruptSource::VBlankOut => (14, 0x41, 1),
            InterruptSource::HBlankIn => (13, 0x42, 2),
            InterruptSource::Timer0 => (12, 0x43, 3),
            InterruptSource::Timer1 => (11, 0x44, 4),
            InterruptSource::SystemManager => (8, 0x47, 7),
            InterruptSource::Pad => (8, 0x48, 8),
            InterruptSource::Dma2End => (6, 0x49, 9),
            InterruptSource::Dma1End => (6, 0x4A, 10),
            InterruptSource::Dma0End => (5, 0x4B, 11),
            InterruptSource::SpriteDrawEnd => (2, 0x4D, 13),
        };
        InterruptLine {
            level,
            vector,
            mask_bit,
        }
    }

    pub fn level(self) -> u8 {
        self.line().level
    }

    pub fn vector(self) -> u8 {
        self.line().vector
    }

    /// IMS/IST bit for this source
    pub fn bit(self) -> u32 {
        1 << self.line().mask_bit
    }

    /// Completion interrupt of a DMA level
    pub fn dma_end(level: usize) -> Option<Self> {
        match level {
            0 => Some(InterruptSource::Dma0End),
            1 => Some(InterruptSource::Dma1End),
            2 => Some(InterruptSource::Dma2End),
            _ => None,
        }
    }
}

/// IMS/IST register pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptController {
    /// IMS - set bits suppress the source
    mask: u32,
    /// IST - latched, not yet accepted
    pending: u32,
}

impl InterruptController {
    /// Everything starts masked, as after power-on
    pub fn new() -> Self {
        Self {
            mask: IMS_VALID,
            pending: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn set_mask(&mut self, value: u32) {
        self.mask = value & IMS_VALID;
    }

    pub fn is_masked(&self, source: InterruptSource) -> bool {
        self.mask & source.bit() != 0
    }

    /// Assert a source. Returns false if it was masked and therefore dropped.
    pub fn raise(&mut self, source: InterruptSource) -> bool {
        if self.is_masked(source) {
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("SCU: {:?} masked", source)
            });
            return false;
        }
        self.pending |= source.bit();
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!(
                "SCU: {:?} asserted (level {}, vector 0x{:02X})",
                source,
                source.level(),
                source.vector()
            )
        });
        true
    }

    /// IST contents
    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn is_pending(&self, source: InterruptSource) -> bool {
        self.pending & source.bit() != 0
    }

    /// IST write: bits written as 0 are cleared
    pub fn acknowledge(&mut self, value: u32) {
        self.pending &= value;
    }

    pub fn has_pending_interrupt(&self) -> bool {
        self.pending & !self.mask != 0
    }

    /// Offer pending, unmasked sources to the CPU in priority order.
    ///
    /// Stops at the first refusal; the refused source and everything behind
    /// it stay pending. Returns how many interrupts were taken.
    pub fn deliver<S: InterruptSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut delivered = 0;
        for source in InterruptSource::PRIORITY_ORDER {
            if !self.is_pending(source) || self.is_masked(source) {
                continue;
            }
            let line = source.line();
            if !sink.accept_interrupt(line.level, line.vector) {
                log(LogCategory::Interrupts, LogLevel::Trace, || {
                    format!("SCU: CPU busy, {:?} left pending", source)
                });
                break;
            }
            self.pending &= !source.bit();
            delivered += 1;
        }
        delivered
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}
