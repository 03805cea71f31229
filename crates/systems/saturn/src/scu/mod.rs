//! SCU (System Control Unit) - interrupt controller, scanline timers and DMA
//!
//! # Register Map (32-bit registers)
//!
//! - `0x00-0x5F`: DMA levels 0-2, `0x20` bytes each (see [`dma`])
//! - `0x7C`: DSTA, DMA status (read)
//! - `0x90`: T0C, Timer 0 compare
//! - `0x94`: T1S, Timer 1 set data
//! - `0x98`: T1MD, Timer 1 mode
//! - `0xA0`: IMS, interrupt mask
//! - `0xA4`: IST, interrupt status (write 0 to clear)
//! - `0xC8`: VER, version (read)

pub mod dma;
pub mod interrupt;
pub mod timer;

use crate::scanline::ScanlineTiming;
use dma::{DmaCompletion, DmaEngine, DmaTrigger, DMA_CHANNELS};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::MemoryBus;
use interrupt::{InterruptController, InterruptSource};
use serde::{Deserialize, Serialize};
use timer::TimerUnit;

const DMA_LEVEL_STRIDE: u32 = 0x20;
const DSTA: u32 = 0x7C;
const T0C: u32 = 0x90;
const T1S: u32 = 0x94;
const T1MD: u32 = 0x98;
const IMS: u32 = 0xA0;
const IST: u32 = 0xA4;
const VER: u32 = 0xC8;

/// Value returned by VER
pub const SCU_VERSION: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scu {
    interrupts: InterruptController,
    timers: TimerUnit,
    dma: DmaEngine,
}

impl Scu {
    pub fn new(max_indirect_descriptors: u32) -> Self {
        Self {
            interrupts: InterruptController::new(),
            timers: TimerUnit::new(),
            dma: DmaEngine::new(max_indirect_descriptors),
        }
    }

    pub fn reset(&mut self) {
        self.interrupts.reset();
        self.timers.reset();
        self.dma.reset();
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }

    pub fn timers(&self) -> &TimerUnit {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerUnit {
        &mut self.timers
    }

    pub fn dma(&self) -> &DmaEngine {
        &self.dma
    }

    pub fn dma_mut(&mut self) -> &mut DmaEngine {
        &mut self.dma
    }

    /// Evaluate one scanline boundary: latch the interrupts it produces and
    /// kick DMA levels waiting on those events. DMA start factors see every
    /// event, masked or not.
    pub fn on_scanline<T: ScanlineTiming + ?Sized>(&mut self, timing: &T) -> Vec<InterruptSource> {
        let events = self.timers.on_scanline(timing);
        for &event in &events {
            self.interrupts.raise(event);
            if let Some(trigger) = DmaTrigger::from_event(event) {
                self.dma.trigger(trigger);
            }
        }
        events
    }

    /// Give the DMA engine up to `units` bus units and raise the end
    /// interrupt of every level that finishes
    pub fn run_dma(&mut self, bus: &mut dyn MemoryBus, units: u32) -> Vec<DmaCompletion> {
        let completions = self.dma.run(bus, units);
        for done in &completions {
            if !done.notify {
                continue;
            }
            if let Some(source) = InterruptSource::dma_end(done.level) {
                self.interrupts.raise(source);
            }
        }
        completions
    }

    pub fn read_register(&self, offset: u32) -> u32 {
        match offset {
            o if o < DMA_LEVEL_STRIDE * DMA_CHANNELS as u32 => self
                .dma
                .read_register((o / DMA_LEVEL_STRIDE) as usize, o % DMA_LEVEL_STRIDE),
            DSTA => self.dma.status(),
            T0C => u32::from(self.timers.timer0_compare()),
            T1S => u32::from(self.timers.timer1_set()),
            T1MD => self.timers.timer1_mode(),
            IMS => self.interrupts.mask(),
            IST => self.interrupts.pending(),
            VER => SCU_VERSION,
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("SCU: read from unimplemented register 0x{:02X}", offset)
                });
                0
            }
        }
    }

    pub fn write_register(&mut self, offset: u32, value: u32) {
        match offset {
            o if o < DMA_LEVEL_STRIDE * DMA_CHANNELS as u32 => self.dma.write_register(
                (o / DMA_LEVEL_STRIDE) as usize,
                o % DMA_LEVEL_STRIDE,
                value,
            ),
            T0C => self.timers.set_timer0_compare(value),
            T1S => self.timers.set_timer1_set(value),
            T1MD => self.timers.set_timer1_mode(value),
            IMS => {
                self.interrupts.set_mask(value);
                log(LogCategory::Interrupts, LogLevel::Debug, || {
                    format!("SCU: IMS = 0x{:04X}", self.interrupts.mask())
                });
            }
            IST => self.interrupts.acknowledge(value),
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!(
                        "SCU: write 0x{:08X} to unimplemented register 0x{:02X}",
                        value, offset
                    )
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::dma::DmaTransfer;
    use super::*;
    use crate::scanline::ScanlineClock;
    use emu_core::FlatMemory;

    #[test]
    fn test_scanline_events_latch_unmasked_only() {
        let mut scu = Scu::new(1024);
        scu.write_register(IMS, !InterruptSource::VBlankOut.bit());
        let clock = ScanlineClock::new(263, 224).unwrap();

        assert_eq!(scu.on_scanline(&clock), vec![InterruptSource::VBlankOut]);
        assert_eq!(scu.read_register(IST), InterruptSource::VBlankOut.bit());
    }

    #[test]
    fn test_vblank_start_factor_ignores_mask() {
        let mut scu = Scu::new(1024);
        let mut mem = FlatMemory::new(0x1000);
        mem.load(0x100, &[1, 2, 3, 4]);

        scu.write_register(0x00, 0x100);
        scu.write_register(0x04, 0x200);
        scu.write_register(0x08, 4);
        scu.write_register(0x0C, 0x101);
        scu.write_register(0x14, DmaTrigger::VBlankOut.to_bits());
        scu.write_register(0x10, 0x100);
        assert_eq!(scu.read_register(DSTA), 0);

        // Everything still masked after power-on
        let clock = ScanlineClock::new(263, 224).unwrap();
        scu.on_scanline(&clock);
        assert_eq!(scu.read_register(DSTA), 1);
        assert_eq!(scu.read_register(IST), 0);

        scu.run_dma(&mut mem, 16);
        assert_eq!(mem.slice(0x200, 4), vec![1, 2, 3, 4]);
        assert_eq!(scu.read_register(DSTA), 0);
    }

    #[test]
    fn test_dma_completion_raises_level_interrupt() {
        let mut scu = Scu::new(1024);
        scu.write_register(IMS, 0);
        let mut mem = FlatMemory::new(0x1000);

        scu.dma_mut()
            .start(1, DmaTransfer::direct(0x0, 0x800, 8))
            .unwrap();
        assert!(scu.run_dma(&mut mem, 4).is_empty());
        let done = scu.run_dma(&mut mem, 4);
        assert_eq!(done.len(), 1);
        assert!(scu.interrupts().is_pending(InterruptSource::Dma1End));
    }

    #[test]
    fn test_completion_interrupt_can_be_disabled() {
        let mut scu = Scu::new(1024);
        scu.write_register(IMS, 0);
        let mut mem = FlatMemory::new(0x1000);

        scu.dma_mut().set_interrupt_on_complete(2, false);
        scu.dma_mut()
            .start(2, DmaTransfer::direct(0x0, 0x800, 2))
            .unwrap();
        assert_eq!(scu.run_dma(&mut mem, 8).len(), 1);
        assert_eq!(scu.interrupts().pending(), 0);
    }

    #[test]
    fn test_aborted_chain_interrupts_even_when_disabled() {
        let mut scu = Scu::new(4);
        scu.write_register(IMS, 0);
        // All-zero table: empty descriptors with no end flag
        let mut mem = FlatMemory::new(0x1000);

        scu.dma_mut().set_interrupt_on_complete(0, false);
        scu.dma_mut().start(0, DmaTransfer::indirect(0x0)).unwrap();
        let done = scu.run_dma(&mut mem, 64);
        assert_eq!(done.len(), 1);
        assert!(done[0].aborted);
        assert!(scu.interrupts().is_pending(InterruptSource::Dma0End));
    }

    #[test]
    fn test_timer_and_interrupt_registers() {
        let mut scu = Scu::new(1024);
        scu.write_register(T0C, 0x3FF);
        scu.write_register(T1S, 0x12);
        scu.write_register(T1MD, 0x101);
        assert_eq!(scu.read_register(T0C), 0x1FF);
        assert_eq!(scu.read_register(T1S), 0x12);
        assert_eq!(scu.read_register(T1MD), 0x101);

        scu.write_register(IMS, 0xFFFF_FFFF);
        assert_eq!(scu.read_register(IMS), 0xBFFF);
        assert_eq!(scu.read_register(VER), SCU_VERSION);
        assert_eq!(scu.read_register(0xFC), 0);
    }

    #[test]
    fn test_ist_write_clears_zero_bits() {
        let mut scu = Scu::new(1024);
        scu.write_register(IMS, 0);
        scu.interrupts_mut().raise(InterruptSource::Timer0);
        scu.interrupts_mut().raise(InterruptSource::Pad);
        scu.write_register(IST, !InterruptSource::Timer0.bit());
        assert_eq!(scu.read_register(IST), InterruptSource::Pad.bit());
    }

    #[test]
    fn test_reset() {
        let mut scu = Scu::new(1024);
        scu.write_register(IMS, 0);
        scu.write_register(T0C, 10);
        scu.dma_mut()
            .start(0, DmaTransfer::direct(0, 0x10, 4))
            .unwrap();
        scu.reset();
        assert_eq!(scu, Scu::new(1024));
    }
}
