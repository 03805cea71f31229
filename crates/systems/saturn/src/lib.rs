//! Saturn-class system chipset: SMPC and SCU.
//!
//! This crate models the two chips that sit between the CPUs and the rest of
//! the machine:
//!
//! - **SMPC**: command processor for power, clock and reset control, the
//!   real-time clock and the parallel I/O ports
//! - **SCU**: scanline-driven interrupt controller with two timers, and a
//!   three-level DMA engine
//!
//! CPU cores, video, sound and memory are collaborators. The host supplies
//! them through [`CpuControl`], [`InterruptSink`] and
//! [`emu_core::MemoryBus`], and drives the chipset one scanline at a time
//! with [`Chipset::step_scanline`].
//!
//! # Scanline Order
//!
//! Each line runs, in order:
//! 1. SMPC command latency countdown
//! 2. Timer/blanking evaluation, interrupt latching and DMA start factors
//! 3. DMA, up to the configured number of units
//! 4. Interrupt delivery to the primary CPU
//! 5. Clock advance

mod bus;
pub mod config;
pub mod cpu;
pub mod scanline;
pub mod scu;
pub mod smpc;

use emu_core::logging::{log, LogCategory, LogConfig, LogLevel};
use emu_core::MemoryBus;
use scanline::{ScanlineClock, ScanlineTiming};
use serde::Deserialize;
use thiserror::Error;

pub use config::{ChipsetConfig, Region};
pub use cpu::{ClockSpeed, CpuControl, CpuId, InterruptSink};
pub use scu::dma::{DmaCompletion, DmaError, DmaMode, DmaTransfer, DmaTrigger};
pub use scu::interrupt::InterruptSource;
pub use scu::Scu;
pub use smpc::command::SmpcCommand;
pub use smpc::port::{SerialDevice, SerialLines};
pub use smpc::rtc::{DateTime, FixedClock, HostClock, RealTimeClock};
pub use smpc::Smpc;

const STATE_VERSION: u64 = 1;
const STATE_SYSTEM: &str = "saturn-chipset";

#[derive(Error, Debug)]
pub enum SaturnError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid save state: {0}")]
    InvalidState(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened on one scanline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanlineReport {
    pub line: u16,
    /// Scanline events in assertion order, masked or not
    pub events: Vec<InterruptSource>,
    /// DMA levels that finished on this line
    pub dma: Vec<DmaCompletion>,
    /// Interrupts the CPU accepted
    pub delivered: usize,
    /// This line was the last of its frame
    pub frame_end: bool,
}

pub struct Chipset {
    config: ChipsetConfig,
    clock: ScanlineClock,
    scu: Scu,
    smpc: Smpc,
}

impl Chipset {
    pub fn new(config: ChipsetConfig) -> Result<Self, SaturnError> {
        config.validate()?;
        if let Some(level) = config.log_level {
            LogConfig::global().set_global_level(level);
        }
        if let Some(path) = &config.log_file {
            LogConfig::global().set_log_file(path.clone())?;
        }
        let clock = ScanlineClock::new(config.total_lines, config.active_lines)?;
        log(LogCategory::Timing, LogLevel::Info, || {
            format!(
                "Chipset: {} lines/frame, {} active, region {:?}",
                config.total_lines, config.active_lines, config.region
            )
        });
        Ok(Self {
            clock,
            scu: Scu::new(config.max_indirect_descriptors),
            smpc: Smpc::new(config.region, config.command_latency),
            config,
        })
    }

    pub fn config(&self) -> &ChipsetConfig {
        &self.config
    }

    pub fn clock(&self) -> &ScanlineClock {
        &self.clock
    }

    pub fn scu(&self) -> &Scu {
        &self.scu
    }

    pub fn scu_mut(&mut self) -> &mut Scu {
        &mut self.scu
    }

    pub fn smpc(&self) -> &Smpc {
        &self.smpc
    }

    pub fn smpc_mut(&mut self) -> &mut Smpc {
        &mut self.smpc
    }

    pub fn set_rtc(&mut self, rtc: Box<dyn RealTimeClock>) {
        self.smpc.set_rtc(rtc);
    }

    pub fn attach_port_device(&mut self, port: usize, device: Box<dyn SerialDevice>) {
        self.smpc.attach_port_device(port, device);
    }

    /// Power-on reset of both chips and the line counter
    pub fn reset(&mut self) {
        self.clock.reset();
        self.scu.reset();
        self.smpc.reset();
    }

    /// Reset button on the console
    pub fn press_reset_button<C: CpuControl + ?Sized>(&mut self, cpu: &mut C) -> bool {
        self.smpc.press_reset_button(cpu)
    }

    /// Run one scanline
    pub fn step_scanline<C>(&mut self, bus: &mut dyn MemoryBus, cpu: &mut C) -> ScanlineReport
    where
        C: CpuControl + InterruptSink + ?Sized,
    {
        let line = self.clock.current_line();
        self.smpc.tick(cpu, self.scu.interrupts_mut());
        let events = self.scu.on_scanline(&self.clock);
        let dma = self.scu.run_dma(bus, self.config.dma_units_per_line);
        let delivered = self.scu.interrupts_mut().deliver(cpu);
        let frame_end = self.clock.advance();
        ScanlineReport {
            line,
            events,
            dma,
            delivered,
            frame_end,
        }
    }

    /// Run scanlines until the current frame ends
    pub fn step_frame<C>(&mut self, bus: &mut dyn MemoryBus, cpu: &mut C) -> Vec<ScanlineReport>
    where
        C: CpuControl + InterruptSink + ?Sized,
    {
        let mut reports = Vec::with_capacity(usize::from(self.clock.total_lines()));
        loop {
            let report = self.step_scanline(bus, cpu);
            let done = report.frame_end;
            reports.push(report);
            if done {
                return reports;
            }
        }
    }

    pub fn save_state(&self) -> serde_json::Value {
        serde_json::json!({
            "version": STATE_VERSION,
            "system": STATE_SYSTEM,
            "clock": self.clock,
            "scu": self.scu,
            "smpc": self.smpc.save_state(),
        })
    }

    pub fn load_state(&mut self, v: &serde_json::Value) -> Result<(), SaturnError> {
        if v["system"].as_str() != Some(STATE_SYSTEM) {
            return Err(SaturnError::InvalidState(format!(
                "not a {} state",
                STATE_SYSTEM
            )));
        }
        if v["version"].as_u64() != Some(STATE_VERSION) {
            return Err(SaturnError::InvalidState(format!(
                "unsupported version {}",
                v["version"]
            )));
        }
        let clock = ScanlineClock::deserialize(&v["clock"])?;
        if clock.total_lines() != self.config.total_lines
            || clock.active_lines() != self.config.active_lines
        {
            return Err(SaturnError::InvalidState(format!(
                "state was saved with {}/{} lines, chipset has {}/{}",
                clock.total_lines(),
                clock.active_lines(),
                self.config.total_lines,
                self.config.active_lines
            )));
        }
        let scu = Scu::deserialize(&v["scu"])?;
        self.smpc.load_state(&v["smpc"])?;
        self.clock = clock;
        self.scu = scu;
        Ok(())
    }
}
