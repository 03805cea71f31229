//! SMPC (System Manager & Peripheral Control)
//!
//! Command/response register file on the CPU bus. Software fills the input
//! registers, sets SF, writes an opcode to COMREG and polls SF until the
//! controller clears it; results are then in the output registers.
//!
//! # Register Map (byte registers on odd offsets)
//!
//! - `0x01-0x0D`: IREG0-6 (write)
//! - `0x1F`: COMREG (write)
//! - `0x21-0x5F`: OREG0-31 (read)
//! - `0x61`: SR (read)
//! - `0x63`: SF (read/write)
//! - `0x75`/`0x77`: PDR1/PDR2
//! - `0x79`/`0x7B`: DDR1/DDR2
//! - `0x7D`: IOSEL (bit 0 port 1, bit 1 port 2), latched and read back only
//! - `0x7F`: EXLE (bit 0 port 1, bit 1 port 2)
//!
//! # Command Timing
//!
//! With a latency of 0 a command runs inside the COMREG write. Otherwise it
//! stays in flight for that many scanlines ([`Smpc::tick`]) and SF reads busy
//! until it completes. A COMREG write while a command is in flight is ignored
//! with a warning; the in-flight command keeps the inputs captured when it
//! was issued.

pub mod command;
pub mod port;
pub mod rtc;

use crate::config::Region;
use crate::cpu::{ClockSpeed, CpuControl, CpuId};
use crate::scu::interrupt::{InterruptController, InterruptSource};
use crate::SaturnError;
use command::SmpcCommand;
use emu_core::logging::{log, LogCategory, LogLevel};
use port::{SerialDevice, SerialLines, PDR2_SOUND_HALT, PORT_COUNT};
use rtc::{HostClock, RealTimeClock};
use serde::{Deserialize, Serialize};

pub const IREG_BASE: u32 = 0x01;
pub const IREG_COUNT: usize = 7;
pub const COMREG: u32 = 0x1F;
pub const OREG_BASE: u32 = 0x21;
pub const OREG_COUNT: usize = 32;
pub const SR: u32 = 0x61;
pub const SF: u32 = 0x63;
pub const PDR1: u32 = 0x75;
pub const PDR2: u32 = 0x77;
pub const DDR1: u32 = 0x79;
pub const DDR2: u32 = 0x7B;
pub const IOSEL: u32 = 0x7D;
pub const EXLE: u32 = 0x7F;

/// OREG0 bit 7: SETTIME has been issued
const STATUS_TIME_SET: u8 = 0x80;
/// OREG0 bit 6: reset button NMI suppressed
const STATUS_RESET_DISABLED: u8 = 0x40;
/// OREG10 system status base value
const SYSTEM_STATUS: u8 = 0x34;
/// OREG10 bit 6: 352-dot mode
const SYSTEM_STATUS_DOT352: u8 = 0x40;
/// SR bit 7: status data available
const SR_STATUS_READY: u8 = 0x80;
/// SR bit 0: reset requested, always reported clear
const SR_RESET: u8 = 0x01;
/// Index of the command echo slot
const OREG_ECHO: usize = 31;

/// A command waiting for its latency to expire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightCommand {
    pub opcode: u8,
    pub remaining: u32,
    /// IREG contents at the time of the COMREG write
    pub ireg: [u8; IREG_COUNT],
}

/// Register file and latches; everything here is part of a save state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmpcRegisters {
    pub ireg: [u8; IREG_COUNT],
    pub oreg: [u8; OREG_COUNT],
    pub comreg: u8,
    pub status_flag: bool,
    pub status_register: u8,
    pub pdr: [u8; PORT_COUNT],
    pub ddr: [u8; PORT_COUNT],
    /// IOSEL bits: set means the CPU drives the port directly. Only latched;
    /// PDR writes reach the serial device and the sound halt line in either mode.
    pub iosel: u8,
    /// EXLE bits: external latch enable per port
    pub exle: u8,
    /// Inverted sense: true means the reset button does not raise NMI
    pub nmi_suppressed: bool,
    pub time_set: bool,
    pub clock_speed: ClockSpeed,
    pub in_flight: Option<InFlightCommand>,
}

pub struct Smpc {
    regs: SmpcRegisters,
    rtc: Box<dyn RealTimeClock>,
    ports: [Option<Box<dyn SerialDevice>>; PORT_COUNT],
    latency: u32,
    region: Region,
}

impl Smpc {
    pub fn new(region: Region, latency: u32) -> Self {
        Self {
            regs: SmpcRegisters::default(),
            rtc: Box::new(HostClock),
            ports: [None, None],
            latency,
            region,
        }
    }

    /// Power-on state. Attached collaborators stay attached.
    pub fn reset(&mut self) {
        self.regs = SmpcRegisters::default();
    }

    pub fn set_rtc(&mut self, rtc: Box<dyn RealTimeClock>) {
        self.rtc = rtc;
    }

    /// Attach a serial device to port 0 or 1
    pub fn attach_port_device(&mut self, port: usize, device: Box<dyn SerialDevice>) {
        if let Some(slot) = self.ports.get_mut(port) {
            *slot = Some(device);
        }
    }

    pub fn registers(&self) -> &SmpcRegisters {
        &self.regs
    }

    pub fn oreg(&self, index: usize) -> u8 {
        self.regs.oreg.get(index).copied().unwrap_or(0)
    }

    /// SF as software sees it
    pub fn status_flag(&self) -> bool {
        self.regs.status_flag || self.regs.in_flight.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.regs.in_flight.is_some()
    }

    pub fn nmi_suppressed(&self) -> bool {
        self.regs.nmi_suppressed
    }

    pub fn clock_speed(&self) -> ClockSpeed {
        self.regs.clock_speed
    }

    pub fn time_set(&self) -> bool {
        self.regs.time_set
    }

    pub fn read(&self, offset: u32) -> u8 {
        match offset {
            o if is_oreg(o) => self.regs.oreg[((o - OREG_BASE) / 2) as usize],
            SR => self.regs.status_register & !SR_RESET,
            SF => u8::from(self.status_flag()),
            PDR1 | PDR2 => {
                let port = port_index(offset);
                let device = self.ports[port].as_deref();
                port::read_pins(
                    self.regs.pdr[port],
                    self.regs.ddr[port],
                    port::device_inputs(device),
                )
            }
            DDR1 | DDR2 => self.regs.ddr[port_index(offset)],
            IOSEL => self.regs.iosel,
            EXLE => self.regs.exle,
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("SMPC: read from write-only/unmapped offset 0x{:02X}", offset)
                });
                0
            }
        }
    }

    pub fn write<C: CpuControl + ?Sized>(
        &mut self,
        offset: u32,
        value: u8,
        cpu: &mut C,
        interrupts: &mut InterruptController,
    ) {
        match offset {
            o if is_ireg(o) => self.regs.ireg[((o - IREG_BASE) / 2) as usize] = value,
            COMREG => self.issue(value, cpu, interrupts),
            SF => self.regs.status_flag = value == 0x01,
            PDR1 | PDR2 => {
                let port = port_index(offset);
                self.regs.pdr[port] = value;
                // Pins configured as inputs float high
                let pins = port::read_pins(value, self.regs.ddr[port], 0xFF);
                if let Some(device) = self.ports[port].as_deref_mut() {
                    device.drive(SerialLines::from_pdr(pins));
                }
                if offset == PDR2 {
                    if value & PDR2_SOUND_HALT == 0 {
                        cpu.halt_clear(CpuId::Sound);
                    } else {
                        cpu.halt_assert(CpuId::Sound);
                    }
                }
            }
            DDR1 | DDR2 => self.regs.ddr[port_index(offset)] = value & 0x7F,
            IOSEL => self.regs.iosel = value & 0x03,
            EXLE => {
                let enabled = value & 0x03;
                let newly_set = enabled & !self.regs.exle;
                self.regs.exle = enabled;
                if newly_set != 0 {
                    log(LogCategory::Smpc, LogLevel::Debug, || {
                        format!("SMPC: external latch enabled (EXLE=0x{:02X})", enabled)
                    });
                    interrupts.raise(InterruptSource::Pad);
                }
            }
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!(
                        "SMPC: write 0x{:02X} to read-only/unmapped offset 0x{:02X}",
                        value, offset
                    )
                });
            }
        }
    }

    /// Advance one scanline. Completes the in-flight command when its latency
    /// runs out.
    pub fn tick<C: CpuControl + ?Sized>(&mut self, cpu: &mut C, interrupts: &mut InterruptController) {
        let Some(mut pending) = self.regs.in_flight else {
            return;
        };
        pending.remaining = pending.remaining.saturating_sub(1);
        if pending.remaining == 0 {
            self.regs.in_flight = None;
            self.execute(pending.opcode, pending.ireg, cpu, interrupts);
        } else {
            self.regs.in_flight = Some(pending);
        }
    }

    /// Reset button. Raises NMI unless RESDISA is in effect.
    pub fn press_reset_button<C: CpuControl + ?Sized>(&self, cpu: &mut C) -> bool {
        if self.regs.nmi_suppressed {
            log(LogCategory::Smpc, LogLevel::Debug, || {
                "SMPC: reset button ignored (NMI disabled)".to_string()
            });
            return false;
        }
        cpu.request_nmi();
        true
    }

    fn issue<C: CpuControl + ?Sized>(
        &mut self,
        opcode: u8,
        cpu: &mut C,
        interrupts: &mut InterruptController,
    ) {
        if let Some(busy) = self.regs.in_flight {
            log(LogCategory::Smpc, LogLevel::Warn, || {
                format!(
                    "SMPC: command 0x{:02X} written while 0x{:02X} in flight, ignored",
                    opcode, busy.opcode
                )
            });
            return;
        }
        self.regs.comreg = opcode;
        self.regs.status_flag = true;
        let ireg = self.regs.ireg;
        if self.latency == 0 {
            self.execute(opcode, ireg, cpu, interrupts);
        } else {
            self.regs.in_flight = Some(InFlightCommand {
                opcode,
                remaining: self.latency,
                ireg,
            });
        }
    }

    fn execute<C: CpuControl + ?Sized>(
        &mut self,
        opcode: u8,
        ireg: [u8; IREG_COUNT],
        cpu: &mut C,
        interrupts: &mut InterruptController,
    ) {
        let Some(command) = SmpcCommand::from_opcode(opcode) else {
            log(LogCategory::Smpc, LogLevel::Warn, || {
                format!("SMPC: unrecognized command 0x{:02X}", opcode)
            });
            self.regs.status_flag = false;
            return;
        };
        log(LogCategory::Smpc, LogLevel::Debug, || {
            format!("SMPC: {} (0x{:02X}) ireg={:02X?}", command.mnemonic(), opcode, ireg)
        });

        if command != SmpcCommand::IntBack {
            self.regs.status_register &= !SR_STATUS_READY;
        }

        match command {
            SmpcCommand::MasterOn | SmpcCommand::CdOn | SmpcCommand::CdOff => {}
            SmpcCommand::SetSmem => {}
            SmpcCommand::SlaveOn => {
                cpu.reset(CpuId::Slave);
                cpu.halt_clear(CpuId::Slave);
            }
            SmpcCommand::SlaveOff => cpu.halt_assert(CpuId::Slave),
            SmpcCommand::SoundOn => {
                cpu.reset(CpuId::Sound);
                cpu.halt_clear(CpuId::Sound);
            }
            SmpcCommand::SoundOff => cpu.halt_assert(CpuId::Sound),
            SmpcCommand::SystemReset => {
                cpu.reset(CpuId::Master);
                let keep = SmpcRegisters {
                    clock_speed: self.regs.clock_speed,
                    time_set: self.regs.time_set,
                    ..SmpcRegisters::default()
                };
                self.regs = keep;
            }
            SmpcCommand::ClockChange352 => self.change_clock(ClockSpeed::Dot352, cpu),
            SmpcCommand::ClockChange320 => self.change_clock(ClockSpeed::Dot320, cpu),
            SmpcCommand::IntBack => self.status_acquire(interrupts),
            SmpcCommand::SetTime => {
                self.regs.oreg[1..=IREG_COUNT].copy_from_slice(&ireg);
                self.regs.time_set = true;
            }
            SmpcCommand::NmiRequest => cpu.request_nmi(),
            SmpcCommand::ResetEnable => {
                self.regs.nmi_suppressed = false;
                self.regs.oreg[0] &= !STATUS_RESET_DISABLED;
            }
            SmpcCommand::ResetDisable => {
                self.regs.nmi_suppressed = true;
                self.regs.oreg[0] |= STATUS_RESET_DISABLED;
            }
        }

        self.regs.oreg[OREG_ECHO] = opcode;
        self.regs.status_flag = false;
    }

    fn change_clock<C: CpuControl + ?Sized>(&mut self, speed: ClockSpeed, cpu: &mut C) {
        self.regs.clock_speed = speed;
        cpu.change_clock(speed);
        cpu.halt_assert(CpuId::Slave);
        cpu.request_nmi();
    }

    fn status_acquire(&mut self, interrupts: &mut InterruptController) {
        let oreg = &mut self.regs.oreg;
        let mut status = 0;
        if self.regs.time_set {
            status |= STATUS_TIME_SET;
        }
        if self.regs.nmi_suppressed {
            status |= STATUS_RESET_DISABLED;
        }
        oreg[0] = status;
        oreg[1..=7].copy_from_slice(&self.rtc.now().to_bcd());
        // No cartridge
        oreg[8] = 0;
        oreg[9] = self.region.area_code();
        oreg[10] = if self.regs.clock_speed == ClockSpeed::Dot352 {
            SYSTEM_STATUS | SYSTEM_STATUS_DOT352
        } else {
            SYSTEM_STATUS
        };
        oreg[11..=15].fill(0);
        oreg[16..=30].fill(0xFF);
        self.regs.status_register |= SR_STATUS_READY;
        interrupts.raise(InterruptSource::SystemManager);
    }

    pub fn save_state(&self) -> serde_json::Value {
        match serde_json::to_value(&self.regs) {
            Ok(state) => state,
            Err(err) => {
                log(LogCategory::Smpc, LogLevel::Error, || {
                    format!("SMPC: failed to serialize state: {}", err)
                });
                serde_json::Value::Null
            }
        }
    }

    pub fn load_state(&mut self, state: &serde_json::Value) -> Result<(), SaturnError> {
        self.regs = SmpcRegisters::deserialize(state)?;
        Ok(())
    }
}

fn is_ireg(offset: u32) -> bool {
    offset & 1 == 1 && (IREG_BASE..IREG_BASE + 2 * IREG_COUNT as u32).contains(&offset)
}

fn is_oreg(offset: u32) -> bool {
    offset & 1 == 1 && (OREG_BASE..OREG_BASE + 2 * OREG_COUNT as u32).contains(&offset)
}

fn port_index(offset: u32) -> usize {
    match offset {
        PDR2 | DDR2 => 1,
        _ => 0,
    }
}
