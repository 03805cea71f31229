//! CPU-facing address decoder for the chipset's register windows
//!
//! The top nibble selects the SH-2 cache area and is ignored, so
//! `0x2010_0000` and `0x0010_0000` reach the same SMPC register.
//!
//! - SMPC: `0x0010_0000-0x0010_007F`, byte registers on odd addresses.
//!   Even addresses read 0 and ignore writes.
//! - SCU: `0x05FE_0000-0x05FE_00FF`, 32-bit registers. Narrow writes are
//!   merged into the current register value and committed once.
//!
//! Wider accesses are split big-endian.

use crate::cpu::CpuControl;
use crate::Chipset;
use emu_core::logging::{log, LogCategory, LogLevel};

const ADDRESS_MASK: u32 = 0x0FFF_FFFF;
const SMPC_START: u32 = 0x0010_0000;
const SMPC_END: u32 = 0x0010_007F;
const SCU_START: u32 = 0x05FE_0000;
const SCU_END: u32 = 0x05FE_00FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Smpc(u32),
    Scu(u32),
    Unmapped,
}

fn decode(addr: u32) -> Target {
    let physical = addr & ADDRESS_MASK;
    match physical {
        SMPC_START..=SMPC_END => Target::Smpc(physical - SMPC_START),
        SCU_START..=SCU_END => Target::Scu(physical - SCU_START),
        _ => Target::Unmapped,
    }
}

impl Chipset {
    pub fn read_byte(&self, addr: u32) -> u8 {
        match decode(addr) {
            Target::Smpc(offset) if offset & 1 == 1 => self.smpc.read(offset),
            Target::Smpc(_) => 0,
            Target::Scu(offset) => {
                let value = self.scu.read_register(offset & !3);
                value.to_be_bytes()[(offset & 3) as usize]
            }
            Target::Unmapped => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("Bus: unmapped read at 0x{:08X}", addr)
                });
                0
            }
        }
    }

    pub fn read_word(&self, addr: u32) -> u16 {
        u16::from_be_bytes([self.read_byte(addr), self.read_byte(addr.wrapping_add(1))])
    }

    pub fn read_long(&self, addr: u32) -> u32 {
        match decode(addr) {
            Target::Scu(offset) if offset & 3 == 0 => self.scu.read_register(offset),
            _ => u32::from_be_bytes([
                self.read_byte(addr),
                self.read_byte(addr.wrapping_add(1)),
                self.read_byte(addr.wrapping_add(2)),
                self.read_byte(addr.wrapping_add(3)),
            ]),
        }
    }

    pub fn write_byte<C: CpuControl + ?Sized>(&mut self, addr: u32, val: u8, cpu: &mut C) {
        match decode(addr) {
            Target::Smpc(offset) if offset & 1 == 1 => {
                self.smpc
                    .write(offset, val, cpu, self.scu.interrupts_mut());
            }
            Target::Smpc(_) => {}
            Target::Scu(offset) => self.write_scu_partial(offset, &[val]),
            Target::Unmapped => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("Bus: unmapped write 0x{:02X} at 0x{:08X}", val, addr)
                });
            }
        }
    }

    pub fn write_word<C: CpuControl + ?Sized>(&mut self, addr: u32, val: u16, cpu: &mut C) {
        match decode(addr) {
            Target::Scu(offset) if offset & 1 == 0 => {
                self.write_scu_partial(offset, &val.to_be_bytes());
            }
            _ => {
                let [hi, lo] = val.to_be_bytes();
                self.write_byte(addr, hi, cpu);
                self.write_byte(addr.wrapping_add(1), lo, cpu);
            }
        }
    }

    pub fn write_long<C: CpuControl + ?Sized>(&mut self, addr: u32, val: u32, cpu: &mut C) {
        match decode(addr) {
            Target::Scu(offset) if offset & 3 == 0 => self.scu.write_register(offset, val),
            _ => {
                for (i, byte) in val.to_be_bytes().into_iter().enumerate() {
                    self.write_byte(addr.wrapping_add(i as u32), byte, cpu);
                }
            }
        }
    }

    /// Merge `bytes` into the SCU register containing `offset`
    fn write_scu_partial(&mut self, offset: u32, bytes: &[u8]) {
        let register = offset & !3;
        let mut value = self.scu.read_register(register).to_be_bytes();
        let start = (offset & 3) as usize;
        for (slot, &byte) in value[start..].iter_mut().zip(bytes) {
            *slot = byte;
        }
        self.scu.write_register(register, u32::from_be_bytes(value));
    }
}
