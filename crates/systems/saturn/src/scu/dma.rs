//! SCU DMA engine - three prioritized channels (levels 0-2)
//!
//! ## Transfer Modes
//!
//! - **Direct**: copy `length` units from the source to the destination,
//!   stepping both addresses after every unit.
//! - **Indirect**: the source address points at a table of 12-byte
//!   big-endian descriptors `[count, destination, source]`. Bit 31 of the
//!   source word marks the last descriptor. Each descriptor is transferred
//!   with the channel's address steps, then the next one (12 bytes further)
//!   is fetched.
//!
//! A unit is one byte moved through the [`MemoryBus`].
//!
//! ## Arbitration
//!
//! Only one channel owns the bus per unit. Level 0 beats level 1 beats
//! level 2; a higher level started while a lower one is running takes over at
//! the next unit boundary and the lower one resumes later from where it
//! stopped.
//!
//! ## Registers (per level, base `0x20 * level`)
//!
//! - `0x00 DxR`: read (source) address
//! - `0x04 DxW`: write (destination) address
//! - `0x08 DxC`: transfer count (20 bits on level 0, 12 bits on levels 1-2)
//! - `0x0C DxAD`: address add. Bit 8: source step 1 instead of 0.
//!   Bits 0-2: destination step, 0 or `1 << (n - 1)`
//! - `0x10 DxEN`: bit 8 enable, bit 0 start (software factor only)
//! - `0x14 DxMD`: bit 24 indirect mode, bit 16 keep final source address,
//!   bit 8 keep final destination address, bits 0-2 start factor

use super::interrupt::InterruptSource;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::MemoryBus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DMA_CHANNELS: usize = 3;

/// Size of one indirect table entry in bytes
pub const DESCRIPTOR_SIZE: u32 = 12;

/// Bit 31 of a descriptor's source word ends the chain
pub const DESCRIPTOR_END: u32 = 0x8000_0000;

const REG_READ_ADDR: u32 = 0x00;
const REG_WRITE_ADDR: u32 = 0x04;
const REG_COUNT: u32 = 0x08;
const REG_ADD: u32 = 0x0C;
const REG_ENABLE: u32 = 0x10;
const REG_MODE: u32 = 0x14;

const ADD_READ: u32 = 0x100;
const EN_ENABLE: u32 = 0x100;
const EN_GO: u32 = 0x001;
const MD_INDIRECT: u32 = 1 << 24;
const MD_READ_UPDATE: u32 = 1 << 16;
const MD_WRITE_UPDATE: u32 = 1 << 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DmaError {
    #[error("DMA level {0} is already transferring")]
    ChannelBusy(usize),
    #[error("no DMA level {0}")]
    InvalidLevel(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DmaMode {
    #[default]
    Direct,
    Indirect,
}

/// Event that starts a channel (DxMD start factor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DmaTrigger {
    VBlankIn,
    VBlankOut,
    HBlankIn,
    Timer0,
    Timer1,
    SpriteDrawEnd,
    /// Started by writing the DxEN start bit
    #[default]
    Software,
}

impl DmaTrigger {
    /// Decode start factor bits. Factor 5 (sound request) has no source in
    /// this chipset and behaves like a software start.
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x07 {
            0 => DmaTrigger::VBlankIn,
            1 => DmaTrigger::VBlankOut,
            2 => DmaTrigger::HBlankIn,
            3 => DmaTrigger::Timer0,
            4 => DmaTrigger::Timer1,
            6 => DmaTrigger::SpriteDrawEnd,
            _ => DmaTrigger::Software,
        }
    }

    pub fn to_bits(self) -> u32 {
        match self {
            DmaTrigger::VBlankIn => 0,
            DmaTrigger::VBlankOut => 1,
            DmaTrigger::HBlankIn => 2,
            DmaTrigger::Timer0 => 3,
            DmaTrigger::Timer1 => 4,
            DmaTrigger::SpriteDrawEnd => 6,
            DmaTrigger::Software => 7,
        }
    }

    /// The start factor a scanline event corresponds to, if any
    pub fn from_event(source: InterruptSource) -> Option<Self> {
        match source {
            InterruptSource::VBlankIn => Some(DmaTrigger::VBlankIn),
            InterruptSource::VBlankOut => Some(DmaTrigger::VBlankOut),
            InterruptSource::HBlankIn => Some(DmaTrigger::HBlankIn),
            InterruptSource::Timer0 => Some(DmaTrigger::Timer0),
            InterruptSource::Timer1 => Some(DmaTrigger::Timer1),
            InterruptSource::SpriteDrawEnd => Some(DmaTrigger::SpriteDrawEnd),
            _ => None,
        }
    }
}

/// Transfer parameters as programmed into a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DmaTransfer {
    /// Source address, or descriptor table address in indirect mode
    pub source: u32,
    pub dest: u32,
    /// Units to move (direct mode only)
    pub length: u32,
    pub source_step: i32,
    pub dest_step: i32,
    pub mode: DmaMode,
}

impl DmaTransfer {
    pub fn direct(source: u32, dest: u32, length: u32) -> Self {
        Self {
            source,
            dest,
            length,
            source_step: 1,
            dest_step: 1,
            mode: DmaMode::Direct,
        }
    }

    pub fn indirect(table: u32) -> Self {
        Self {
            source: table,
            mode: DmaMode::Indirect,
            ..Self::direct(0, 0, 0)
        }
    }

    pub fn with_steps(mut self, source_step: i32, dest_step: i32) -> Self {
        self.source_step = source_step;
        self.dest_step = dest_step;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
enum ChannelState {
    #[default]
    Idle,
    /// Has work left but does not own the bus
    Pending,
    /// Owns the bus
    Active,
}

/// Reported when a channel finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaCompletion {
    pub level: usize,
    /// Malformed indirect chain cut short
    pub aborted: bool,
    /// Whether the channel's completion interrupt should be raised
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaChannel {
    level: usize,
    /// Programmed registers
    program: DmaTransfer,
    enabled: bool,
    trigger: DmaTrigger,
    keep_source: bool,
    keep_dest: bool,
    interrupt_on_complete: bool,

    // Live transfer state
    source_address: u32,
    dest_address: u32,
    source_step: i32,
    dest_step: i32,
    remaining_length: u32,
    mode: DmaMode,
    state: ChannelState,
    table_address: u32,
    descriptors_read: u32,
    fetch_descriptor: bool,
    last_descriptor: bool,
}

impl DmaChannel {
    fn new(level: usize) -> Self {
        Self {
            level,
            program: DmaTransfer::default(),
            enabled: false,
            trigger: DmaTrigger::Software,
            keep_source: false,
            keep_dest: false,
            interrupt_on_complete: true,
            source_address: 0,
            dest_address: 0,
            source_step: 0,
            dest_step: 0,
            remaining_length: 0,
            mode: DmaMode::Direct,
            state: ChannelState::Idle,
            table_address: 0,
            descriptors_read: 0,
            fetch_descriptor: false,
            last_descriptor: false,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn source_address(&self) -> u32 {
        self.source_address
    }

    pub fn dest_address(&self) -> u32 {
        self.dest_address
    }

    pub fn source_step(&self) -> i32 {
        self.source_step
    }

    pub fn dest_step(&self) -> i32 {
        self.dest_step
    }

    /// Units left in the current transfer (current descriptor when indirect)
    pub fn remaining_length(&self) -> u32 {
        self.remaining_length
    }

    pub fn mode(&self) -> DmaMode {
        self.mode
    }

    /// Owns the bus right now
    pub fn is_active(&self) -> bool {
        self.state == ChannelState::Active
    }

    /// Has a transfer in progress, running or preempted
    pub fn is_busy(&self) -> bool {
        self.state != ChannelState::Idle
    }

    pub fn program(&self) -> &DmaTransfer {
        &self.program
    }

    pub fn trigger(&self) -> DmaTrigger {
        self.trigger
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn count_mask(&self) -> u32 {
        if self.level == 0 {
            0x000F_FFFF
        } else {
            0x0000_0FFF
        }
    }

    fn begin(&mut self, transfer: DmaTransfer) {
        self.source_step = transfer.source_step;
        self.dest_step = transfer.dest_step;
        self.mode = transfer.mode;
        self.descriptors_read = 0;
        self.last_descriptor = false;
        match transfer.mode {
            DmaMode::Direct => {
                self.source_address = transfer.source;
                self.dest_address = transfer.dest;
                self.remaining_length = transfer.length;
                self.fetch_descriptor = false;
            }
            DmaMode::Indirect => {
                self.table_address = transfer.source;
                self.source_address = 0;
                self.dest_address = 0;
                self.remaining_length = 0;
                self.fetch_descriptor = true;
            }
        }
        self.state = ChannelState::Pending;
    }

    fn finish(&mut self, aborted: bool) -> DmaCompletion {
        self.state = ChannelState::Idle;
        self.remaining_length = 0;
        self.fetch_descriptor = false;
        if self.keep_source && self.mode == DmaMode::Direct {
            self.program.source = self.source_address;
        }
        if self.keep_dest {
            self.program.dest = self.dest_address;
        }
        DmaCompletion {
            level: self.level,
            aborted,
            // Aborted chains always interrupt so software stops waiting
            notify: self.interrupt_on_complete || aborted,
        }
    }

    fn read_register(&self, reg: u32) -> u32 {
        match reg {
            REG_READ_ADDR => self.program.source,
            REG_WRITE_ADDR => self.program.dest,
            REG_COUNT => self.program.length,
            REG_ADD => {
                let read = if self.program.source_step != 0 { ADD_READ } else { 0 };
                read | encode_dest_step(self.program.dest_step)
            }
            REG_ENABLE => {
                if self.enabled {
                    EN_ENABLE
                } else {
                    0
                }
            }
            REG_MODE => {
                let mut value = self.trigger.to_bits();
                if self.program.mode == DmaMode::Indirect {
                    value |= MD_INDIRECT;
                }
                if self.keep_source {
                    value |= MD_READ_UPDATE;
                }
                if self.keep_dest {
                    value |= MD_WRITE_UPDATE;
                }
                value
            }
            _ => 0,
        }
    }
}

/// Destination step for DxAD bits 0-2
fn decode_dest_step(bits: u32) -> i32 {
    match bits & 0x07 {
        0 => 0,
        n => 1 << (n - 1),
    }
}

fn encode_dest_step(step: i32) -> u32 {
    match step {
        0 => 0,
        s if s > 0 && (s as u32).is_power_of_two() && s <= 64 => s.trailing_zeros() + 1,
        _ => 1,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaEngine {
    channels: [DmaChannel; DMA_CHANNELS],
    max_descriptors: u32,
}

impl DmaEngine {
    pub fn new(max_descriptors: u32) -> Self {
        Self {
            channels: [DmaChannel::new(0), DmaChannel::new(1), DmaChannel::new(2)],
            max_descriptors,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.max_descriptors);
    }

    pub fn channel(&self, level: usize) -> Option<&DmaChannel> {
        self.channels.get(level)
    }

    pub fn is_busy(&self, level: usize) -> bool {
        self.channels.get(level).is_some_and(|c| c.is_busy())
    }

    pub fn any_busy(&self) -> bool {
        self.channels.iter().any(|c| c.is_busy())
    }

    /// Program a channel and start it immediately
    pub fn start(&mut self, level: usize, transfer: DmaTransfer) -> Result<(), DmaError> {
        let channel = self
            .channels
            .get_mut(level)
            .ok_or(DmaError::InvalidLevel(level))?;
        if channel.is_busy() {
            log(LogCategory::Dma, LogLevel::Warn, || {
                format!("DMA: level {} started while busy, ignored", level)
            });
            return Err(DmaError::ChannelBusy(level));
        }
        channel.program = transfer;
        channel.begin(transfer);
        log(LogCategory::Dma, LogLevel::Debug, || {
            format!(
                "DMA: level {} start {:?} src=0x{:08X} dst=0x{:08X} len={}",
                level, transfer.mode, transfer.source, transfer.dest, transfer.length
            )
        });
        Ok(())
    }

    /// Start a channel from its programmed registers
    pub fn start_programmed(&mut self, level: usize) -> Result<(), DmaError> {
        let transfer = self
            .channels
            .get(level)
            .ok_or(DmaError::InvalidLevel(level))?
            .program;
        self.start(level, transfer)
    }

    /// Kick every enabled channel whose start factor matches `trigger`.
    ///
    /// Returns the levels that were still busy and ignored the start.
    pub fn trigger(&mut self, trigger: DmaTrigger) -> Vec<usize> {
        let mut rejected = Vec::new();
        for level in 0..DMA_CHANNELS {
            let channel = &self.channels[level];
            if !channel.enabled || channel.trigger != trigger {
                continue;
            }
            if channel.is_busy() {
                log(LogCategory::Dma, LogLevel::Warn, || {
                    format!("DMA: level {} still busy, {:?} start ignored", level, trigger)
                });
                rejected.push(level);
                continue;
            }
            // Not busy and in range, so this cannot fail
            let _ = self.start_programmed(level);
        }
        rejected
    }

    /// Choose who owns the bus for the next unit
    fn arbitrate(&mut self) -> Option<usize> {
        let winner = self.channels.iter().position(|c| c.is_busy())?;
        for channel in self.channels.iter_mut() {
            if channel.level != winner && channel.state == ChannelState::Active {
                channel.state = ChannelState::Pending;
                log(LogCategory::Dma, LogLevel::Debug, || {
                    format!(
                        "DMA: level {} preempted by level {} with {} units left",
                        channel.level, winner, channel.remaining_length
                    )
                });
            }
        }
        self.channels[winner].state = ChannelState::Active;
        Some(winner)
    }

    /// Move one unit on behalf of the highest-priority busy channel.
    ///
    /// Returns the completion if that unit finished the channel's transfer.
    /// Returns `None` with nothing moved when all channels are idle.
    pub fn step_unit(&mut self, bus: &mut dyn MemoryBus) -> Option<DmaCompletion> {
        let level = self.arbitrate()?;
        let max_descriptors = self.max_descriptors;
        let channel = &mut self.channels[level];

        while channel.fetch_descriptor {
            if channel.descriptors_read >= max_descriptors {
                log(LogCategory::Dma, LogLevel::Warn, || {
                    format!(
                        "DMA: level {} indirect chain exceeds {} descriptors at 0x{:08X}, aborted",
                        level, max_descriptors, channel.table_address
                    )
                });
                return Some(channel.finish(true));
            }
            let table = channel.table_address;
            let count = bus.read_long(table);
            let dest = bus.read_long(table.wrapping_add(4));
            let source = bus.read_long(table.wrapping_add(8));
            channel.table_address = table.wrapping_add(DESCRIPTOR_SIZE);
            channel.descriptors_read += 1;
            channel.last_descriptor = source & DESCRIPTOR_END != 0;
            channel.source_address = source & !DESCRIPTOR_END;
            channel.dest_address = dest;
            channel.remaining_length = count;
            channel.fetch_descriptor = false;
            log(LogCategory::Dma, LogLevel::Trace, || {
                format!(
                    "DMA: level {} descriptor {} src=0x{:08X} dst=0x{:08X} len={}{}",
                    level,
                    channel.descriptors_read,
                    channel.source_address,
                    dest,
                    count,
                    if channel.last_descriptor { " (end)" } else { "" }
                )
            });
            if count == 0 {
                if channel.last_descriptor {
                    return Some(channel.finish(false));
                }
                channel.fetch_descriptor = true;
            }
        }

        if channel.remaining_length == 0 {
            // Direct transfer programmed with a zero count
            return Some(channel.finish(false));
        }

        let value = bus.read_byte(channel.source_address);
        bus.write_byte(channel.dest_address, value);
        channel.source_address = channel.source_address.wrapping_add_signed(channel.source_step);
        channel.dest_address = channel.dest_address.wrapping_add_signed(channel.dest_step);
        assert!(
            channel.remaining_length > 0,
            "DMA level {} transferred past its length",
            level
        );
        channel.remaining_length -= 1;

        if channel.remaining_length == 0 {
            if channel.mode == DmaMode::Direct || channel.last_descriptor {
                log(LogCategory::Dma, LogLevel::Debug, || {
                    format!("DMA: level {} complete", level)
                });
                return Some(channel.finish(false));
            }
            channel.fetch_descriptor = true;
        }
        None
    }

    /// Run for at most `budget` units, returning completions in the order they
    /// happened
    pub fn run(&mut self, bus: &mut dyn MemoryBus, budget: u32) -> Vec<DmaCompletion> {
        let mut completions = Vec::new();
        for _ in 0..budget {
            if !self.any_busy() {
                break;
            }
            if let Some(done) = self.step_unit(bus) {
                completions.push(done);
            }
        }
        completions
    }

    /// Run until every channel is idle
    pub fn run_to_completion(&mut self, bus: &mut dyn MemoryBus) -> Vec<DmaCompletion> {
        let mut completions = Vec::new();
        while self.any_busy() {
            if let Some(done) = self.step_unit(bus) {
                completions.push(done);
            }
        }
        completions
    }

    /// DSTA: bit `4 * level` set while the level is busy
    pub fn status(&self) -> u32 {
        self.channels
            .iter()
            .filter(|c| c.is_busy())
            .fold(0, |acc, c| acc | 1 << (4 * c.level))
    }

    pub fn set_interrupt_on_complete(&mut self, level: usize, enabled: bool) {
        if let Some(channel) = self.channels.get_mut(level) {
            channel.interrupt_on_complete = enabled;
        }
    }

    /// Set the start factor and enable bit without touching the transfer
    pub fn configure_trigger(&mut self, level: usize, trigger: DmaTrigger, enabled: bool) {
        if let Some(channel) = self.channels.get_mut(level) {
            channel.trigger = trigger;
            channel.enabled = enabled;
        }
    }

    /// Program a channel without starting it
    pub fn program(&mut self, level: usize, transfer: DmaTransfer) {
        if let Some(channel) = self.channels.get_mut(level) {
            channel.program = transfer;
        }
    }

    /// Register read, `offset` relative to the level's register block
    pub fn read_register(&self, level: usize, offset: u32) -> u32 {
        self.channels
            .get(level)
            .map_or(0, |c| c.read_register(offset))
    }

    /// Register write, `offset` relative to the level's register block
    pub fn write_register(&mut self, level: usize, offset: u32, value: u32) {
        let Some(channel) = self.channels.get_mut(level) else {
            return;
        };
        match offset {
            REG_READ_ADDR => channel.program.source = value & 0x07FF_FFFF,
            REG_WRITE_ADDR => channel.program.dest = value & 0x07FF_FFFF,
            REG_COUNT => channel.program.length = value & channel.count_mask(),
            REG_ADD => {
                channel.program.source_step = if value & ADD_READ != 0 { 1 } else { 0 };
                channel.program.dest_step = decode_dest_step(value);
            }
            REG_ENABLE => {
                channel.enabled = value & EN_ENABLE != 0;
                if value & EN_GO != 0 {
                    if channel.enabled && channel.trigger == DmaTrigger::Software {
                        if let Err(err) = self.start_programmed(level) {
                            log(LogCategory::Dma, LogLevel::Warn, || {
                                format!("DMA: start rejected: {}", err)
                            });
                        }
                    } else {
                        log(LogCategory::Dma, LogLevel::Debug, || {
                            format!(
                                "DMA: level {} start bit ignored (enabled={}, factor={:?})",
                                level, channel.enabled, channel.trigger
                            )
                        });
                    }
                }
            }
            REG_MODE => {
                channel.program.mode = if value & MD_INDIRECT != 0 {
                    DmaMode::Indirect
                } else {
                    DmaMode::Direct
                };
                channel.keep_source = value & MD_READ_UPDATE != 0;
                channel.keep_dest = value & MD_WRITE_UPDATE != 0;
                channel.trigger = DmaTrigger::from_bits(value);
            }
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("DMA: write to unknown level {} offset 0x{:02X}", level, offset)
                });
            }
        }
    }
}
