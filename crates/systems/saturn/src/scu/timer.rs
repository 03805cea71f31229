//! Scanline interrupt dispatcher and the two SCU timers
//!
//! # Timer Registers
//!
//! - `T0C`: Timer 0 compare (9 bits). Timer 0 counts active lines since the
//!   last vertical-blank-in and fires on the line where the count equals T0C.
//! - `T1S`: Timer 1 set data (9 bits, dot position within a line; stored only)
//! - `T1MD`: Timer 1 mode
//!   - Bit 0: timer enable
//!   - Bit 8: 0 = Timer 1 fires on every active line,
//!     1 = only on the line where Timer 0 matches
//!
//! Both counters reset on vertical-blank-in. A compare value beyond the
//! number of active lines simply never matches. A compare value of 0 matches
//! right at vertical-blank-in, because the compare is re-evaluated against the
//! freshly cleared counter.

use super::interrupt::InterruptSource;
use crate::scanline::{ScanlinePhase, ScanlineTiming};
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

const TIMER_MASK: u32 = 0x1FF;
const T1MD_ENABLE: u32 = 0x001;
const T1MD_ON_TIMER0_MATCH: u32 = 0x100;
const T1MD_VALID: u32 = T1MD_ENABLE | T1MD_ON_TIMER0_MATCH;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerUnit {
    timer0_count: u16,
    timer1_count: u16,
    timer0_compare: u16,
    timer1_set: u16,
    timer1_mode: u32,
    vblank: bool,
}

impl TimerUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn timer0_count(&self) -> u16 {
        self.timer0_count
    }

    pub fn timer1_count(&self) -> u16 {
        self.timer1_count
    }

    pub fn timer0_compare(&self) -> u16 {
        self.timer0_compare
    }

    /// T0C write
    pub fn set_timer0_compare(&mut self, value: u32) {
        self.timer0_compare = (value & TIMER_MASK) as u16;
    }

    pub fn timer1_set(&self) -> u16 {
        self.timer1_set
    }

    /// T1S write
    pub fn set_timer1_set(&mut self, value: u32) {
        self.timer1_set = (value & TIMER_MASK) as u16;
    }

    pub fn timer1_mode(&self) -> u32 {
        self.timer1_mode
    }

    /// T1MD write
    pub fn set_timer1_mode(&mut self, value: u32) {
        self.timer1_mode = value & T1MD_VALID;
    }

    /// True between vertical-blank-in and the next vertical-blank-out
    pub fn in_vblank(&self) -> bool {
        self.vblank
    }

    fn timer0_matches(&self) -> bool {
        self.timer0_count == self.timer0_compare
    }

    /// Evaluate one scanline boundary.
    ///
    /// Returns the sources that fire on this line, in the order they must be
    /// asserted. Masking is applied later by the interrupt controller; the
    /// counters here advance regardless.
    pub fn on_scanline<T: ScanlineTiming + ?Sized>(&mut self, timing: &T) -> Vec<InterruptSource> {
        let mut fired = Vec::new();

        match timing.phase() {
            ScanlinePhase::VBlankOut => {
                self.vblank = false;
                fired.push(InterruptSource::VBlankOut);
            }
            ScanlinePhase::Active(_) => {
                self.vblank = false;
                self.timer0_count += 1;
                self.timer1_count += 1;

                let timer0_hit = self.timer0_matches();
                if timer0_hit {
                    fired.push(InterruptSource::Timer0);
                }
                if self.timer1_mode & T1MD_ENABLE != 0 {
                    let every_line = self.timer1_mode & T1MD_ON_TIMER0_MATCH == 0;
                    if every_line || timer0_hit {
                        fired.push(InterruptSource::Timer1);
                    }
                }
                fired.push(InterruptSource::HBlankIn);
            }
            ScanlinePhase::VBlankIn => {
                self.timer0_count = 0;
                self.timer1_count = 0;
                self.vblank = true;
                fired.push(InterruptSource::VBlankIn);
                if self.timer0_matches() {
                    fired.push(InterruptSource::Timer0);
                }
                fired.push(InterruptSource::SpriteDrawEnd);
            }
            ScanlinePhase::VBlank => {
                self.vblank = true;
            }
        }

        if !fired.is_empty() {
            log(LogCategory::Timing, LogLevel::Trace, || {
                format!("SCU: line {} -> {:?}", timing.current_line(), fired)
            });
        }
        fired
    }
}
