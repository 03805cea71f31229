//! Scanline clock - the time base of the whole chipset.
//!
//! One tick per video line. Line 0 is the vertical-blank-out edge, lines
//! `1..=active_lines` are active display (each one ends with a horizontal
//! blank), line `active_lines + 1` is the vertical-blank-in edge and the rest
//! of the frame is vertical blanking.

use crate::SaturnError;
use serde::{Deserialize, Serialize};

/// What a scanline boundary means for interrupt generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanlinePhase {
    /// Line 0: display restarts
    VBlankOut,
    /// Active display line (1-based)
    Active(u16),
    /// First line after active display
    VBlankIn,
    /// Remaining blanking lines, no events
    VBlank,
}

/// Read-only view of video timing, so consumers can be driven by a fake
/// clock in tests.
pub trait ScanlineTiming {
    fn current_line(&self) -> u16;
    fn total_lines(&self) -> u16;
    fn active_lines(&self) -> u16;

    fn phase(&self) -> ScanlinePhase {
        let line = self.current_line();
        let active = self.active_lines();
        match line {
            0 => ScanlinePhase::VBlankOut,
            l if l <= active => ScanlinePhase::Active(l),
            l if l == active + 1 => ScanlinePhase::VBlankIn,
            _ => ScanlinePhase::VBlank,
        }
    }
}

/// Free-running line counter, wrapping once per frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanlineClock {
    line: u16,
    total_lines: u16,
    active_lines: u16,
    frame: u64,
}

impl ScanlineClock {
    /// `active_lines + 1` must still be inside the frame so that the
    /// vertical-blank-in edge exists.
    pub fn new(total_lines: u16, active_lines: u16) -> Result<Self, SaturnError> {
        if active_lines == 0 || u32::from(active_lines) + 1 >= u32::from(total_lines) {
            return Err(SaturnError::InvalidConfig(format!(
                "{} active lines do not fit in a {}-line frame",
                active_lines, total_lines
            )));
        }
        Ok(Self {
            line: 0,
            total_lines,
            active_lines,
            frame: 0,
        })
    }

    pub fn reset(&mut self) {
        self.line = 0;
        self.frame = 0;
    }

    /// Move to the next line. Returns true when a new frame starts.
    pub fn advance(&mut self) -> bool {
        self.line += 1;
        if self.line >= self.total_lines {
            self.line = 0;
            self.frame += 1;
            true
        } else {
            false
        }
    }

    /// Completed frames since reset
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl ScanlineTiming for ScanlineClock {
    fn current_line(&self) -> u16 {
        self.line
    }

    fn total_lines(&self) -> u16 {
        self.total_lines
    }

    fn active_lines(&self) -> u16 {
        self.active_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_wraps_each_frame() {
        let mut clock = ScanlineClock::new(263, 224).unwrap();
        for _ in 0..262 {
            assert!(!clock.advance());
        }
        assert_eq!(clock.current_line(), 262);
        assert!(clock.advance());
        assert_eq!(clock.current_line(), 0);
        assert_eq!(clock.frame(), 1);
    }

    #[test]
    fn test_phase_classification() {
        let mut clock = ScanlineClock::new(10, 6).unwrap();
        let mut phases = Vec::new();
        for _ in 0..10 {
            phases.push(clock.phase());
            clock.advance();
        }
        assert_eq!(phases[0], ScanlinePhase::VBlankOut);
        assert_eq!(phases[1], ScanlinePhase::Active(1));
        assert_eq!(phases[6], ScanlinePhase::Active(6));
        assert_eq!(phases[7], ScanlinePhase::VBlankIn);
        assert_eq!(phases[8], ScanlinePhase::VBlank);
        assert_eq!(phases[9], ScanlinePhase::VBlank);
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        assert!(ScanlineClock::new(263, 0).is_err());
        assert!(ScanlineClock::new(263, 262).is_err());
        assert!(ScanlineClock::new(263, 261).is_ok());
    }

    #[test]
    fn test_reset() {
        let mut clock = ScanlineClock::new(263, 224).unwrap();
        for _ in 0..300 {
            clock.advance();
        }
        clock.reset();
        assert_eq!(clock.current_line(), 0);
        assert_eq!(clock.frame(), 0);
    }
}
