//! Real-time clock collaborator and the BCD date layout used by INTBACK
//!
//! Seven bytes, in OREG order:
//! century, year, `weekday << 4 | month`, day, hour, minute, second.
//! Weekday 0 is Sunday; month is 1-12 in binary (it fits in a nibble).

use chrono::{Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// 0 = Sunday
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    pub fn to_bcd(&self) -> [u8; 7] {
        [
            to_bcd((self.year / 100) as u8),
            to_bcd((self.year % 100) as u8),
            (self.weekday & 0x0F) << 4 | (self.month & 0x0F),
            to_bcd(self.day),
            to_bcd(self.hour),
            to_bcd(self.minute),
            to_bcd(self.second),
        ]
    }

    /// Decode the INTBACK layout. `None` if any digit is not valid BCD.
    pub fn from_bcd(bytes: &[u8; 7]) -> Option<Self> {
        let century = u16::from(from_bcd(bytes[0])?);
        let year = u16::from(from_bcd(bytes[1])?);
        Some(Self {
            year: century * 100 + year,
            month: bytes[2] & 0x0F,
            weekday: bytes[2] >> 4,
            day: from_bcd(bytes[3])?,
            hour: from_bcd(bytes[4])?,
            minute: from_bcd(bytes[5])?,
            second: from_bcd(bytes[6])?,
        })
    }
}

pub fn to_bcd(value: u8) -> u8 {
    ((value / 10) % 10) << 4 | (value % 10)
}

pub fn from_bcd(value: u8) -> Option<u8> {
    let (hi, lo) = (value >> 4, value & 0x0F);
    if hi > 9 || lo > 9 {
        None
    } else {
        Some(hi * 10 + lo)
    }
}

/// Battery-backed clock read by the status-acquire command
pub trait RealTimeClock {
    fn now(&self) -> DateTime;
}

/// Host wall clock in local time
#[derive(Debug, Clone, Copy, Default)]
pub struct HostClock;

impl RealTimeClock for HostClock {
    fn now(&self) -> DateTime {
        let now = Local::now();
        DateTime {
            year: now.year().clamp(0, 9999) as u16,
            month: now.month() as u8,
            day: now.day() as u8,
            weekday: now.weekday().num_days_from_sunday() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
        }
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime);

impl RealTimeClock for FixedClock {
    fn now(&self) -> DateTime {
        self.0
    }
}
