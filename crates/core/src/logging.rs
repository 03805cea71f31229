//! Centralized logging configuration for the emulator.
//!
//! Every chip logs through a single entry point, [`log`], which takes a
//! category, a level and a closure producing the message. The closure is only
//! evaluated when the category/level pair is enabled, so logging left in hot
//! paths (per-scanline interrupt assertions, per-unit DMA progress) costs a
//! couple of relaxed atomic loads when disabled.
//!
//! # Architecture
//!
//! - **LogConfig**: process-wide configuration stored in atomics
//! - **LogLevel**: Off < Error < Warn < Info < Debug < Trace
//! - **LogCategory**: which chip or concern a message belongs to
//! - Output goes to stderr, or to a file written by a background thread
//!
//! # Usage
//!
//! ```rust
//! use emu_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Smpc, LogLevel::Debug, || {
//!     format!("SMPC: command 0x{:02X} issued", 0x10)
//! });
//! ```

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread;
use thiserror::Error;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level: {0}")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    /// Case-insensitive; numeric levels are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "err" | "1" => Ok(LogLevel::Error),
            "warn" | "warning" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl LogLevel {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the chipset components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Peripheral controller command processing and port I/O
    Smpc,
    /// Interrupt assertion, masking and delivery
    Interrupts,
    /// DMA channel starts, progress and completion
    Dma,
    /// Scanline clock and timers
    Timing,
    /// Register window decoding
    Bus,
    /// Unimplemented features/stubs
    Stubs,
}

impl LogCategory {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        match self {
            LogCategory::Smpc => 0,
            LogCategory::Interrupts => 1,
            LogCategory::Dma => 2,
            LogCategory::Timing => 3,
            LogCategory::Bus => 4,
            LogCategory::Stubs => 5,
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    global_level: AtomicU8,
    /// Per-category overrides; `Off` means "use the global level"
    category_levels: [AtomicU8; LogCategory::COUNT],
    log_sender: Mutex<Option<Sender<String>>>,
    file_logging_enabled: AtomicBool,
}

impl LogConfig {
    /// Create a new LogConfig with all logging disabled
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: std::array::from_fn(|_| AtomicU8::new(LogLevel::Off as u8)),
            log_sender: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category-specific level wins over the global one unless it is `Off`.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for level in &self.category_levels {
            level.store(LogLevel::Off as u8, Ordering::Relaxed);
        }
    }

    /// Send log output to `path` instead of stderr.
    ///
    /// The file is appended to by a background thread so that emulation never
    /// waits on disk I/O. Calling this again replaces the previous sink.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
            })?;

        *self
            .log_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sender);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop logging to file; the writer thread exits once its sender is dropped.
    pub fn clear_log_file(&self) {
        *self
            .log_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.file_logging_enabled.store(false, Ordering::Relaxed);
    }

    fn write_message(&self, message: String) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            let sender = self
                .log_sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = sender.as_ref() {
                // Fall back to stderr if the writer thread died
                if let Err(err) = sender.send(message) {
                    eprintln!("{}", err.0);
                }
                return;
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a message with the specified category and level.
///
/// `message_fn` only runs when the message will actually be written.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    log_to(LogConfig::global(), category, level, message_fn);
}

fn log_to<F>(config: &LogConfig, category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    if config.should_log(category, level) {
        config.write_message(message_fn());
    }
}
