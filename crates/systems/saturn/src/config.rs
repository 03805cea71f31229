//! Chipset configuration

use crate::SaturnError;
use emu_core::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Console region, reported by the status-acquire command as the area code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Region {
    Japan,
    #[default]
    NorthAmerica,
    Europe,
}

impl Region {
    /// Area code nibble as returned in OREG9
    pub fn area_code(self) -> u8 {
        match self {
            Region::Japan => 0x01,
            Region::NorthAmerica => 0x04,
            Region::Europe => 0x0C,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipsetConfig {
    /// Lines per frame including blanking
    pub total_lines: u16,
    /// Active display lines
    pub active_lines: u16,
    #[serde(default)]
    pub region: Region,
    /// Scanlines a peripheral controller command stays in flight (0 = synchronous)
    #[serde(default)]
    pub command_latency: u32,
    /// DMA units the bus can move per scanline
    #[serde(default = "default_dma_units_per_line")]
    pub dma_units_per_line: u32,
    /// Indirect DMA chains longer than this are treated as malformed
    #[serde(default = "default_max_indirect_descriptors")]
    pub max_indirect_descriptors: u32,
    /// Global log level applied when the chipset is created
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    /// Write log output to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_dma_units_per_line() -> u32 {
    1024
}

fn default_max_indirect_descriptors() -> u32 {
    1024
}

impl Default for ChipsetConfig {
    fn default() -> Self {
        Self::ntsc()
    }
}

impl ChipsetConfig {
    /// 263-line NTSC frame with 224 active lines
    pub fn ntsc() -> Self {
        Self {
            total_lines: 263,
            active_lines: 224,
            region: Region::NorthAmerica,
            command_latency: 0,
            dma_units_per_line: default_dma_units_per_line(),
            max_indirect_descriptors: default_max_indirect_descriptors(),
            log_level: None,
            log_file: None,
        }
    }

    /// 313-line PAL frame with 256 active lines
    pub fn pal() -> Self {
        Self {
            total_lines: 313,
            active_lines: 256,
            region: Region::Europe,
            ..Self::ntsc()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SaturnError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SaturnError> {
        if self.active_lines == 0 {
            return Err(SaturnError::InvalidConfig(
                "active_lines must be at least 1".to_string(),
            ));
        }
        if u32::from(self.active_lines) + 1 >= u32::from(self.total_lines) {
            return Err(SaturnError::InvalidConfig(format!(
                "active_lines ({}) leaves no vertical blank in a {}-line frame",
                self.active_lines, self.total_lines
            )));
        }
        if self.dma_units_per_line == 0 {
            return Err(SaturnError::InvalidConfig(
                "dma_units_per_line must be non-zero".to_string(),
            ));
        }
        if self.max_indirect_descriptors == 0 {
            return Err(SaturnError::InvalidConfig(
                "max_indirect_descriptors must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
