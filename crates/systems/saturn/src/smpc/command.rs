//! SMPC command opcodes

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmpcCommand {
    /// MSHON - master CPU on (acknowledge only)
    MasterOn,
    /// SSHON
    SlaveOn,
    /// SSHOFF
    SlaveOff,
    /// SNDON
    SoundOn,
    /// SNDOFF
    SoundOff,
    /// CDON
    CdOn,
    /// CDOFF
    CdOff,
    /// SYSRES
    SystemReset,
    /// CKCHG352
    ClockChange352,
    /// CKCHG320
    ClockChange320,
    /// INTBACK - status acquire
    IntBack,
    /// SETTIME
    SetTime,
    /// SETSMEM
    SetSmem,
    /// NMIREQ
    NmiRequest,
    /// RESENAB - allow NMI from the reset button
    ResetEnable,
    /// RESDISA - suppress NMI from the reset button
    ResetDisable,
}

impl SmpcCommand {
    pub const ALL: [SmpcCommand; 16] = [
        SmpcCommand::MasterOn,
        SmpcCommand::SlaveOn,
        SmpcCommand::SlaveOff,
        SmpcCommand::SoundOn,
        SmpcCommand::SoundOff,
        SmpcCommand::CdOn,
        SmpcCommand::CdOff,
        SmpcCommand::SystemReset,
        SmpcCommand::ClockChange352,
        SmpcCommand::ClockChange320,
        SmpcCommand::IntBack,
        SmpcCommand::SetTime,
        SmpcCommand::SetSmem,
        SmpcCommand::NmiRequest,
        SmpcCommand::ResetEnable,
        SmpcCommand::ResetDisable,
    ];

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Some(match opcode {
            0x00 => SmpcCommand::MasterOn,
            0x02 => SmpcCommand::SlaveOn,
            0x03 => SmpcCommand::SlaveOff,
            0x06 => SmpcCommand::SoundOn,
            0x07 => SmpcCommand::SoundOff,
            0x08 => SmpcCommand::CdOn,
            0x09 => SmpcCommand::CdOff,
            0x0D => SmpcCommand::SystemReset,
            0x0E => SmpcCommand::ClockChange352,
            0x0F => SmpcCommand::ClockChange320,
            0x10 => SmpcCommand::IntBack,
            0x16 => SmpcCommand::SetTime,
            0x17 => SmpcCommand::SetSmem,
            0x18 => SmpcCommand::NmiRequest,
            0x19 => SmpcCommand::ResetEnable,
            0x1A => SmpcCommand::ResetDisable,
            _ => return None,
        })
    }

    pub fn opcode(self) -> u8 {
        match self {
            SmpcCommand::MasterOn => 0x00,
            SmpcCommand::SlaveOn => 0x02,
            SmpcCommand::SlaveOff => 0x03,
            SmpcCommand::SoundOn => 0x06,
            SmpcCommand::SoundOff => 0x07,
            SmpcCommand::CdOn => 0x08,
            SmpcCommand::CdOff => 0x09,
            SmpcCommand::SystemReset => 0x0D,
            SmpcCommand::ClockChange352 => 0x0E,
            SmpcCommand::ClockChange320 => 0x0F,
            SmpcCommand::IntBack => 0x10,
            SmpcCommand::SetTime => 0x16,
            SmpcCommand::SetSmem => 0x17,
            SmpcCommand::NmiRequest => 0x18,
            SmpcCommand::ResetEnable => 0x19,
            SmpcCommand::ResetDisable => 0x1A,
        }
    }

    /// Hardware mnemonic, for logs
    pub fn mnemonic(self) -> &'static str {
        match self {
            SmpcCommand::MasterOn => "MSHON",
            SmpcCommand::SlaveOn => "SSHON",
            SmpcCommand::SlaveOff => "SSHOFF",
            SmpcCommand::SoundOn => "SNDON",
            SmpcCommand::SoundOff => "SNDOFF",
            SmpcCommand::CdOn => "CDON",
            SmpcCommand::CdOff => "CDOFF",
            SmpcCommand::SystemReset => "SYSRES",
            SmpcCommand::ClockChange352 => "CKCHG352",
            SmpcCommand::ClockChange320 => "CKCHG320",
            SmpcCommand::IntBack => "INTBACK",
            SmpcCommand::SetTime => "SETTIME",
            SmpcCommand::SetSmem => "SETSMEM",
            SmpcCommand::NmiRequest => "NMIREQ",
            SmpcCommand::ResetEnable => "RESENAB",
            SmpcCommand::ResetDisable => "RESDISA",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table_is_consistent() {
        for command in SmpcCommand::ALL {
            assert_eq!(SmpcCommand::from_opcode(command.opcode()), Some(command));
        }
    }

    #[test]
    fn test_unknown_opcodes() {
        for opcode in [0x01, 0x04, 0x05, 0x0A, 0x11, 0x1B, 0xFF] {
            assert_eq!(SmpcCommand::from_opcode(opcode), None);
        }
    }
}
