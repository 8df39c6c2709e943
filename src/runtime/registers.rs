//! Register file storage.
//!
//! Each VM instance owns one register file: 32 general registers, a staging
//! area for outbound call arguments, and the return slot. Inbound arguments
//! are not stored here -- reads of ids 32-39 resolve against the current
//! scope's snapshot, while writes to the same ids land in [`RegisterFile::staged`].
//! The addressing rules themselves live on [`crate::runtime::Vm`].

use super::Word;
use serde::Serialize;
use std::fmt;

/// Number of general-purpose registers (ids 0-31).
pub const GENERAL_REGISTER_COUNT: usize = 32;

/// Number of argument registers (ids 32-39).
pub const ARG_REGISTER_COUNT: usize = 8;

/// Id of the first argument register.
pub const ARG_REGISTER_BASE: u8 = GENERAL_REGISTER_COUNT as u8;

/// Id of the write-only return slot.
pub const RETURN_REGISTER: u8 = 40;

#[derive(Debug, Clone, Serialize)]
pub struct RegisterFile {
    /// General registers, ids 0-31.
    pub general: [Word; GENERAL_REGISTER_COUNT],
    /// Staged arguments for the next nested call, written through ids 32-39.
    pub staged: [Word; ARG_REGISTER_COUNT],
    /// The return slot, id 40.
    pub ret: Word,
}

impl RegisterFile {
    pub fn new() -> RegisterFile {
        RegisterFile {
            general: [0; GENERAL_REGISTER_COUNT],
            staged: [0; ARG_REGISTER_COUNT],
            ret: 0,
        }
    }
}

impl Default for RegisterFile {
    fn default() -> RegisterFile {
        RegisterFile::new()
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.general.iter().enumerate() {
            if i % 8 == 0 {
                if i > 0 {
                    writeln!(f)?;
                }
                write!(f, "r{:02}", i)?;
            }
            write!(f, " {:04x}", value)?;
        }
        writeln!(f)?;
        write!(f, "stg")?;
        for value in &self.staged {
            write!(f, " {:04x}", value)?;
        }
        writeln!(f)?;
        write!(f, "ret {:04x}", self.ret)
    }
}
