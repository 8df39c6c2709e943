//! vm16 execution engine.
//!
//! This module provides the machine itself: the register file, the scope
//! (frame) chain, the shared memory buffer, the builtin registry, and the
//! fetch/decode/dispatch loop in [`vm::Vm`].

pub mod builtins;
pub mod memory;
pub mod registers;
pub mod scope;
pub mod vm;

pub use builtins::{BuiltinFn, BuiltinTable};
pub use memory::{Memory, SharedMemory, MEMORY_SIZE};
pub use registers::RegisterFile;
pub use scope::Scope;
pub use vm::Vm;

/// The machine word: every register and memory word is 16-bit unsigned.
pub type Word = u16;

/// Errors raised during execution. Every error is fatal to the VM instance
/// that raised it and to every ancestor up the call chain; the host driver is
/// the only consumer.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Register-addressing misuse, and other malformed requests against the
    /// machine state (out-of-bounds memory access, truncated operands).
    #[error("{0}")]
    General(String),
    /// The tag portion of an opcode byte is outside the defined set. Carries
    /// the raw offending byte.
    #[error("invalid opcode byte {0}")]
    InvalidOpcode(u8),
    /// A call target did not point at a `Scope` instruction.
    #[error("invalid call address {0}")]
    InvalidCallAddress(usize),
}
