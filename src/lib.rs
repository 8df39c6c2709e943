//! A 16-bit register-machine bytecode interpreter.
//!
//! vm16 executes byte-encoded programs against a fixed register file and a
//! single byte-addressable memory buffer shared by every frame of a call
//! tree. Nested procedure-like calls run as nested VM instances chained
//! through lexical frames ("scopes"): each call gets a fresh register file
//! and argument snapshot, while memory stays flat and global.
//!
//! # Modules
//!
//! - [`bytecode`] -- Instruction encoding. Splits opcode bytes into a tag and
//!   an immediate flag, and packs them back for program construction.
//! - [`runtime`] -- The machine itself: register file, scope chain, shared
//!   memory, builtin table, and the fetch/decode/dispatch loop.
//!
//! # Example
//!
//! Copy an immediate into register 0 and run the program to completion:
//!
//! ```
//! use vm16::bytecode::{encode, Opcode};
//! use vm16::runtime::Vm;
//!
//! let program = [encode(Opcode::Copy, true), 20, 0];
//! let mut vm = Vm::new(&program);
//! let ret = vm.execute().unwrap();
//!
//! assert_eq!(vm.registers().general[0], 20);
//! assert_eq!(ret, 0);
//! ```

pub mod bytecode;
pub mod runtime;
