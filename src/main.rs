//! Command-line driver: runs one literal sample program and reports the
//! final machine state.
//!
//! The sample stages an argument, calls a routine that echoes it back
//! through the return slot, and leaves the result in register 0. The
//! register file is printed to stdout (`--json` selects a JSON dump) and
//! the return word becomes the process exit status, truncated to a byte.

use std::env;
use std::process::ExitCode;

use vm16::bytecode::{encode, Opcode};
use vm16::runtime::Vm;

fn sample_program() -> Vec<u8> {
    vec![
        encode(Opcode::Copy, true),
        20,
        32, // stage 20 as argument 0
        encode(Opcode::Call, false),
        0,
        8,
        0,
        0, // call the routine at 8, result into r0
        encode(Opcode::Scope, false), // routine entry
        encode(Opcode::Copy, false),
        32,
        40, // return argument 0
        encode(Opcode::Abort, false),
    ]
}

fn main() -> ExitCode {
    let json = env::args().skip(1).any(|arg| arg == "--json");

    let program = sample_program();
    println!("program: {}", hex::encode(&program));

    let mut vm = Vm::new(&program);
    match vm.execute() {
        Ok(ret) => {
            if json {
                let dump = serde_json::to_string_pretty(vm.registers())
                    .expect("register file serialises");
                println!("{}", dump);
            } else {
                println!("{}", vm.registers());
            }
            ExitCode::from(ret as u8)
        }
        Err(err) => {
            eprintln!("execution failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
