//! The virtual machine: fetch, decode, dispatch.
//!
//! A `Vm` drives one instruction stream with its own register file, program
//! counter, and current scope. A `Call` instruction spawns a nested `Vm`
//! over the same stream; the nested instance gets a fresh register file and
//! argument snapshot but shares the call tree's memory buffer and builtin
//! table. Execution ends when the program counter reaches the end of the
//! stream, yielding the return slot, or when an instruction fails, in which
//! case the error unwinds through every ancestor instance.

use super::builtins::BuiltinTable;
use super::registers::{RegisterFile, ARG_REGISTER_BASE, RETURN_REGISTER};
use super::scope::Scope;
use super::{SharedMemory, VmError, Word};
use crate::bytecode::{self, Opcode, Reader};
use std::rc::Rc;

/// Call-state discriminant selecting an ordinary call. Any other value is
/// the reserved deferred form: decoded, but without effect in this revision.
const CALL_STATE_NORMAL: u8 = 0;

pub struct Vm<'a> {
    code: &'a [u8],
    pc: usize,
    registers: RegisterFile,
    scope: Scope,
    builtins: Rc<BuiltinTable>,
    diagnostic: Option<String>,
}

impl<'a> Vm<'a> {
    /// Root VM over a program. Allocates the call tree's memory buffer and
    /// attaches an empty builtin table.
    pub fn new(code: &'a [u8]) -> Vm<'a> {
        Vm::with_builtins(code, BuiltinTable::new())
    }

    /// Root VM with a table of host builtins attached before execution.
    pub fn with_builtins(code: &'a [u8], builtins: BuiltinTable) -> Vm<'a> {
        Vm {
            code,
            pc: 0,
            registers: RegisterFile::new(),
            scope: Scope::root(),
            builtins: Rc::new(builtins),
            diagnostic: None,
        }
    }

    /// Nested VM spawned by a `Call` instruction, entering at `entry`.
    fn for_call(code: &'a [u8], entry: usize, scope: Scope, builtins: Rc<BuiltinTable>) -> Vm<'a> {
        let mut registers = RegisterFile::new();
        // The handed-down snapshot doubles as the callee's initial staging,
        // so the Scope instruction at the entry point captures the same
        // arguments the caller staged.
        registers.staged = *scope.args();
        Vm {
            code,
            pc: entry,
            registers,
            scope,
            builtins,
            diagnostic: None,
        }
    }

    /// Run until the program counter reaches the end of the stream or an
    /// instruction fails. Returns the final value of the return slot.
    ///
    /// Any error halts this instance immediately; the formatted diagnostic
    /// stays readable through [`Vm::last_diagnostic`] until the next error.
    pub fn execute(&mut self) -> Result<Word, VmError> {
        while self.pc < self.code.len() {
            if let Err(err) = self.step() {
                self.diagnostic = Some(err.to_string());
                return Err(err);
            }
        }
        Ok(self.registers.ret)
    }

    /// Decode and execute the instruction at the program counter.
    fn step(&mut self) -> Result<(), VmError> {
        let byte = self.code[self.pc];
        let (opcode, immediate) =
            bytecode::decode(byte).ok_or(VmError::InvalidOpcode(byte))?;
        match opcode {
            Opcode::Call => self.exec_call(),
            Opcode::Scope => {
                self.exec_scope();
                Ok(())
            }
            Opcode::Abort => {
                self.exec_abort();
                Ok(())
            }
            Opcode::Copy => self.exec_copy(immediate),
            // The remaining tags are declared but carry no operand encoding
            // or effect yet: consume the opcode byte and nothing else.
            _ => {
                self.pc += 1;
                Ok(())
            }
        }
    }

    /// Read a register through the instruction addressing scheme: ids 0-31
    /// are general registers, ids 32-39 read the current scope's argument
    /// snapshot. The return slot is not readable this way.
    pub fn read_register(&self, id: u8) -> Result<Word, VmError> {
        match id {
            0..=31 => Ok(self.registers.general[id as usize]),
            32..=39 => Ok(self.scope.arg((id - ARG_REGISTER_BASE) as usize)),
            _ => Err(VmError::General(format!("register {id} is not readable"))),
        }
    }

    /// Write a register: ids 0-31 are general registers, ids 32-39 stage
    /// arguments for the next nested call (they do not touch what this
    /// frame reads at the same ids), id 40 is the return slot.
    pub fn write_register(&mut self, id: u8, value: Word) -> Result<(), VmError> {
        match id {
            0..=31 => {
                self.registers.general[id as usize] = value;
                Ok(())
            }
            32..=39 => {
                self.registers.staged[(id - ARG_REGISTER_BASE) as usize] = value;
                Ok(())
            }
            RETURN_REGISTER => {
                self.registers.ret = value;
                Ok(())
            }
            _ => Err(VmError::General(format!("register {id} is not writable"))),
        }
    }

    /// `Call`: 1-byte call state, 2-byte target address, 1-byte destination
    /// register. A normal call requires the target byte to be a `Scope`
    /// opcode, spawns a nested VM there, and folds its return value into
    /// the destination register. The program counter always advances past
    /// the whole instruction.
    fn exec_call(&mut self) -> Result<(), VmError> {
        let mut reader = Reader::new(self.code);
        reader.skip_to(self.pc + 1);
        let state = reader.read_u8().map_err(|_| truncated("call"))?;
        let target = reader.read_u16().map_err(|_| truncated("call"))? as usize;
        let dest = reader.read_u8().map_err(|_| truncated("call"))?;
        let resume = reader.pos();

        if state == CALL_STATE_NORMAL {
            match self.code.get(target).copied().and_then(bytecode::decode) {
                Some((Opcode::Scope, _)) => {}
                _ => return Err(VmError::InvalidCallAddress(target)),
            }
            let scope = Scope::for_call(self.scope.clone(), resume, self.registers.staged);
            let mut callee = Vm::for_call(self.code, target, scope, Rc::clone(&self.builtins));
            let result = callee.execute()?;
            self.write_register(dest, result)?;
        }

        self.pc = resume;
        Ok(())
    }

    /// `Scope`: push a frame nested in the same stream, capturing the
    /// currently staged arguments as its snapshot.
    fn exec_scope(&mut self) {
        self.scope = Scope::nested(self.scope.clone(), self.registers.staged);
        self.pc += 1;
    }

    /// `Abort`: pop the current frame. The counter advances for the
    /// instruction itself; a recorded resume address then overrides it. On
    /// the root frame there is nothing to pop.
    fn exec_abort(&mut self) {
        self.pc += 1;
        if let Some(parent) = self.scope.take_parent() {
            if let Some(resume) = self.scope.resume_address() {
                self.pc = resume;
            }
            self.scope = *parent;
        }
    }

    /// `Copy`: 2 operand bytes. The first is a literal when the immediate
    /// flag is set, otherwise a source register id; the second is the
    /// destination register id.
    fn exec_copy(&mut self, immediate: bool) -> Result<(), VmError> {
        let mut reader = Reader::new(self.code);
        reader.skip_to(self.pc + 1);
        let operand = reader.read_u8().map_err(|_| truncated("copy"))?;
        let dest = reader.read_u8().map_err(|_| truncated("copy"))?;

        let value = if immediate {
            Word::from(operand)
        } else {
            self.read_register(operand)?
        };
        self.write_register(dest, value)?;

        self.pc = reader.pos();
        Ok(())
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The call tree's shared memory buffer.
    pub fn memory(&self) -> &SharedMemory {
        self.scope.memory()
    }

    pub fn builtins(&self) -> &BuiltinTable {
        &self.builtins
    }

    /// Formatted diagnostic for the most recent error raised by this
    /// instance, if any. Overwritten by the next error; nested instances
    /// each own their own slot.
    pub fn last_diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }
}

fn truncated(instruction: &str) -> VmError {
    VmError::General(format!(
        "unexpected end of stream decoding {instruction} operands"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::encode;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(15)]
    #[case(31)]
    fn test_general_register_roundtrip(#[case] id: u8) {
        let mut vm = Vm::new(&[]);
        vm.write_register(id, 0xABCD).unwrap();
        assert_eq!(vm.read_register(id).unwrap(), 0xABCD);
    }

    #[rstest]
    #[case(32)]
    #[case(35)]
    #[case(39)]
    fn test_argument_write_stages_without_shadowing_reads(#[case] id: u8) {
        let mut vm = Vm::new(&[]);
        vm.write_register(id, 77).unwrap();

        // The write landed in staging; the read still sees the frame's
        // snapshot, which is all zeroes.
        assert_eq!(vm.read_register(id).unwrap(), 0);
        assert_eq!(vm.registers().staged[(id - 32) as usize], 77);
    }

    #[test]
    fn test_return_slot_is_write_only() {
        let mut vm = Vm::new(&[]);
        vm.write_register(40, 5).unwrap();
        assert_eq!(vm.registers().ret, 5);

        let err = vm.read_register(40).unwrap_err();
        assert!(matches!(err, VmError::General(_)));
        assert!(err.to_string().contains("register 40 is not readable"));
    }

    #[rstest]
    #[case(41)]
    #[case(64)]
    #[case(255)]
    fn test_out_of_range_ids_fail_both_ways(#[case] id: u8) {
        let mut vm = Vm::new(&[]);
        assert!(matches!(vm.read_register(id), Err(VmError::General(_))));
        assert!(matches!(vm.write_register(id, 1), Err(VmError::General(_))));
    }

    #[test]
    fn test_copy_immediate() {
        let program = [encode(Opcode::Copy, true), 20, 0];
        let mut vm = Vm::new(&program);
        vm.execute().unwrap();
        assert_eq!(vm.registers().general[0], 20);
        assert_eq!(vm.pc(), 3);
    }

    #[test]
    fn test_copy_resolves_source_register() {
        // r1 <- 9, then r2 <- r1
        let program = [
            encode(Opcode::Copy, true),
            9,
            1,
            encode(Opcode::Copy, false),
            1,
            2,
        ];
        let mut vm = Vm::new(&program);
        vm.execute().unwrap();
        assert_eq!(vm.registers().general[2], 9);
    }

    #[test]
    fn test_copy_bad_destination_halts() {
        let program = [encode(Opcode::Copy, true), 1, 41];
        let mut vm = Vm::new(&program);
        let err = vm.execute().unwrap_err();
        assert!(matches!(err, VmError::General(_)));
        assert!(vm
            .last_diagnostic()
            .unwrap()
            .contains("register 41 is not writable"));
    }

    #[test]
    fn test_copy_truncated_operands() {
        let program = [encode(Opcode::Copy, true), 20];
        let mut vm = Vm::new(&program);
        let err = vm.execute().unwrap_err();
        assert!(matches!(err, VmError::General(_)));
        assert!(err.to_string().contains("copy"));
    }

    #[test]
    fn test_invalid_opcode_stores_raw_byte() {
        let program = [0xFF];
        let mut vm = Vm::new(&program);
        let err = vm.execute().unwrap_err();
        assert!(matches!(err, VmError::InvalidOpcode(0xFF)));
        assert!(vm.last_diagnostic().unwrap().contains("255"));
    }

    #[test]
    fn test_scope_captures_staged_arguments() {
        // Stage 5 as argument 0, then open a scope that snapshots it
        let program = [
            encode(Opcode::Copy, true),
            5,
            32,
            encode(Opcode::Scope, false),
        ];
        let mut vm = Vm::new(&program);
        vm.execute().unwrap();

        assert_eq!(vm.scope().depth(), 2);
        assert_eq!(vm.scope().arg(0), 5);
        assert_eq!(vm.read_register(32).unwrap(), 5);
    }

    #[test]
    fn test_scope_then_abort_restores_current_frame() {
        let program = [encode(Opcode::Scope, false), encode(Opcode::Abort, false)];
        let mut vm = Vm::new(&program);
        vm.execute().unwrap();

        assert_eq!(vm.scope().depth(), 1);
        assert!(vm.scope().is_root());
        assert_eq!(*vm.scope().args(), [0; 8]);
        assert_eq!(vm.pc(), 2);
    }

    #[test]
    fn test_abort_on_root_only_advances() {
        let program = [encode(Opcode::Abort, false)];
        let mut vm = Vm::new(&program);
        vm.execute().unwrap();
        assert_eq!(vm.pc(), 1);
        assert!(vm.scope().is_root());
    }

    #[test]
    fn test_call_requires_scope_at_target() {
        // Target 0 points at the call itself, not a Scope instruction
        let program = [encode(Opcode::Call, false), 0, 0, 0, 2];
        let mut vm = Vm::new(&program);
        vm.write_register(5, 123).unwrap();

        let err = vm.execute().unwrap_err();
        assert!(matches!(err, VmError::InvalidCallAddress(0)));

        // The caller's register file is untouched
        assert_eq!(vm.registers().general[5], 123);
        assert_eq!(vm.registers().general[2], 0);
        assert_eq!(vm.registers().ret, 0);
    }

    #[test]
    fn test_call_target_out_of_range() {
        let program = [encode(Opcode::Call, false), 0, 200, 0, 0];
        let mut vm = Vm::new(&program);
        let err = vm.execute().unwrap_err();
        assert!(matches!(err, VmError::InvalidCallAddress(200)));
    }

    #[test]
    fn test_reserved_call_state_is_recognised_without_effect() {
        // State 1 is the reserved form; the bogus target must not matter
        let program = [encode(Opcode::Call, false), 1, 0xEE, 0xFF, 3];
        let mut vm = Vm::new(&program);
        let ret = vm.execute().unwrap();

        assert_eq!(ret, 0);
        assert_eq!(vm.pc(), 5);
        assert_eq!(vm.registers().general[3], 0);
    }

    #[test]
    fn test_call_truncated_operands() {
        let program = [encode(Opcode::Call, false), 0, 8];
        let mut vm = Vm::new(&program);
        let err = vm.execute().unwrap_err();
        assert!(matches!(err, VmError::General(_)));
        assert!(err.to_string().contains("call"));
    }

    #[test]
    fn test_nested_call_shares_memory() {
        // The callee VM writes nothing itself; verify the spawned frame
        // aliases the caller's buffer by checking the root handle after a
        // full call round-trip.
        let program = [
            encode(Opcode::Call, false),
            0,
            5,
            0,
            0,
            encode(Opcode::Scope, false),
            encode(Opcode::Abort, false),
        ];
        let mut vm = Vm::new(&program);
        vm.memory().borrow_mut().write_word(42, 0xCAFE).unwrap();
        vm.execute().unwrap();
        assert_eq!(vm.memory().borrow().read_word(42).unwrap(), 0xCAFE);
    }
}
