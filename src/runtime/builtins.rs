//! Host-provided native operations.
//!
//! A builtin is a name-addressed native callable attached to a VM instance
//! before execution begins. No opcode consumes the table in this revision;
//! a future instruction will invoke entries by name. The table is shared
//! down the call tree so nested VM instances resolve the same names.

use super::registers::ARG_REGISTER_COUNT;
use super::vm::Vm;
use super::Word;
use std::collections::HashMap;
use std::rc::Rc;

/// The contract every builtin satisfies: the owning VM plus one word per
/// argument register in, one result word out.
pub type BuiltinFn = Rc<dyn Fn(&mut Vm<'_>, [Word; ARG_REGISTER_COUNT]) -> Word>;

/// Name-to-native-function registry.
#[derive(Clone, Default)]
pub struct BuiltinTable {
    builtins: HashMap<String, BuiltinFn>,
}

impl BuiltinTable {
    /// Create a new empty table.
    pub fn new() -> BuiltinTable {
        BuiltinTable {
            builtins: HashMap::new(),
        }
    }

    /// Register a builtin under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, builtin: BuiltinFn) {
        self.builtins.insert(name.into(), builtin);
    }

    /// Look up a builtin by name.
    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.builtins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }
}
