//! Instruction encoding for vm16 programs.
//!
//! Every instruction begins with a single opcode byte: bit 0 is the immediate
//! flag, bits 1-7 are the opcode tag. Operand bytes follow the opcode byte
//! and are consumed by the instruction's handler, not by the decoder.

pub mod reader;

pub use reader::Reader;

/// Number of defined opcode tags; any tag at or above this is invalid.
pub const OPCODE_COUNT: u8 = 14;

/// The defined opcode tags, in tag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Call = 0,
    Scope = 1,
    Abort = 2,
    Mset = 3,
    Mget = 4,
    Cmp = 5,
    Jump = 6,
    Tjmp = 7,
    Fjmp = 8,
    Copy = 9,
    Add = 10,
    Sub = 11,
    Mul = 12,
    Div = 13,
}

impl Opcode {
    /// Look up an opcode by its 7-bit tag. Returns `None` for tags outside
    /// the defined set.
    pub fn from_tag(tag: u8) -> Option<Opcode> {
        match tag {
            0 => Some(Opcode::Call),
            1 => Some(Opcode::Scope),
            2 => Some(Opcode::Abort),
            3 => Some(Opcode::Mset),
            4 => Some(Opcode::Mget),
            5 => Some(Opcode::Cmp),
            6 => Some(Opcode::Jump),
            7 => Some(Opcode::Tjmp),
            8 => Some(Opcode::Fjmp),
            9 => Some(Opcode::Copy),
            10 => Some(Opcode::Add),
            11 => Some(Opcode::Sub),
            12 => Some(Opcode::Mul),
            13 => Some(Opcode::Div),
            _ => None,
        }
    }

    /// The 7-bit tag packed into bits 1-7 of an opcode byte.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Split an opcode byte into its tag and immediate flag. Returns `None` when
/// the tag portion is outside the defined set.
pub fn decode(byte: u8) -> Option<(Opcode, bool)> {
    Opcode::from_tag(byte >> 1).map(|opcode| (opcode, byte & 1 == 1))
}

/// Pack an opcode and immediate flag into a single opcode byte.
pub fn encode(opcode: Opcode, immediate: bool) -> u8 {
    (opcode.tag() << 1) | immediate as u8
}
