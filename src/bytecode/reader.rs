//! Positioned reads over an instruction stream.
//!
//! Instruction handlers use a `Reader` to consume their operand bytes and to
//! learn where the next instruction begins. Multi-byte operands are
//! little-endian.

use byteorder::{ByteOrder, LittleEndian};
use std::io;

pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader { bytes, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn has_at_least(&self, count: usize) -> bool {
        self.remaining() >= count
    }

    pub fn skip_to(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn read_u8(&mut self) -> Result<u8, io::Error> {
        if !self.has_at_least(1) {
            return Err(eof());
        }
        let byte = self.bytes[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    // le
    pub fn read_u16(&mut self) -> Result<u16, io::Error> {
        if !self.has_at_least(2) {
            return Err(eof());
        }
        let value = LittleEndian::read_u16(&self.bytes[self.pos..]);
        self.pos += 2;
        Ok(value)
    }
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "no more bytes to read")
}
