//! Data pseudo-instructions built from raw memory.
//!
//! These lines carry no timing and no tags. Discovery uses [`parse_db`] to
//! group unclassified bytes; the others are for callers that know what a
//! region holds.

use crate::disassembler::{read_bytes, CodeLine};
use crate::memory::MemoryBus;
use crate::opcodes::Tags;
use crate::operand::Operand;

fn data_line(address: u16, mnemonic: &'static str, operands: Vec<Operand>, bytes: Vec<u8>) -> CodeLine {
    CodeLine {
        address,
        mnemonic,
        operands,
        bytes,
        ticks: 0,
        ticks_alt: 0,
        tags: Tags::empty(),
        label: None,
    }
}

/// `DB` holding `count` bytes
pub fn parse_db<M: MemoryBus + ?Sized>(memory: &M, address: u16, count: usize) -> CodeLine {
    let bytes = read_bytes(memory, address, count);
    let operands = bytes.iter().map(|&b| Operand::Imm8(b)).collect();
    data_line(address, "DB", operands, bytes)
}

/// `DW` holding `count` little-endian words
pub fn parse_dw<M: MemoryBus + ?Sized>(memory: &M, address: u16, count: usize) -> CodeLine {
    let bytes = read_bytes(memory, address, count * 2);
    let operands = bytes
        .chunks_exact(2)
        .map(|pair| Operand::imm16(u16::from_le_bytes([pair[0], pair[1]])))
        .collect();
    data_line(address, "DW", operands, bytes)
}

/// `DZ` holding a NUL-terminated string.
///
/// Reads until a zero byte or until `max_length` bytes have been read. The
/// terminator is part of `bytes` but not of the text. A string cut off by
/// `max_length` has no terminator and comes back as a `DB` text line.
pub fn parse_dz<M: MemoryBus + ?Sized>(memory: &M, address: u16, max_length: usize) -> CodeLine {
    let mut bytes = Vec::new();
    let mut text = String::new();
    let mut terminated = false;
    for offset in 0..max_length {
        let byte = memory.read(address.wrapping_add(offset as u16));
        bytes.push(byte);
        if byte == 0 {
            terminated = true;
            break;
        }
        text.push(char::from(byte));
    }
    let mnemonic = if terminated { "DZ" } else { "DB" };
    data_line(address, mnemonic, vec![Operand::Text(text)], bytes)
}

/// `DS` covering the run of identical bytes at `address`, at most `max_length` long.
///
/// Operands are the count and the fill byte.
pub fn parse_ds<M: MemoryBus + ?Sized>(memory: &M, address: u16, max_length: usize) -> CodeLine {
    let limit = max_length.clamp(1, u16::MAX as usize);
    let fill = memory.read(address);
    let count = (1..limit)
        .take_while(|&offset| memory.read(address.wrapping_add(offset as u16)) == fill)
        .count()
        + 1;
    data_line(
        address,
        "DS",
        vec![Operand::imm16(count as u16), Operand::Imm8(fill)],
        vec![fill; count],
    )
}
