//! Z80 Disassembler Module
//!
//! Converts machine code into structured [`CodeLine`] records. The
//! [`decoder`] reads one instruction at a time from any [`MemoryBus`], the
//! [`directives`] build data pseudo-instructions (`DB`, `DW`, `DZ`, `DS`), and
//! the [`formatter`] renders either kind as assembler-accepted text.

pub mod decoder;
pub mod directives;
pub mod formatter;

use crate::memory::{FlatMemory, MemoryBus};
use crate::opcodes::Tags;
use crate::operand::Operand;

pub use decoder::Decoder;

/// A single decoded instruction or data directive with full metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// Memory address where this line starts
    pub address: u16,

    /// Instruction mnemonic (e.g. "LD", "JR") or directive ("DB", "DW", "DZ", "DS")
    pub mnemonic: &'static str,

    /// Operands in assembly order
    pub operands: Vec<Operand>,

    /// Encoded bytes, prefixes included
    pub bytes: Vec<u8>,

    /// Clock ticks when a conditional is not taken (or always)
    pub ticks: u8,

    /// Clock ticks when a conditional branch or block repeat is taken
    pub ticks_alt: u8,

    /// Classification tags
    pub tags: Tags,

    /// Label attached to `address`, if the label lookup knows one
    pub label: Option<String>,
}

/// How control leaves an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Falls through to the next instruction
    Next,
    /// Unconditional transfer; `None` when the target is in a register
    Jump { target: Option<u16> },
    /// Conditional transfer that may also fall through
    Branch { target: u16 },
    /// Subroutine call; execution resumes after it
    Call { target: Option<u16>, conditional: bool },
    /// Unconditional return
    Return,
    /// Conditional return that may also fall through
    ConditionalReturn,
}

impl CodeLine {
    /// Encoded size in bytes
    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    /// Address of the byte after this line's encoding
    pub fn next_address(&self) -> u16 {
        self.address.wrapping_add(self.bytes.len() as u16)
    }

    /// Control-flow classification used by discovery
    pub fn flow(&self) -> Flow {
        let conditional = matches!(self.operands.first(), Some(Operand::Condition(_)));
        let target = self.operands.last().and_then(|op| match op {
            Operand::Imm16 { value, .. } => Some(*value),
            _ => None,
        });

        if self.tags.contains(Tags::RETURN) {
            return if conditional {
                Flow::ConditionalReturn
            } else {
                Flow::Return
            };
        }

        match self.mnemonic {
            "JP" | "JR" if conditional => match target {
                Some(target) => Flow::Branch { target },
                None => Flow::Jump { target: None },
            },
            "JP" | "JR" => Flow::Jump { target },
            "DJNZ" => match target {
                Some(target) => Flow::Branch { target },
                None => Flow::Next,
            },
            "CALL" => Flow::Call {
                target,
                conditional,
            },
            "RST" => Flow::Call {
                target: self.operands.first().and_then(Operand::value),
                conditional: false,
            },
            _ => Flow::Next,
        }
    }
}

/// Options for decoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Decode Z80N opcodes in the ED space instead of treating them as unassigned
    pub extended_opcodes: bool,
}

/// Options controlling flat disassembly of a byte slice
#[derive(Debug, Clone, Copy, Default)]
pub struct DisassemblyOptions {
    /// Address of the first byte
    pub start_address: u16,

    /// Decode Z80N opcodes
    pub extended_opcodes: bool,
}

/// Disassemble a byte slice into a vector of code lines
///
/// Decoding is linear. An instruction that would run past the end of `bytes`
/// is emitted as a `DB` line holding the remaining bytes.
///
/// # Examples
///
/// ```
/// use libz80::disassembler::{disassemble, DisassemblyOptions};
///
/// let lines = disassemble(&[0x3E, 0x01, 0xC9], DisassemblyOptions::default());
/// assert_eq!(lines.len(), 2);
/// assert_eq!(lines[0].to_string(), "LD A,$01");
/// assert_eq!(lines[1].to_string(), "RET");
/// ```
pub fn disassemble(bytes: &[u8], options: DisassemblyOptions) -> Vec<CodeLine> {
    let memory = FlatMemory::from_bytes(options.start_address, bytes);
    let mut decoder = Decoder::new(&memory).with_options(DecoderOptions {
        extended_opcodes: options.extended_opcodes,
    });

    let mut lines = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let address = options.start_address.wrapping_add(offset as u16);
        let line = decoder.parse_instruction(address);
        let consumed = decoder.position().wrapping_sub(address) as usize;

        if offset + consumed > bytes.len() {
            let remaining = bytes.len() - offset;
            lines.push(directives::parse_db(&memory, address, remaining));
            break;
        }
        offset += consumed;
        lines.push(line);
    }

    lines
}

/// Read `count` bytes starting at `address`, wrapping at the top of memory
pub(crate) fn read_bytes<M: MemoryBus + ?Sized>(memory: &M, address: u16, count: usize) -> Vec<u8> {
    (0..count)
        .map(|offset| memory.read(address.wrapping_add(offset as u16)))
        .collect()
}
