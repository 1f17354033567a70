//! Instruction decoder for the Z80 disassembler

use crate::codemap::CodeMap;
use crate::disassembler::{directives, CodeLine, DecoderOptions};
use crate::labels::LabelLookup;
use crate::memory::MemoryBus;
use crate::opcodes::{extended_nop, instruction_set, Encoding, OperandShape};
use crate::operand::{IndexMode, Operand};

/// Longest instruction encoding, prefixes included
pub const MAX_INSTRUCTION_LENGTH: u16 = 4;

/// Decodes instructions from a byte source.
///
/// The decoder keeps a cursor that [`parse_instruction`](Self::parse_instruction)
/// moves past every byte it consumes, including index prefixes that were
/// discarded because another prefix followed them.
///
/// # Examples
///
/// ```
/// use libz80::{Decoder, FlatMemory};
///
/// let memory = FlatMemory::from_bytes(0x8000, &[0xDD, 0x21, 0x00, 0x40]);
/// let mut decoder = Decoder::new(&memory);
/// let line = decoder.parse_instruction(0x8000);
///
/// assert_eq!(line.to_string(), "LD IX,$4000");
/// assert_eq!(decoder.position(), 0x8004);
/// ```
pub struct Decoder<'a, M: MemoryBus + ?Sized> {
    memory: &'a M,
    labels: Option<&'a dyn LabelLookup>,
    options: DecoderOptions,
    cursor: u16,
}

impl<'a, M: MemoryBus + ?Sized> Decoder<'a, M> {
    /// Create a decoder over `memory` with default options and no labels
    pub fn new(memory: &'a M) -> Self {
        Self {
            memory,
            labels: None,
            options: DecoderOptions::default(),
            cursor: 0,
        }
    }

    /// Attach a label lookup used to name addresses
    pub fn with_labels(mut self, labels: &'a dyn LabelLookup) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Replace the decoder options
    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    /// Address of the next byte the decoder would read
    pub fn position(&self) -> u16 {
        self.cursor
    }

    /// Byte source being decoded
    pub fn memory(&self) -> &'a M {
        self.memory
    }

    /// Label lookup, if one is attached
    pub fn labels(&self) -> Option<&'a dyn LabelLookup> {
        self.labels
    }

    fn next_byte(&mut self) -> u8 {
        let byte = self.memory.read(self.cursor);
        self.cursor = self.cursor.wrapping_add(1);
        byte
    }

    fn label_for(&self, address: u16) -> Option<String> {
        self.labels
            .and_then(|labels| labels.get_label(address))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    /// Decode the instruction at `address`.
    ///
    /// Never fails: unassigned ED opcodes decode to the `NOP $ED,$xx`
    /// pseudo-instruction. A redundant index prefix, or one followed by `ED`,
    /// is consumed but left out of the returned bytes.
    pub fn parse_instruction(&mut self, address: u16) -> CodeLine {
        self.cursor = address;
        let mut bytes = Vec::with_capacity(4);
        let mut mode = IndexMode::Hl;

        let mut opcode = self.next_byte();
        while let Some(prefix) = IndexMode::from_prefix(opcode) {
            // Last prefix wins
            mode = prefix;
            bytes.clear();
            bytes.push(opcode);
            opcode = self.next_byte();
        }

        let set = instruction_set();
        let unassigned;
        let mut displacement = None;
        let encoding: &Encoding = match opcode {
            0xED => {
                bytes.clear();
                bytes.push(opcode);
                let sub = self.next_byte();
                bytes.push(sub);
                match set.extended(sub, self.options.extended_opcodes) {
                    Some(encoding) => encoding,
                    None => {
                        unassigned = extended_nop(sub);
                        &unassigned
                    }
                }
            }
            0xCB if mode != IndexMode::Hl => {
                let d = self.next_byte();
                let sub = self.next_byte();
                bytes.extend([opcode, d, sub]);
                displacement = Some(d as i8);
                set.bit(mode, sub)
            }
            0xCB => {
                let sub = self.next_byte();
                bytes.extend([opcode, sub]);
                set.bit(mode, sub)
            }
            _ => {
                bytes.push(opcode);
                match set.main(mode, opcode) {
                    Some(encoding) => encoding,
                    None => return self.parse_db(address, 1),
                }
            }
        };

        let mut operands = Vec::with_capacity(encoding.operands.len());
        for &shape in &encoding.operands {
            operands.push(self.read_operand(shape, &mut bytes, &mut displacement));
        }

        CodeLine {
            address,
            mnemonic: encoding.mnemonic,
            operands,
            bytes,
            ticks: encoding.ticks,
            ticks_alt: encoding.ticks_alt,
            tags: encoding.tags,
            label: self.label_for(address),
        }
    }

    fn read_operand(
        &mut self,
        shape: OperandShape,
        bytes: &mut Vec<u8>,
        displacement: &mut Option<i8>,
    ) -> Operand {
        let mut fetch = |decoder: &mut Self| {
            let byte = decoder.next_byte();
            bytes.push(byte);
            byte
        };

        match shape {
            OperandShape::Reg8(reg) => Operand::Reg8(reg),
            OperandShape::Reg16(reg) => Operand::Reg16(reg),
            OperandShape::MemReg16(reg) | OperandShape::JumpIndirect(reg) => {
                Operand::MemReg16(reg)
            }
            OperandShape::MemIndexed(base) => {
                // Indexed CB forms fetched the displacement before the opcode
                let d = match displacement.take() {
                    Some(d) => d,
                    None => fetch(self) as i8,
                };
                Operand::MemIndexed {
                    base,
                    displacement: d,
                }
            }
            OperandShape::Imm8 => Operand::Imm8(fetch(self)),
            OperandShape::Imm16 => {
                let value = u16::from_le_bytes([fetch(self), fetch(self)]);
                Operand::Imm16 {
                    value,
                    label: self.label_for(value),
                }
            }
            OperandShape::Imm16BigEndian => {
                let value = u16::from_be_bytes([fetch(self), fetch(self)]);
                Operand::Imm16 {
                    value,
                    label: self.label_for(value),
                }
            }
            OperandShape::MemImm16 => {
                let address = u16::from_le_bytes([fetch(self), fetch(self)]);
                Operand::MemImm16 {
                    address,
                    label: self.label_for(address),
                }
            }
            OperandShape::Relative => {
                let d = fetch(self) as i8;
                let target = self.cursor.wrapping_add(d as u16);
                Operand::Imm16 {
                    value: target,
                    label: self.label_for(target),
                }
            }
            OperandShape::PortImm8 => Operand::PortImm8(fetch(self)),
            OperandShape::PortC => Operand::PortC,
            OperandShape::Condition(condition) => Operand::Condition(condition),
            OperandShape::Value(value) => Operand::Imm8(value),
        }
    }

    /// Decode the instruction that ends at (or covers the byte before) `address`.
    ///
    /// With a code map that records an instruction covering `address - 1`,
    /// that instruction is decoded. Otherwise the decoder tries start
    /// addresses up to [`MAX_INSTRUCTION_LENGTH`] bytes back, longest first,
    /// and takes the first whose encoding ends exactly at `address`; if none
    /// fits, the byte before `address` is decoded on its own.
    pub fn parse_instruction_backwards(
        &mut self,
        address: u16,
        code_map: Option<&CodeMap>,
    ) -> CodeLine {
        let previous = address.wrapping_sub(1);
        if let Some(start) = code_map.and_then(|map| map.instruction_start(previous)) {
            return self.parse_instruction(start);
        }

        for lookback in (1..=MAX_INSTRUCTION_LENGTH).rev() {
            let start = address.wrapping_sub(lookback);
            let line = self.parse_instruction(start);
            if self.cursor == address {
                return line;
            }
        }
        self.parse_instruction(previous)
    }

    /// `DB` line of `count` bytes at `address`
    pub fn parse_db(&mut self, address: u16, count: usize) -> CodeLine {
        self.finish_directive(directives::parse_db(self.memory, address, count))
    }

    /// `DW` line of `count` little-endian words at `address`
    pub fn parse_dw(&mut self, address: u16, count: usize) -> CodeLine {
        self.finish_directive(directives::parse_dw(self.memory, address, count))
    }

    /// `DZ` line reading a NUL-terminated string of at most `max_length` bytes
    pub fn parse_dz(&mut self, address: u16, max_length: usize) -> CodeLine {
        self.finish_directive(directives::parse_dz(self.memory, address, max_length))
    }

    /// `DS` line covering a run of identical bytes, at most `max_length` long
    pub fn parse_ds(&mut self, address: u16, max_length: usize) -> CodeLine {
        self.finish_directive(directives::parse_ds(self.memory, address, max_length))
    }

    fn finish_directive(&mut self, mut line: CodeLine) -> CodeLine {
        self.cursor = line.next_address();
        line.label = self.label_for(line.address);
        line
    }
}
