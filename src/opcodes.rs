//! # Instruction Model
//!
//! This module holds the opcode tables that serve as the single source of truth
//! for Z80 instruction metadata. The decoder reads them forwards (byte to
//! [`Encoding`]) and the assembler reads them backwards (mnemonic plus operand
//! shapes to [`Encoding`]), so the two can never disagree.
//!
//! The tables cover:
//! - **Main table** (256 opcodes, 4 of which are prefixes)
//! - **CB table** (bit, rotate and shift operations)
//! - **ED table** (extended operations, block transfers and I/O)
//! - **DD/FD index forms** of every main and CB opcode
//! - **Z80N extensions** in the ED space, reachable only when enabled
//!
//! The tables are generated once from the regular `x/y/z` structure of the
//! opcode byte rather than typed out by hand; the index prefixes are applied by
//! [`index_form`], which is the one place that knows which operands HL, H and L
//! turn into.
//!
//! # Examples
//!
//! ```
//! use libz80::opcodes::{instruction_set, OperandShape};
//! use libz80::operand::{IndexMode, Reg8};
//!
//! let set = instruction_set();
//!
//! // LD H,$n under a DD prefix loads the high half of IX
//! let ld = set.main(IndexMode::Ix, 0x26).unwrap();
//! assert_eq!(ld.mnemonic, "LD");
//! assert_eq!(ld.operands, vec![OperandShape::Reg8(Reg8::Ixh), OperandShape::Imm8]);
//! assert_eq!(ld.length(), 3);
//! assert_eq!(ld.ticks, 11);
//! ```

use std::collections::HashMap;

use bitflags::bitflags;
use once_cell::sync::Lazy;

use crate::operand::{Condition, IndexMode, Reg16, Reg8};

bitflags! {
    /// Classification tags. An instruction may carry several, e.g. `CALL`
    /// is tagged both CALL and STACK.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Tags: u16 {
        const LOAD = 1 << 0;
        const ALU = 1 << 1;
        const JUMP = 1 << 2;
        const CALL = 1 << 3;
        const RETURN = 1 << 4;
        const STACK = 1 << 5;
        const IO = 1 << 6;
        const BLOCK = 1 << 7;
        const BIT = 1 << 8;
        const SHIFT_ROTATE = 1 << 9;
        const EXCHANGE = 1 << 10;
        const CPU_CONTROL = 1 << 11;
    }
}

/// Operand slot of an opcode, before any bytes are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandShape {
    Reg8(Reg8),
    Reg16(Reg16),
    /// `(BC)`, `(DE)`, `(HL)`, `(SP)`; `(HL)` becomes [`MemIndexed`](Self::MemIndexed) under a prefix
    MemReg16(Reg16),
    /// `(IX+d)` / `(IY+d)`: one displacement byte
    MemIndexed(Reg16),
    /// Target of `JP (HL)`; never takes a displacement
    JumpIndirect(Reg16),
    /// One immediate byte
    Imm8,
    /// Two immediate bytes, little-endian
    Imm16,
    /// Two immediate bytes, big-endian (Z80N `PUSH nn`)
    Imm16BigEndian,
    /// `(nn)`: two address bytes, little-endian
    MemImm16,
    /// One signed displacement byte, shown as the absolute target address
    Relative,
    /// `(n)`: one port byte
    PortImm8,
    /// `(C)`
    PortC,
    Condition(Condition),
    /// A number baked into the opcode: bit index, RST vector, interrupt mode
    Value(u8),
}

impl OperandShape {
    /// Bytes this operand occupies after the opcode
    pub fn width(self) -> usize {
        match self {
            OperandShape::MemIndexed(_)
            | OperandShape::Imm8
            | OperandShape::Relative
            | OperandShape::PortImm8 => 1,
            OperandShape::Imm16 | OperandShape::Imm16BigEndian | OperandShape::MemImm16 => 2,
            _ => 0,
        }
    }
}

/// Opcode table an encoding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpTable {
    Main,
    /// Reached through `0xCB`
    Bit,
    /// Reached through `0xED`
    Extended,
}

/// Full description of one encodable instruction form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    /// Instruction mnemonic (e.g. "LD", "JR", "BIT")
    pub mnemonic: &'static str,

    /// Operand slots in assembly order
    pub operands: Vec<OperandShape>,

    /// Index prefix byte (0xDD or 0xFD) preceding the instruction, if any
    pub prefix: Option<u8>,

    /// Table holding the opcode
    pub table: OpTable,

    /// Opcode byte within its table
    pub opcode: u8,

    /// Clock ticks when a conditional branch is not taken (or always, if unconditional)
    pub ticks: u8,

    /// Clock ticks when a conditional branch or repeat is taken
    pub ticks_alt: u8,

    /// Classification tags
    pub tags: Tags,

    /// Part of the Z80N extension set
    pub extension: bool,

    /// True when the index prefix rewrote at least one operand
    pub substituted: bool,
}

impl Encoding {
    /// Total encoded size in bytes, prefixes and operands included
    pub fn length(&self) -> usize {
        let prefix = usize::from(self.prefix.is_some());
        let table = match self.table {
            OpTable::Main => 0,
            OpTable::Bit | OpTable::Extended => 1,
        };
        prefix + table + 1 + self.operands.iter().map(|s| s.width()).sum::<usize>()
    }

    /// Bytes of this encoding with every operand byte set to `fill`
    pub fn template_bytes(&self, fill: u8) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4);
        bytes.extend(self.prefix);
        match self.table {
            OpTable::Main => bytes.push(self.opcode),
            OpTable::Extended => bytes.extend([0xED, self.opcode]),
            OpTable::Bit if self.prefix.is_some() => {
                // Indexed CB forms put the displacement before the opcode
                bytes.extend([0xCB, fill, self.opcode]);
                return bytes;
            }
            OpTable::Bit => bytes.extend([0xCB, self.opcode]),
        }
        for shape in &self.operands {
            bytes.extend(std::iter::repeat(fill).take(shape.width()));
        }
        bytes
    }
}

/// Pseudo-instruction for an ED opcode with no assigned meaning: `NOP $ED,$xx`.
pub fn extended_nop(opcode: u8) -> Encoding {
    Encoding {
        mnemonic: "NOP",
        operands: vec![OperandShape::Value(0xED), OperandShape::Value(opcode)],
        prefix: None,
        table: OpTable::Extended,
        opcode,
        ticks: 8,
        ticks_alt: 8,
        tags: Tags::CPU_CONTROL,
        extension: false,
        substituted: false,
    }
}

/// All opcode tables, built once.
pub struct InstructionSet {
    main: [Vec<Option<Encoding>>; 3],
    bit: [Vec<Encoding>; 3],
    extended: Vec<Option<Encoding>>,
    by_mnemonic: HashMap<&'static str, Vec<Encoding>>,
}

static INSTRUCTION_SET: Lazy<InstructionSet> = Lazy::new(InstructionSet::build);

/// The shared instruction set
pub fn instruction_set() -> &'static InstructionSet {
    &INSTRUCTION_SET
}

impl InstructionSet {
    fn build() -> Self {
        let base: Vec<Option<Encoding>> = (0..=255u8).map(main_entry).collect();
        let main: [Vec<Option<Encoding>>; 3] = IndexMode::ALL.map(|mode| {
            base.iter()
                .map(|entry| {
                    entry.as_ref().map(|e| match mode {
                        IndexMode::Hl => e.clone(),
                        _ => index_form(e, mode),
                    })
                })
                .collect()
        });
        let bit: [Vec<Encoding>; 3] = IndexMode::ALL.map(|mode| {
            (0..=255u8)
                .map(|op| match mode {
                    IndexMode::Hl => bit_entry(op),
                    _ => bit_index_form(op, mode),
                })
                .collect()
        });
        let extended: Vec<Option<Encoding>> = (0..=255u8).map(extended_entry).collect();

        // Documented forms go in first so undocumented duplicates never shadow them
        let mut by_mnemonic: HashMap<&'static str, Vec<Encoding>> = HashMap::new();
        let mut insert = |encoding: &Encoding| {
            let forms = by_mnemonic.entry(encoding.mnemonic).or_default();
            if !forms.iter().any(|e| e.operands == encoding.operands) {
                forms.push(encoding.clone());
            }
        };
        for table in &main {
            for encoding in table.iter().flatten() {
                if encoding.prefix.is_none() || encoding.substituted {
                    insert(encoding);
                }
            }
        }
        for encoding in &bit[0] {
            insert(encoding);
        }
        for table in &bit[1..] {
            let canonical = (0..=255usize).filter(|op| op & 7 == 6);
            let copies = (0..=255usize).filter(|op| op & 7 != 6);
            for op in canonical.chain(copies) {
                insert(&table[op]);
            }
        }
        for encoding in extended.iter().flatten() {
            insert(encoding);
        }

        InstructionSet {
            main,
            bit,
            extended,
            by_mnemonic,
        }
    }

    /// Main-table entry under an index mode; `None` for the prefix bytes themselves
    pub fn main(&self, mode: IndexMode, opcode: u8) -> Option<&Encoding> {
        self.main[mode.slot()][opcode as usize].as_ref()
    }

    /// CB-table entry; under DD/FD this is the `(IX+d)` form
    pub fn bit(&self, mode: IndexMode, opcode: u8) -> &Encoding {
        &self.bit[mode.slot()][opcode as usize]
    }

    /// ED-table entry, hiding Z80N opcodes unless `allow_extension` is set
    pub fn extended(&self, opcode: u8, allow_extension: bool) -> Option<&Encoding> {
        self.extended[opcode as usize]
            .as_ref()
            .filter(|e| allow_extension || !e.extension)
    }

    /// Every assemblable form of a mnemonic, documented forms first
    pub fn candidates(&self, mnemonic: &str) -> &[Encoding] {
        self.by_mnemonic
            .get(mnemonic)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if the mnemonic names an instruction
    pub fn is_mnemonic(&self, mnemonic: &str) -> bool {
        self.by_mnemonic.contains_key(mnemonic)
    }

    /// Every distinct assemblable form
    pub fn encodings(&self) -> impl Iterator<Item = &Encoding> {
        self.by_mnemonic.values().flatten()
    }
}

// ========== Table construction ==========

fn entry(
    mnemonic: &'static str,
    operands: &[OperandShape],
    ticks: u8,
    ticks_alt: u8,
    tags: Tags,
) -> Encoding {
    Encoding {
        mnemonic,
        operands: operands.to_vec(),
        prefix: None,
        table: OpTable::Main,
        opcode: 0,
        ticks,
        ticks_alt,
        tags,
        extension: false,
        substituted: false,
    }
}

fn fixed(mnemonic: &'static str, operands: &[OperandShape], ticks: u8, tags: Tags) -> Encoding {
    entry(mnemonic, operands, ticks, ticks, tags)
}

use OperandShape::{
    Condition as Cc, Imm16, Imm8, MemImm16, PortC, PortImm8, Reg16 as R16, Reg8 as R8, Relative,
    Value,
};

/// `r` field: B C D E H L (HL) A
fn r(index: u8) -> OperandShape {
    match index & 7 {
        0 => R8(Reg8::B),
        1 => R8(Reg8::C),
        2 => R8(Reg8::D),
        3 => R8(Reg8::E),
        4 => R8(Reg8::H),
        5 => R8(Reg8::L),
        6 => OperandShape::MemReg16(Reg16::Hl),
        _ => R8(Reg8::A),
    }
}

/// `rp` field: BC DE HL SP
fn rp(index: u8) -> Reg16 {
    [Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::Sp][(index & 3) as usize]
}

/// `rp2` field: BC DE HL AF
fn rp2(index: u8) -> Reg16 {
    [Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::Af][(index & 3) as usize]
}

fn cc(index: u8) -> OperandShape {
    Cc(Condition::ALL[(index & 7) as usize])
}

/// 8-bit ALU operation `y` applied to `operand`
fn alu(y: u8, operand: OperandShape, ticks: u8) -> Encoding {
    let a = R8(Reg8::A);
    match y {
        0 => fixed("ADD", &[a, operand], ticks, Tags::ALU),
        1 => fixed("ADC", &[a, operand], ticks, Tags::ALU),
        2 => fixed("SUB", &[operand], ticks, Tags::ALU),
        3 => fixed("SBC", &[a, operand], ticks, Tags::ALU),
        4 => fixed("AND", &[operand], ticks, Tags::ALU),
        5 => fixed("XOR", &[operand], ticks, Tags::ALU),
        6 => fixed("OR", &[operand], ticks, Tags::ALU),
        _ => fixed("CP", &[operand], ticks, Tags::ALU),
    }
}

const ROTATES: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];

fn main_entry(opcode: u8) -> Option<Encoding> {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;
    let mem = |i: u8| i == 6;

    let mut encoding = match x {
        0 => match z {
            0 => match y {
                0 => fixed("NOP", &[], 4, Tags::CPU_CONTROL),
                1 => fixed(
                    "EX",
                    &[R16(Reg16::Af), R16(Reg16::AfAlt)],
                    4,
                    Tags::EXCHANGE,
                ),
                2 => entry("DJNZ", &[Relative], 8, 13, Tags::JUMP),
                3 => fixed("JR", &[Relative], 12, Tags::JUMP),
                _ => entry("JR", &[cc(y - 4), Relative], 7, 12, Tags::JUMP),
            },
            1 if q == 0 => fixed("LD", &[R16(rp(p)), Imm16], 10, Tags::LOAD),
            1 => fixed("ADD", &[R16(Reg16::Hl), R16(rp(p))], 11, Tags::ALU),
            2 => {
                let a = R8(Reg8::A);
                let hl = R16(Reg16::Hl);
                let (operands, ticks) = match (q, p) {
                    (0, 0) => (vec![OperandShape::MemReg16(Reg16::Bc), a], 7),
                    (0, 1) => (vec![OperandShape::MemReg16(Reg16::De), a], 7),
                    (0, 2) => (vec![MemImm16, hl], 16),
                    (0, _) => (vec![MemImm16, a], 13),
                    (_, 0) => (vec![a, OperandShape::MemReg16(Reg16::Bc)], 7),
                    (_, 1) => (vec![a, OperandShape::MemReg16(Reg16::De)], 7),
                    (_, 2) => (vec![hl, MemImm16], 16),
                    (_, _) => (vec![a, MemImm16], 13),
                };
                fixed("LD", &operands, ticks, Tags::LOAD)
            }
            3 if q == 0 => fixed("INC", &[R16(rp(p))], 6, Tags::ALU),
            3 => fixed("DEC", &[R16(rp(p))], 6, Tags::ALU),
            4 => fixed("INC", &[r(y)], if mem(y) { 11 } else { 4 }, Tags::ALU),
            5 => fixed("DEC", &[r(y)], if mem(y) { 11 } else { 4 }, Tags::ALU),
            6 => fixed("LD", &[r(y), Imm8], if mem(y) { 10 } else { 7 }, Tags::LOAD),
            _ => {
                let (mnemonic, tags) = [
                    ("RLCA", Tags::SHIFT_ROTATE),
                    ("RRCA", Tags::SHIFT_ROTATE),
                    ("RLA", Tags::SHIFT_ROTATE),
                    ("RRA", Tags::SHIFT_ROTATE),
                    ("DAA", Tags::ALU),
                    ("CPL", Tags::ALU),
                    ("SCF", Tags::ALU),
                    ("CCF", Tags::ALU),
                ][y as usize];
                fixed(mnemonic, &[], 4, tags)
            }
        },
        1 if y == 6 && z == 6 => fixed("HALT", &[], 4, Tags::CPU_CONTROL),
        1 => {
            let ticks = if mem(y) || mem(z) { 7 } else { 4 };
            fixed("LD", &[r(y), r(z)], ticks, Tags::LOAD)
        }
        2 => alu(y, r(z), if mem(z) { 7 } else { 4 }),
        _ => match z {
            0 => entry("RET", &[cc(y)], 5, 11, Tags::RETURN | Tags::STACK),
            1 if q == 0 => fixed("POP", &[R16(rp2(p))], 10, Tags::STACK),
            1 => match p {
                0 => fixed("RET", &[], 10, Tags::RETURN | Tags::STACK),
                1 => fixed("EXX", &[], 4, Tags::EXCHANGE),
                2 => fixed(
                    "JP",
                    &[OperandShape::JumpIndirect(Reg16::Hl)],
                    4,
                    Tags::JUMP,
                ),
                _ => fixed("LD", &[R16(Reg16::Sp), R16(Reg16::Hl)], 6, Tags::LOAD),
            },
            2 => fixed("JP", &[cc(y), Imm16], 10, Tags::JUMP),
            3 => match y {
                0 => fixed("JP", &[Imm16], 10, Tags::JUMP),
                1 => return None,
                2 => fixed("OUT", &[PortImm8, R8(Reg8::A)], 11, Tags::IO),
                3 => fixed("IN", &[R8(Reg8::A), PortImm8], 11, Tags::IO),
                4 => fixed(
                    "EX",
                    &[OperandShape::MemReg16(Reg16::Sp), R16(Reg16::Hl)],
                    19,
                    Tags::EXCHANGE | Tags::STACK,
                ),
                5 => fixed(
                    "EX",
                    &[R16(Reg16::De), R16(Reg16::Hl)],
                    4,
                    Tags::EXCHANGE,
                ),
                6 => fixed("DI", &[], 4, Tags::CPU_CONTROL),
                _ => fixed("EI", &[], 4, Tags::CPU_CONTROL),
            },
            4 => entry("CALL", &[cc(y), Imm16], 10, 17, Tags::CALL | Tags::STACK),
            5 if q == 0 => fixed("PUSH", &[R16(rp2(p))], 11, Tags::STACK),
            5 if p == 0 => fixed("CALL", &[Imm16], 17, Tags::CALL | Tags::STACK),
            5 => return None,
            6 => alu(y, Imm8, 7),
            _ => fixed("RST", &[Value(y * 8)], 11, Tags::CALL | Tags::STACK),
        },
    };
    encoding.opcode = opcode;
    Some(encoding)
}

/// Rewrite a main-table encoding for an index prefix.
///
/// HL becomes IX/IY, `(HL)` becomes `(IX+d)`, and when no `(HL)` operand is
/// present H and L become the index halves. Opcodes that do not mention HL
/// keep their operands and only gain the prefix byte and its 4 ticks.
/// `EX DE,HL` is never substituted.
pub fn index_form(base: &Encoding, mode: IndexMode) -> Encoding {
    let mut encoding = base.clone();
    if mode == IndexMode::Hl {
        return encoding;
    }
    encoding.prefix = mode.prefix();
    encoding.ticks += 4;
    encoding.ticks_alt += 4;

    if base.table != OpTable::Main || base.opcode == 0xEB {
        return encoding;
    }

    let has_memory = base
        .operands
        .contains(&OperandShape::MemReg16(Reg16::Hl));
    let mut substituted = false;
    for shape in &mut encoding.operands {
        let replacement = match *shape {
            OperandShape::MemReg16(Reg16::Hl) => OperandShape::MemIndexed(mode.register()),
            OperandShape::Reg16(Reg16::Hl) => OperandShape::Reg16(mode.register()),
            OperandShape::JumpIndirect(Reg16::Hl) => OperandShape::JumpIndirect(mode.register()),
            OperandShape::Reg8(Reg8::H) if !has_memory => OperandShape::Reg8(mode.high()),
            OperandShape::Reg8(Reg8::L) if !has_memory => OperandShape::Reg8(mode.low()),
            other => other,
        };
        substituted |= replacement != *shape;
        *shape = replacement;
    }

    if has_memory {
        // Displacement fetch and address calculation; LD (IX+d),n overlaps them
        let extra = if base.opcode == 0x36 { 5 } else { 8 };
        encoding.ticks += extra;
        encoding.ticks_alt += extra;
    }
    encoding.substituted = substituted;
    encoding
}

fn bit_entry(opcode: u8) -> Encoding {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let memory = z == 6;

    let mut encoding = match x {
        0 => fixed(
            ROTATES[y as usize],
            &[r(z)],
            if memory { 15 } else { 8 },
            Tags::SHIFT_ROTATE,
        ),
        1 => fixed("BIT", &[Value(y), r(z)], if memory { 12 } else { 8 }, Tags::BIT),
        2 => fixed("RES", &[Value(y), r(z)], if memory { 15 } else { 8 }, Tags::BIT),
        _ => fixed("SET", &[Value(y), r(z)], if memory { 15 } else { 8 }, Tags::BIT),
    };
    encoding.table = OpTable::Bit;
    encoding.opcode = opcode;
    encoding
}

/// `DD CB d op` / `FD CB d op`. Forms whose register field is not 6 also copy
/// the result into that register (BIT only tests, so every BIT form reads the same).
fn bit_index_form(opcode: u8, mode: IndexMode) -> Encoding {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let target = OperandShape::MemIndexed(mode.register());
    let copy = (z != 6).then(|| r(z));

    let mut operands = Vec::with_capacity(3);
    let (mnemonic, ticks, tags) = match x {
        0 => (ROTATES[y as usize], 23, Tags::SHIFT_ROTATE),
        1 => ("BIT", 20, Tags::BIT),
        2 => ("RES", 23, Tags::BIT),
        _ => ("SET", 23, Tags::BIT),
    };
    if x != 0 {
        operands.push(Value(y));
    }
    operands.push(target);
    if x != 1 {
        operands.extend(copy);
    }

    let mut encoding = fixed(mnemonic, &operands, ticks, tags);
    encoding.table = OpTable::Bit;
    encoding.opcode = opcode;
    encoding.prefix = mode.prefix();
    encoding.substituted = true;
    encoding
}

const BLOCK_OPS: [[&str; 4]; 4] = [
    ["LDI", "CPI", "INI", "OUTI"],
    ["LDD", "CPD", "IND", "OUTD"],
    ["LDIR", "CPIR", "INIR", "OTIR"],
    ["LDDR", "CPDR", "INDR", "OTDR"],
];

fn extended_entry(opcode: u8) -> Option<Encoding> {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;

    let mut encoding = match (x, z) {
        (1, 0) => {
            let target = if y == 6 { R8(Reg8::F) } else { r(y) };
            fixed("IN", &[target, PortC], 12, Tags::IO)
        }
        (1, 1) => {
            let source = if y == 6 { Value(0) } else { r(y) };
            fixed("OUT", &[PortC, source], 12, Tags::IO)
        }
        (1, 2) if q == 0 => fixed("SBC", &[R16(Reg16::Hl), R16(rp(p))], 15, Tags::ALU),
        (1, 2) => fixed("ADC", &[R16(Reg16::Hl), R16(rp(p))], 15, Tags::ALU),
        (1, 3) if q == 0 => fixed("LD", &[MemImm16, R16(rp(p))], 20, Tags::LOAD),
        (1, 3) => fixed("LD", &[R16(rp(p)), MemImm16], 20, Tags::LOAD),
        (1, 4) => fixed("NEG", &[], 8, Tags::ALU),
        (1, 5) if y == 1 => fixed("RETI", &[], 14, Tags::RETURN | Tags::STACK),
        (1, 5) => fixed("RETN", &[], 14, Tags::RETURN | Tags::STACK),
        (1, 6) => fixed(
            "IM",
            &[Value([0, 0, 1, 2, 0, 0, 1, 2][y as usize])],
            8,
            Tags::CPU_CONTROL,
        ),
        (1, 7) => match y {
            0 => fixed("LD", &[R8(Reg8::I), R8(Reg8::A)], 9, Tags::LOAD),
            1 => fixed("LD", &[R8(Reg8::R), R8(Reg8::A)], 9, Tags::LOAD),
            2 => fixed("LD", &[R8(Reg8::A), R8(Reg8::I)], 9, Tags::LOAD),
            3 => fixed("LD", &[R8(Reg8::A), R8(Reg8::R)], 9, Tags::LOAD),
            4 => fixed("RRD", &[], 18, Tags::SHIFT_ROTATE),
            5 => fixed("RLD", &[], 18, Tags::SHIFT_ROTATE),
            _ => return None,
        },
        (2, 0..=3) if y >= 4 => {
            let mnemonic = BLOCK_OPS[(y - 4) as usize][z as usize];
            let kind = match z {
                0 => Tags::LOAD,
                1 => Tags::ALU,
                _ => Tags::IO,
            };
            let repeat_ticks = if y >= 6 { 21 } else { 16 };
            entry(mnemonic, &[], 16, repeat_ticks, kind | Tags::BLOCK)
        }
        _ => return next_entry(opcode),
    };
    encoding.table = OpTable::Extended;
    encoding.opcode = opcode;
    Some(encoding)
}

/// Z80N (ZX Spectrum Next) opcodes, all in otherwise unassigned ED slots.
fn next_entry(opcode: u8) -> Option<Encoding> {
    let de_b = [R16(Reg16::De), R8(Reg8::B)];
    let mut encoding = match opcode {
        0x23 => fixed("SWAPNIB", &[], 8, Tags::ALU),
        0x24 => fixed("MIRROR", &[], 8, Tags::ALU),
        0x27 => fixed("TEST", &[Imm8], 11, Tags::ALU),
        0x28 => fixed("BSLA", &de_b, 8, Tags::SHIFT_ROTATE),
        0x29 => fixed("BSRA", &de_b, 8, Tags::SHIFT_ROTATE),
        0x2A => fixed("BSRL", &de_b, 8, Tags::SHIFT_ROTATE),
        0x2B => fixed("BSRF", &de_b, 8, Tags::SHIFT_ROTATE),
        0x2C => fixed("BRLC", &de_b, 8, Tags::SHIFT_ROTATE),
        0x30 => fixed("MUL", &[R8(Reg8::D), R8(Reg8::E)], 8, Tags::ALU),
        0x31 => fixed("ADD", &[R16(Reg16::Hl), R8(Reg8::A)], 8, Tags::ALU),
        0x32 => fixed("ADD", &[R16(Reg16::De), R8(Reg8::A)], 8, Tags::ALU),
        0x33 => fixed("ADD", &[R16(Reg16::Bc), R8(Reg8::A)], 8, Tags::ALU),
        0x34 => fixed("ADD", &[R16(Reg16::Hl), Imm16], 16, Tags::ALU),
        0x35 => fixed("ADD", &[R16(Reg16::De), Imm16], 16, Tags::ALU),
        0x36 => fixed("ADD", &[R16(Reg16::Bc), Imm16], 16, Tags::ALU),
        0x8A => fixed("PUSH", &[OperandShape::Imm16BigEndian], 23, Tags::STACK),
        0x90 => fixed("OUTINB", &[], 16, Tags::IO | Tags::BLOCK),
        0x91 => fixed("NEXTREG", &[Imm8, Imm8], 20, Tags::IO),
        0x92 => fixed("NEXTREG", &[Imm8, R8(Reg8::A)], 17, Tags::IO),
        0x93 => fixed("PIXELDN", &[], 8, Tags::ALU),
        0x94 => fixed("PIXELAD", &[], 8, Tags::ALU),
        0x95 => fixed("SETAE", &[], 8, Tags::ALU),
        0x98 => fixed("JP", &[PortC], 13, Tags::JUMP | Tags::IO),
        0xA4 => fixed("LDIX", &[], 16, Tags::LOAD | Tags::BLOCK),
        0xA5 => fixed("LDWS", &[], 14, Tags::LOAD | Tags::BLOCK),
        0xAC => fixed("LDDX", &[], 16, Tags::LOAD | Tags::BLOCK),
        0xB4 => entry("LDIRX", &[], 16, 21, Tags::LOAD | Tags::BLOCK),
        0xB7 => entry("LDPIRX", &[], 16, 21, Tags::LOAD | Tags::BLOCK),
        0xBC => entry("LDDRX", &[], 16, 21, Tags::LOAD | Tags::BLOCK),
        _ => return None,
    };
    encoding.table = OpTable::Extended;
    encoding.opcode = opcode;
    encoding.extension = true;
    Some(encoding)
}
