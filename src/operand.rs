//! # Operands
//!
//! Registers, condition codes and the decoded [`Operand`] tagged union. These
//! closed enums are shared by the decoder, which produces them, and the
//! assembler, which parses source text into them. Strings only appear when an
//! operand is rendered (see [`formatter`](crate::disassembler::formatter)).

/// 8-bit registers, including the undocumented index register halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    /// Interrupt vector register
    I,
    /// Memory refresh register
    R,
    /// Flags, only addressable by `IN F,(C)`
    F,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
}

impl Reg8 {
    /// Assembly name of the register
    pub fn name(self) -> &'static str {
        match self {
            Reg8::A => "A",
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
            Reg8::I => "I",
            Reg8::R => "R",
            Reg8::F => "F",
            Reg8::Ixh => "IXH",
            Reg8::Ixl => "IXL",
            Reg8::Iyh => "IYH",
            Reg8::Iyl => "IYL",
        }
    }

    /// Parse an uppercase register name
    pub fn from_name(name: &str) -> Option<Self> {
        let reg = match name {
            "A" => Reg8::A,
            "B" => Reg8::B,
            "C" => Reg8::C,
            "D" => Reg8::D,
            "E" => Reg8::E,
            "H" => Reg8::H,
            "L" => Reg8::L,
            "I" => Reg8::I,
            "R" => Reg8::R,
            "F" => Reg8::F,
            "IXH" => Reg8::Ixh,
            "IXL" => Reg8::Ixl,
            "IYH" => Reg8::Iyh,
            "IYL" => Reg8::Iyl,
            _ => return None,
        };
        Some(reg)
    }

    /// The index register this half belongs to, if it is an index half
    pub fn index_register(self) -> Option<Reg16> {
        match self {
            Reg8::Ixh | Reg8::Ixl => Some(Reg16::Ix),
            Reg8::Iyh | Reg8::Iyl => Some(Reg16::Iy),
            _ => None,
        }
    }
}

/// 16-bit register pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    Af,
    /// The shadow `AF'` pair, only named by `EX AF,AF'`
    AfAlt,
    Bc,
    De,
    Hl,
    Sp,
    Ix,
    Iy,
}

impl Reg16 {
    /// Assembly name of the register pair
    pub fn name(self) -> &'static str {
        match self {
            Reg16::Af => "AF",
            Reg16::AfAlt => "AF'",
            Reg16::Bc => "BC",
            Reg16::De => "DE",
            Reg16::Hl => "HL",
            Reg16::Sp => "SP",
            Reg16::Ix => "IX",
            Reg16::Iy => "IY",
        }
    }

    /// Parse an uppercase register pair name
    pub fn from_name(name: &str) -> Option<Self> {
        let reg = match name {
            "AF" => Reg16::Af,
            "AF'" => Reg16::AfAlt,
            "BC" => Reg16::Bc,
            "DE" => Reg16::De,
            "HL" => Reg16::Hl,
            "SP" => Reg16::Sp,
            "IX" => Reg16::Ix,
            "IY" => Reg16::Iy,
            _ => return None,
        };
        Some(reg)
    }

    /// True for IX and IY
    pub fn is_index(self) -> bool {
        matches!(self, Reg16::Ix | Reg16::Iy)
    }
}

/// Branch condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Nz,
    Z,
    Nc,
    C,
    Po,
    Pe,
    P,
    M,
}

impl Condition {
    /// Conditions in encoding order (the `cc` field of an opcode)
    pub const ALL: [Condition; 8] = [
        Condition::Nz,
        Condition::Z,
        Condition::Nc,
        Condition::C,
        Condition::Po,
        Condition::Pe,
        Condition::P,
        Condition::M,
    ];

    /// Assembly name of the condition
    pub fn name(self) -> &'static str {
        match self {
            Condition::Nz => "NZ",
            Condition::Z => "Z",
            Condition::Nc => "NC",
            Condition::C => "C",
            Condition::Po => "PO",
            Condition::Pe => "PE",
            Condition::P => "P",
            Condition::M => "M",
        }
    }

    /// Parse an uppercase condition name
    pub fn from_name(name: &str) -> Option<Self> {
        Condition::ALL.iter().copied().find(|c| c.name() == name)
    }
}

/// Which register an index prefix substitutes for HL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexMode {
    /// No prefix: HL, H and L mean themselves
    Hl,
    /// `0xDD` prefix
    Ix,
    /// `0xFD` prefix
    Iy,
}

impl IndexMode {
    /// All modes in table order
    pub const ALL: [IndexMode; 3] = [IndexMode::Hl, IndexMode::Ix, IndexMode::Iy];

    /// Mode selected by a prefix byte, if the byte is an index prefix
    pub fn from_prefix(byte: u8) -> Option<Self> {
        match byte {
            0xDD => Some(IndexMode::Ix),
            0xFD => Some(IndexMode::Iy),
            _ => None,
        }
    }

    /// Prefix byte selecting this mode
    pub fn prefix(self) -> Option<u8> {
        match self {
            IndexMode::Hl => None,
            IndexMode::Ix => Some(0xDD),
            IndexMode::Iy => Some(0xFD),
        }
    }

    /// Register pair standing in for HL
    pub fn register(self) -> Reg16 {
        match self {
            IndexMode::Hl => Reg16::Hl,
            IndexMode::Ix => Reg16::Ix,
            IndexMode::Iy => Reg16::Iy,
        }
    }

    /// Register standing in for H
    pub fn high(self) -> Reg8 {
        match self {
            IndexMode::Hl => Reg8::H,
            IndexMode::Ix => Reg8::Ixh,
            IndexMode::Iy => Reg8::Iyh,
        }
    }

    /// Register standing in for L
    pub fn low(self) -> Reg8 {
        match self {
            IndexMode::Hl => Reg8::L,
            IndexMode::Ix => Reg8::Ixl,
            IndexMode::Iy => Reg8::Iyl,
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            IndexMode::Hl => 0,
            IndexMode::Ix => 1,
            IndexMode::Iy => 2,
        }
    }
}

/// Operand classification, independent of the concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Reg8,
    Reg16,
    Imm8,
    Imm16,
    /// Indirect through a 16-bit register: `(HL)`, `(BC)`, `(SP)`
    MemReg16,
    /// Indirect through an absolute address: `($1234)`
    MemImm16,
    /// Index register plus signed displacement: `(IX+$05)`
    MemIndexed,
    Condition,
    /// Port number: `($FE)`
    PortImm8,
    /// Port addressed by register C: `(C)`
    PortReg,
    /// String payload of a `DZ` line
    Text,
}

/// A decoded instruction operand.
///
/// Exactly one payload is authoritative per kind: register and condition
/// operands carry their closed enum, immediates and addresses carry numbers.
/// Address-valued operands may also carry the label the decoder found for
/// that address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg8(Reg8),
    Reg16(Reg16),
    Imm8(u8),
    Imm16 { value: u16, label: Option<String> },
    MemReg16(Reg16),
    MemImm16 { address: u16, label: Option<String> },
    MemIndexed { base: Reg16, displacement: i8 },
    Condition(Condition),
    PortImm8(u8),
    PortC,
    Text(String),
}

impl Operand {
    /// Unlabelled 16-bit immediate
    pub fn imm16(value: u16) -> Self {
        Operand::Imm16 { value, label: None }
    }

    /// Unlabelled absolute memory reference
    pub fn mem_imm16(address: u16) -> Self {
        Operand::MemImm16 {
            address,
            label: None,
        }
    }

    /// Kind tag of this operand
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Reg8(_) => OperandKind::Reg8,
            Operand::Reg16(_) => OperandKind::Reg16,
            Operand::Imm8(_) => OperandKind::Imm8,
            Operand::Imm16 { .. } => OperandKind::Imm16,
            Operand::MemReg16(_) => OperandKind::MemReg16,
            Operand::MemImm16 { .. } => OperandKind::MemImm16,
            Operand::MemIndexed { .. } => OperandKind::MemIndexed,
            Operand::Condition(_) => OperandKind::Condition,
            Operand::PortImm8(_) => OperandKind::PortImm8,
            Operand::PortC => OperandKind::PortReg,
            Operand::Text(_) => OperandKind::Text,
        }
    }

    /// Numeric payload, for immediate, address and port operands
    pub fn value(&self) -> Option<u16> {
        match self {
            Operand::Imm8(v) | Operand::PortImm8(v) => Some(*v as u16),
            Operand::Imm16 { value, .. } => Some(*value),
            Operand::MemImm16 { address, .. } => Some(*address),
            _ => None,
        }
    }

    /// Symbolic payload, for register and condition operands
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Operand::Reg8(r) => Some(r.name()),
            Operand::Reg16(r) | Operand::MemReg16(r) => Some(r.name()),
            Operand::MemIndexed { base, .. } => Some(base.name()),
            Operand::Condition(c) => Some(c.name()),
            Operand::PortC => Some("C"),
            _ => None,
        }
    }

    /// Label attached by the decoder
    pub fn label(&self) -> Option<&str> {
        match self {
            Operand::Imm16 { label, .. } | Operand::MemImm16 { label, .. } => label.as_deref(),
            _ => None,
        }
    }
}
