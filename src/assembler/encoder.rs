//! Instruction encoder for the Z80 assembler
//!
//! Reads the shared instruction set backwards: a mnemonic and its classified
//! operands select one [`Encoding`], whose template is then filled with the
//! operand values.

use crate::assembler::parser::Arg;
use crate::assembler::ErrorKind;
use crate::opcodes::{instruction_set, Encoding, OpTable, OperandShape};
use crate::operand::{Condition, Reg16, Reg8};

/// An operand with its expressions evaluated; `None` while still unknown
pub type Resolved = Arg<Option<i64>>;

/// How strictly operands are checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Accept Z80N mnemonics
    pub extended_opcodes: bool,
    /// Values are final: enforce ranges and branch distances
    pub check_ranges: bool,
}

fn index_register(arg: &Resolved) -> Option<Reg16> {
    match arg {
        Arg::Reg8(reg) => reg.index_register(),
        Arg::Reg16(reg) | Arg::MemReg16(reg) | Arg::MemIndexed { base: reg, .. } => {
            Some(*reg).filter(|r| r.is_index())
        }
        _ => None,
    }
}

fn matches_shape(shape: OperandShape, arg: &Resolved) -> bool {
    match (shape, arg) {
        (OperandShape::Reg8(want), Arg::Reg8(have)) => want == *have,
        (OperandShape::Reg16(want), Arg::Reg16(have)) => want == *have,
        (OperandShape::MemReg16(want), Arg::MemReg16(have)) => want == *have,
        (OperandShape::MemIndexed(want), Arg::MemIndexed { base, .. }) => want == *base,
        (OperandShape::JumpIndirect(Reg16::Hl), Arg::MemReg16(Reg16::Hl)) => true,
        (
            OperandShape::JumpIndirect(want),
            Arg::MemIndexed {
                base,
                displacement: None,
            },
        ) => want == *base,
        (
            OperandShape::Imm8
            | OperandShape::Imm16
            | OperandShape::Imm16BigEndian
            | OperandShape::Relative,
            Arg::Imm(_),
        ) => true,
        (OperandShape::MemImm16 | OperandShape::PortImm8, Arg::Mem(_)) => true,
        (OperandShape::PortC, Arg::PortC) => true,
        (OperandShape::Condition(want), Arg::Condition(have)) => want == *have,
        (OperandShape::Condition(Condition::C), Arg::Reg8(Reg8::C)) => true,
        (OperandShape::Value(want), Arg::Imm(value)) => value.map_or(true, |v| v == i64::from(want)),
        _ => false,
    }
}

/// Find the encoding for `mnemonic` with `args`
pub fn select(
    mnemonic: &str,
    args: &[Resolved],
    extended_opcodes: bool,
) -> Result<&'static Encoding, ErrorKind> {
    let mut candidates = instruction_set()
        .candidates(mnemonic)
        .iter()
        .filter(|e| extended_opcodes || !e.extension)
        .peekable();
    if candidates.peek().is_none() {
        return Err(ErrorKind::UnknownMnemonic(mnemonic.to_string()));
    }

    candidates
        .find(|e| {
            e.operands.len() == args.len()
                && e.operands
                    .iter()
                    .zip(args)
                    .all(|(shape, arg)| matches_shape(*shape, arg))
        })
        .ok_or_else(|| ErrorKind::InvalidOperands(mnemonic.to_string()))
}

fn value_of(arg: &Resolved) -> i64 {
    match arg {
        Arg::Imm(v) | Arg::Mem(v) => v.unwrap_or(0),
        Arg::MemIndexed { displacement, .. } => displacement.flatten().unwrap_or(0),
        _ => 0,
    }
}

fn byte(value: i64, check: bool) -> Result<u8, ErrorKind> {
    if check && !(-256..=255).contains(&value) {
        return Err(ErrorKind::ValueOutOfRange(value));
    }
    Ok(value as u8)
}

fn word(value: i64, check: bool) -> Result<u16, ErrorKind> {
    if check && !(-32768..=65535).contains(&value) {
        return Err(ErrorKind::ValueOutOfRange(value));
    }
    Ok(value as u16)
}

fn displacement(value: i64, check: bool) -> Result<u8, ErrorKind> {
    if check && !(-128..=127).contains(&value) {
        return Err(ErrorKind::DisplacementOutOfRange(value));
    }
    Ok(value as u8)
}

/// Signed distance from the end of the instruction to `target`, modulo 64K
fn relative(target: i64, address: u16, length: usize, check: bool) -> Result<u8, ErrorKind> {
    if check && !(0..=0xFFFF).contains(&target) {
        return Err(ErrorKind::ValueOutOfRange(target));
    }
    let next = i64::from(address) + length as i64;
    let offset = (target - next).rem_euclid(0x10000);
    let offset = if offset >= 0x8000 { offset - 0x10000 } else { offset };
    if check && !(-128..=127).contains(&offset) {
        return Err(ErrorKind::BranchOutOfRange(offset));
    }
    Ok(offset as u8)
}

/// Encode one instruction at `address`
///
/// # Examples
///
/// ```
/// use libz80::assembler::encoder::{encode, EncodeOptions};
/// use libz80::assembler::parser::Arg;
/// use libz80::operand::Reg16;
///
/// let args = [Arg::Reg16(Reg16::Ix), Arg::Imm(Some(0x1234))];
/// assert_eq!(
///     encode("LD", &args, 0, EncodeOptions::default()),
///     Ok(vec![0xDD, 0x21, 0x34, 0x12])
/// );
/// ```
pub fn encode(
    mnemonic: &str,
    args: &[Resolved],
    address: u16,
    options: EncodeOptions,
) -> Result<Vec<u8>, ErrorKind> {
    let mut index = args.iter().filter_map(index_register);
    if let Some(first) = index.next() {
        if index.any(|other| other != first) {
            return Err(ErrorKind::MixedIndexRegisters);
        }
    }

    // The decoder's rendering of unassigned ED opcodes
    if let ("NOP", [Arg::Imm(prefix), Arg::Imm(opcode)]) = (mnemonic, args) {
        let check = options.check_ranges;
        if prefix.map_or(true, |p| p == 0xED) {
            return Ok(vec![0xED, byte(opcode.unwrap_or(0), check)?]);
        }
        return Err(ErrorKind::InvalidOperands(mnemonic.to_string()));
    }

    let aliased;
    let args = match (mnemonic, args) {
        ("IN", [Arg::PortC]) => {
            aliased = [Arg::Reg8(Reg8::F), Arg::PortC];
            &aliased[..]
        }
        _ => args,
    };

    let encoding = select(mnemonic, args, options.extended_opcodes)?;
    emit(encoding, args, address, options.check_ranges)
}

fn emit(
    encoding: &Encoding,
    args: &[Resolved],
    address: u16,
    check: bool,
) -> Result<Vec<u8>, ErrorKind> {
    let length = encoding.length();
    let mut bytes = Vec::with_capacity(length);
    bytes.extend(encoding.prefix);
    match encoding.table {
        OpTable::Main => bytes.push(encoding.opcode),
        OpTable::Extended => bytes.extend([0xED, encoding.opcode]),
        OpTable::Bit if encoding.prefix.is_some() => {
            let d = args
                .iter()
                .find(|arg| matches!(arg, Arg::MemIndexed { .. }))
                .map_or(0, value_of);
            bytes.extend([0xCB, displacement(d, check)?, encoding.opcode]);
            return Ok(bytes);
        }
        OpTable::Bit => bytes.extend([0xCB, encoding.opcode]),
    }

    for (shape, arg) in encoding.operands.iter().zip(args) {
        let value = value_of(arg);
        match shape {
            OperandShape::Imm8 | OperandShape::PortImm8 => bytes.push(byte(value, check)?),
            OperandShape::Imm16 | OperandShape::MemImm16 => {
                bytes.extend(word(value, check)?.to_le_bytes())
            }
            OperandShape::Imm16BigEndian => bytes.extend(word(value, check)?.to_be_bytes()),
            OperandShape::MemIndexed(_) => bytes.push(displacement(value, check)?),
            OperandShape::Relative => bytes.push(relative(value, address, length, check)?),
            _ => {}
        }
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Condition;

    fn imm(value: i64) -> Resolved {
        Arg::Imm(Some(value))
    }

    fn checked(mnemonic: &str, args: &[Resolved], address: u16) -> Result<Vec<u8>, ErrorKind> {
        encode(
            mnemonic,
            args,
            address,
            EncodeOptions {
                extended_opcodes: false,
                check_ranges: true,
            },
        )
    }

    #[test]
    fn test_encode_simple_forms() {
        assert_eq!(checked("NOP", &[], 0), Ok(vec![0x00]));
        assert_eq!(
            checked("LD", &[Arg::Reg8(Reg8::A), imm(0x42)], 0),
            Ok(vec![0x3E, 0x42])
        );
        assert_eq!(
            checked("LD", &[Arg::Reg8(Reg8::A), Arg::Mem(Some(0x5C00))], 0),
            Ok(vec![0x3A, 0x00, 0x5C])
        );
        assert_eq!(
            checked("JP", &[Arg::Condition(Condition::Nz), imm(0x8000)], 0),
            Ok(vec![0xC2, 0x00, 0x80])
        );
    }

    #[test]
    fn test_condition_c_parsed_as_register() {
        assert_eq!(
            checked("JR", &[Arg::Reg8(Reg8::C), imm(0x10)], 0x10),
            Ok(vec![0x38, 0xFE])
        );
        assert_eq!(checked("RET", &[Arg::Reg8(Reg8::C)], 0), Ok(vec![0xD8]));
    }

    #[test]
    fn test_relative_range() {
        assert_eq!(checked("JR", &[imm(0x181)], 0x100), Ok(vec![0x18, 0x7F]));
        assert_eq!(
            checked("JR", &[imm(0x182)], 0x100),
            Err(ErrorKind::BranchOutOfRange(128))
        );
        assert_eq!(checked("DJNZ", &[imm(0x82)], 0x100), Ok(vec![0x10, 0x80]));
        // Distances wrap around the 64K address space
        assert_eq!(checked("JR", &[imm(0x0000)], 0xFFFE), Ok(vec![0x18, 0x00]));
    }

    #[test]
    fn test_indexed_forms() {
        let ix = |d: i64| Arg::MemIndexed {
            base: Reg16::Ix,
            displacement: Some(Some(d)),
        };
        assert_eq!(
            checked("LD", &[ix(5), imm(0x10)], 0),
            Ok(vec![0xDD, 0x36, 0x05, 0x10])
        );
        assert_eq!(
            checked("BIT", &[imm(7), ix(-2)], 0),
            Ok(vec![0xDD, 0xCB, 0xFE, 0x7E])
        );
        assert_eq!(
            checked("INC", &[ix(128)], 0),
            Err(ErrorKind::DisplacementOutOfRange(128))
        );
        assert_eq!(
            checked(
                "JP",
                &[Arg::MemIndexed {
                    base: Reg16::Iy,
                    displacement: None
                }],
                0
            ),
            Ok(vec![0xFD, 0xE9])
        );
        assert_eq!(
            checked("LD", &[Arg::Reg8(Reg8::Ixh), Arg::Reg8(Reg8::Ixl)], 0),
            Ok(vec![0xDD, 0x65])
        );
    }

    #[test]
    fn test_mixed_index_registers_rejected() {
        assert_eq!(
            checked("LD", &[Arg::Reg8(Reg8::Ixh), Arg::Reg8(Reg8::Iyl)], 0),
            Err(ErrorKind::MixedIndexRegisters)
        );
    }

    #[test]
    fn test_aliases_and_pseudo_nop() {
        assert_eq!(checked("IN", &[Arg::PortC], 0), Ok(vec![0xED, 0x70]));
        assert_eq!(checked("NOP", &[imm(0xED), imm(0x01)], 0), Ok(vec![0xED, 0x01]));
        assert_eq!(
            checked("OUT", &[Arg::PortC, imm(0)], 0),
            Ok(vec![0xED, 0x71])
        );
    }

    #[test]
    fn test_unknown_and_invalid() {
        assert_eq!(
            checked("FOO", &[], 0),
            Err(ErrorKind::UnknownMnemonic("FOO".to_string()))
        );
        assert_eq!(
            checked("LD", &[Arg::Reg8(Reg8::A)], 0),
            Err(ErrorKind::InvalidOperands("LD".to_string()))
        );
        assert_eq!(
            checked("LD", &[Arg::Reg8(Reg8::A), imm(300)], 0),
            Err(ErrorKind::ValueOutOfRange(300))
        );
    }

    #[test]
    fn test_extension_toggle() {
        let args = [Arg::Reg8(Reg8::D), Arg::Reg8(Reg8::E)];
        assert_eq!(
            checked("MUL", &args, 0),
            Err(ErrorKind::UnknownMnemonic("MUL".to_string()))
        );
        let on = EncodeOptions {
            extended_opcodes: true,
            check_ranges: true,
        };
        assert_eq!(encode("MUL", &args, 0, on), Ok(vec![0xED, 0x30]));
        assert_eq!(
            encode("PUSH", &[imm(0x1234)], 0, on),
            Ok(vec![0xED, 0x8A, 0x12, 0x34])
        );
    }

    #[test]
    fn test_unknown_values_size_like_known_ones() {
        let loose = EncodeOptions::default();
        assert_eq!(encode("JP", &[Arg::Imm(None)], 0, loose).map(|b| b.len()), Ok(3));
        assert_eq!(encode("RST", &[Arg::Imm(None)], 0, loose).map(|b| b.len()), Ok(1));
        assert_eq!(encode("JR", &[Arg::Imm(Some(0x9000))], 0, loose).map(|b| b.len()), Ok(2));
    }
}
