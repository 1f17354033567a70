//! Formatting functions for decoded lines
//!
//! The text produced here is the assembler's canonical syntax: feeding a
//! formatted line back through the assembler reproduces the same bytes.

use std::fmt;

use crate::disassembler::CodeLine;
use crate::operand::Operand;

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg8(reg) => f.write_str(reg.name()),
            Operand::Reg16(reg) => f.write_str(reg.name()),
            Operand::Imm8(value) => write!(f, "${:02X}", value),
            Operand::Imm16 {
                label: Some(label), ..
            } => f.write_str(label),
            Operand::Imm16 { value, .. } => write!(f, "${:04X}", value),
            Operand::MemReg16(reg) => write!(f, "({})", reg.name()),
            Operand::MemImm16 {
                label: Some(label), ..
            } => write!(f, "({})", label),
            Operand::MemImm16 { address, .. } => write!(f, "(${:04X})", address),
            Operand::MemIndexed { base, displacement } => {
                let sign = if *displacement < 0 { '-' } else { '+' };
                write!(
                    f,
                    "({}{}${:02X})",
                    base.name(),
                    sign,
                    displacement.unsigned_abs()
                )
            }
            Operand::Condition(condition) => f.write_str(condition.name()),
            Operand::PortImm8(port) => write!(f, "(${:02X})", port),
            Operand::PortC => f.write_str("(C)"),
            Operand::Text(text) => f.write_str(&format_text(text)),
        }
    }
}

/// Render text as quoted runs, with unprintable characters and quotes as `$xx` bytes
fn format_text(text: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut run = String::new();
    for ch in text.chars() {
        if (' '..='~').contains(&ch) && ch != '"' {
            run.push(ch);
            continue;
        }
        if !run.is_empty() {
            parts.push(format!("\"{}\"", run));
            run.clear();
        }
        parts.push(format!("${:02X}", u32::from(ch) & 0xFF));
    }
    if !run.is_empty() || parts.is_empty() {
        parts.push(format!("\"{}\"", run));
    }
    parts.join(",")
}

/// Small numbers baked into an opcode read better in decimal: `BIT 7,(HL)`, `IM 1`
fn is_opcode_number(line: &CodeLine, index: usize) -> bool {
    match line.mnemonic {
        "BIT" | "SET" | "RES" | "IM" => index == 0,
        "OUT" => index == 1,
        _ => false,
    }
}

impl fmt::Display for CodeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)?;
        for (index, operand) in self.operands.iter().enumerate() {
            f.write_str(if index == 0 { " " } else { "," })?;
            match operand {
                Operand::Imm8(value) if is_opcode_number(self, index) => write!(f, "{}", value)?,
                operand => write!(f, "{}", operand)?,
            }
        }
        Ok(())
    }
}

/// Format a single line as assembly text, without address or label
pub fn format_instruction(line: &CodeLine) -> String {
    line.to_string()
}

/// Format a listing row: address, encoded bytes, optional label, then the text
///
/// ```
/// use libz80::disassembler::{disassemble, formatter::format_listing_line, DisassemblyOptions};
///
/// let mut lines = disassemble(&[0x3E, 0x01], DisassemblyOptions { start_address: 0x8000, ..Default::default() });
/// lines[0].label = Some("START".to_string());
/// assert_eq!(format_listing_line(&lines[0]), "8000  3E 01        START: LD A,$01");
/// ```
pub fn format_listing_line(line: &CodeLine) -> String {
    let bytes = line
        .bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    let label = line
        .label
        .as_deref()
        .map(|name| format!("{}: ", name))
        .unwrap_or_default();
    format!("{:04X}  {:<13}{}{}", line.address, bytes, label, line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::directives::{parse_ds, parse_dz};
    use crate::disassembler::{disassemble, DisassemblyOptions};
    use crate::memory::FlatMemory;
    use crate::operand::Reg16;

    fn text(bytes: &[u8]) -> Vec<String> {
        disassemble(bytes, DisassemblyOptions::default())
            .iter()
            .map(format_instruction)
            .collect()
    }

    #[test]
    fn test_format_registers_and_immediates() {
        assert_eq!(
            text(&[0x21, 0x00, 0x80, 0x08, 0xD3, 0xFE, 0xED, 0x78]),
            vec!["LD HL,$8000", "EX AF,AF'", "OUT ($FE),A", "IN A,(C)"]
        );
    }

    #[test]
    fn test_format_indexed_displacement_sign() {
        let plus = Operand::MemIndexed {
            base: Reg16::Ix,
            displacement: 5,
        };
        let minus = Operand::MemIndexed {
            base: Reg16::Iy,
            displacement: -128,
        };

        assert_eq!(plus.to_string(), "(IX+$05)");
        assert_eq!(minus.to_string(), "(IY-$80)");
    }

    #[test]
    fn test_format_opcode_numbers_in_decimal() {
        assert_eq!(
            text(&[0xCB, 0x7E, 0xED, 0x56, 0xED, 0x71, 0xFF]),
            vec!["BIT 7,(HL)", "IM 1", "OUT (C),0", "RST $38"]
        );
    }

    #[test]
    fn test_format_label_replaces_address() {
        let op = Operand::MemImm16 {
            address: 0x5C00,
            label: Some("VARS".to_string()),
        };
        assert_eq!(op.to_string(), "(VARS)");
    }

    #[test]
    fn test_format_pseudo_nop() {
        assert_eq!(text(&[0xED, 0x01]), vec!["NOP $ED,$01"]);
    }

    #[test]
    fn test_format_text_directives() {
        let memory = FlatMemory::from_bytes(0, b"HI\"\r\0");
        assert_eq!(parse_dz(&memory, 0, 10).to_string(), "DZ \"HI\",$22,$0D");

        let memory = FlatMemory::from_bytes(0, &[0xAA; 4]);
        assert_eq!(parse_ds(&memory, 0, 4).to_string(), "DS $0004,$AA");
    }

    #[test]
    fn test_format_listing_line_without_label() {
        let lines = disassemble(&[0xC9], DisassemblyOptions::default());
        assert_eq!(format_listing_line(&lines[0]), "0000  C9           RET");
    }
}
