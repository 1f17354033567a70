//! Assembly source parser
//!
//! Splits a tokenized line into label, operation and operand groups, and
//! classifies instruction operands into register, condition, memory and
//! immediate forms.

use crate::assembler::expression::{parse_expression, Expr};
use crate::assembler::lexer::{Token, TokenType};
use crate::opcodes::instruction_set;
use crate::operand::{Condition, Reg16, Reg8};

/// Directive names, including aliases
pub const DIRECTIVES: &[&str] = &[
    "ORG", "EQU", "SET", "DEFL", "DB", "DEFB", "DEFM", "DW", "DEFW", "DZ", "DS", "DEFS",
    "INCLUDE", "IF", "IFDEF", "IFNDEF", "ELSE", "ENDIF", "END",
];

/// True if `name` is an instruction mnemonic or a directive
pub fn is_keyword(name: &str) -> bool {
    DIRECTIVES.contains(&name) || instruction_set().is_mnemonic(name)
}

/// True if `name` is a register or condition and cannot name a symbol
pub fn is_reserved(name: &str) -> bool {
    Reg8::from_name(name).is_some()
        || Reg16::from_name(name).is_some()
        || Condition::from_name(name).is_some()
}

/// A parsed line of assembly source
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Statement {
    /// Symbol defined by this line (e.g., "START" from "START:")
    pub label: Option<String>,

    /// Mnemonic or directive, uppercase
    pub operation: Option<String>,

    /// Operand token groups, split at top-level commas
    pub operands: Vec<Vec<Token>>,
}

fn identifier(token: Option<&Token>) -> Option<&str> {
    match token.map(|t| &t.token_type) {
        Some(TokenType::Identifier(name)) => Some(name),
        _ => None,
    }
}

/// Split one tokenized line into a [`Statement`]
///
/// A label is recognized as `NAME:`, as a non-keyword identifier in column 0,
/// or as the name in front of `EQU`, `SET` or `DEFL`.
pub fn parse_statement(tokens: &[Token]) -> Result<Statement, String> {
    let mut statement = Statement::default();
    let mut rest = tokens;

    if let Some(name) = identifier(rest.first()) {
        let colon = matches!(rest.get(1).map(|t| &t.token_type), Some(TokenType::Colon));
        let assignment = matches!(identifier(rest.get(1)), Some("EQU" | "SET" | "DEFL"));
        let leading = rest[0].column == 0 && !is_keyword(name);
        if colon || assignment || leading {
            statement.label = Some(name.to_string());
            rest = &rest[if colon { 2 } else { 1 }..];
        }
    }

    let Some(first) = rest.first() else {
        return Ok(statement);
    };
    match &first.token_type {
        TokenType::Identifier(name) => statement.operation = Some(name.clone()),
        other => {
            return Err(format!(
                "expected mnemonic or directive at column {}, found {:?}",
                first.column, other
            ))
        }
    }

    statement.operands = split_operands(&rest[1..])?;
    Ok(statement)
}

fn split_operands(tokens: &[Token]) -> Result<Vec<Vec<Token>>, String> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut groups = vec![Vec::new()];
    let mut depth = 0usize;
    for token in tokens {
        match token.token_type {
            TokenType::LParen => depth += 1,
            TokenType::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced ')' at column {}", token.column))?
            }
            TokenType::Comma if depth == 0 => {
                groups.push(Vec::new());
                continue;
            }
            _ => {}
        }
        if let Some(group) = groups.last_mut() {
            group.push(token.clone());
        }
    }

    if depth != 0 {
        return Err("unbalanced '('".to_string());
    }
    if groups.iter().any(Vec::is_empty) {
        return Err("empty operand".to_string());
    }
    Ok(groups)
}

/// Classified instruction operand, generic over its value payload.
///
/// The parser produces `Arg<Expr>`; the assembler evaluates the expressions
/// into `Arg<Option<i64>>` before encoding, `None` meaning "not known yet".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg<V> {
    Reg8(Reg8),
    Reg16(Reg16),
    /// Any condition but `C`, which parses as the register
    Condition(Condition),
    /// `(BC)`, `(DE)`, `(HL)`, `(SP)`
    MemReg16(Reg16),
    /// `(IX+d)`; no displacement for a bare `(IX)`
    MemIndexed {
        base: Reg16,
        displacement: Option<V>,
    },
    /// `(C)`
    PortC,
    /// `(expr)`: memory address or port
    Mem(V),
    Imm(V),
}

impl<V> Arg<V> {
    /// Convert the value payloads, keeping the classification
    pub fn try_map<W, E>(&self, mut f: impl FnMut(&V) -> Result<W, E>) -> Result<Arg<W>, E> {
        let arg = match self {
            Arg::Reg8(r) => Arg::Reg8(*r),
            Arg::Reg16(r) => Arg::Reg16(*r),
            Arg::Condition(c) => Arg::Condition(*c),
            Arg::MemReg16(r) => Arg::MemReg16(*r),
            Arg::MemIndexed { base, displacement } => Arg::MemIndexed {
                base: *base,
                displacement: displacement.as_ref().map(&mut f).transpose()?,
            },
            Arg::PortC => Arg::PortC,
            Arg::Mem(v) => Arg::Mem(f(v)?),
            Arg::Imm(v) => Arg::Imm(f(v)?),
        };
        Ok(arg)
    }
}

/// True if the `(` at `tokens[0]` is closed by the last token
fn fully_parenthesized(tokens: &[Token]) -> bool {
    if tokens.len() < 2 || tokens[0].token_type != TokenType::LParen {
        return false;
    }
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate() {
        match token.token_type {
            TokenType::LParen => depth += 1,
            TokenType::RParen => {
                depth -= 1;
                if depth == 0 {
                    return index == tokens.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Classify one instruction operand
///
/// ```
/// use libz80::assembler::lexer::tokenize;
/// use libz80::assembler::parser::{parse_arg, Arg};
/// use libz80::operand::Reg16;
///
/// let arg = parse_arg(&tokenize("(IX-2)").unwrap()).unwrap();
/// assert!(matches!(arg, Arg::MemIndexed { base: Reg16::Ix, displacement: Some(_) }));
///
/// // Parentheses inside an expression do not make a memory operand
/// let arg = parse_arg(&tokenize("(1+2)*3").unwrap()).unwrap();
/// assert!(matches!(arg, Arg::Imm(_)));
/// ```
pub fn parse_arg(tokens: &[Token]) -> Result<Arg<Expr>, String> {
    if let [token] = tokens {
        if let TokenType::Identifier(name) = &token.token_type {
            if let Some(reg) = Reg8::from_name(name) {
                return Ok(Arg::Reg8(reg));
            }
            if let Some(reg) = Reg16::from_name(name) {
                return Ok(Arg::Reg16(reg));
            }
            if let Some(condition) = Condition::from_name(name) {
                return Ok(Arg::Condition(condition));
            }
        }
    }

    if !fully_parenthesized(tokens) {
        return parse_expression(tokens).map(Arg::Imm);
    }

    let inner = &tokens[1..tokens.len() - 1];
    let register = identifier(inner.first());
    match (register, inner.len()) {
        (Some("C"), 1) => return Ok(Arg::PortC),
        (Some(name), 1) => {
            if let Some(reg) = Reg16::from_name(name) {
                return Ok(if reg.is_index() {
                    Arg::MemIndexed {
                        base: reg,
                        displacement: None,
                    }
                } else {
                    Arg::MemReg16(reg)
                });
            }
        }
        (Some(name @ ("IX" | "IY")), _)
            if matches!(
                inner[1].token_type,
                TokenType::Plus | TokenType::Minus
            ) =>
        {
            let base = Reg16::from_name(name).ok_or_else(|| format!("bad index `{}`", name))?;
            return Ok(Arg::MemIndexed {
                base,
                displacement: Some(parse_expression(&inner[1..])?),
            });
        }
        _ => {}
    }

    if let Some(name) = register.filter(|name| is_reserved(name)) {
        return Err(format!("register `{}` cannot be used in an address", name));
    }
    parse_expression(inner).map(Arg::Mem)
}

/// One item of a data directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataItem {
    /// A quoted string, one byte per character
    Text(String),
    Expr(Expr),
}

/// Parse the operand of `DB`, `DW` or `DZ`
pub fn parse_data_item(tokens: &[Token]) -> Result<DataItem, String> {
    match tokens {
        [Token {
            token_type: TokenType::Str(text),
            ..
        }] => Ok(DataItem::Text(text.clone())),
        _ => parse_expression(tokens).map(DataItem::Expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::lexer::tokenize;

    fn statement(line: &str) -> Statement {
        parse_statement(&tokenize(line).unwrap()).unwrap()
    }

    fn arg(text: &str) -> Arg<Expr> {
        parse_arg(&tokenize(text).unwrap()).unwrap()
    }

    #[test]
    fn test_label_forms() {
        let s = statement("START: LD A,1");
        assert_eq!(s.label.as_deref(), Some("START"));
        assert_eq!(s.operation.as_deref(), Some("LD"));
        assert_eq!(s.operands.len(), 2);

        let s = statement("loop djnz loop");
        assert_eq!(s.label.as_deref(), Some("LOOP"));
        assert_eq!(s.operation.as_deref(), Some("DJNZ"));

        let s = statement("  COUNT EQU 5");
        assert_eq!(s.label.as_deref(), Some("COUNT"));
        assert_eq!(s.operation.as_deref(), Some("EQU"));

        let s = statement("NOP");
        assert_eq!(s.label, None);
        assert_eq!(s.operation.as_deref(), Some("NOP"));

        let s = statement("ONLY:");
        assert_eq!(s.label.as_deref(), Some("ONLY"));
        assert_eq!(s.operation, None);
    }

    #[test]
    fn test_operand_split_respects_parentheses() {
        let s = statement(" LD (IX+(2,3)),A");
        assert_eq!(s.operands.len(), 2);
        assert!(parse_statement(&tokenize(" DB 1,,2").unwrap()).is_err());
        assert!(parse_statement(&tokenize(" LD A,(1").unwrap()).is_err());
        assert!(parse_statement(&tokenize(" 5").unwrap()).is_err());
    }

    #[test]
    fn test_register_and_condition_args() {
        assert_eq!(arg("a"), Arg::Reg8(Reg8::A));
        assert_eq!(arg("IXH"), Arg::Reg8(Reg8::Ixh));
        assert_eq!(arg("AF'"), Arg::Reg16(Reg16::AfAlt));
        assert_eq!(arg("NZ"), Arg::Condition(Condition::Nz));
        assert_eq!(arg("C"), Arg::Reg8(Reg8::C));
    }

    #[test]
    fn test_memory_args() {
        assert_eq!(arg("(HL)"), Arg::MemReg16(Reg16::Hl));
        assert_eq!(arg("(C)"), Arg::PortC);
        assert_eq!(
            arg("(IY)"),
            Arg::MemIndexed {
                base: Reg16::Iy,
                displacement: None
            }
        );
        assert_eq!(arg("($5C00)"), Arg::Mem(Expr::Number(0x5C00)));
        assert!(matches!(arg("(IX+LEN-1)"), Arg::MemIndexed { base: Reg16::Ix, .. }));
        assert!(parse_arg(&tokenize("(HL+1)").unwrap()).is_err());
    }

    #[test]
    fn test_immediate_args() {
        assert_eq!(arg("'A'"), Arg::Imm(Expr::Number(65)));
        assert_eq!(arg("\"B\""), Arg::Imm(Expr::Number(66)));
        assert_eq!(arg("TABLE"), Arg::Imm(Expr::Symbol("TABLE".to_string())));
    }

    #[test]
    fn test_try_map_keeps_shape() {
        let mapped: Result<Arg<i64>, ()> = arg("(IX+3)").try_map(|_| Ok(3));
        assert_eq!(
            mapped,
            Ok(Arg::MemIndexed {
                base: Reg16::Ix,
                displacement: Some(3)
            })
        );
    }

    #[test]
    fn test_data_items() {
        let tokens = tokenize("\"Hello\"").unwrap();
        assert_eq!(
            parse_data_item(&tokens),
            Ok(DataItem::Text("Hello".to_string()))
        );
        let tokens = tokenize("1+1").unwrap();
        assert!(matches!(parse_data_item(&tokens), Ok(DataItem::Expr(_))));
    }
}
