//! Expressions in operands and directives
//!
//! Parsing uses precedence climbing over the token slice of one operand.
//! Evaluation yields `Ok(None)` when a referenced symbol has no value yet, so
//! the first pass can size instructions before forward references are known.

use thiserror::Error;

use crate::assembler::lexer::{Token, TokenStream, TokenType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Negate,
    Not,
    Complement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    fn from_token(token_type: &TokenType) -> Option<(Self, u8)> {
        let op = match token_type {
            TokenType::OrOr => (BinaryOp::LogicalOr, 1),
            TokenType::AndAnd => (BinaryOp::LogicalAnd, 2),
            TokenType::Pipe => (BinaryOp::Or, 3),
            TokenType::Caret => (BinaryOp::Xor, 4),
            TokenType::Amp => (BinaryOp::And, 5),
            TokenType::EqEq => (BinaryOp::Eq, 6),
            TokenType::Ne => (BinaryOp::Ne, 6),
            TokenType::Lt => (BinaryOp::Lt, 7),
            TokenType::Le => (BinaryOp::Le, 7),
            TokenType::Gt => (BinaryOp::Gt, 7),
            TokenType::Ge => (BinaryOp::Ge, 7),
            TokenType::Shl => (BinaryOp::Shl, 8),
            TokenType::Shr => (BinaryOp::Shr, 8),
            TokenType::Plus => (BinaryOp::Add, 9),
            TokenType::Minus => (BinaryOp::Sub, 9),
            TokenType::Star => (BinaryOp::Mul, 10),
            TokenType::Slash => (BinaryOp::Div, 10),
            TokenType::Percent => (BinaryOp::Mod, 10),
            _ => return None,
        };
        Some(op)
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    Symbol(String),
    /// `$`, the address of the current line
    Here,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    High(Box<Expr>),
    Low(Box<Expr>),
}

/// Evaluation failures that no later pass can fix
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("symbol `{0}` is defined in terms of itself")]
    Cyclic(String),

    #[error("undefined symbol `{0}`")]
    Undefined(String),
}

/// Symbol values and the current address for evaluation
pub trait Scope {
    /// Address of the line being evaluated
    fn here(&self) -> i64;

    /// Value of `name`; `Ok(None)` while it is not known yet
    fn symbol(&mut self, name: &str) -> Result<Option<i64>, ExprError>;
}

impl Expr {
    /// Evaluate against `scope`, `Ok(None)` if any symbol is still unknown
    pub fn eval(&self, scope: &mut dyn Scope) -> Result<Option<i64>, ExprError> {
        let value = match self {
            Expr::Number(n) => *n,
            Expr::Here => scope.here(),
            Expr::Symbol(name) => return scope.symbol(name),
            Expr::High(inner) => match inner.eval(scope)? {
                Some(v) => (v >> 8) & 0xFF,
                None => return Ok(None),
            },
            Expr::Low(inner) => match inner.eval(scope)? {
                Some(v) => v & 0xFF,
                None => return Ok(None),
            },
            Expr::Unary(op, inner) => {
                let Some(v) = inner.eval(scope)? else {
                    return Ok(None);
                };
                match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Negate => v.wrapping_neg(),
                    UnaryOp::Not => i64::from(v == 0),
                    UnaryOp::Complement => !v,
                }
            }
            Expr::Binary(op, left, right) => {
                let left = left.eval(scope)?;
                let right = right.eval(scope)?;
                let (Some(a), Some(b)) = (left, right) else {
                    return Ok(None);
                };
                apply(*op, a, b)?
            }
        };
        Ok(Some(value))
    }

    /// Every symbol name the expression references
    pub fn symbols(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_symbols(&mut names);
        names
    }

    fn collect_symbols<'e>(&'e self, names: &mut Vec<&'e str>) {
        match self {
            Expr::Symbol(name) => names.push(name),
            Expr::Unary(_, inner) | Expr::High(inner) | Expr::Low(inner) => {
                inner.collect_symbols(names)
            }
            Expr::Binary(_, left, right) => {
                left.collect_symbols(names);
                right.collect_symbols(names);
            }
            Expr::Number(_) | Expr::Here => {}
        }
    }
}

fn apply(op: BinaryOp, a: i64, b: i64) -> Result<i64, ExprError> {
    let shift = |b: i64| b.clamp(0, 63) as u32;
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b == 0 => return Err(ExprError::DivisionByZero),
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Mod if b == 0 => return Err(ExprError::DivisionByZero),
        BinaryOp::Mod => a.wrapping_rem(b),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(shift(b)),
        BinaryOp::Shr => a.wrapping_shr(shift(b)),
        BinaryOp::Lt => i64::from(a < b),
        BinaryOp::Le => i64::from(a <= b),
        BinaryOp::Gt => i64::from(a > b),
        BinaryOp::Ge => i64::from(a >= b),
        BinaryOp::Eq => i64::from(a == b),
        BinaryOp::Ne => i64::from(a != b),
        BinaryOp::LogicalAnd => i64::from(a != 0 && b != 0),
        BinaryOp::LogicalOr => i64::from(a != 0 || b != 0),
    };
    Ok(value)
}

/// Parse a whole token slice as one expression
///
/// ```
/// use libz80::assembler::expression::{parse_expression, Expr, Scope, ExprError};
/// use libz80::assembler::lexer::tokenize;
///
/// struct Fixed;
/// impl Scope for Fixed {
///     fn here(&self) -> i64 { 0x8000 }
///     fn symbol(&mut self, _: &str) -> Result<Option<i64>, ExprError> { Ok(None) }
/// }
///
/// let expr = parse_expression(&tokenize("HIGH($ + 2 * 0x80)").unwrap()).unwrap();
/// assert_eq!(expr.eval(&mut Fixed), Ok(Some(0x81)));
/// ```
pub fn parse_expression(tokens: &[Token]) -> Result<Expr, String> {
    let mut stream = TokenStream::new(tokens);
    if stream.is_eof() {
        return Err("missing expression".to_string());
    }
    let expr = parse_binary(&mut stream, 1)?;
    match stream.peek() {
        None => Ok(expr),
        Some(token) => Err(format!(
            "unexpected {:?} at column {}",
            token.token_type, token.column
        )),
    }
}

fn parse_binary(stream: &mut TokenStream<'_>, min_precedence: u8) -> Result<Expr, String> {
    let mut left = parse_unary(stream)?;
    while let Some((op, precedence)) = stream
        .peek()
        .and_then(|token| BinaryOp::from_token(&token.token_type))
    {
        if precedence < min_precedence {
            break;
        }
        stream.advance();
        let right = parse_binary(stream, precedence + 1)?;
        left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_unary(stream: &mut TokenStream<'_>) -> Result<Expr, String> {
    let op = match stream.peek().map(|t| &t.token_type) {
        Some(TokenType::Plus) => UnaryOp::Plus,
        Some(TokenType::Minus) => UnaryOp::Negate,
        Some(TokenType::Bang) => UnaryOp::Not,
        Some(TokenType::Tilde) => UnaryOp::Complement,
        _ => return parse_primary(stream),
    };
    stream.advance();
    Ok(Expr::Unary(op, Box::new(parse_unary(stream)?)))
}

fn parse_primary(stream: &mut TokenStream<'_>) -> Result<Expr, String> {
    let column = stream.current_column();
    let Some(token) = stream.consume() else {
        return Err(format!("missing operand at column {}", column));
    };

    match &token.token_type {
        TokenType::Number(n) => Ok(Expr::Number(*n)),
        TokenType::Dollar => Ok(Expr::Here),
        TokenType::Str(text) if text.chars().count() == 1 => {
            Ok(Expr::Number(text.chars().next().map_or(0, |c| c as i64)))
        }
        TokenType::Identifier(name)
            if (name == "HIGH" || name == "LOW")
                && matches!(stream.peek().map(|t| &t.token_type), Some(TokenType::LParen)) =>
        {
            stream.advance();
            let inner = Box::new(parse_binary(stream, 1)?);
            expect_close(stream)?;
            Ok(if name == "HIGH" {
                Expr::High(inner)
            } else {
                Expr::Low(inner)
            })
        }
        TokenType::Identifier(name) => Ok(Expr::Symbol(name.clone())),
        TokenType::LParen => {
            let inner = parse_binary(stream, 1)?;
            expect_close(stream)?;
            Ok(inner)
        }
        other => Err(format!("unexpected {:?} at column {}", other, token.column)),
    }
}

fn expect_close(stream: &mut TokenStream<'_>) -> Result<(), String> {
    match stream.consume() {
        Some(Token {
            token_type: TokenType::RParen,
            ..
        }) => Ok(()),
        _ => Err(format!("expected ')' at column {}", stream.current_column())),
    }
}
