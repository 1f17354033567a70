//! Lexical analysis for Z80 assembly source
//!
//! This module provides the first phase of assembly: converting source text into
//! a stream of typed tokens. The lexer separates character-level concerns (what is
//! a number? where does a comment start?) from syntactic analysis (is this a valid
//! instruction?).
//!
//! # Architecture
//!
//! Source is processed in three steps:
//!
//! 1. **Comment stripping** ([`strip_comments`]): removes `;` line comments and
//!    `/* ... */` block comments from a whole unit, keeping line numbers intact
//! 2. **Tokenization** ([`tokenize`]): converts one line into a [`Token`] vector
//! 3. **Consumption** ([`TokenStream`]): the expression parser navigates tokens
//!    with lookahead
//!
//! ## Separation of Concerns
//!
//! **Lexer responsibilities:**
//! - Recognize token boundaries and classify tokens ([`TokenType`])
//! - Parse numeric literals in every supported notation to `i64`
//! - Uppercase identifiers (strings keep their case)
//! - Decide context-sensitive characters: `%` is a binary prefix or modulo,
//!   `$` is a hex prefix or the current address, `'` is a character literal
//!   or the tail of `AF'`
//!
//! **Parser responsibilities** (see [`parser`](super::parser)):
//! - Find the label, the operation and the operand groups of a line
//! - Classify operands and build expressions
//!
//! # Examples
//!
//! ```
//! use libz80::assembler::lexer::{tokenize, TokenType};
//!
//! let tokens = tokenize("ld a,($FF + 0x10)").unwrap();
//!
//! assert_eq!(tokens[0].token_type, TokenType::Identifier("LD".to_string()));
//! assert_eq!(tokens[3].token_type, TokenType::LParen);
//! assert_eq!(tokens[4].token_type, TokenType::Number(0xFF));
//! assert_eq!(tokens[6].token_type, TokenType::Number(0x10));
//! ```
//!
//! ## Number Notations
//!
//! ```
//! use libz80::assembler::lexer::parse_number;
//!
//! assert_eq!(parse_number("0FFh"), Some(255));
//! assert_eq!(parse_number("0x1F"), Some(31));
//! assert_eq!(parse_number("1010b"), Some(10));
//! assert_eq!(parse_number("0b1010"), Some(10));
//! assert_eq!(parse_number("42"), Some(42));
//! ```

use thiserror::Error;

/// Errors found while tokenizing a line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    #[error("invalid number `{text}` at column {column}")]
    InvalidNumber { text: String, column: usize },

    #[error("unterminated string at column {column}")]
    UnterminatedString { column: usize },

    #[error("unterminated character literal at column {column}")]
    UnterminatedCharacter { column: usize },

    #[error("unexpected character '{ch}' at column {column}")]
    UnexpectedCharacter { ch: char, column: usize },
}

/// Classification of lexical tokens in Z80 assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenType {
    /// Mnemonics, directives, registers, symbols (uppercase normalized);
    /// includes the shadow pair `AF'`
    Identifier(String),
    /// Any numeric or character literal, already evaluated
    Number(i64),
    /// Double-quoted string, case preserved
    Str(String),
    /// `$` on its own: the address of the current line
    Dollar,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    /// `==` (a single `=` lexes the same)
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    LParen,
    RParen,
    Comma,
    Colon,
}

impl TokenType {
    /// True if a value ends with this token, so a following `%` is modulo
    fn ends_value(&self) -> bool {
        matches!(
            self,
            TokenType::Identifier(_)
                | TokenType::Number(_)
                | TokenType::Str(_)
                | TokenType::Dollar
                | TokenType::RParen
        )
    }
}

/// A single lexical token with type and source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token classification and optional parsed value
    pub token_type: TokenType,

    /// Column offset within line (0-indexed)
    pub column: usize,

    /// Character span (for error highlighting)
    pub length: usize,
}

/// Parse a numeric literal without sign: decimal, `0x` hex, `h`-suffixed hex,
/// `0b` binary or `b`-suffixed binary. `$` and `%` prefixes are handled by the
/// lexer before this is called.
pub fn parse_number(text: &str) -> Option<i64> {
    let lower = text.to_ascii_lowercase();
    let binary = |digits: &str| {
        if !digits.is_empty() && digits.chars().all(|c| c == '0' || c == '1') {
            i64::from_str_radix(digits, 2).ok()
        } else {
            None
        }
    };

    if let Some(hex) = lower.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = lower.strip_suffix('h') {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(value) = lower.strip_prefix("0b").and_then(binary) {
        return Some(value);
    }
    if let Some(value) = lower.strip_suffix('b').and_then(binary) {
        return Some(value);
    }
    lower.parse::<i64>().ok()
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '.'
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
}

/// Lexer state for converting one line of source text into tokens
pub struct Lexer<'a> {
    /// Reference to original source text (lifetime-bound)
    source: &'a str,

    /// Iterator over (byte_offset, char) pairs
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,

    /// Current character being examined
    current: Option<(usize, char)>,

    /// Type of the previous token, for context-sensitive characters
    last: Option<TokenType>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source line
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.char_indices().peekable();
        let current = chars.next();
        Lexer {
            source,
            chars,
            current,
            last: None,
        }
    }

    /// Advance to the next character in the source
    fn advance(&mut self) {
        self.current = self.chars.next();
    }

    /// Peek at the current character without consuming it
    fn peek(&self) -> Option<char> {
        self.current.map(|(_, ch)| ch)
    }

    /// Peek one character past the current one
    fn peek_next(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, ch)| ch)
    }

    /// Calculate the current column offset (0-indexed)
    fn column(&self) -> usize {
        match self.current {
            Some((pos, _)) => pos,
            None => self.source.len(),
        }
    }

    /// Collect characters while `accept` holds
    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if !accept(ch) {
                break;
            }
            text.push(ch);
            self.advance();
        }
        text
    }

    /// Scan an identifier (uppercase normalized); `AF'` is one token
    fn scan_identifier(&mut self, start_col: usize) -> Token {
        let mut identifier = self.take_while(is_identifier_char).to_ascii_uppercase();
        if identifier == "AF" && self.peek() == Some('\'') {
            self.advance();
            identifier.push('\'');
        }

        Token {
            length: identifier.len(),
            token_type: TokenType::Identifier(identifier),
            column: start_col,
        }
    }

    /// Scan a number starting with a digit
    fn scan_number(&mut self, start_col: usize) -> Result<Token, LexerError> {
        let text = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let value = parse_number(&text).ok_or_else(|| LexerError::InvalidNumber {
            text: text.clone(),
            column: start_col,
        })?;

        Ok(Token {
            token_type: TokenType::Number(value),
            column: start_col,
            length: text.len(),
        })
    }

    /// Scan digits after a `$` or `%` prefix (already consumed)
    fn scan_prefixed_number(&mut self, start_col: usize, radix: u32) -> Result<Token, LexerError> {
        let digits = self.take_while(|c| c.is_ascii_alphanumeric());
        let value = i64::from_str_radix(&digits, radix).map_err(|_| LexerError::InvalidNumber {
            text: digits.clone(),
            column: start_col,
        })?;

        Ok(Token {
            token_type: TokenType::Number(value),
            column: start_col,
            length: digits.len() + 1,
        })
    }

    /// Scan a double-quoted string (opening quote already consumed)
    fn scan_string(&mut self, start_col: usize) -> Result<Token, LexerError> {
        let text = self.take_while(|c| c != '"');
        if self.peek() != Some('"') {
            return Err(LexerError::UnterminatedString { column: start_col });
        }
        self.advance();

        Ok(Token {
            length: text.len() + 2,
            token_type: TokenType::Str(text),
            column: start_col,
        })
    }

    /// Scan a character literal `'x'` (opening quote already consumed)
    fn scan_character(&mut self, start_col: usize) -> Result<Token, LexerError> {
        let ch = self
            .peek()
            .ok_or(LexerError::UnterminatedCharacter { column: start_col })?;
        self.advance();
        if self.peek() != Some('\'') {
            return Err(LexerError::UnterminatedCharacter { column: start_col });
        }
        self.advance();

        Ok(Token {
            token_type: TokenType::Number(ch as i64),
            column: start_col,
            length: 3,
        })
    }

    /// One- or two-character operator, with the first character already consumed
    fn scan_operator(&mut self, first: char, start_col: usize) -> Result<Token, LexerError> {
        let second = self.peek();
        let (token_type, length) = match (first, second) {
            ('<', Some('<')) => (TokenType::Shl, 2),
            ('>', Some('>')) => (TokenType::Shr, 2),
            ('<', Some('=')) => (TokenType::Le, 2),
            ('>', Some('=')) => (TokenType::Ge, 2),
            ('=', Some('=')) => (TokenType::EqEq, 2),
            ('!', Some('=')) => (TokenType::Ne, 2),
            ('<', Some('>')) => (TokenType::Ne, 2),
            ('&', Some('&')) => (TokenType::AndAnd, 2),
            ('|', Some('|')) => (TokenType::OrOr, 2),
            ('<', _) => (TokenType::Lt, 1),
            ('>', _) => (TokenType::Gt, 1),
            ('=', _) => (TokenType::EqEq, 1),
            ('!', _) => (TokenType::Bang, 1),
            ('&', _) => (TokenType::Amp, 1),
            ('|', _) => (TokenType::Pipe, 1),
            ('+', _) => (TokenType::Plus, 1),
            ('-', _) => (TokenType::Minus, 1),
            ('*', _) => (TokenType::Star, 1),
            ('/', _) => (TokenType::Slash, 1),
            ('%', _) => (TokenType::Percent, 1),
            ('^', _) => (TokenType::Caret, 1),
            ('~', _) => (TokenType::Tilde, 1),
            ('(', _) => (TokenType::LParen, 1),
            (')', _) => (TokenType::RParen, 1),
            (',', _) => (TokenType::Comma, 1),
            (':', _) => (TokenType::Colon, 1),
            (ch, _) => {
                return Err(LexerError::UnexpectedCharacter {
                    ch,
                    column: start_col,
                })
            }
        };
        if length == 2 {
            self.advance();
        }

        Ok(Token {
            token_type,
            column: start_col,
            length,
        })
    }

    /// Get the next token from the source
    fn next_token(&mut self) -> Result<Option<Token>, LexerError> {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.advance();
        }
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let start_col = self.column();
        let after_value = self.last.as_ref().is_some_and(TokenType::ends_value);

        let token = match ch {
            '$' => {
                self.advance();
                if self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                    self.scan_prefixed_number(start_col, 16)?
                } else {
                    Token {
                        token_type: TokenType::Dollar,
                        column: start_col,
                        length: 1,
                    }
                }
            }
            '%' if !after_value && matches!(self.peek_next(), Some('0' | '1')) => {
                self.advance();
                self.scan_prefixed_number(start_col, 2)?
            }
            '"' => {
                self.advance();
                self.scan_string(start_col)?
            }
            '\'' => {
                self.advance();
                self.scan_character(start_col)?
            }
            '0'..='9' => self.scan_number(start_col)?,
            ch if is_identifier_start(ch) => self.scan_identifier(start_col),
            ch => {
                self.advance();
                self.scan_operator(ch, start_col)?
            }
        };

        self.last = Some(token.token_type.clone());
        Ok(Some(token))
    }
}

/// Tokenize one comment-free line of assembly source
///
/// # Examples
/// ```
/// use libz80::assembler::lexer::{tokenize, TokenType};
///
/// let tokens = tokenize("EX AF,AF'").unwrap();
/// assert_eq!(tokens[3].token_type, TokenType::Identifier("AF'".to_string()));
///
/// // `%` after a value is modulo, before digits it is a binary prefix
/// let tokens = tokenize("7 % %11").unwrap();
/// assert_eq!(tokens[1].token_type, TokenType::Percent);
/// assert_eq!(tokens[2].token_type, TokenType::Number(3));
/// ```
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Remove comments from a whole unit of source, one entry per line.
///
/// `;` starts a comment to the end of the line, `/* ... */` may span lines.
/// Neither is recognized inside a string or a character literal. Lines keep
/// their numbering; a block comment leaves the lines it covers empty.
///
/// Returns the 1-indexed line of the opening `/*` if a block comment is never
/// closed.
pub fn strip_comments(text: &str) -> Result<Vec<String>, usize> {
    let mut lines = Vec::new();
    let mut open_block: Option<usize> = None;

    for (index, raw) in text.lines().enumerate() {
        let chars: Vec<char> = raw.chars().collect();
        let mut out = String::with_capacity(raw.len());
        let mut i = 0;

        while i < chars.len() {
            if open_block.is_some() {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    open_block = None;
                    out.push(' ');
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }

            match chars[i] {
                ';' => break,
                '/' if chars.get(i + 1) == Some(&'*') => {
                    open_block = Some(index + 1);
                    i += 2;
                }
                '"' => {
                    let end = chars[i + 1..]
                        .iter()
                        .position(|&c| c == '"')
                        .map_or(chars.len(), |p| i + 2 + p);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '\'' => {
                    let register_tail = i >= 2
                        && chars[i - 2].eq_ignore_ascii_case(&'A')
                        && chars[i - 1].eq_ignore_ascii_case(&'F')
                        && (i < 3 || !is_identifier_char(chars[i - 3]));
                    let end = if !register_tail && chars.get(i + 2) == Some(&'\'') {
                        i + 3
                    } else {
                        i + 1
                    };
                    out.extend(&chars[i..end]);
                    i = end;
                }
                ch => {
                    out.push(ch);
                    i += 1;
                }
            }
        }
        lines.push(out);
    }

    match open_block {
        Some(line) => Err(line),
        None => Ok(lines),
    }
}

/// Token stream with lookahead capability for parser consumption
pub struct TokenStream<'t> {
    /// Token sequence being read
    tokens: &'t [Token],

    /// Current read position (index into tokens)
    position: usize,
}

impl<'t> TokenStream<'t> {
    /// Create a new token stream over a slice of tokens
    pub fn new(tokens: &'t [Token]) -> Self {
        TokenStream {
            tokens,
            position: 0,
        }
    }

    /// Peek at the current token without consuming it
    #[must_use]
    pub fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.position)
    }

    /// Peek ahead n tokens without consuming them. peek_n(0) is equivalent to peek().
    #[must_use]
    pub fn peek_n(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.position + n)
    }

    /// Advance the stream position by one token without returning it
    pub fn advance(&mut self) -> bool {
        if self.position < self.tokens.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Consume and return the current token, advancing the stream
    pub fn consume(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// Check if every token has been consumed
    #[must_use = "calling is_eof() without using the result has no effect"]
    pub fn is_eof(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Column of the current token, or of the end of the last one
    #[must_use]
    pub fn current_column(&self) -> usize {
        match self.peek() {
            Some(token) => token.column,
            None => self
                .tokens
                .last()
                .map_or(0, |last| last.column + last.length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_number_notations() {
        let values: Vec<TokenType> = types("$FF,0xff,0FFh,%11111111,0b11111111,11111111b,255,'A'")
            .into_iter()
            .filter(|t| *t != TokenType::Comma)
            .collect();
        assert_eq!(
            values,
            vec![
                TokenType::Number(255),
                TokenType::Number(255),
                TokenType::Number(255),
                TokenType::Number(255),
                TokenType::Number(255),
                TokenType::Number(255),
                TokenType::Number(255),
                TokenType::Number(65),
            ]
        );
    }

    #[test]
    fn test_dollar_alone_is_current_address() {
        assert_eq!(
            types("$+2"),
            vec![TokenType::Dollar, TokenType::Plus, TokenType::Number(2)]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            types("<< >> <= >= == != && || = <>"),
            vec![
                TokenType::Shl,
                TokenType::Shr,
                TokenType::Le,
                TokenType::Ge,
                TokenType::EqEq,
                TokenType::Ne,
                TokenType::AndAnd,
                TokenType::OrOr,
                TokenType::EqEq,
                TokenType::Ne,
            ]
        );
    }

    #[test]
    fn test_identifiers_are_uppercased_strings_are_not() {
        assert_eq!(
            types("db \"Hi\",loop_1"),
            vec![
                TokenType::Identifier("DB".to_string()),
                TokenType::Str("Hi".to_string()),
                TokenType::Comma,
                TokenType::Identifier("LOOP_1".to_string()),
            ]
        );
    }

    #[test]
    fn test_lexer_errors() {
        assert!(matches!(
            tokenize("LD A,12Z"),
            Err(LexerError::InvalidNumber { .. })
        ));
        assert!(matches!(
            tokenize("DB \"open"),
            Err(LexerError::UnterminatedString { column: 3 })
        ));
        assert!(matches!(
            tokenize("LD A,@"),
            Err(LexerError::UnexpectedCharacter { ch: '@', .. })
        ));
    }

    #[test]
    fn test_strip_line_and_block_comments() {
        let lines = strip_comments("NOP ; one\nLD A,1 /* two\nthree */ RET\nDB ';', \"a;b\"").unwrap();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].trim(), "NOP");
        assert_eq!(lines[1].trim(), "LD A,1");
        assert_eq!(lines[2].trim(), "RET");
        assert_eq!(lines[3], "DB ';', \"a;b\"");
    }

    #[test]
    fn test_strip_keeps_shadow_register() {
        let lines = strip_comments("EX AF,AF' ; swap").unwrap();
        assert_eq!(lines[0].trim(), "EX AF,AF'");
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert_eq!(strip_comments("NOP\n/* never\nclosed"), Err(2));
    }

    #[test]
    fn test_token_stream_lookahead() {
        let tokens = tokenize("HIGH(1)").unwrap();
        let mut stream = TokenStream::new(&tokens);

        assert_eq!(stream.peek_n(1).unwrap().token_type, TokenType::LParen);
        assert!(stream.advance());
        assert_eq!(stream.consume().unwrap().token_type, TokenType::LParen);
        assert!(!stream.is_eof());
        assert_eq!(stream.current_column(), 5);
    }
}
