//! Z80 Assembler Module
//!
//! Converts assembly language source code into binary machine code.
//!
//! # Passes
//!
//! Sizing passes walk every line binding labels, `EQU` and `SET` symbols and
//! counting bytes. A symbol used before its definition takes the value it had
//! at the end of the previous sizing pass, so sizing repeats until no value
//! changes (or a fixed number of passes is exhausted). The final pass then
//! walks the source once more with every value known and emits bytes, checking
//! operand ranges and branch distances.
//!
//! Every pass owns its state in a private `Pass` value created by
//! [`Assembler::compile`]; nothing survives between compilations.
//!
//! # Examples
//!
//! ```
//! use libz80::assembler::assemble;
//!
//! let output = assemble("ORG $8000\nSTART: LD A,1\n JR START").unwrap();
//! assert_eq!(output.origin, 0x8000);
//! assert_eq!(output.bytes, vec![0x3E, 0x01, 0x18, 0xFC]);
//! assert_eq!(output.symbol("start").unwrap().value, 0x8000);
//! ```

pub mod encoder;
pub mod expression;
pub mod lexer;
pub mod parser;
pub mod source_map;
pub mod symbol_table;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::labels::LabelMap;
use crate::memory::MemoryBus;
use encoder::{encode, EncodeOptions};
use expression::{parse_expression, Expr, ExprError};
use lexer::{strip_comments, tokenize, Token, TokenType};
use parser::{is_reserved, parse_arg, parse_data_item, parse_statement, DataItem, Statement};
use source_map::{AddressRange, SourceLocation, SourceMap};
pub use symbol_table::SymbolKind;
use symbol_table::{Binding, Entry, Resolver, SymbolTable};

/// Upper bound on sizing passes before values are declared unsettled
const MAX_PASSES: usize = 16;

/// Provides the text of source units by identifier, for `INCLUDE`
pub trait SourceResolver {
    /// Full text of unit `id`, or `None` if it does not exist
    fn get_source(&self, id: &str) -> Option<String>;
}

impl SourceResolver for HashMap<String, String> {
    fn get_source(&self, id: &str) -> Option<String> {
        self.get(id).cloned()
    }
}

impl<T: SourceResolver + ?Sized> SourceResolver for &T {
    fn get_source(&self, id: &str) -> Option<String> {
        (**self).get_source(id)
    }
}

/// Source units held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySources {
    units: HashMap<String, String>,
}

impl InMemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit, builder style
    pub fn with(mut self, id: &str, text: &str) -> Self {
        self.insert(id, text);
        self
    }

    /// Add or replace a unit
    pub fn insert(&mut self, id: &str, text: &str) {
        self.units.insert(id.to_string(), text.to_string());
    }
}

impl SourceResolver for InMemorySources {
    fn get_source(&self, id: &str) -> Option<String> {
        self.units.get(id).cloned()
    }
}

/// Assembler configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerOptions {
    /// Accept the Z80N extension mnemonics
    pub extended_opcodes: bool,
}

/// Bytes emitted contiguously from one origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub origin: u16,
    pub bytes: Vec<u8>,
}

impl Segment {
    /// One past the last address, without wrapping
    fn end(&self) -> usize {
        usize::from(self.origin) + self.bytes.len()
    }
}

/// A symbol table entry mapping a name to its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name (uppercase)
    pub name: String,

    /// Resolved value; a label's value is its address
    pub value: i64,

    pub kind: SymbolKind,

    /// Source unit of the (last) definition
    pub unit: String,

    /// Source line where the symbol was (last) defined
    pub defined_at: usize,
}

/// A non-fatal warning from the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerWarning {
    pub unit: String,

    /// Line number where warning occurred
    pub line: usize,

    /// Warning message
    pub message: String,
}

impl fmt::Display for AssemblerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: warning: {}", self.unit, self.line, self.message)
    }
}

/// Complete output from assembling source code
#[derive(Debug, Clone)]
pub struct AssemblerOutput {
    /// Lowest address written (or the first `ORG` if nothing was emitted)
    pub origin: u16,

    /// Flat image from `origin` to the highest byte written; gaps are zero
    pub bytes: Vec<u8>,

    /// Emitted bytes in emission order, one entry per contiguous run
    pub segments: Vec<Segment>,

    /// Symbols in order of definition
    pub symbols: Vec<Symbol>,

    /// Source map for debugging
    pub source_map: SourceMap,

    /// Non-fatal warnings encountered during assembly
    pub warnings: Vec<AssemblerWarning>,
}

impl AssemblerOutput {
    /// Look up a symbol, ignoring case
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        let name = name.to_ascii_uppercase();
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Write every segment into `memory` at its origin
    pub fn load_into<M: MemoryBus + ?Sized>(&self, memory: &mut M) {
        for segment in &self.segments {
            for (offset, byte) in segment.bytes.iter().enumerate() {
                memory.write(segment.origin.wrapping_add(offset as u16), *byte);
            }
        }
    }

    /// Labels for the decoder; the first label defined at an address wins
    pub fn labels(&self) -> LabelMap {
        self.symbols
            .iter()
            .rev()
            .filter(|s| s.kind == SymbolKind::Label)
            .map(|s| (s.value as u16, s.name.clone()))
            .collect()
    }
}

/// An error encountered during assembly
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{unit}:{line}: {kind}")]
pub struct AssemblerError {
    /// Error type classification
    pub kind: ErrorKind,

    /// Source unit the line belongs to
    pub unit: String,

    /// Line number where error occurred (1-indexed, 0 if not tied to a line)
    pub line: usize,

    /// Offending source line, trimmed
    pub text: String,
}

impl AssemblerError {
    fn new(kind: ErrorKind, unit: &str, line: usize, text: &str) -> Self {
        Self {
            kind,
            unit: unit.to_string(),
            line,
            text: text.trim().to_string(),
        }
    }
}

/// Classification of assembly errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("duplicate symbol `{0}`")]
    DuplicateSymbol(String),

    #[error("`{0}` cannot be both an EQU constant and a SET variable")]
    SymbolKindConflict(String),

    #[error("undefined symbol `{0}`")]
    UndefinedSymbol(String),

    #[error("symbol `{0}` is defined in terms of itself")]
    CyclicSymbol(String),

    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),

    #[error("invalid operands for `{0}`")]
    InvalidOperands(String),

    #[error("IX and IY registers cannot be mixed in one instruction")]
    MixedIndexRegisters,

    #[error("relative branch offset {0} out of range")]
    BranchOutOfRange(i64),

    #[error("value {0} out of range")]
    ValueOutOfRange(i64),

    #[error("index displacement {0} out of range")]
    DisplacementOutOfRange(i64),

    #[error("unterminated block comment")]
    UnterminatedBlockComment,

    #[error("IF without ENDIF")]
    MissingEndif,

    #[error("ENDIF without IF")]
    StrayEndif,

    #[error("ELSE without IF")]
    StrayElse,

    #[error("more than one ELSE for the same IF")]
    DuplicateElse,

    #[error("`{0}` includes itself")]
    IncludeCycle(String),

    #[error("cannot resolve source `{0}`")]
    IncludeNotFound(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("`{0}` must be defined before this line")]
    ForwardReference(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("symbol values did not settle after {0} passes")]
    UnsettledSymbols(usize),
}

impl From<ExprError> for ErrorKind {
    fn from(error: ExprError) -> Self {
        match error {
            ExprError::DivisionByZero => ErrorKind::DivisionByZero,
            ExprError::Cyclic(name) => ErrorKind::CyclicSymbol(name),
            ExprError::Undefined(name) => ErrorKind::UndefinedSymbol(name),
        }
    }
}

/// Two-pass assembler over units provided by a [`SourceResolver`]
pub struct Assembler<R: SourceResolver> {
    resolver: R,
    options: AssemblerOptions,
}

impl<R: SourceResolver> Assembler<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            options: AssemblerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AssemblerOptions) -> Self {
        self.options = options;
        self
    }

    /// Assemble unit `root` and everything it includes.
    ///
    /// The first fatal error aborts the compilation; no partial output is
    /// returned.
    pub fn compile(&self, root: &str) -> Result<AssemblerOutput, AssemblerError> {
        let mut units = HashMap::new();
        let mut previous = HashMap::new();
        let mut settled = false;

        for number in 1..=MAX_PASSES {
            let mut pass = Pass::new(&self.resolver, self.options, &mut units, &previous, false);
            pass.run(root)?;
            let forward = pass.forward;
            let values = pass.values()?;

            let stable = !forward || values == previous;
            tracing::debug!(pass = number, symbols = values.len(), forward, stable, "sizing pass");
            previous = values;
            if stable {
                settled = true;
                break;
            }
        }
        if !settled {
            tracing::warn!(root, passes = MAX_PASSES, "symbol values did not settle");
            return Err(AssemblerError::new(
                ErrorKind::UnsettledSymbols(MAX_PASSES),
                root,
                0,
                "",
            ));
        }

        let mut pass = Pass::new(&self.resolver, self.options, &mut units, &previous, true);
        pass.run(root)?;
        let output = pass.into_output()?;
        tracing::debug!(
            root,
            bytes = output.bytes.len(),
            segments = output.segments.len(),
            warnings = output.warnings.len(),
            "assembled"
        );
        Ok(output)
    }
}

/// Assemble a single self-contained source text (unit name `main`)
///
/// # Arguments
///
/// * `source` - The assembly source code text
///
/// # Returns
///
/// Ok(AssemblerOutput) on success, Err(AssemblerError) at the first fatal error
pub fn assemble(source: &str) -> Result<AssemblerOutput, AssemblerError> {
    Assembler::new(InMemorySources::new().with("main", source)).compile("main")
}

// ========== Pass state ==========

/// What happens after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineFlow {
    Next,
    /// `END`: ignore the rest of the unit
    End,
}

/// A line failure, or an error already located in an included unit
enum Failure {
    Here(ErrorKind),
    Nested(AssemblerError),
}

impl From<ErrorKind> for Failure {
    fn from(kind: ErrorKind) -> Self {
        Failure::Here(kind)
    }
}

#[derive(Debug, Clone, Copy)]
struct Conditional {
    parent_active: bool,
    /// Some branch of this IF has been selected
    taken: bool,
    active: bool,
    seen_else: bool,
}

struct Pass<'a> {
    resolver: &'a dyn SourceResolver,
    options: AssemblerOptions,
    units: &'a mut HashMap<String, Rc<Vec<String>>>,
    /// Symbol values at the end of the previous sizing pass
    previous: &'a HashMap<String, i64>,
    /// Final pass: emit bytes, require every value
    emit: bool,

    table: SymbolTable,
    pc: u16,
    first_origin: Option<u16>,
    segments: Vec<Segment>,
    /// Addresses already emitted in the final pass
    written: Vec<bool>,
    conditions: Vec<Conditional>,
    /// Conditional depth when the current unit started
    base_depth: usize,
    include_stack: Vec<String>,
    /// A symbol was used before its definition
    forward: bool,

    current: SourceLocation,
    line_bytes: usize,
    source_map: SourceMap,
    warnings: Vec<AssemblerWarning>,
}

fn single_expr(operands: &[Vec<Token>]) -> Result<Expr, ErrorKind> {
    match operands {
        [tokens] => parse_expression(tokens).map_err(ErrorKind::Syntax),
        _ => Err(ErrorKind::Syntax("expected one expression".to_string())),
    }
}

fn single_name(operands: &[Vec<Token>]) -> Result<&str, ErrorKind> {
    match operands {
        [tokens] => match tokens.as_slice() {
            [Token {
                token_type: TokenType::Identifier(name),
                ..
            }] => Ok(name),
            _ => Err(ErrorKind::Syntax("expected a symbol name".to_string())),
        },
        _ => Err(ErrorKind::Syntax("expected a symbol name".to_string())),
    }
}

impl<'a> Pass<'a> {
    fn new(
        resolver: &'a dyn SourceResolver,
        options: AssemblerOptions,
        units: &'a mut HashMap<String, Rc<Vec<String>>>,
        previous: &'a HashMap<String, i64>,
        emit: bool,
    ) -> Self {
        Self {
            resolver,
            options,
            units,
            previous,
            emit,
            table: SymbolTable::new(),
            pc: 0,
            first_origin: None,
            segments: Vec::new(),
            written: if emit { vec![false; 0x10000] } else { Vec::new() },
            conditions: Vec::new(),
            base_depth: 0,
            include_stack: Vec::new(),
            forward: false,
            current: SourceLocation { unit: 0, line: 0 },
            line_bytes: 0,
            source_map: SourceMap::new(),
            warnings: Vec::new(),
        }
    }

    fn run(&mut self, root: &str) -> Result<(), AssemblerError> {
        let lines = self.load(root)?.ok_or_else(|| {
            AssemblerError::new(ErrorKind::IncludeNotFound(root.to_string()), root, 0, "")
        })?;
        self.run_unit(root, &lines)
    }

    /// Comment-free lines of a unit, loaded once per compilation
    fn load(&mut self, name: &str) -> Result<Option<Rc<Vec<String>>>, AssemblerError> {
        if let Some(lines) = self.units.get(name) {
            return Ok(Some(Rc::clone(lines)));
        }
        let Some(text) = self.resolver.get_source(name) else {
            return Ok(None);
        };
        let lines = strip_comments(&text).map_err(|line| {
            AssemblerError::new(ErrorKind::UnterminatedBlockComment, name, line, "")
        })?;
        let lines = Rc::new(lines);
        self.units.insert(name.to_string(), Rc::clone(&lines));
        Ok(Some(lines))
    }

    fn run_unit(&mut self, name: &str, lines: &[String]) -> Result<(), AssemblerError> {
        let unit = self.source_map.unit_index(name);
        self.include_stack.push(name.to_string());
        let outer_depth = std::mem::replace(&mut self.base_depth, self.conditions.len());

        for (index, text) in lines.iter().enumerate() {
            if self.line(name, unit, index + 1, text)? == LineFlow::End {
                self.conditions.truncate(self.base_depth);
                break;
            }
        }
        if self.conditions.len() > self.base_depth {
            return Err(AssemblerError::new(
                ErrorKind::MissingEndif,
                name,
                lines.len(),
                "",
            ));
        }

        self.base_depth = outer_depth;
        self.include_stack.pop();
        Ok(())
    }

    fn active(&self) -> bool {
        self.conditions.last().map_or(true, |c| c.active)
    }

    fn line(
        &mut self,
        name: &str,
        unit: usize,
        number: usize,
        text: &str,
    ) -> Result<LineFlow, AssemblerError> {
        let fail = |kind| AssemblerError::new(kind, name, number, text);
        let tokens = tokenize(text).map_err(|e| fail(ErrorKind::Syntax(e.to_string())))?;
        let statement = parse_statement(&tokens).map_err(|m| fail(ErrorKind::Syntax(m)))?;
        self.current = SourceLocation { unit, line: number };

        let operation = statement.operation.as_deref().unwrap_or_default();
        if matches!(operation, "IF" | "IFDEF" | "IFNDEF" | "ELSE" | "ENDIF") {
            self.conditional(operation, &statement).map_err(fail)?;
            return Ok(LineFlow::Next);
        }
        if !self.active() {
            return Ok(LineFlow::Next);
        }

        let start = self.pc;
        self.line_bytes = 0;
        let flow = match self.statement(&statement) {
            Ok(flow) => flow,
            Err(Failure::Here(kind)) => return Err(fail(kind)),
            Err(Failure::Nested(error)) => return Err(error),
        };

        if self.emit && operation != "INCLUDE" {
            let range = AddressRange {
                start,
                length: self.line_bytes,
            };
            self.source_map.add_mapping(range, self.current);
        }
        Ok(flow)
    }

    fn conditional(&mut self, operation: &str, statement: &Statement) -> Result<(), ErrorKind> {
        if statement.label.is_some() {
            return Err(ErrorKind::Syntax(format!(
                "a label cannot be attached to {}",
                operation
            )));
        }

        match operation {
            "IF" | "IFDEF" | "IFNDEF" => {
                let parent_active = self.active();
                let taken = parent_active
                    && match operation {
                        "IF" => {
                            let expr = single_expr(&statement.operands)?;
                            self.eval(&expr)?.is_some_and(|v| v != 0)
                        }
                        _ => {
                            let name = single_name(&statement.operands)?;
                            self.table.contains(name) == (operation == "IFDEF")
                        }
                    };
                self.conditions.push(Conditional {
                    parent_active,
                    taken,
                    active: taken,
                    seen_else: false,
                });
            }
            "ELSE" => {
                if self.conditions.len() <= self.base_depth {
                    return Err(ErrorKind::StrayElse);
                }
                let Some(top) = self.conditions.last_mut() else {
                    return Err(ErrorKind::StrayElse);
                };
                if top.seen_else {
                    return Err(ErrorKind::DuplicateElse);
                }
                top.seen_else = true;
                top.active = top.parent_active && !top.taken;
                top.taken = true;
            }
            _ => {
                if self.conditions.len() <= self.base_depth {
                    return Err(ErrorKind::StrayEndif);
                }
                self.conditions.pop();
            }
        }
        Ok(())
    }

    fn statement(&mut self, statement: &Statement) -> Result<LineFlow, Failure> {
        let operation = statement.operation.as_deref();
        let operands = statement.operands.as_slice();

        let assignment = match operation {
            Some("EQU") => Some(SymbolKind::Equ),
            Some("DEFL") => Some(SymbolKind::Set),
            // SET with two operands is the bit instruction
            Some("SET") if operands.len() == 1 && statement.label.is_some() => {
                Some(SymbolKind::Set)
            }
            _ => None,
        };
        if let Some(kind) = assignment {
            let name = statement
                .label
                .as_deref()
                .ok_or_else(|| ErrorKind::Syntax("assignment needs a symbol name".to_string()))?;
            let expr = single_expr(operands)?;
            self.assign(name, kind, expr)?;
            return Ok(LineFlow::Next);
        }

        if let Some(name) = &statement.label {
            self.define(name, SymbolKind::Label, Binding::Value(i64::from(self.pc)))?;
        }

        match operation {
            None => {}
            Some("END") => return Ok(LineFlow::End),
            Some("ORG") => {
                let address = self.eval_strict(&single_expr(operands)?)?;
                if !(0..=0xFFFF).contains(&address) {
                    return Err(ErrorKind::ValueOutOfRange(address).into());
                }
                self.pc = address as u16;
                self.first_origin.get_or_insert(self.pc);
            }
            Some("DB" | "DEFB" | "DEFM") => self.data(operands, false, false)?,
            Some("DW" | "DEFW") => self.data(operands, true, false)?,
            Some("DZ") => self.data(operands, false, true)?,
            Some("DS" | "DEFS") => self.reserve(operands)?,
            Some("INCLUDE") => self.include(operands)?,
            Some(mnemonic) => self.instruction(mnemonic, operands)?,
        }
        Ok(LineFlow::Next)
    }

    fn define(&mut self, name: &str, kind: SymbolKind, binding: Binding) -> Result<(), ErrorKind> {
        if is_reserved(name) {
            return Err(ErrorKind::Syntax(format!(
                "`{}` is a register or condition name",
                name
            )));
        }
        let entry = Entry {
            kind,
            binding,
            unit: self.current.unit,
            line: self.current.line,
        };
        self.table.define(name, entry)
    }

    fn assign(&mut self, name: &str, kind: SymbolKind, expr: Expr) -> Result<(), ErrorKind> {
        let here = i64::from(self.pc);
        let binding = match self.eval(&expr)? {
            Some(value) => Binding::Value(value),
            None => Binding::Deferred { expr, here },
        };
        self.define(name, kind, binding)
    }

    /// Evaluate with forward references allowed. `None` only outside the
    /// final pass, which fails on anything still unknown.
    fn eval(&mut self, expr: &Expr) -> Result<Option<i64>, ErrorKind> {
        let mut resolver = Resolver::new(&self.table, Some(self.previous), i64::from(self.pc));
        if self.emit {
            resolver = resolver.require_known();
        }
        let result = expr.eval(&mut resolver);
        self.forward |= resolver.forward;

        match result {
            Ok(value) => Ok(value),
            // Values may still be moving
            Err(ExprError::DivisionByZero) if !self.emit => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Evaluate using only symbols defined above this line (`ORG`, `DS` counts)
    fn eval_strict(&mut self, expr: &Expr) -> Result<i64, ErrorKind> {
        let mut resolver = Resolver::new(&self.table, None, i64::from(self.pc));
        let result = expr.eval(&mut resolver);
        let missing = resolver.missing.first().cloned().unwrap_or_default();

        match result {
            Ok(Some(value)) => Ok(value),
            Ok(None) | Err(ExprError::DivisionByZero) if !self.emit => Ok(0),
            Ok(None) if self.previous.contains_key(&missing) => {
                Err(ErrorKind::ForwardReference(missing))
            }
            Ok(None) => Err(ErrorKind::UndefinedSymbol(missing)),
            Err(error) => Err(error.into()),
        }
    }

    fn warn(&mut self, message: String) {
        if !self.emit {
            return;
        }
        let unit = self
            .source_map
            .unit_name(self.current.unit)
            .unwrap_or_default()
            .to_string();
        self.warnings.push(AssemblerWarning {
            unit,
            line: self.current.line,
            message,
        });
    }

    /// Append bytes at the program counter (final pass) or just count them
    fn output(&mut self, bytes: &[u8]) {
        self.line_bytes += bytes.len();
        if !self.emit {
            self.pc = self.pc.wrapping_add(bytes.len() as u16);
            return;
        }
        let mut overlap = None;
        for &byte in bytes {
            let pc = self.pc;
            let seen = &mut self.written[usize::from(pc)];
            if *seen && overlap.is_none() {
                overlap = Some(pc);
            }
            *seen = true;
            match self.segments.last_mut() {
                Some(segment) if segment.end() == usize::from(pc) => segment.bytes.push(byte),
                _ => self.segments.push(Segment {
                    origin: pc,
                    bytes: vec![byte],
                }),
            }
            self.pc = pc.wrapping_add(1);
        }
        if let Some(address) = overlap {
            self.warn(format!("output at ${:04X} overwrites earlier bytes", address));
        }
    }

    fn data(&mut self, operands: &[Vec<Token>], words: bool, terminate: bool) -> Result<(), ErrorKind> {
        if operands.is_empty() && !terminate {
            return Err(ErrorKind::Syntax("missing data".to_string()));
        }

        let mut bytes = Vec::new();
        for tokens in operands {
            match parse_data_item(tokens).map_err(ErrorKind::Syntax)? {
                DataItem::Text(text) => {
                    for ch in text.chars() {
                        let code = u32::from(ch);
                        if code > 0xFF {
                            return Err(ErrorKind::ValueOutOfRange(i64::from(code)));
                        }
                        bytes.push(code as u8);
                        if words {
                            bytes.push(0);
                        }
                    }
                }
                DataItem::Expr(expr) => {
                    let value = self.eval(&expr)?.unwrap_or(0);
                    if words {
                        if self.emit && !(-32768..=65535).contains(&value) {
                            return Err(ErrorKind::ValueOutOfRange(value));
                        }
                        bytes.extend((value as u16).to_le_bytes());
                    } else {
                        if self.emit && !(-256..=255).contains(&value) {
                            return Err(ErrorKind::ValueOutOfRange(value));
                        }
                        if value < 0 {
                            self.warn(format!("negative value {} stored as ${:02X}", value, value as u8));
                        }
                        bytes.push(value as u8);
                    }
                }
            }
        }
        if terminate {
            bytes.push(0);
        }
        self.output(&bytes);
        Ok(())
    }

    fn reserve(&mut self, operands: &[Vec<Token>]) -> Result<(), ErrorKind> {
        let (count, fill) = match operands {
            [count] => (count, None),
            [count, fill] => (count, Some(fill)),
            _ => {
                return Err(ErrorKind::Syntax(
                    "DS takes a count and an optional fill value".to_string(),
                ))
            }
        };

        let count = self.eval_strict(&parse_expression(count).map_err(ErrorKind::Syntax)?)?;
        if !(0..=0x10000).contains(&count) {
            if self.emit {
                return Err(ErrorKind::ValueOutOfRange(count));
            }
            return Ok(());
        }
        let fill = match fill {
            Some(tokens) => {
                let expr = parse_expression(tokens).map_err(ErrorKind::Syntax)?;
                self.eval(&expr)?.unwrap_or(0)
            }
            None => 0,
        };
        if self.emit && !(-256..=255).contains(&fill) {
            return Err(ErrorKind::ValueOutOfRange(fill));
        }

        if count == 0 {
            self.warn("DS with a zero count reserves nothing".to_string());
        }
        self.output(&vec![fill as u8; count as usize]);
        Ok(())
    }

    fn include(&mut self, operands: &[Vec<Token>]) -> Result<(), Failure> {
        let name = match operands {
            [tokens] => match tokens.as_slice() {
                [Token {
                    token_type: TokenType::Str(name),
                    ..
                }] => name.clone(),
                _ => return Err(ErrorKind::Syntax("INCLUDE needs a quoted name".to_string()).into()),
            },
            _ => return Err(ErrorKind::Syntax("INCLUDE needs a quoted name".to_string()).into()),
        };

        if self.include_stack.contains(&name) {
            return Err(ErrorKind::IncludeCycle(name).into());
        }
        let lines = self
            .load(&name)
            .map_err(Failure::Nested)?
            .ok_or_else(|| ErrorKind::IncludeNotFound(name.clone()))?;

        let current = self.current;
        self.run_unit(&name, &lines).map_err(Failure::Nested)?;
        self.current = current;
        Ok(())
    }

    fn instruction(&mut self, mnemonic: &str, operands: &[Vec<Token>]) -> Result<(), ErrorKind> {
        let mut args = Vec::with_capacity(operands.len());
        for tokens in operands {
            let arg = parse_arg(tokens).map_err(ErrorKind::Syntax)?;
            args.push(arg.try_map(|expr| self.eval(expr))?);
        }

        let options = EncodeOptions {
            extended_opcodes: self.options.extended_opcodes,
            check_ranges: self.emit,
        };
        let bytes = encode(mnemonic, &args, self.pc, options)?;
        self.output(&bytes);
        Ok(())
    }

    /// Every symbol value this pass could resolve
    fn values(&self) -> Result<HashMap<String, i64>, AssemblerError> {
        self.table.values(Some(self.previous)).map_err(|(name, kind)| {
            let (unit, line) = self
                .table
                .lookup(&name)
                .map(|entry| (entry.unit, entry.line))
                .unwrap_or_default();
            let unit = self.source_map.unit_name(unit).unwrap_or_default();
            AssemblerError::new(kind, unit, line, &name)
        })
    }

    fn into_output(mut self) -> Result<AssemblerOutput, AssemblerError> {
        let values = self.values()?;
        let symbols: Vec<Symbol> = self
            .table
            .names()
            .filter_map(|name| {
                let entry = self.table.lookup(name)?;
                let value = match entry.binding {
                    Binding::Value(value) => value,
                    Binding::Deferred { .. } => *values.get(name)?,
                };
                Some(Symbol {
                    name: name.to_string(),
                    value,
                    kind: entry.kind,
                    unit: self.source_map.unit_name(entry.unit).unwrap_or_default().to_string(),
                    defined_at: entry.line,
                })
            })
            .collect();

        let origin = self
            .segments
            .iter()
            .map(|s| s.origin)
            .min()
            .or(self.first_origin)
            .unwrap_or(0);
        let end = self.segments.iter().map(Segment::end).max().unwrap_or(0);
        let mut bytes = vec![0; end.saturating_sub(usize::from(origin))];
        for segment in &self.segments {
            let at = usize::from(segment.origin) - usize::from(origin);
            bytes[at..at + segment.bytes.len()].copy_from_slice(&segment.bytes);
        }

        self.source_map.finalize();
        Ok(AssemblerOutput {
            origin,
            bytes,
            segments: self.segments,
            symbols,
            source_map: self.source_map,
            warnings: self.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(source: &str) -> Vec<u8> {
        assemble(source).unwrap().bytes
    }

    fn error(source: &str) -> ErrorKind {
        assemble(source).unwrap_err().kind
    }

    #[test]
    fn test_forward_reference() {
        let output = assemble("JP TARGET\nNOP\nNOP\nTARGET: LD A,1").unwrap();
        assert_eq!(output.bytes, vec![0xC3, 0x05, 0x00, 0x00, 0x00, 0x3E, 0x01]);
        assert_eq!(output.symbol("TARGET").unwrap().value, 5);
    }

    #[test]
    fn test_if_with_forward_reference() {
        assert_eq!(bytes("IF X == 1\n LD A,1\n ENDIF\nX EQU 1"), vec![0x3E, 0x01]);
        assert_eq!(bytes("IF X == 1\n LD A,1\n ENDIF\nX EQU 0"), Vec::<u8>::new());
    }

    #[test]
    fn test_relative_branch_range() {
        assert_eq!(bytes("ORG 0x100\n JR 0x181"), vec![0x18, 0x7F]);
        assert_eq!(
            error("ORG 0x100\n JR 0x182"),
            ErrorKind::BranchOutOfRange(128)
        );
        assert_eq!(
            error("ORG 0x100\n JR 0x10101"),
            ErrorKind::ValueOutOfRange(0x10101)
        );
        assert_eq!(error("DJNZ -1"), ErrorKind::ValueOutOfRange(-1));
    }

    #[test]
    fn test_set_and_equ_rules() {
        assert_eq!(bytes("V SET 1\n DB V\nV SET 2\n DB V"), vec![1, 2]);
        assert_eq!(
            error("V EQU 1\nV EQU 2"),
            ErrorKind::DuplicateSymbol("V".to_string())
        );
        assert_eq!(
            error("V EQU 1\nV SET 2"),
            ErrorKind::SymbolKindConflict("V".to_string())
        );
        assert_eq!(
            error("V DEFL 1\nV EQU 2"),
            ErrorKind::SymbolKindConflict("V".to_string())
        );
    }

    #[test]
    fn test_set_instruction_is_not_assignment() {
        assert_eq!(bytes("LOOP: SET 3,A"), vec![0xCB, 0xDF]);
    }

    #[test]
    fn test_cyclic_symbols() {
        assert_eq!(
            error("A1 EQU B1\nB1 EQU A1"),
            ErrorKind::CyclicSymbol("A1".to_string())
        );
    }

    #[test]
    fn test_error_location_and_display() {
        let err = assemble("NOP\n  FROB A").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.unit, "main");
        assert_eq!(err.text, "FROB A");
        assert_eq!(err.to_string(), "main:2: unknown mnemonic `FROB`");
    }

    #[test]
    fn test_org_forward_reference_rejected() {
        assert_eq!(
            error("ORG START\nSTART: NOP"),
            ErrorKind::ForwardReference("START".to_string())
        );
        assert_eq!(
            error("ORG NOWHERE"),
            ErrorKind::UndefinedSymbol("NOWHERE".to_string())
        );
    }

    #[test]
    fn test_segments_and_flat_image() {
        let output = assemble("ORG $10\n DB 1\n ORG $08\n DB 2,3").unwrap();
        assert_eq!(output.origin, 0x08);
        assert_eq!(output.segments.len(), 2);
        assert_eq!(output.bytes, vec![2, 3, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_source_map_records_lines() {
        let output = assemble("ORG $8000\n LD A,1\n\n RET").unwrap();
        let location = output.source_map.get_source_location(0x8002).unwrap();
        assert_eq!(location.line, 4);
        let range = output.source_map.get_address_range("main", 2).unwrap();
        assert_eq!((range.start, range.length), (0x8000, 2));
    }

    #[test]
    fn test_labels_for_decoder() {
        use crate::labels::LabelLookup;

        let output = assemble("ORG $4000\nFIRST:\nALIAS: NOP\nK EQU 7").unwrap();
        let labels = output.labels();
        assert_eq!(labels.get_label(0x4000), Some("FIRST"));
        assert_eq!(labels.len(), 1);
    }
}
