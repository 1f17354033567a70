//! Symbol table management for labels, `EQU` constants and `SET` variables

use std::collections::HashMap;

use crate::assembler::expression::{Expr, ExprError, Scope};
use crate::assembler::ErrorKind;

/// How a symbol was defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Bound to the emission address of its line
    Label,
    /// `EQU`: single assignment
    Equ,
    /// `SET` / `DEFL`: may be reassigned
    Set,
}

/// Value of a symbol as far as the current pass knows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Value(i64),
    /// Defined by an expression that could not be evaluated yet
    Deferred { expr: Expr, here: i64 },
}

/// A table entry with its definition site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: SymbolKind,
    pub binding: Binding,
    /// Index of the source unit in the source map
    pub unit: usize,
    pub line: usize,
}

/// Symbol table for one assembly pass
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl SymbolTable {
    /// Create a new empty symbol table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, enforcing the single-assignment rules:
    /// labels and `EQU` symbols are defined once, `SET` symbols may be
    /// rebound by `SET`, and `EQU`/`SET` never share a name.
    pub fn define(&mut self, name: &str, entry: Entry) -> Result<(), ErrorKind> {
        if let Some(existing) = self.entries.get_mut(name) {
            return match (existing.kind, entry.kind) {
                (SymbolKind::Set, SymbolKind::Set) => {
                    *existing = entry;
                    Ok(())
                }
                (SymbolKind::Equ, SymbolKind::Set) | (SymbolKind::Set, SymbolKind::Equ) => {
                    Err(ErrorKind::SymbolKindConflict(name.to_string()))
                }
                _ => Err(ErrorKind::DuplicateSymbol(name.to_string())),
            };
        }

        self.order.push(name.to_string());
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Look up a symbol by name
    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names in order of first definition
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Resolve every binding, following deferred definitions.
    ///
    /// Symbols this table does not define are looked up in `fallback`.
    /// Names that still have no value are left out of the result; a
    /// definition that depends on itself fails with the name and its entry.
    pub fn values(
        &self,
        fallback: Option<&HashMap<String, i64>>,
    ) -> Result<HashMap<String, i64>, (String, ErrorKind)> {
        let mut values = HashMap::new();
        for name in &self.order {
            let mut resolver = Resolver::new(self, fallback, 0);
            match resolver.symbol(name) {
                Ok(Some(value)) => {
                    values.insert(name.clone(), value);
                }
                Ok(None) | Err(ExprError::DivisionByZero) => {}
                Err(ExprError::Cyclic(culprit)) => {
                    return Err((name.clone(), ErrorKind::CyclicSymbol(culprit)))
                }
                Err(ExprError::Undefined(culprit)) => {
                    return Err((name.clone(), ErrorKind::UndefinedSymbol(culprit)))
                }
            }
        }
        Ok(values)
    }
}

/// Expression scope over a symbol table.
///
/// Names the table does not define come from `fallback` (the values of the
/// previous pass) and count as forward references. Without a fallback only
/// symbols defined so far are visible.
pub struct Resolver<'t> {
    table: &'t SymbolTable,
    fallback: Option<&'t HashMap<String, i64>>,
    here: i64,
    visiting: Vec<String>,
    require_known: bool,

    /// Set when a name was not defined earlier in this pass
    pub forward: bool,

    /// Names that had no value anywhere
    pub missing: Vec<String>,
}

impl<'t> Resolver<'t> {
    pub fn new(
        table: &'t SymbolTable,
        fallback: Option<&'t HashMap<String, i64>>,
        here: i64,
    ) -> Self {
        Self {
            table,
            fallback,
            here,
            visiting: Vec::new(),
            require_known: false,
            forward: false,
            missing: Vec::new(),
        }
    }

    /// Fail with [`ExprError::Undefined`] instead of yielding `None`
    pub fn require_known(mut self) -> Self {
        self.require_known = true;
        self
    }
}

impl Scope for Resolver<'_> {
    fn here(&self) -> i64 {
        self.here
    }

    fn symbol(&mut self, name: &str) -> Result<Option<i64>, ExprError> {
        let table = self.table;
        if let Some(entry) = table.lookup(name) {
            return match &entry.binding {
                Binding::Value(value) => Ok(Some(*value)),
                Binding::Deferred { expr, here } => {
                    if self.visiting.iter().any(|v| v == name) {
                        return Err(ExprError::Cyclic(name.to_string()));
                    }
                    self.visiting.push(name.to_string());
                    let outer = std::mem::replace(&mut self.here, *here);
                    let result = expr.eval(self);
                    self.here = outer;
                    self.visiting.pop();
                    result
                }
            };
        }

        self.forward = true;
        if let Some(value) = self.fallback.and_then(|values| values.get(name)) {
            return Ok(Some(*value));
        }
        if self.require_known {
            return Err(ExprError::Undefined(name.to_string()));
        }
        if !self.missing.iter().any(|m| m == name) {
            self.missing.push(name.to_string());
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::expression::parse_expression;
    use crate::assembler::lexer::tokenize;

    fn entry(kind: SymbolKind, value: i64) -> Entry {
        Entry {
            kind,
            binding: Binding::Value(value),
            unit: 0,
            line: 1,
        }
    }

    fn deferred(source: &str) -> Entry {
        Entry {
            kind: SymbolKind::Equ,
            binding: Binding::Deferred {
                expr: parse_expression(&tokenize(source).unwrap()).unwrap(),
                here: 0x100,
            },
            unit: 0,
            line: 1,
        }
    }

    #[test]
    fn test_symbol_table_add_lookup() {
        let mut table = SymbolTable::new();

        assert!(table.define("START", entry(SymbolKind::Label, 0x8000)).is_ok());
        assert!(table.define("LOOP", entry(SymbolKind::Label, 0x8010)).is_ok());

        let start = table.lookup("START").unwrap();
        assert_eq!(start.binding, Binding::Value(0x8000));
        assert!(table.lookup("UNDEFINED").is_none());
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["START", "LOOP"]);
    }

    #[test]
    fn test_assignment_rules() {
        let mut table = SymbolTable::new();
        table.define("L", entry(SymbolKind::Label, 1)).unwrap();
        table.define("E", entry(SymbolKind::Equ, 2)).unwrap();
        table.define("S", entry(SymbolKind::Set, 3)).unwrap();

        assert_eq!(
            table.define("L", entry(SymbolKind::Label, 9)),
            Err(ErrorKind::DuplicateSymbol("L".to_string()))
        );
        assert_eq!(
            table.define("E", entry(SymbolKind::Equ, 9)),
            Err(ErrorKind::DuplicateSymbol("E".to_string()))
        );
        assert_eq!(
            table.define("E", entry(SymbolKind::Set, 9)),
            Err(ErrorKind::SymbolKindConflict("E".to_string()))
        );
        assert_eq!(
            table.define("S", entry(SymbolKind::Equ, 9)),
            Err(ErrorKind::SymbolKindConflict("S".to_string()))
        );

        table.define("S", entry(SymbolKind::Set, 4)).unwrap();
        assert_eq!(table.lookup("S").unwrap().binding, Binding::Value(4));
    }

    #[test]
    fn test_deferred_binding_resolves_later() {
        let mut table = SymbolTable::new();
        table.define("SIZE", deferred("END - START")).unwrap();
        table.define("START", entry(SymbolKind::Label, 0x10)).unwrap();
        table.define("END", entry(SymbolKind::Label, 0x30)).unwrap();

        let values = table.values(None).unwrap();
        assert_eq!(values["SIZE"], 0x20);
    }

    #[test]
    fn test_deferred_binding_uses_its_own_address() {
        let mut table = SymbolTable::new();
        table.define("HERE", deferred("$ + 0 * LATER")).unwrap();
        table.define("LATER", entry(SymbolKind::Equ, 1)).unwrap();

        assert_eq!(table.values(None).unwrap()["HERE"], 0x100);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut table = SymbolTable::new();
        table.define("A1", deferred("B1 + 1")).unwrap();
        table.define("B1", deferred("A1 - 1")).unwrap();

        let (name, kind) = table.values(None).unwrap_err();
        assert_eq!(name, "A1");
        assert_eq!(kind, ErrorKind::CyclicSymbol("A1".to_string()));
    }

    #[test]
    fn test_resolver_fallback_marks_forward() {
        let table = SymbolTable::new();
        let previous = HashMap::from([("NEXT".to_string(), 7)]);

        let mut resolver = Resolver::new(&table, Some(&previous), 0);
        assert_eq!(resolver.symbol("NEXT"), Ok(Some(7)));
        assert!(resolver.forward);
        assert_eq!(resolver.symbol("NOWHERE"), Ok(None));
        assert_eq!(resolver.missing, vec!["NOWHERE".to_string()]);

        let mut strict = Resolver::new(&table, Some(&previous), 0).require_known();
        assert_eq!(
            strict.symbol("NOWHERE"),
            Err(ExprError::Undefined("NOWHERE".to_string()))
        );
    }
}
