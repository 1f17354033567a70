//! Label lookup capability used by the decoder to name addresses

use std::collections::BTreeMap;

/// Maps addresses to symbolic names.
///
/// The decoder asks for a label whenever an operand or an instruction carries
/// a 16-bit address; `None` means the address has no name.
pub trait LabelLookup {
    /// Label attached to `address`, if any
    fn get_label(&self, address: u16) -> Option<&str>;

    /// Attach `name` to `address`, replacing any previous label there
    fn add_label(&mut self, address: u16, name: &str);
}

/// In-memory label table, ordered by address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    labels: BTreeMap<u16, String>,
}

impl LabelMap {
    /// Create an empty label map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of labelled addresses
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when no address carries a label
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate `(address, name)` pairs in address order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &str)> {
        self.labels.iter().map(|(addr, name)| (*addr, name.as_str()))
    }
}

impl LabelLookup for LabelMap {
    fn get_label(&self, address: u16) -> Option<&str> {
        self.labels
            .get(&address)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    fn add_label(&mut self, address: u16, name: &str) {
        self.labels.insert(address, name.to_string());
    }
}

impl FromIterator<(u16, String)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (u16, String)>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}
