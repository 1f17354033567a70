//! Source map for bidirectional mapping between emitted bytes and source lines

/// Bidirectional mapping between binary and source locations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    /// Source unit identifiers, indexed by [`SourceLocation::unit`]
    units: Vec<String>,

    /// Forward map: emitted range → source location
    /// Sorted by start address for binary search
    address_to_source: Vec<(AddressRange, SourceLocation)>,

    /// Reverse map: source location → emitted range
    /// Sorted by location for binary search
    source_to_address: Vec<(SourceLocation, AddressRange)>,
}

/// A line of one source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    /// Index of the unit (see [`SourceMap::unit_name`])
    pub unit: usize,

    /// Line number (1-indexed)
    pub line: usize,
}

/// A range of emitted addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    /// Starting address (inclusive)
    pub start: u16,

    /// Number of bytes
    pub length: usize,
}

impl AddressRange {
    pub fn contains(&self, address: u16) -> bool {
        (address.wrapping_sub(self.start) as usize) < self.length
    }
}

impl SourceMap {
    /// Create a new empty source map
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of unit `name`, registering it on first use
    pub fn unit_index(&mut self, name: &str) -> usize {
        match self.units.iter().position(|unit| unit == name) {
            Some(index) => index,
            None => {
                self.units.push(name.to_string());
                self.units.len() - 1
            }
        }
    }

    /// Identifier of unit `index`
    pub fn unit_name(&self, index: usize) -> Option<&str> {
        self.units.get(index).map(String::as_str)
    }

    /// Record that `range` was emitted by `location`
    pub fn add_mapping(&mut self, range: AddressRange, location: SourceLocation) {
        if range.length == 0 {
            return;
        }
        self.address_to_source.push((range, location));
        self.source_to_address.push((location, range));
    }

    /// Source line that emitted the byte at `address`
    pub fn get_source_location(&self, address: u16) -> Option<SourceLocation> {
        let end = self
            .address_to_source
            .partition_point(|(range, _)| range.start <= address);
        self.address_to_source[..end]
            .iter()
            .rev()
            .chain(&self.address_to_source[end..])
            .find(|(range, _)| range.contains(address))
            .map(|(_, location)| *location)
    }

    /// Bytes emitted by `line` of unit `unit`
    pub fn get_address_range(&self, unit: &str, line: usize) -> Option<AddressRange> {
        let location = SourceLocation {
            unit: self.units.iter().position(|u| u == unit)?,
            line,
        };
        self.source_to_address
            .binary_search_by_key(&location, |(l, _)| *l)
            .ok()
            .map(|idx| self.source_to_address[idx].1)
    }

    /// Finalize the source map (sort for binary search)
    pub fn finalize(&mut self) {
        self.address_to_source
            .sort_by_key(|(range, _)| range.start);
        self.source_to_address.sort_by_key(|(location, _)| *location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_map_add_lookup() {
        let mut map = SourceMap::new();
        let main = map.unit_index("main");
        let lib = map.unit_index("lib.asm");
        assert_eq!(map.unit_index("main"), main);

        map.add_mapping(
            AddressRange {
                start: 0x8003,
                length: 2,
            },
            SourceLocation { unit: lib, line: 4 },
        );
        map.add_mapping(
            AddressRange {
                start: 0x8000,
                length: 3,
            },
            SourceLocation { unit: main, line: 1 },
        );
        map.finalize();

        assert_eq!(
            map.get_source_location(0x8002),
            Some(SourceLocation { unit: main, line: 1 })
        );
        assert_eq!(
            map.get_source_location(0x8004),
            Some(SourceLocation { unit: lib, line: 4 })
        );
        assert!(map.get_source_location(0x8005).is_none());
        assert!(map.get_source_location(0x7FFF).is_none());

        let range = map.get_address_range("lib.asm", 4).unwrap();
        assert_eq!((range.start, range.length), (0x8003, 2));
        assert_eq!(map.unit_name(lib), Some("lib.asm"));
        assert!(map.get_address_range("other", 4).is_none());
    }

    #[test]
    fn test_range_wraps_at_top_of_memory() {
        let range = AddressRange {
            start: 0xFFFF,
            length: 2,
        };
        assert!(range.contains(0xFFFF));
        assert!(range.contains(0x0000));
        assert!(!range.contains(0x0001));
    }
}
