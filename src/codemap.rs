//! # Code Map
//!
//! Per-address classification of memory as code or data. Each cell is a set of
//! independent [`CodeFlags`]; an address can be both read and written as data,
//! and data flags never interfere with code flags.
//!
//! For an instruction of length N at address A, A carries `CODE_START` and
//! A+1..A+N-1 carry `CODE_INTERIOR`. Remarking a start with a shorter length
//! clears the interior bytes the longer instruction left behind.

use bitflags::bitflags;

bitflags! {
    /// Classification bits of one address
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CodeFlags: u8 {
        /// First byte of an instruction
        const CODE_START = 1 << 0;
        /// Non-first byte of an instruction
        const CODE_INTERIOR = 1 << 1;
        /// Read as data by executed code
        const DATA_READ = 1 << 2;
        /// Written as data by executed code
        const DATA_WRITE = 1 << 3;

        const CODE = Self::CODE_START.bits() | Self::CODE_INTERIOR.bits();
    }
}

/// Address space classification, one flag cell per address.
///
/// # Examples
///
/// ```
/// use libz80::CodeMap;
///
/// let mut map = CodeMap::default();
/// map.mark_code(0x8000, 3, true);
///
/// assert!(map.is_code_start(0x8000));
/// assert!(map.is_code_interior(0x8002));
/// assert_eq!(map.instruction_start(0x8002), Some(0x8000));
/// assert_eq!(map.instruction_length(0x8000), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMap {
    cells: Vec<CodeFlags>,
}

impl Default for CodeMap {
    /// Full 64K map with every address unclassified
    fn default() -> Self {
        Self::new(0x10000, CodeFlags::empty())
    }
}

impl CodeMap {
    /// Create a map of `size` cells, each set to `fill`. Addresses wrap at `size`.
    pub fn new(size: usize, fill: CodeFlags) -> Self {
        Self {
            cells: vec![fill; size.max(1)],
        }
    }

    /// Number of cells
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    fn index(&self, address: u16) -> usize {
        address as usize % self.cells.len()
    }

    /// Flags at `address`
    pub fn flags(&self, address: u16) -> CodeFlags {
        self.cells[self.index(address)]
    }

    fn update(&mut self, address: u16, flags: CodeFlags, set: bool) {
        let index = self.index(address);
        self.cells[index].set(flags, set);
    }

    pub fn is_code_start(&self, address: u16) -> bool {
        self.flags(address).contains(CodeFlags::CODE_START)
    }

    pub fn is_code_interior(&self, address: u16) -> bool {
        self.flags(address).contains(CodeFlags::CODE_INTERIOR)
    }

    /// Start or interior
    pub fn is_code(&self, address: u16) -> bool {
        self.flags(address).intersects(CodeFlags::CODE)
    }

    pub fn is_data_read(&self, address: u16) -> bool {
        self.flags(address).contains(CodeFlags::DATA_READ)
    }

    pub fn is_data_written(&self, address: u16) -> bool {
        self.flags(address).contains(CodeFlags::DATA_WRITE)
    }

    /// No flags at all
    pub fn is_unclassified(&self, address: u16) -> bool {
        self.flags(address).is_empty()
    }

    /// Mark (or unmark) `length` bytes at `address` as one instruction.
    ///
    /// Either way, interior bytes directly after the span are orphans of a
    /// previously longer instruction and are cleared.
    pub fn mark_code(&mut self, address: u16, length: usize, set: bool) {
        if length == 0 {
            return;
        }

        self.update(address, CodeFlags::CODE, false);
        self.update(address, CodeFlags::CODE_START, set);
        for offset in 1..length {
            let interior = address.wrapping_add(offset as u16);
            self.update(interior, CodeFlags::CODE, false);
            self.update(interior, CodeFlags::CODE_INTERIOR, set);
        }

        let mut orphan = address.wrapping_add(length as u16);
        for _ in 0..self.cells.len() {
            if orphan == address || !self.is_code_interior(orphan) {
                break;
            }
            self.update(orphan, CodeFlags::CODE_INTERIOR, false);
            orphan = orphan.wrapping_add(1);
        }
    }

    /// Mark (or unmark) `length` bytes at `address` as read or written data
    pub fn mark_data(&mut self, address: u16, length: usize, is_write: bool, set: bool) {
        let flag = if is_write {
            CodeFlags::DATA_WRITE
        } else {
            CodeFlags::DATA_READ
        };
        for offset in 0..length {
            self.update(address.wrapping_add(offset as u16), flag, set);
        }
    }

    /// Start address of the instruction covering `address`, if the map records one
    pub fn instruction_start(&self, address: u16) -> Option<u16> {
        let mut current = address;
        for _ in 0..self.cells.len() {
            let flags = self.flags(current);
            if flags.contains(CodeFlags::CODE_START) {
                return Some(current);
            }
            if !flags.contains(CodeFlags::CODE_INTERIOR) {
                return None;
            }
            current = current.wrapping_sub(1);
        }
        None
    }

    /// Length of the instruction recorded at `start`, or 0 if `start` is not a code start
    pub fn instruction_length(&self, start: u16) -> usize {
        if !self.is_code_start(start) {
            return 0;
        }
        let mut length = 1;
        while length < self.cells.len()
            && self.is_code_interior(start.wrapping_add(length as u16))
        {
            length += 1;
        }
        length
    }

    /// Every recorded instruction start, in address order
    pub fn code_starts(&self) -> impl Iterator<Item = u16> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, flags)| flags.contains(CodeFlags::CODE_START))
            .map(|(index, _)| index as u16)
    }

    /// Union `other` into this map, keeping existing code boundaries.
    ///
    /// Data flags are always merged; a code span from `other` is copied only
    /// where this map has no code marks yet.
    pub fn merge(&mut self, other: &CodeMap) {
        for start in other.code_starts() {
            let length = other.instruction_length(start);
            let free = (0..length).all(|offset| !self.is_code(start.wrapping_add(offset as u16)));
            if free {
                self.mark_code(start, length, true);
            }
        }
        for index in 0..other.cells.len().min(0x10000) {
            let data = other.cells[index] & (CodeFlags::DATA_READ | CodeFlags::DATA_WRITE);
            if !data.is_empty() {
                self.update(index as u16, data, true);
            }
        }
    }
}
