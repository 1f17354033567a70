//! # Memory Bus Abstraction
//!
//! This module provides the `MemoryBus` trait, the byte-source capability that the
//! decoder, the discovery engine and the assembler's loader all work through.
//!
//! ## Design Principles
//!
//! The MemoryBus trait follows Z80 hardware behavior:
//! - No bus errors - reads/writes always succeed
//! - Addresses are 16 bits wide and wrap at 0xFFFF
//! - Reads have no side effects, so a disassembler can peek freely
//! - Writes to ROM/unmapped regions may be ignored

/// Memory bus trait for reading and writing bytes of the 64K address space.
///
/// # Design
///
/// - `read(&self)`: peek without side effects; used by the decoder
/// - `write(&mut self)`: poke; used by execution tracing and by the assembler loader
/// - No error types: the address space is total
///
/// # Examples
///
/// ```
/// use libz80::{MemoryBus, FlatMemory};
///
/// let mut mem = FlatMemory::new();
/// mem.write(0x1234, 0x42);
/// assert_eq!(mem.read(0x1234), 0x42);
/// ```
///
/// ## Implementing Custom Memory
///
/// ```
/// use libz80::MemoryBus;
///
/// struct RomRamMemory {
///     rom: [u8; 0x4000],  // 16KB ROM (0x0000-0x3FFF)
///     ram: [u8; 0xC000],  // 48KB RAM (0x4000-0xFFFF)
/// }
///
/// impl MemoryBus for RomRamMemory {
///     fn read(&self, addr: u16) -> u8 {
///         if addr < 0x4000 {
///             self.rom[addr as usize]
///         } else {
///             self.ram[(addr - 0x4000) as usize]
///         }
///     }
///
///     fn write(&mut self, addr: u16, value: u8) {
///         if addr >= 0x4000 {
///             self.ram[(addr - 0x4000) as usize] = value;
///         }
///         // Writes to ROM are silently ignored
///     }
/// }
/// ```
pub trait MemoryBus {
    /// Reads a byte from the specified 16-bit address without side effects.
    ///
    /// This method must never panic.
    fn read(&self, addr: u16) -> u8;

    /// Writes a byte to the specified 16-bit address.
    ///
    /// This method must never panic. If the address is read-only or unmapped,
    /// implementations may ignore the write.
    fn write(&mut self, addr: u16, value: u8);
}

impl<M: MemoryBus + ?Sized> MemoryBus for &mut M {
    fn read(&self, addr: u16) -> u8 {
        (**self).read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        (**self).write(addr, value);
    }
}

/// Simple 64KB flat memory implementation.
///
/// All 65536 addresses (0x0000-0xFFFF) are mapped to a single contiguous RAM
/// array initialized to 0x00. Useful for tests, for analysing raw images, and
/// as the target of [`AssemblerOutput::load_into`](crate::assembler::AssemblerOutput::load_into).
///
/// # Examples
///
/// ```
/// use libz80::{FlatMemory, MemoryBus};
///
/// let mem = FlatMemory::from_bytes(0x8000, &[0x3E, 0x01]);
/// assert_eq!(mem.read(0x8000), 0x3E);
/// assert_eq!(mem.read(0x8001), 0x01);
/// ```
#[derive(Clone)]
pub struct FlatMemory {
    /// 64KB contiguous memory array
    data: Box<[u8; 65536]>,
}

impl FlatMemory {
    /// Creates a new FlatMemory instance with all bytes initialized to zero.
    pub fn new() -> Self {
        Self {
            data: Box::new([0; 65536]),
        }
    }

    /// Creates memory holding `bytes` at `origin`, wrapping at the top of the
    /// address space.
    pub fn from_bytes(origin: u16, bytes: &[u8]) -> Self {
        let mut memory = Self::new();
        memory.load(origin, bytes);
        memory
    }

    /// Copies `bytes` into memory starting at `origin`.
    pub fn load(&mut self, origin: u16, bytes: &[u8]) {
        for (offset, &byte) in bytes.iter().enumerate() {
            self.data[origin.wrapping_add(offset as u16) as usize] = byte;
        }
    }

    /// Returns the whole address space as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlatMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatMemory").finish_non_exhaustive()
    }
}

impl MemoryBus for FlatMemory {
    fn read(&self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.data[addr as usize] = value;
    }
}
