//! # Z80 Instruction Toolkit
//!
//! A Z80 instruction model with a decoder, a two-pass assembler and a
//! code/data discovery engine, designed for WebAssembly portability.
//!
//! The decoder and the assembler read the same opcode tables, one forwards
//! and one backwards, so every line the decoder prints assembles back to the
//! bytes it came from.
//!
//! ## Quick Start
//!
//! ```rust
//! use libz80::{assemble, Decoder, FlatMemory, MemoryBus};
//!
//! let output = assemble("ORG $8000\nLD HL,$4000\nLD (HL),$76\nHALT").unwrap();
//!
//! let mut memory = FlatMemory::new();
//! output.load_into(&mut memory);
//!
//! let mut decoder = Decoder::new(&memory);
//! let line = decoder.parse_instruction(0x8000);
//! assert_eq!(line.to_string(), "LD HL,$4000");
//! assert_eq!(decoder.position(), 0x8003);
//! ```
//!
//! ## Architecture
//!
//! - **Table-Driven Design**: all opcode metadata lives in [`opcodes`], built once
//! - **Capabilities as traits**: memory ([`MemoryBus`]), labels ([`LabelLookup`]),
//!   source units ([`SourceResolver`]) and CPU stepping ([`CpuStepper`]) are
//!   supplied by the caller
//! - **WebAssembly Portability**: no OS dependencies, no global mutable state
//!
//! ## Modules
//!
//! - `memory` - MemoryBus trait and a flat 64K implementation
//! - `labels` - label lookup capability
//! - `operand` - registers, conditions and the decoded operand type
//! - `opcodes` - the instruction model shared by decoder and assembler
//! - `disassembler` - decoder, data directives and text formatting
//! - `codemap` - per-address code/data classification
//! - `discovery` - raw, heuristic and execution-trace disassembly
//! - `assembler` - lexer, parser, expressions and the two-pass driver

pub mod assembler;
pub mod codemap;
pub mod disassembler;
pub mod discovery;
pub mod labels;
pub mod memory;
pub mod opcodes;
pub mod operand;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export public API
pub use assembler::{
    assemble, Assembler, AssemblerError, AssemblerOptions, AssemblerOutput, ErrorKind,
    InMemorySources, SourceResolver,
};
pub use codemap::{CodeFlags, CodeMap};
pub use disassembler::{disassemble, CodeLine, Decoder, DecoderOptions, DisassemblyOptions, Flow};
pub use discovery::{CodeRequest, CodeSource, CpuStepper, Discovery, MemoryAccess};
pub use labels::{LabelLookup, LabelMap};
pub use memory::{FlatMemory, MemoryBus};
pub use opcodes::{instruction_set, Encoding, Tags};
pub use operand::{Condition, Operand, OperandKind, Reg16, Reg8};
