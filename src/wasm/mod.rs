//! WebAssembly bindings for libz80.
//!
//! This module provides JavaScript-callable interfaces to the assembler,
//! the decoder and the discovery engine, for browser-based Z80 tooling.

pub mod api;

pub use api::Z80Workbench;
