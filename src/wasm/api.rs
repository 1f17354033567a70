//! WASM API for the Z80 toolkit.
//!
//! Provides JavaScript-callable interfaces for memory access, assembly,
//! disassembly and code discovery over one shared 64K address space.

use crate::disassembler::formatter::format_listing_line;
use crate::assembler::AssemblerOptions;
use crate::{
    Assembler, CodeLine, CodeMap, CodeRequest, CodeSource, CpuStepper, Decoder, DecoderOptions,
    Discovery, FlatMemory, InMemorySources, LabelMap, MemoryAccess, MemoryBus,
};
use wasm_bindgen::prelude::*;

/// JavaScript-compatible error wrapper
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct JsError {
    message: String,
}

#[wasm_bindgen]
impl JsError {
    #[wasm_bindgen(constructor)]
    pub fn new(message: &str) -> JsError {
        JsError {
            message: message.to_string(),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

/// Result of assembly operation
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct AssemblyResult {
    success: bool,
    machine_code: Vec<u8>,
    start_addr: u16,
    end_addr: u16,
    error_message: Option<String>,
    error_line: Option<usize>,
    warnings: Vec<String>,
}

#[wasm_bindgen]
impl AssemblyResult {
    #[wasm_bindgen(getter)]
    pub fn success(&self) -> bool {
        self.success
    }

    #[wasm_bindgen(getter)]
    pub fn machine_code(&self) -> Vec<u8> {
        self.machine_code.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn start_addr(&self) -> u16 {
        self.start_addr
    }

    #[wasm_bindgen(getter)]
    pub fn end_addr(&self) -> u16 {
        self.end_addr
    }

    #[wasm_bindgen(getter)]
    pub fn error_message(&self) -> Option<String> {
        self.error_message.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn error_line(&self) -> Option<usize> {
        self.error_line
    }

    /// Warnings as `unit:line: warning: message` strings
    #[wasm_bindgen(getter)]
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }
}

/// One listing row
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct DisassemblyLine {
    address: u16,
    bytes: Vec<u8>,
    mnemonic: String,
    text: String,
    listing: String,
    ticks: u8,
    ticks_alt: u8,
}

impl From<&CodeLine> for DisassemblyLine {
    fn from(line: &CodeLine) -> Self {
        DisassemblyLine {
            address: line.address,
            bytes: line.bytes.clone(),
            mnemonic: line.mnemonic.to_string(),
            text: line.to_string(),
            listing: format_listing_line(line),
            ticks: line.ticks,
            ticks_alt: line.ticks_alt,
        }
    }
}

#[wasm_bindgen]
impl DisassemblyLine {
    #[wasm_bindgen(getter)]
    pub fn address(&self) -> u16 {
        self.address
    }

    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn mnemonic(&self) -> String {
        self.mnemonic.clone()
    }

    /// Instruction text without address or label
    #[wasm_bindgen(getter)]
    pub fn text(&self) -> String {
        self.text.clone()
    }

    /// Full listing row: address, bytes, label and text
    #[wasm_bindgen(getter)]
    pub fn listing(&self) -> String {
        self.listing.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn ticks(&self) -> u8 {
        self.ticks
    }

    #[wasm_bindgen(getter)]
    pub fn ticks_alt(&self) -> u8 {
        self.ticks_alt
    }
}

/// Trace stepper driven by a JavaScript callback.
///
/// The callback receives the current program counter and returns either the
/// next program counter, or an array `[next_pc, address, value, ...]` whose
/// address/value pairs are memory writes made by the instruction. A callback
/// that throws or returns anything else leaves the program counter where it
/// was.
struct JsStepper<'a> {
    memory: &'a mut FlatMemory,
    pc: u16,
    on_step: &'a js_sys::Function,
    accesses: Vec<MemoryAccess>,
}

/// Apply one step result (the next program counter, then address/value
/// pairs) and return the new program counter, if there was one
fn apply_step(memory: &mut FlatMemory, values: &[f64], accesses: &mut Vec<MemoryAccess>) -> Option<u16> {
    let (&next, writes) = values.split_first()?;
    for pair in writes.chunks_exact(2) {
        let address = pair[0] as u16;
        memory.write(address, pair[1] as u8);
        accesses.push(MemoryAccess {
            address,
            is_write: true,
        });
    }
    Some(next as u16)
}

impl CpuStepper for JsStepper<'_> {
    fn pc(&self) -> u16 {
        self.pc
    }

    fn set_pc(&mut self, address: u16) {
        self.pc = address;
    }

    fn step(&mut self) -> u32 {
        let Ok(result) = self.on_step.call1(&JsValue::NULL, &JsValue::from(self.pc)) else {
            return 0;
        };
        let values: Vec<f64> = if let Some(next) = result.as_f64() {
            vec![next]
        } else if js_sys::Array::is_array(&result) {
            js_sys::Array::from(&result)
                .iter()
                .map_while(|value| value.as_f64())
                .collect()
        } else {
            Vec::new()
        };
        if let Some(next) = apply_step(self.memory, &values, &mut self.accesses) {
            self.pc = next;
        }
        0
    }

    fn memory(&self) -> &dyn MemoryBus {
        &*self.memory
    }

    fn take_accesses(&mut self) -> Vec<MemoryAccess> {
        std::mem::take(&mut self.accesses)
    }
}

/// Address space, labels and code map shared by the JavaScript front end
#[wasm_bindgen]
pub struct Z80Workbench {
    memory: FlatMemory,
    labels: LabelMap,
    code_map: CodeMap,
    extended_opcodes: bool,
}

impl Default for Z80Workbench {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl Z80Workbench {
    /// Create a workbench with zeroed memory and an empty code map
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Z80Workbench {
            memory: FlatMemory::new(),
            labels: LabelMap::new(),
            code_map: CodeMap::default(),
            extended_opcodes: false,
        }
    }

    /// Enable Z80N opcodes for assembly and decoding
    #[wasm_bindgen(setter)]
    pub fn set_extended_opcodes(&mut self, enabled: bool) {
        self.extended_opcodes = enabled;
    }

    #[wasm_bindgen(getter)]
    pub fn extended_opcodes(&self) -> bool {
        self.extended_opcodes
    }

    // Memory access methods

    /// Read a single byte from memory
    pub fn read_memory(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    /// Write a single byte to memory
    pub fn write_memory(&mut self, addr: u16, value: u8) {
        self.memory.write(addr, value);
    }

    /// Read a 256-byte page from memory (for efficient display)
    pub fn get_memory_page(&self, page: u8) -> Vec<u8> {
        let start = (page as u16) << 8;
        (0..256).map(|i| self.memory.read(start + i)).collect()
    }

    /// Copy a program into memory
    pub fn load_program(&mut self, program: &[u8], start_addr: u16) {
        self.memory.load(start_addr, program);
    }

    /// Forget every code classification
    pub fn clear_code_map(&mut self) {
        self.code_map = CodeMap::default();
    }

    /// Assemble Z80 source, load the result and adopt its labels
    pub fn assemble_and_load(&mut self, source: String) -> AssemblyResult {
        let assembler = Assembler::new(InMemorySources::new().with("main", &source))
            .with_options(AssemblerOptions {
                extended_opcodes: self.extended_opcodes,
            });

        match assembler.compile("main") {
            Ok(output) => {
                output.load_into(&mut self.memory);
                self.labels = output.labels();
                let start_addr = output.origin;
                AssemblyResult {
                    success: true,
                    end_addr: start_addr.wrapping_add(output.bytes.len() as u16),
                    machine_code: output.bytes,
                    start_addr,
                    error_message: None,
                    error_line: None,
                    warnings: output.warnings.iter().map(ToString::to_string).collect(),
                }
            }
            Err(error) => AssemblyResult {
                success: false,
                machine_code: Vec::new(),
                start_addr: 0,
                end_addr: 0,
                error_message: Some(error.to_string()),
                error_line: Some(error.line),
                warnings: Vec::new(),
            },
        }
    }

    /// Decode `num_instructions` instructions linearly from `start_addr`
    pub fn disassemble(&self, start_addr: u16, num_instructions: u32) -> Vec<JsValue> {
        let mut decoder = Decoder::new(&self.memory)
            .with_labels(&self.labels)
            .with_options(DecoderOptions {
                extended_opcodes: self.extended_opcodes,
            });

        let mut address = start_addr;
        (0..num_instructions)
            .map(|_| {
                let line = decoder.parse_instruction(address);
                address = decoder.position();
                JsValue::from(DisassemblyLine::from(&line))
            })
            .collect()
    }

    /// Listing that separates code from data, refining the workbench code map
    pub fn discover(&mut self, start_addr: u16, limit: u32, use_heuristic: bool) -> Vec<JsValue> {
        let request = CodeRequest {
            start_address: start_addr,
            instruction_limit: limit as usize,
            use_heuristic,
            ..Default::default()
        };
        let discovery = Discovery::new()
            .with_labels(&self.labels)
            .with_options(DecoderOptions {
                extended_opcodes: self.extended_opcodes,
            });

        discovery
            .parse_code(
                CodeSource::Memory(&self.memory),
                &request,
                Some(&mut self.code_map),
            )
            .iter()
            .map(|line| JsValue::from(DisassemblyLine::from(line)))
            .collect()
    }

    /// Listing of the instructions a JavaScript CPU executes from `start_addr`.
    ///
    /// `on_step(pc)` runs one instruction and returns the new program counter,
    /// or `[pc, address, value, ...]` when the instruction wrote memory. Writes
    /// land in workbench memory before the next instruction is decoded.
    pub fn trace(&mut self, start_addr: u16, limit: u32, on_step: js_sys::Function) -> Vec<JsValue> {
        let request = CodeRequest {
            start_address: start_addr,
            instruction_limit: limit as usize,
            ..Default::default()
        };
        let discovery = Discovery::new()
            .with_labels(&self.labels)
            .with_options(DecoderOptions {
                extended_opcodes: self.extended_opcodes,
            });
        let mut stepper = JsStepper {
            memory: &mut self.memory,
            pc: start_addr,
            on_step: &on_step,
            accesses: Vec::new(),
        };

        discovery
            .parse_code(
                CodeSource::Execution(&mut stepper),
                &request,
                Some(&mut self.code_map),
            )
            .iter()
            .map(|line| JsValue::from(DisassemblyLine::from(line)))
            .collect()
    }

    /// Mark `length` bytes at `addr` as one instruction
    pub fn mark_code(&mut self, addr: u16, length: usize) {
        self.code_map.mark_code(addr, length, true);
    }
}

/// Assemble a standalone source text, without any workbench state
#[wasm_bindgen]
pub fn assemble_source(source: &str) -> Result<Vec<u8>, JsError> {
    crate::assemble(source)
        .map(|output| output.bytes)
        .map_err(|error| JsError::new(&error.to_string()))
}
