//! # Discovery Engine
//!
//! Decides which bytes of memory are code and renders a listing from that
//! decision. Three strategies are available:
//!
//! - **Raw**: linear decoding from the start address with no classification.
//!   Used when there is no code map, no heuristic and no CPU.
//! - **Heuristic**: a static control-flow sweep. Conditional branch and call
//!   targets are queued for later sweeps; unconditional jumps and returns end
//!   the current sweep without following the target. Bytes nobody reached stay
//!   unclassified and are listed as data.
//! - **Execution trace**: a [`CpuStepper`] runs the program and every visited
//!   PC is marked as code, decoded from memory as it is at that moment so that
//!   self-modifying code is classified by what actually ran.
//!
//! Results are written into the caller's [`CodeMap`] when one is given, so the
//! same map can be refined across several passes.

use crate::codemap::CodeMap;
use crate::disassembler::{CodeLine, Decoder, DecoderOptions, Flow};
use crate::labels::LabelLookup;
use crate::memory::MemoryBus;

/// A data access reported by a CPU during one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccess {
    pub address: u16,
    pub is_write: bool,
}

/// CPU capability driven by execution-trace discovery.
///
/// The CPU interpreter itself lives outside this crate; anything that can
/// report and move its program counter, execute one instruction, and expose
/// its memory can be traced.
pub trait CpuStepper {
    /// Current program counter
    fn pc(&self) -> u16;

    /// Move the program counter
    fn set_pc(&mut self, address: u16);

    /// Execute one instruction, returning the clock ticks it took
    fn step(&mut self) -> u32;

    /// The live address space the CPU executes from
    fn memory(&self) -> &dyn MemoryBus;

    /// Data accesses made since the last call. CPUs that do not track them
    /// report none.
    fn take_accesses(&mut self) -> Vec<MemoryAccess> {
        Vec::new()
    }
}

/// Where discovery reads its bytes from
pub enum CodeSource<'a> {
    /// Static memory image
    Memory(&'a dyn MemoryBus),
    /// A CPU to trace; its memory is also used for the listing
    Execution(&'a mut dyn CpuStepper),
}

/// Parameters of one discovery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRequest {
    /// First address of the listing, and the entry point for tracing
    pub start_address: u16,

    /// Maximum listing lines; also the number of instructions traced
    pub instruction_limit: usize,

    /// Run the static control-flow sweep before listing
    pub use_heuristic: bool,

    /// Maximum bytes per `DB` line; 0 groups a whole data run into one line
    pub max_data_group: usize,
}

impl Default for CodeRequest {
    fn default() -> Self {
        Self {
            start_address: 0x0000,
            instruction_limit: 64,
            use_heuristic: false,
            max_data_group: 8,
        }
    }
}

/// Code/data discovery over a byte source
#[derive(Default)]
pub struct Discovery<'a> {
    labels: Option<&'a dyn LabelLookup>,
    options: DecoderOptions,
}

impl<'a> Discovery<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name addresses in the listing
    pub fn with_labels(mut self, labels: &'a dyn LabelLookup) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Decoder options used for every decode
    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    fn decoder<'m>(&'m self, memory: &'m dyn MemoryBus) -> Decoder<'m, dyn MemoryBus + 'm> {
        let decoder = Decoder::new(memory).with_options(self.options);
        match self.labels {
            Some(labels) => decoder.with_labels(labels),
            None => decoder,
        }
    }

    /// Classify memory and produce a listing starting at `request.start_address`.
    ///
    /// With no code map, no heuristic and a static source the listing is a raw
    /// linear decode. Otherwise classifications go into `code_map` (or a
    /// scratch map) and the listing shows code starts as instructions and
    /// everything else as grouped `DB` lines.
    pub fn parse_code(
        &self,
        source: CodeSource<'_>,
        request: &CodeRequest,
        code_map: Option<&mut CodeMap>,
    ) -> Vec<CodeLine> {
        tracing::debug!(
            start = request.start_address,
            limit = request.instruction_limit,
            heuristic = request.use_heuristic,
            external_map = code_map.is_some(),
            "parse_code"
        );
        let mut scratch = None;
        match source {
            CodeSource::Memory(memory) => {
                let map = match code_map {
                    Some(map) => map,
                    None if request.use_heuristic => scratch.insert(CodeMap::default()),
                    None => return self.raw_listing(memory, request),
                };
                if request.use_heuristic {
                    self.sweep(memory, request.start_address, map);
                }
                self.listing(memory, map, request)
            }
            CodeSource::Execution(cpu) => {
                let map = match code_map {
                    Some(map) => map,
                    None => scratch.insert(CodeMap::default()),
                };
                self.trace(cpu, request, map);
                if request.use_heuristic {
                    self.sweep(cpu.memory(), request.start_address, map);
                }
                self.listing(cpu.memory(), map, request)
            }
        }
    }

    fn raw_listing(&self, memory: &dyn MemoryBus, request: &CodeRequest) -> Vec<CodeLine> {
        let mut decoder = self.decoder(memory);
        let mut address = request.start_address;
        let mut lines = Vec::with_capacity(request.instruction_limit.min(1024));
        while lines.len() < request.instruction_limit {
            let line = decoder.parse_instruction(address);
            let next = decoder.position();
            let skipped = discarded_prefixes(&line, address, next);
            if skipped > 0 {
                // Listed as data; the next round decodes the instruction without them
                address = push_data(&mut decoder, address, skipped, request, &mut lines);
                continue;
            }
            lines.push(line);
            address = next;
        }
        lines
    }

    /// Static sweep from `entry`. Existing code marks are never overwritten; a
    /// sweep that runs into one stops there.
    fn sweep(&self, memory: &dyn MemoryBus, entry: u16, map: &mut CodeMap) {
        let mut decoder = self.decoder(memory);
        let mut worklist = vec![entry];

        while let Some(start) = worklist.pop() {
            let mut address = start;
            loop {
                if map.is_code(address) {
                    break;
                }
                let line = decoder.parse_instruction(address);
                let next = decoder.position();
                let length = next.wrapping_sub(address) as usize;
                if (1..length).any(|offset| map.is_code(address.wrapping_add(offset as u16))) {
                    break;
                }
                let skipped = discarded_prefixes(&line, address, next);
                map.mark_code(address.wrapping_add(skipped as u16), length - skipped, true);

                match line.flow() {
                    Flow::Next | Flow::ConditionalReturn => {}
                    Flow::Branch { target } => worklist.push(target),
                    Flow::Call { target, .. } => worklist.extend(target),
                    Flow::Jump { .. } | Flow::Return => break,
                }
                address = next;
            }
        }
    }

    /// Step the CPU from the start address, marking every visited instruction.
    fn trace(&self, cpu: &mut dyn CpuStepper, request: &CodeRequest, map: &mut CodeMap) {
        cpu.set_pc(request.start_address);
        for _ in 0..request.instruction_limit {
            let pc = cpu.pc();
            let (start, length) = {
                // Decode fresh every time: earlier steps may have rewritten these bytes
                let mut decoder = self.decoder(cpu.memory());
                let line = decoder.parse_instruction(pc);
                let next = decoder.position();
                let skipped = discarded_prefixes(&line, pc, next);
                (pc.wrapping_add(skipped as u16), line.length())
            };
            tracing::trace!(pc, length, "traced instruction");
            map.mark_code(start, length, true);

            cpu.step();
            for access in cpu.take_accesses() {
                map.mark_data(access.address, 1, access.is_write, true);
            }
        }
    }

    fn listing(&self, memory: &dyn MemoryBus, map: &CodeMap, request: &CodeRequest) -> Vec<CodeLine> {
        let mut decoder = self.decoder(memory);
        let mut lines = Vec::new();
        let mut address = request.start_address;
        let mut walked = 0usize;

        while lines.len() < request.instruction_limit && walked < 0x10000 {
            if map.is_code_start(address) {
                let mut line = decoder.parse_instruction(address);
                let next = decoder.position();
                let skipped = discarded_prefixes(&line, address, next);
                if skipped > 0 {
                    let start = push_data(&mut decoder, address, skipped, request, &mut lines);
                    if lines.len() >= request.instruction_limit {
                        break;
                    }
                    line = decoder.parse_instruction(start);
                }
                walked += next.wrapping_sub(address) as usize;
                address = next;
                lines.push(line);
                continue;
            }

            let mut count = 1;
            while walked + count < 0x10000
                && (request.max_data_group == 0 || count < request.max_data_group)
            {
                let next = address.wrapping_add(count as u16);
                if map.is_code_start(next) || self.has_label(next) {
                    break;
                }
                count += 1;
            }
            lines.push(decoder.parse_db(address, count));
            walked += count;
            address = address.wrapping_add(count as u16);
        }
        lines
    }

    fn has_label(&self, address: u16) -> bool {
        self.labels
            .and_then(|labels| labels.get_label(address))
            .is_some_and(|name| !name.is_empty())
    }
}

/// Prefix bytes a decode at `address` consumed without making them part of `line`
fn discarded_prefixes(line: &CodeLine, address: u16, next: u16) -> usize {
    (next.wrapping_sub(address) as usize).saturating_sub(line.length())
}

/// `DB` lines for `count` bytes at `address`, split by `max_data_group` and
/// stopping at the line limit. Returns the first address not listed.
fn push_data(
    decoder: &mut Decoder<'_, dyn MemoryBus + '_>,
    mut address: u16,
    mut count: usize,
    request: &CodeRequest,
    lines: &mut Vec<CodeLine>,
) -> u16 {
    while count > 0 && lines.len() < request.instruction_limit {
        let size = match request.max_data_group {
            0 => count,
            group => count.min(group),
        };
        lines.push(decoder.parse_db(address, size));
        address = address.wrapping_add(size as u16);
        count -= size;
    }
    address
}
