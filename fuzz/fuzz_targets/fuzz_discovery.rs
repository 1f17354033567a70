//! Fuzz target for heuristic code discovery.
//!
//! Loads arbitrary bytes, sweeps them for code from an arbitrary entry
//! point, and checks the code map stays consistent with the listing.

#![no_main]

use arbitrary::Arbitrary;
use libz80::{CodeMap, CodeRequest, CodeSource, Discovery, FlatMemory};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    origin: u16,
    bytes: Vec<u8>,
    entry_offset: u8,
    limit: u8,
    max_data_group: u8,
}

fuzz_target!(|input: FuzzInput| {
    if input.bytes.len() > 4096 {
        return;
    }

    let memory = FlatMemory::from_bytes(input.origin, &input.bytes);
    let mut code_map = CodeMap::default();
    let request = CodeRequest {
        start_address: input.origin.wrapping_add(input.entry_offset as u16),
        instruction_limit: input.limit as usize,
        use_heuristic: true,
        max_data_group: input.max_data_group as usize,
    };

    let lines = Discovery::new().parse_code(
        CodeSource::Memory(&memory),
        &request,
        Some(&mut code_map),
    );

    assert!(lines.len() <= request.instruction_limit);
    for line in &lines {
        if line.mnemonic != "DB" {
            assert!(code_map.is_code_start(line.address));
        }
    }
});
