//! Fuzz target for the disassembler.
//!
//! Feeds arbitrary byte sequences to the linear decoder and checks the
//! shape of every line it produces.

#![no_main]

use arbitrary::Arbitrary;
use libz80::{disassemble, DisassemblyOptions};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    bytes: Vec<u8>,
    start_address: u16,
    extended_opcodes: bool,
}

fuzz_target!(|input: FuzzInput| {
    // Limit input size to prevent OOM
    if input.bytes.len() > 65536 {
        return;
    }

    let options = DisassemblyOptions {
        start_address: input.start_address,
        extended_opcodes: input.extended_opcodes,
    };
    let lines = disassemble(&input.bytes, options);

    let mut total = 0usize;
    for line in &lines {
        // Redundant prefixes are consumed without appearing in the bytes,
        // so a line is never longer than a full instruction
        assert!(!line.bytes.is_empty());
        if line.mnemonic != "DB" {
            assert!(line.bytes.len() <= 4);
        }
        total += line.bytes.len();

        // Rendering must not panic
        let _ = line.to_string();
    }
    assert!(total <= input.bytes.len());
});
