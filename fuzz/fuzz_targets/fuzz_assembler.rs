//! Fuzz target for the assembler.
//!
//! Arbitrary text goes through the lexer, the parser, expression
//! evaluation and the pass loop; errors are fine, panics are not.

#![no_main]

use arbitrary::Arbitrary;
use libz80::{Assembler, AssemblerOptions, InMemorySources};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    main: String,
    include: String,
    extended_opcodes: bool,
}

fuzz_target!(|input: FuzzInput| {
    let sources = InMemorySources::new()
        .with("main", &input.main)
        .with("lib.asm", &input.include);
    let assembler = Assembler::new(sources).with_options(AssemblerOptions {
        extended_opcodes: input.extended_opcodes,
    });

    if let Ok(output) = assembler.compile("main") {
        for symbol in &output.symbols {
            assert!(output.symbol(&symbol.name).is_some());
        }
    }

    let _ = libz80::assemble(&input.main);
});
