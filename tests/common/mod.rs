//! Shared fixtures for integration tests

#![allow(dead_code)]

use libz80::{CpuStepper, Decoder, FlatMemory, MemoryAccess, MemoryBus};

/// Route `tracing` output to the test harness. Level comes from `RUST_LOG`,
/// defaulting to DEBUG.
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    // A second test in the same binary finds the subscriber already installed
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Tiny CPU for tracing tests.
///
/// Executes `NOP`, `LD HL,nn`, `LD (HL),n`, `LD A,(nn)`, `HALT`, `JP nn`
/// and `JR e`; every other instruction only advances the program counter
/// past its encoding.
pub struct TraceCpu {
    pub memory: FlatMemory,
    pc: u16,
    hl: u16,
    accesses: Vec<MemoryAccess>,
}

impl TraceCpu {
    pub fn new(origin: u16, program: &[u8]) -> Self {
        Self {
            memory: FlatMemory::from_bytes(origin, program),
            pc: origin,
            hl: 0,
            accesses: Vec::new(),
        }
    }

    fn word(&self, address: u16) -> u16 {
        u16::from_le_bytes([
            self.memory.read(address),
            self.memory.read(address.wrapping_add(1)),
        ])
    }
}

impl CpuStepper for TraceCpu {
    fn pc(&self) -> u16 {
        self.pc
    }

    fn set_pc(&mut self, address: u16) {
        self.pc = address;
    }

    fn step(&mut self) -> u32 {
        let pc = self.pc;
        let (ticks, next) = {
            let mut decoder = Decoder::new(&self.memory);
            let line = decoder.parse_instruction(pc);
            (u32::from(line.ticks), decoder.position())
        };

        match self.memory.read(pc) {
            0x21 => {
                self.hl = self.word(pc.wrapping_add(1));
                self.pc = next;
            }
            0x36 => {
                let value = self.memory.read(pc.wrapping_add(1));
                self.memory.write(self.hl, value);
                self.accesses.push(MemoryAccess {
                    address: self.hl,
                    is_write: true,
                });
                self.pc = next;
            }
            0x3A => {
                let address = self.word(pc.wrapping_add(1));
                self.accesses.push(MemoryAccess {
                    address,
                    is_write: false,
                });
                self.pc = next;
            }
            // Halted: stay put
            0x76 => {}
            0xC3 => self.pc = self.word(pc.wrapping_add(1)),
            0x18 => {
                let offset = self.memory.read(pc.wrapping_add(1)) as i8;
                self.pc = next.wrapping_add(offset as u16);
            }
            _ => self.pc = next,
        }
        ticks
    }

    fn memory(&self) -> &dyn MemoryBus {
        &self.memory
    }

    fn take_accesses(&mut self) -> Vec<MemoryAccess> {
        std::mem::take(&mut self.accesses)
    }
}

/// Text of every line, as the assembler would read it
pub fn texts(lines: &[libz80::CodeLine]) -> Vec<String> {
    lines.iter().map(ToString::to_string).collect()
}
