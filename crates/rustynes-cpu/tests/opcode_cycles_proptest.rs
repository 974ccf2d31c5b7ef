//! Property test: every opcode's measured step cost is at least its
//! tabulated base cycle count.
//!
//! Page crossing, branch taken/not-taken, and interrupt-sequence variance
//! can only ever add cycles relative to `OPCODE_TABLE`, never subtract.

use proptest::prelude::*;
use rustynes_cpu::{Bus, Cpu, OPCODE_TABLE};

struct FlatBus {
    memory: [u8; 0x10000],
}

impl FlatBus {
    fn new(opcode: u8) -> Self {
        let mut memory = [0xEAu8; 0x10000]; // fill with NOP so stray fetches are harmless
        memory[0x8000] = opcode;
        // Operand bytes: zero is always a legal encoding for any addressing mode.
        memory[0x8001] = 0x00;
        memory[0x8002] = 0x80; // absolute/indirect high byte stays in ROM space
        Self { memory }
    }
}

impl Bus for FlatBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.memory[addr as usize] = value;
    }
}

proptest! {
    #[test]
    fn step_cycles_never_below_table_minimum(opcode in any::<u8>()) {
        let info = OPCODE_TABLE[opcode as usize];
        let mut bus = FlatBus::new(opcode);
        let mut cpu = Cpu::new();
        cpu.pc = 0x8000;
        cpu.sp = 0xFF;

        let cycles = cpu.step(&mut bus);

        prop_assert!(
            cycles >= info.cycles,
            "opcode {opcode:#04X} ({}) took {cycles} cycles, below tabulated minimum {}",
            info.mnemonic,
            info.cycles
        );
    }
}
