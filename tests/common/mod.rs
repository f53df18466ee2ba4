//! Shared test infrastructure: instruction encoders and a pipeline harness.
#![allow(dead_code)]

use sim_lib::cpu::{CPUHistory, CPUPolicy, CPUState, TEXT_START};
use sim_lib::memory::{MainMemory, MemoryInterface};
use sim_lib::pipelined::Pipeline;
use sim_lib::run_wrapper::run_to_completion;
use sim_lib::single_cycle;

pub const DATA_BASE: u64 = 0x1000_0000;

/// B.cond condition codes
pub const EQ: u32 = 0x0;
pub const NE: u32 = 0x1;

// --- Encoders for the supported instruction subset ---

pub fn movz(rd: u32, imm16: u32, hw: u32) -> u32 {
    0xd280_0000 | hw << 21 | (imm16 & 0xffff) << 5 | rd
}

pub fn addi(rd: u32, rn: u32, imm12: u32) -> u32 {
    0x9100_0000 | (imm12 & 0xfff) << 10 | rn << 5 | rd
}

pub fn subis(rd: u32, rn: u32, imm12: u32) -> u32 {
    0xf100_0000 | (imm12 & 0xfff) << 10 | rn << 5 | rd
}

pub fn add(rd: u32, rn: u32, rm: u32) -> u32 {
    0x8b00_0000 | rm << 16 | rn << 5 | rd
}

pub fn subs(rd: u32, rn: u32, rm: u32) -> u32 {
    0xeb00_0000 | rm << 16 | rn << 5 | rd
}

pub fn ldur(rt: u32, rn: u32, imm9: i32) -> u32 {
    0xf840_0000 | ((imm9 as u32) & 0x1ff) << 12 | rn << 5 | rt
}

pub fn stur(rt: u32, rn: u32, imm9: i32) -> u32 {
    0xf800_0000 | ((imm9 as u32) & 0x1ff) << 12 | rn << 5 | rt
}

/// `offset` is in bytes
pub fn cbz(rt: u32, offset: i32) -> u32 {
    0xb400_0000 | (((offset / 4) as u32) & 0x7ffff) << 5 | rt
}

pub fn cbnz(rt: u32, offset: i32) -> u32 {
    0xb500_0000 | (((offset / 4) as u32) & 0x7ffff) << 5 | rt
}

pub fn bcond(cond: u32, offset: i32) -> u32 {
    0x5400_0000 | (((offset / 4) as u32) & 0x7ffff) << 5 | cond
}

pub fn b(offset: i32) -> u32 {
    0x1400_0000 | ((offset / 4) as u32) & 0x03ff_ffff
}

pub fn br(rn: u32) -> u32 {
    0xd61f_0000 | rn << 5
}

pub fn hlt() -> u32 {
    0xd440_0000
}

// --- Harness ---

pub struct TestContext {
    pub pipeline: Pipeline<MainMemory>,
}

impl TestContext {
    pub fn new(program: &[u32]) -> Self {
        Self::with_policy(program, CPUPolicy::default())
    }

    pub fn with_policy(program: &[u32], policy: CPUPolicy) -> Self {
        Self::with_memory(program, policy, MainMemory::make())
    }

    /// Places `program` at `TEXT_START` in `memory` and starts the pipeline
    pub fn with_memory(program: &[u32], policy: CPUPolicy, mut memory: MainMemory) -> Self {
        memory.load_words(TEXT_START, program).unwrap();
        let mut pipeline = Pipeline::new(policy, memory);
        pipeline.init(TEXT_START);
        Self { pipeline }
    }

    pub fn run_to_halt(&mut self) -> CPUHistory {
        run_to_completion(&mut self.pipeline, 100_000).unwrap();
        self.pipeline.cpu().history
    }

    pub fn reg(&self, index: u8) -> i64 {
        self.pipeline.cpu().regs.read(index)
    }
}

/// Memory with one double word written at `address`
pub fn memory_with(address: u64, value: u64) -> MainMemory {
    let mut memory = MainMemory::make();
    memory.write_double(address, value);
    memory
}

/// Runs `program` on the single-cycle reference
pub fn reference(program: &[u32], memory: MainMemory) -> CPUState {
    let mut memory = memory;
    memory.load_words(TEXT_START, program).unwrap();
    let mut cpu = CPUState::make(CPUPolicy::default());
    single_cycle::run(&mut cpu, &mut memory, 100_000).unwrap();
    cpu
}

pub fn no_forwarding() -> CPUPolicy {
    CPUPolicy { forwarding: false, ..Default::default() }
}

pub fn program_path(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("programs").join(format!("{}.hex", name))
}
