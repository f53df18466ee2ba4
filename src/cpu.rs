//! Architectural state of the ARM-like core

use crate::pipelined::branch_predictor::PredictorHeuristic;

/// Number of architectural registers
pub const NUM_REGS: usize = 32;
/// Register hard-wired to zero
pub const ZERO_REG: u8 = 31;
/// Width of every instruction in bytes
pub const INSTRUCTION_WIDTH: u64 = 4;
/// Where text images are placed and where execution starts
pub const TEXT_START: u64 = 0x0040_0000;

/// CPU state
#[derive(Clone, Copy, Debug)]
pub struct CPUState {
    /// Program counter (the fetch PC in the pipelined core)
    pub pc: u64,
    /// General purpose registers
    pub regs: RegisterFile,
    /// Condition flags
    pub flags: Flags,

    /// CPU policy
    pub policy: CPUPolicy,

    /// History of execution
    pub history: CPUHistory,
}

impl CPUState {
    pub fn make(policy: CPUPolicy) -> Self {
        Self {
            pc: TEXT_START,
            regs: RegisterFile::default(),
            flags: Flags::default(),
            policy,
            history: CPUHistory::default(),
        }
    }

    /// Increments history cycle count
    pub fn update_cycle_count(&mut self, value: u64) {
        self.history.cycle_count += value;
    }

    /// Increments history instruction count
    pub fn update_inst_count(&mut self, value: u64) {
        self.history.inst_count += value;
    }
}

/// Register file simulation
///
/// Copies of this type are the register snapshots carried by the
/// pipeline registers, so it stays `Copy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    data: [i64; NUM_REGS],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self { data: [0; NUM_REGS] }
    }
}

impl RegisterFile {
    /// Reads a register; the zero register always reads 0
    pub fn read(&self, index: u8) -> i64 {
        match index {
            ZERO_REG => 0,
            i => self.data[i as usize % NUM_REGS],
        }
    }

    /// Writes to a register; writes to the zero register are dropped
    pub fn write(&mut self, index: u8, value: i64) {
        if index != ZERO_REG {
            self.data[index as usize % NUM_REGS] = value;
        }
    }
}

/// Zero and Negative condition flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub n: bool,
    pub z: bool,
}

impl Flags {
    pub fn from_result(result: i64) -> Self {
        Self { n: result < 0, z: result == 0 }
    }
}

/// Implementation enum
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Implementation {
    SingleCycle,
    #[default]
    Pipelined,
}

/// CPU policy
#[derive(Clone, Copy, Debug)]
pub struct CPUPolicy {
    pub verbose: bool,
    pub implementation: Implementation,
    pub history: bool,
    pub heuristic: PredictorHeuristic,
    /// Bypass values from Memory/Writeback into Execute
    pub forwarding: bool,
    pub interactive: bool,
}

impl Default for CPUPolicy {
    fn default() -> Self {
        Self {
            verbose: false,
            implementation: Implementation::default(),
            history: false,
            heuristic: PredictorHeuristic::default(),
            forwarding: true,
            interactive: false,
        }
    }
}

/// History module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CPUHistory {
    pub cycle_count: u64,
    /// Retired instructions
    pub inst_count: u64,
    /// Cycles the front end was held by a load-use, store-load or
    /// no-forwarding dependency
    pub hazard_stall_count: u64,
    /// Cycles the Memory stage spent waiting on the data cache
    pub mem_stall_count: u64,
    /// Cycles Fetch spent waiting on the instruction cache
    pub fetch_stall_count: u64,
    pub branch_count: u64,
    pub mispredict_count: u64,
}

impl CPUHistory {
    pub fn cpi(&self) -> f64 {
        if self.inst_count == 0 {
            0.0
        } else {
            self.cycle_count as f64 / self.inst_count as f64
        }
    }
}
