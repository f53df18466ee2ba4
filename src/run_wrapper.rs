//! A simulator wrapper

use std::path::Path;

use tracing::info;

use crate::cpu::{CPUHistory, CPUPolicy, CPUState, Implementation, RegisterFile};
use crate::error::{ExecutionError, SimulatorResult};
use crate::loader;
use crate::memory::cache::CacheHistory;
use crate::memory::{MainMemory, MemoryInterface};
use crate::pipelined::Pipeline;
use crate::single_cycle;

/// Cycle limit used when the caller gives none
pub const DEFAULT_MAX_CYCLES: u64 = 100_000_000;

/// What a finished run leaves behind
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunStats {
    pub history: CPUHistory,
    pub icache: CacheHistory,
    pub dcache: CacheHistory,
    pub regs: RegisterFile,
}

impl RunStats {
    /// Snapshot of a pipeline's counters and registers
    pub fn from_pipeline<M: MemoryInterface>(pipeline: &Pipeline<M>) -> Self {
        Self {
            history: pipeline.cpu().history,
            icache: pipeline.icache_history(),
            dcache: pipeline.dcache_history(),
            regs: pipeline.cpu().regs,
        }
    }

    pub fn cpi(&self) -> f64 {
        self.history.cpi()
    }

    /// Fraction of resolved branches that were mispredicted
    pub fn mispredict_rate(&self) -> f64 {
        if self.history.branch_count == 0 {
            0.0
        } else {
            self.history.mispredict_count as f64 / self.history.branch_count as f64
        }
    }

    /// Logs the statistics block printed by `-h`
    pub fn report(&self) {
        let h = &self.history;
        info!("[HISTORY] # cycles = {}, # instructions = {}", h.cycle_count, h.inst_count);
        info!("[HISTORY] CPI = {:.3}", self.cpi());
        info!(
            "[HISTORY] stalls: hazard = {}, data cache = {}, instruction cache = {}",
            h.hazard_stall_count, h.mem_stall_count, h.fetch_stall_count
        );
        info!(
            "[HISTORY] branches = {}, mispredictions = {} ({:.2}%)",
            h.branch_count,
            h.mispredict_count,
            100.0 * self.mispredict_rate()
        );
        info!("[HISTORY] I-cache {:?}", self.icache);
        info!("[HISTORY] D-cache {:?}", self.dcache);
    }
}

/// Run simulation on the given program file
pub fn run(path: &Path, policy: CPUPolicy, max_cycles: u64) -> SimulatorResult<RunStats> {
    let mut memory = MainMemory::make();
    let entry = loader::load_program(path, &mut memory)?;
    run_image(memory, entry, policy, max_cycles)
}

/// Run simulation on a program already placed in `memory`
pub fn run_image<M: MemoryInterface>(
    mut memory: M,
    entry: u64,
    policy: CPUPolicy,
    max_cycles: u64,
) -> SimulatorResult<RunStats> {
    let stats = match policy.implementation {
        Implementation::SingleCycle => {
            let mut cpu = CPUState::make(policy);
            cpu.pc = entry;
            single_cycle::run(&mut cpu, &mut memory, max_cycles)?;
            RunStats {
                history: cpu.history,
                icache: CacheHistory::default(),
                dcache: CacheHistory::default(),
                regs: cpu.regs,
            }
        }
        Implementation::Pipelined => {
            let mut pipeline = Pipeline::new(policy, memory);
            pipeline.init(entry);
            run_to_completion(&mut pipeline, max_cycles)?;
            RunStats::from_pipeline(&pipeline)
        }
    };

    if policy.history {
        stats.report();
    }
    Ok(stats)
}

/// Cycles until the pipeline stops, failing once `max_cycles` have passed
pub fn run_to_completion<M: MemoryInterface>(
    pipeline: &mut Pipeline<M>,
    max_cycles: u64,
) -> SimulatorResult<()> {
    while pipeline.is_running() {
        if pipeline.cpu().history.cycle_count >= max_cycles {
            return Err(ExecutionError::ExecutionLimitReached(max_cycles).into());
        }
        pipeline.cycle()?;
    }
    Ok(())
}
