//! Pipelined implementation

use tracing::{debug, info, warn};

use crate::cpu::{CPUPolicy, CPUState};
use crate::error::{ExecutionError, SimulatorResult};
use crate::memory::cache::{Cache, CacheHistory, CachePolicy};
use crate::memory::MemoryInterface;
use branch_predictor::BranchPredictor;
use hazards::Stall;
use pipeline::PipelineState;

pub mod branch_predictor;
pub mod hazards;
pub mod pipeline;
pub mod stages;

/// Structures owned by a running pipeline, released once it stops
struct Resources {
    icache: Cache,
    dcache: Cache,
    predictor: BranchPredictor,
}

impl Resources {
    fn new(policy: &CPUPolicy) -> Self {
        Self {
            icache: Cache::make(CachePolicy::instruction()),
            dcache: Cache::make(CachePolicy::data()),
            predictor: BranchPredictor::new(policy.heuristic),
        }
    }
}

/// Five-stage pipeline driving a core against main memory `M`.
///
/// Call [`Pipeline::init`] once, then [`Pipeline::cycle`] until
/// [`Pipeline::is_running`] turns false.
pub struct Pipeline<M: MemoryInterface> {
    cpu: CPUState,
    memory: M,
    state: PipelineState,
    resources: Option<Resources>,

    // Cache statistics survive the release of the caches
    icache_history: CacheHistory,
    dcache_history: CacheHistory,

    running: bool,
    /// HLT has executed; younger operations are squashed
    halted: bool,
}

impl<M: MemoryInterface> Pipeline<M> {
    pub fn new(policy: CPUPolicy, memory: M) -> Self {
        Self {
            cpu: CPUState::make(policy),
            memory,
            state: PipelineState::default(),
            resources: None,
            icache_history: CacheHistory::default(),
            dcache_history: CacheHistory::default(),
            running: false,
            halted: false,
        }
    }

    /// Empties the pipeline, allocates fresh caches and predictor tables,
    /// and starts fetching at `entry`. Registers and memory are kept.
    pub fn init(&mut self, entry: u64) {
        self.cpu.pc = entry;
        self.state = PipelineState::default();
        self.resources = Some(Resources::new(&self.cpu.policy));
        self.icache_history = CacheHistory::default();
        self.dcache_history = CacheHistory::default();
        self.running = true;
        self.halted = false;
        debug!("Pipeline initialized; PC: {:#010x}", entry);
    }

    /// Advances every stage by one cycle.
    ///
    /// A fatal condition stops the pipeline and is returned; once stopped,
    /// further calls do nothing.
    pub fn cycle(&mut self) -> SimulatorResult<()> {
        if !self.running {
            return Ok(());
        }
        let Some(mut resources) = self.resources.take() else {
            self.running = false;
            return Ok(());
        };

        let result = self.step(&mut resources);
        if let Err(e) = &result {
            warn!("Stopping at cycle {}: {}", self.cpu.history.cycle_count, e);
            self.running = false;
        }

        if self.running {
            self.resources = Some(resources);
        } else {
            self.release(resources);
        }
        Ok(result?)
    }

    /// Cycles up to `cycles` times, stopping early if the pipeline stops
    pub fn run(&mut self, cycles: u64) -> SimulatorResult<()> {
        for _ in 0..cycles {
            if !self.running {
                break;
            }
            self.cycle()?;
        }
        Ok(())
    }

    /// Stops the pipeline from the outside. Resources are released if
    /// still held; architectural state is left as it is.
    pub fn halt(&mut self) {
        self.running = false;
        if let Some(resources) = self.resources.take() {
            self.release(resources);
        }
    }

    fn step(&mut self, resources: &mut Resources) -> Result<(), ExecutionError> {
        self.cpu.update_cycle_count(1);
        debug!("New cycle {}; PC: {:#010x}", self.cpu.history.cycle_count, self.cpu.pc);

        if self.write_back() {
            info!(
                "HLT retired: {} instructions in {} cycles",
                self.cpu.history.inst_count, self.cpu.history.cycle_count
            );
            self.running = false;
            return Ok(());
        }

        let hold = match self.memory_access(&mut resources.dcache) {
            Some(stall) => {
                debug!("Front end held: {:?}", stall);
                match stall {
                    Stall::DataCache => self.cpu.history.mem_stall_count += 1,
                    _ => self.cpu.history.hazard_stall_count += 1,
                }
                true
            }
            None => {
                self.execute(&mut resources.predictor, &mut resources.icache)?;
                self.decode()?;
                false
            }
        };

        let issued = self.fetch(&mut resources.icache, hold);
        self.update_pc(&resources.predictor, &resources.icache, issued, hold);
        Ok(())
    }

    fn release(&mut self, resources: Resources) {
        self.icache_history = resources.icache.history;
        self.dcache_history = resources.dcache.history;
        debug!(
            "Released caches; miss rates: I {:.3}, D {:.3}",
            resources.icache.get_miss_rate(),
            resources.dcache.get_miss_rate()
        );
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn cpu(&self) -> &CPUState {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CPUState {
        &mut self.cpu
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Live instruction cache; `None` once released
    pub fn icache(&self) -> Option<&Cache> {
        self.resources.as_ref().map(|r| &r.icache)
    }

    /// Live data cache; `None` once released
    pub fn dcache(&self) -> Option<&Cache> {
        self.resources.as_ref().map(|r| &r.dcache)
    }

    pub fn predictor(&self) -> Option<&BranchPredictor> {
        self.resources.as_ref().map(|r| &r.predictor)
    }

    pub fn icache_history(&self) -> CacheHistory {
        self.icache().map_or(self.icache_history, |cache| cache.history)
    }

    pub fn dcache_history(&self) -> CacheHistory {
        self.dcache().map_or(self.dcache_history, |cache| cache.history)
    }
}
