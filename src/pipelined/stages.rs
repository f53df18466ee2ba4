//! 5 stages adapted for pipelined execution
//!
//! Each stage consumes its input register and fills the next one. Stages
//! run in reverse order within a cycle, so every stage sees what the
//! previous cycle left behind.

use tracing::debug;

use super::branch_predictor::{BranchPredictor, Confidence};
use super::hazards::{self, Stall};
use super::pipeline::StageRegister;
use super::Pipeline;
use crate::cpu::INSTRUCTION_WIDTH;
use crate::error::ExecutionError;
use crate::instruction::{classify, Function, Operation};
use crate::memory::cache::{Cache, CacheAccess};
use crate::memory::MemoryInterface;
use crate::stages_simple::{self, effective_address, BranchOutcome};

impl<M: MemoryInterface> Pipeline<M> {
    /// WB stage. Returns true when HLT retires.
    pub(super) fn write_back(&mut self) -> bool {
        let retiring = self.state.mem_wb.take();
        if retiring.op.is_bubble {
            debug!("WB: BUBBLE");
            return false;
        }
        debug!("WB: {:#010x} {:?}", retiring.pc, retiring.op.function);

        stages_simple::write_back(&retiring.op, &retiring.regs, &retiring.flags, &mut self.cpu);
        self.cpu.update_inst_count(1);

        if hazards::forward_from_writeback(&retiring, &mut self.state.de_ex) {
            debug!("WB: forwarding result of {:#010x} to EX", retiring.pc);
        }
        retiring.op.function == Function::HLT
    }

    /// MEM stage. Returns the reason the earlier stages must hold, if any.
    pub(super) fn memory_access(&mut self, dcache: &mut Cache) -> Option<Stall> {
        self.state.ex_mem.flushed = false;

        let pending = &self.state.ex_mem.stage;
        if dcache.is_waiting() {
            if !dcache.tick() {
                self.state.mem_wb = StageRegister::bubble();
                return Some(Stall::DataCache);
            }
            let address = effective_address(&pending.op, &pending.regs);
            debug!("MEM: data cache line for {:#010x} arrived", address);
            dcache.finish_miss(address);
            self.state.ex_mem.stalled = false;
        } else if !pending.op.is_bubble && (pending.op.is_load || pending.op.is_store) {
            let address = effective_address(&pending.op, &pending.regs);
            if dcache.lookup(address) == CacheAccess::Miss {
                debug!("MEM: data cache miss at {:#010x}", address);
                dcache.start_miss();
                self.state.ex_mem.stalled = true;
                self.state.mem_wb = StageRegister::bubble();
                return Some(Stall::DataCache);
            }
        }

        let mut stage = self.state.ex_mem.stage.take();
        if stage.op.is_bubble {
            debug!("MEM: BUBBLE");
        } else {
            debug!("MEM: {:#010x} {:?}", stage.pc, stage.op.function);
            stages_simple::memory_access(&stage.op, &mut stage.regs, &mut self.memory);
        }

        let stall =
            hazards::check_memory_stage(&stage, &mut self.state.de_ex, self.cpu.policy.forwarding);
        self.state.mem_wb = stage;
        stall
    }

    /// EX stage. Resolves branches and redirects the front end when the
    /// latched prediction was wrong.
    pub(super) fn execute(
        &mut self,
        predictor: &mut BranchPredictor,
        icache: &mut Cache,
    ) -> Result<(), ExecutionError> {
        let mut stage = self.state.de_ex.take();
        if stage.op.is_bubble || self.halted {
            debug!("EX: BUBBLE");
            self.state.ex_mem.stage = StageRegister::bubble();
            return Ok(());
        }
        debug!("EX: {:#010x} {:?}", stage.pc, stage.op.function);

        let outcome = stages_simple::execute(&mut stage.op, &mut stage.regs, &mut stage.flags)?;
        let (pc, predicted_pc, function) = (stage.pc, stage.op.predicted_pc, stage.op.function);
        let is_conditional = stage.op.is_conditional();
        self.state.ex_mem.stage = stage;

        if function == Function::HLT {
            debug!("EX: HLT at {:#010x}; squashing younger operations", pc);
            self.halted = true;
            self.cpu.pc = pc.wrapping_add(INSTRUCTION_WIDTH);
            return Ok(());
        }

        let (resolved_pc, taken) = match outcome {
            Some(BranchOutcome { target, taken }) => {
                self.cpu.history.branch_count += 1;
                predictor.update(pc, target, taken, is_conditional);
                (if taken { target } else { pc }, taken)
            }
            None => (pc, false),
        };

        if !BranchPredictor::resolves(predicted_pc, resolved_pc, taken) {
            let target = BranchPredictor::expected_pc(resolved_pc, taken);
            debug!(
                "EX: {:#010x} mispredicted {:#010x}; redirecting to {:#010x}",
                pc, predicted_pc, target
            );
            self.flush(target, icache);
        }
        Ok(())
    }

    /// Squashes the operation in IF/DE and points Fetch at `target`
    fn flush(&mut self, target: u64, icache: &mut Cache) {
        self.cpu.history.mispredict_count += 1;

        let fetch_pc = if self.state.if_de.stalled {
            self.state.if_de.stalled_pc
        } else {
            self.cpu.pc
        };
        self.state.if_de.flush();
        self.state.ex_mem.flushed = true;

        if icache.is_waiting() {
            if icache.belongs_to_same_line(fetch_pc, target) {
                // The pending line also serves the target; keep counting
                self.state.ex_mem.flushed = false;
            } else {
                debug!("EX: abandoning instruction cache miss at {:#010x}", fetch_pc);
                icache.abandon_miss();
            }
        }
        self.cpu.pc = target;
    }

    /// DE stage
    pub(super) fn decode(&mut self) -> Result<(), ExecutionError> {
        let fetched = self.state.if_de.stage.take();
        if fetched.op.is_bubble || self.halted {
            debug!("DE: BUBBLE");
            self.state.de_ex = StageRegister::bubble();
            return Ok(());
        }

        let mut op = classify(fetched.op.word, fetched.pc)?;
        op.predicted_pc = fetched.op.predicted_pc;
        debug!("DE: {:#010x} {:?} ({:#010x})", fetched.pc, op.function, op.word);

        self.state.de_ex = StageRegister {
            op,
            regs: self.cpu.regs,
            flags: self.cpu.flags,
            pc: fetched.pc,
        };
        Ok(())
    }

    /// IF stage. Returns true if the PC was consumed this cycle.
    ///
    /// While the pipeline is held (`hold`), IF/DE is left untouched: Fetch
    /// only services the instruction cache and records the PC it could
    /// not deliver, which is re-issued once the hold ends.
    pub(super) fn fetch(&mut self, icache: &mut Cache, hold: bool) -> bool {
        if self.state.ex_mem.flushed || self.halted {
            if !hold {
                debug!("IF: BUBBLE");
                self.state.if_de.stage = StageRegister::bubble();
            }
            return false;
        }
        if hold && self.state.if_de.stalled {
            return false;
        }

        let reissue = self.state.if_de.stalled;
        let pc = if reissue {
            self.state.if_de.stalled_pc
        } else {
            self.cpu.pc
        };

        let ready = if icache.is_waiting() {
            let done = icache.tick();
            if done {
                debug!("IF: instruction cache line for {:#010x} arrived", pc);
                icache.finish_miss(pc);
            }
            done
        } else if icache.lookup(pc) == CacheAccess::Miss {
            debug!("IF: instruction cache miss at {:#010x}", pc);
            icache.start_miss();
            false
        } else {
            true
        };

        if !ready {
            self.cpu.history.fetch_stall_count += 1;
            if !hold {
                self.state.if_de.stage = StageRegister::bubble();
            }
            return false;
        }

        if hold {
            debug!("IF: holding {:#010x}", pc);
            self.state.if_de.stalled = true;
            self.state.if_de.stalled_pc = pc;
            return true;
        }

        let word = self.memory.read_word(pc);
        let mut op = Operation::fetched(word, pc);
        if reissue {
            debug!("IF: re-issuing {:#010x}", pc);
            op.predicted_pc = self.cpu.pc;
            self.state.if_de.stalled = false;
            self.state.if_de.secondary_stall = true;
        } else {
            debug!("IF: {:#010x} ({:#010x})", pc, word);
        }
        self.state.if_de.stage = StageRegister { op, pc, ..StageRegister::bubble() };
        true
    }

    /// Moves the fetch PC along the predicted path
    pub(super) fn update_pc(
        &mut self,
        predictor: &BranchPredictor,
        icache: &Cache,
        issued: bool,
        hold: bool,
    ) {
        if self.state.if_de.secondary_stall {
            self.state.if_de.secondary_stall = false;
            return;
        }
        if self.halted || icache.is_waiting() || self.state.ex_mem.flushed || !issued {
            return;
        }

        let prediction = predictor.predict(self.cpu.pc);
        if prediction.confidence == Confidence::PredictedTaken {
            debug!("IF: predicting {:#010x} -> {:#010x}", self.cpu.pc, prediction.next_pc);
        }
        if !hold {
            self.state.if_de.stage.op.predicted_pc = prediction.next_pc;
        }
        self.cpu.pc = prediction.next_pc;
    }
}
