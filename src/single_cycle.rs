//! Single cycle implementation
//!
//! Executes one instruction per step with no timing model. Serves as the
//! architectural reference for the pipelined core.

use tracing::{debug, info};

use crate::cpu::{CPUState, INSTRUCTION_WIDTH};
use crate::error::{ExecutionError, SimulatorResult};
use crate::instruction::{classify, Function};
use crate::memory::MemoryInterface;
use crate::stages_simple::*;

/// Executes the instruction at the current PC.
/// Returns false once HLT has executed.
pub fn step(cpu: &mut CPUState, mem: &mut impl MemoryInterface) -> Result<bool, ExecutionError> {
    // Increment CPU cycle count
    cpu.update_cycle_count(1);

    let pc = cpu.pc;
    debug!("PC: {:#010x}", pc);

    // IF
    let word = mem.read_word(pc);
    // ID
    let mut op = classify(word, pc)?;
    let mut regs = cpu.regs;
    let mut flags = cpu.flags;
    // EX
    let outcome = execute(&mut op, &mut regs, &mut flags)?;
    // MEM
    memory_access(&op, &mut regs, mem);
    // WB
    write_back(&op, &regs, &flags, cpu);
    cpu.update_inst_count(1);

    cpu.pc = pc.wrapping_add(INSTRUCTION_WIDTH);
    if op.function == Function::HLT {
        return Ok(false);
    }

    if let Some(outcome) = outcome {
        cpu.history.branch_count += 1;
        if outcome.taken {
            debug!("Branching from {:#010x} to {:#010x}", pc, outcome.target);
            cpu.pc = outcome.target;
        }
    }
    Ok(true)
}

/// Runs until HLT, or fails after `max_cycles` steps.
/// Returns the PC of the HLT instruction.
pub fn run(
    cpu: &mut CPUState,
    mem: &mut impl MemoryInterface,
    max_cycles: u64,
) -> SimulatorResult<u64> {
    while step(cpu, mem)? {
        if cpu.history.cycle_count >= max_cycles {
            return Err(ExecutionError::ExecutionLimitReached(max_cycles).into());
        }
    }
    let exit_pc = cpu.pc - INSTRUCTION_WIDTH;
    info!("HLT at {:#010x} after {} instructions", exit_pc, cpu.history.inst_count);
    Ok(exit_pc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CPUPolicy, TEXT_START};
    use crate::instruction::HLT;
    use crate::memory::MainMemory;

    fn cpu_and_memory(words: &[u32]) -> (CPUState, MainMemory) {
        let mut memory = MainMemory::make();
        memory.load_words(TEXT_START, words).unwrap();
        (CPUState::make(CPUPolicy::default()), memory)
    }

    #[test]
    fn runs_to_halt() {
        // MOVZ X1, #42; ADDI X2, X1, #1; HLT
        let (mut cpu, mut memory) = cpu_and_memory(&[0xd280_0541, 0x9100_0422, HLT]);
        let exit = run(&mut cpu, &mut memory, 100).unwrap();
        assert_eq!(exit, TEXT_START + 8);
        assert_eq!(cpu.regs.read(2), 43);
        assert_eq!(cpu.history.inst_count, 3);
        assert_eq!(cpu.history.cycle_count, 3);
    }

    #[test]
    fn follows_taken_branches() {
        // B #8 skips the MOVZ
        let (mut cpu, mut memory) = cpu_and_memory(&[0x1400_0002, 0xd280_0541, HLT]);
        run(&mut cpu, &mut memory, 100).unwrap();
        assert_eq!(cpu.regs.read(1), 0);
        assert_eq!(cpu.history.branch_count, 1);
    }

    #[test]
    fn infinite_loop_hits_limit() {
        // B #0
        let (mut cpu, mut memory) = cpu_and_memory(&[0x1400_0000]);
        let err = run(&mut cpu, &mut memory, 10).unwrap_err();
        assert!(matches!(
            err,
            crate::error::SimulatorError::ExecutionError(ExecutionError::ExecutionLimitReached(10))
        ));
    }
}
