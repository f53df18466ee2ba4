//! Functional semantics of Execute, Memory and Writeback.
//!
//! Every function works on an operation and the register/flag snapshot it
//! carries, so the pipelined core and the single-cycle reference share
//! them unchanged.

use crate::alu::{alu, alu_op, ALUOp};
use crate::cpu::{CPUState, Flags, RegisterFile};
use crate::error::ExecutionError;
use crate::instruction::{Function, InstructionType, Operation};
use crate::memory::MemoryInterface;

/// Resolved control flow of a branch operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchOutcome {
    /// Where the branch goes when taken
    pub target: u64,
    pub taken: bool,
}

/// EX: computes the result into the snapshot and resolves branches.
///
/// Register results land in `regs[rt]`, flag results in `flags`.
/// Returns the outcome for branch operations.
pub fn execute(
    op: &mut Operation,
    regs: &mut RegisterFile,
    flags: &mut Flags,
) -> Result<Option<BranchOutcome>, ExecutionError> {
    use Function::*;

    let unknown = ExecutionError::UnknownOpcode {
        opcode: op.opcode,
        kind: op.kind,
        pc: op.pc,
    };

    let mut outcome = None;
    let result = match op.kind {
        InstructionType::Register if op.function == BR => {
            outcome = Some(BranchOutcome { target: regs.read(op.rn) as u64, taken: true });
            None
        }
        InstructionType::Register => {
            let alu_op = alu_op(op.function).ok_or(unknown)?;
            Some(alu(alu_op, regs.read(op.rn), regs.read(op.rm)))
        }
        InstructionType::Immediate => {
            let operand = regs.read(op.rn);
            let immr = ((op.immediate >> 6) & 0x3F) as i64;
            let imms = (op.immediate & 0x3F) as i64;
            Some(match op.function {
                LSL => alu(ALUOp::LSL, operand, 63 - imms),
                LSR => alu(ALUOp::LSR, operand, immr),
                f => alu(alu_op(f).ok_or(unknown)?, operand, op.immediate as i64),
            })
        }
        InstructionType::Wide => match op.function {
            MOVZ => Some(op.immediate as i64),
            HLT => None,
            _ => return Err(unknown),
        },
        // Address generation happens in the Memory stage
        InstructionType::Memory => None,
        InstructionType::Branch => {
            outcome = Some(BranchOutcome { target: relative_target(op), taken: true });
            None
        }
        InstructionType::CondBranch => {
            let taken = match op.function {
                CBZ => regs.read(op.rt) == 0,
                CBNZ => regs.read(op.rt) != 0,
                BCOND => condition_holds(op.rt, *flags).ok_or(unknown)?,
                _ => return Err(unknown),
            };
            outcome = Some(BranchOutcome { target: relative_target(op), taken });
            None
        }
        InstructionType::Unclassified => return Err(unknown),
    };

    if let Some(value) = result {
        if op.modifies_register {
            regs.write(op.rt, value);
        }
        if op.sets_flags {
            *flags = Flags::from_result(value);
        }
    }
    op.will_branch = outcome.is_some_and(|outcome| outcome.taken);
    Ok(outcome)
}

fn relative_target(op: &Operation) -> u64 {
    op.pc.wrapping_add_signed(op.address)
}

/// Evaluates a B.cond condition code; V is always clear.
/// Returns `None` for codes the core does not implement.
pub fn condition_holds(cond: u8, flags: Flags) -> Option<bool> {
    Some(match cond & 0xF {
        0x0 => flags.z,
        0x1 => !flags.z,
        0xA => !flags.n,
        0xB => flags.n,
        0xC => !flags.z && !flags.n,
        0xD => flags.z || flags.n,
        _ => return None,
    })
}

/// Address touched by a load or store
pub fn effective_address(op: &Operation, regs: &RegisterFile) -> u64 {
    (regs.read(op.rn) as u64).wrapping_add_signed(op.address)
}

/// MEM: performs the load or store of `op`.
///
/// Loads write `regs[rt]` of the snapshot. Narrow accesses work on the
/// word at the address.
pub fn memory_access(op: &Operation, regs: &mut RegisterFile, mem: &mut impl MemoryInterface) {
    use Function::*;
    if op.is_bubble || !(op.is_load || op.is_store) {
        return;
    }

    let address = effective_address(op, regs);
    if op.is_load {
        let value = match op.function {
            LDUR => mem.read_double(address) as i64,
            LDURW => mem.read_word(address) as i64,
            LDURH => (mem.read_word(address) & 0xFFFF) as i64,
            LDURB => (mem.read_word(address) & 0xFF) as i64,
            _ => return,
        };
        regs.write(op.rt, value);
        return;
    }

    let data = regs.read(op.rt) as u64;
    match op.function {
        STUR => mem.write_double(address, data),
        STURW => mem.write_word(address, data as u32),
        STURH => {
            let word = mem.read_word(address);
            mem.write_word(address, (word & !0xFFFF) | (data as u32 & 0xFFFF));
        }
        STURB => {
            let word = mem.read_word(address);
            mem.write_word(address, (word & !0xFF) | (data as u32 & 0xFF));
        }
        _ => {}
    }
}

/// WB: commits the staged register and flag results
pub fn write_back(op: &Operation, regs: &RegisterFile, flags: &Flags, cpu: &mut CPUState) {
    if op.is_bubble {
        return;
    }
    if op.modifies_register {
        cpu.regs.write(op.rt, regs.read(op.rt));
    }
    if op.sets_flags {
        cpu.flags = *flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CPUPolicy;
    use crate::instruction::classify;
    use crate::memory::MainMemory;
    use rstest::rstest;

    fn run_one(word: u32, regs: &mut RegisterFile, flags: &mut Flags) -> Option<BranchOutcome> {
        let mut op = classify(word, 0x40_0000).unwrap();
        execute(&mut op, regs, flags).unwrap()
    }

    #[test]
    fn register_ops_write_destination() {
        let mut regs = RegisterFile::default();
        let mut flags = Flags::default();
        regs.write(1, 40);
        regs.write(2, 2);
        // ADD X3, X1, X2
        assert_eq!(run_one(0x8b02_0023, &mut regs, &mut flags), None);
        assert_eq!(regs.read(3), 42);
        assert_eq!(flags, Flags::default());
    }

    #[test]
    fn compare_sets_flags_only() {
        let mut regs = RegisterFile::default();
        let mut flags = Flags::default();
        regs.write(1, 3);
        regs.write(2, 5);
        // CMP X1, X2
        run_one(0xeb02_003f, &mut regs, &mut flags);
        assert_eq!(flags, Flags { n: true, z: false });
        assert_eq!(regs.read(31), 0);
    }

    #[test]
    fn shifts_use_bitfield_fields() {
        let mut regs = RegisterFile::default();
        let mut flags = Flags::default();
        regs.write(1, 0b101);
        // LSL X0, X1, #1
        run_one(0xd37f_f820, &mut regs, &mut flags);
        assert_eq!(regs.read(0), 0b1010);
        // LSR X0, X1, #1
        run_one(0xd341_fc20, &mut regs, &mut flags);
        assert_eq!(regs.read(0), 0b10);
    }

    #[test]
    fn branches_report_targets() {
        let mut regs = RegisterFile::default();
        let mut flags = Flags::default();
        // CBZ X1, #-8 with X1 == 0
        let outcome = run_one(0xb4ff_ffc1, &mut regs, &mut flags);
        assert_eq!(outcome, Some(BranchOutcome { target: 0x3f_fff8, taken: true }));
        regs.write(1, 1);
        let outcome = run_one(0xb4ff_ffc1, &mut regs, &mut flags);
        assert_eq!(outcome.map(|o| o.taken), Some(false));
        // BR X1
        regs.write(1, 0x40_1000);
        let outcome = run_one(0xd61f_0020, &mut regs, &mut flags);
        assert_eq!(outcome, Some(BranchOutcome { target: 0x40_1000, taken: true }));
    }

    #[rstest]
    #[case(0x0, Flags { n: false, z: true }, true)]
    #[case(0x1, Flags { n: false, z: true }, false)]
    #[case(0xA, Flags { n: true, z: false }, false)]
    #[case(0xB, Flags { n: true, z: false }, true)]
    #[case(0xC, Flags { n: false, z: false }, true)]
    #[case(0xD, Flags { n: false, z: false }, false)]
    fn evaluates_conditions(#[case] cond: u8, #[case] flags: Flags, #[case] expected: bool) {
        assert_eq!(condition_holds(cond, flags), Some(expected));
    }

    #[test]
    fn unsupported_condition_is_unknown_opcode() {
        let mut regs = RegisterFile::default();
        let mut flags = Flags::default();
        // B.VS #8
        let mut op = classify(0x5400_0046, 0x40_0000).unwrap();
        let err = execute(&mut op, &mut regs, &mut flags).unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownOpcode { pc: 0x40_0000, .. }));
    }

    #[test]
    fn loads_and_stores_by_width() {
        let mut mem = MainMemory::make();
        let mut regs = RegisterFile::default();
        regs.write(1, 0x1000_0000);
        regs.write(2, 0x1122_3344_5566_7788);

        // STUR X2, [X1, #8]
        let store = classify(0xf800_8022, 0).unwrap();
        memory_access(&store, &mut regs, &mut mem);
        assert_eq!(mem.read_double(0x1000_0008), 0x1122_3344_5566_7788);

        // LDUR X3, [X1, #8]
        let load = classify(0xf840_8023, 0).unwrap();
        memory_access(&load, &mut regs, &mut mem);
        assert_eq!(regs.read(3), 0x1122_3344_5566_7788);

        // STURB X2, [X1] then LDURW X4, [X1]
        mem.write_word(0x1000_0000, 0xaabb_ccdd);
        memory_access(&classify(0x3800_0022, 0).unwrap(), &mut regs, &mut mem);
        memory_access(&classify(0xb840_0024, 0).unwrap(), &mut regs, &mut mem);
        assert_eq!(regs.read(4), 0xaabb_cc88);
    }

    #[test]
    fn write_back_commits_destination_and_flags() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        let mut regs = RegisterFile::default();
        let mut flags = Flags::default();
        regs.write(1, 4);
        regs.write(2, 4);
        // SUBS X3, X1, X2
        let mut op = classify(0xeb02_0023, 0).unwrap();
        execute(&mut op, &mut regs, &mut flags).unwrap();
        // Unrelated snapshot entries are not committed
        regs.write(9, 99);
        write_back(&op, &regs, &flags, &mut cpu);
        assert_eq!(cpu.regs.read(3), 0);
        assert_eq!(cpu.regs.read(9), 0);
        assert!(cpu.flags.z);
    }
}
