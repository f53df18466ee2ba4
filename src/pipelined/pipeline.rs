//! Pipeline state
use crate::cpu::{Flags, RegisterFile};
use crate::instruction::Operation;

/// Pipeline state = 4 pipeline registers
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineState {
    pub if_de: IFDERegister,
    pub de_ex: StageRegister,
    pub ex_mem: EXMEMRegister,
    pub mem_wb: StageRegister,
}

impl PipelineState {
    /// True if every stage holds a bubble
    pub fn is_drained(&self) -> bool {
        self.if_de.stage.op.is_bubble
            && self.de_ex.op.is_bubble
            && self.ex_mem.stage.op.is_bubble
            && self.mem_wb.op.is_bubble
    }
}

/// Contents of a pipeline register: the operation plus the architectural
/// view valid at that depth.
///
/// The snapshot is a copy. Forwarding writes only into the consumer's
/// snapshot, never into the register file.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageRegister {
    pub op: Operation,
    pub regs: RegisterFile,
    pub flags: Flags,
    pub pc: u64,
}

impl StageRegister {
    pub fn bubble() -> Self {
        Self::default()
    }

    /// Consumes the register, leaving a bubble behind
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// IF/DE register
#[derive(Clone, Copy, Debug, Default)]
pub struct IFDERegister {
    pub stage: StageRegister,

    /// Fetch could not deliver `stalled_pc` because Decode was held
    pub stalled: bool,
    pub stalled_pc: u64,

    /// The stalled PC was re-issued this cycle; the PC update skips once
    pub secondary_stall: bool,
}

impl IFDERegister {
    /// Squashes the staged operation and any pending re-issue
    pub fn flush(&mut self) {
        self.stage = StageRegister::bubble();
        self.stalled = false;
        self.secondary_stall = false;
    }
}

/// EX/MEM register
#[derive(Clone, Copy, Debug, Default)]
pub struct EXMEMRegister {
    pub stage: StageRegister,

    /// Memory is waiting on the data cache for this operation
    pub stalled: bool,

    /// Execute redirected the front end this cycle
    pub flushed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_leaves_bubble() {
        let mut reg = StageRegister {
            op: Operation::fetched(0xd440_0000, 0x40_0000),
            pc: 0x40_0000,
            ..Default::default()
        };
        let taken = reg.take();
        assert!(!taken.op.is_bubble);
        assert_eq!(taken.pc, 0x40_0000);
        assert!(reg.op.is_bubble);
    }

    #[test]
    fn flush_cancels_reissue() {
        let mut reg = IFDERegister {
            stage: StageRegister { op: Operation::fetched(1, 4), ..Default::default() },
            stalled: true,
            stalled_pc: 4,
            secondary_stall: true,
        };
        reg.flush();
        assert!(reg.stage.op.is_bubble);
        assert!(!reg.stalled && !reg.secondary_stall);
    }

    #[test]
    fn fresh_state_is_drained() {
        assert!(PipelineState::default().is_drained());
    }
}
