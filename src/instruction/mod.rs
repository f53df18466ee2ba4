//! Instruction representation

use crate::cpu::ZERO_REG;

pub mod decode_helper;

pub use decode_helper::classify;

/// HLT #0
pub const HLT: u32 = 0xd440_0000;

/// Decoded instruction in flight.
///
/// Created by Fetch with only `word` and `pc` filled in, classified by
/// Decode, annotated by Execute. Replaced by a bubble once retired or
/// squashed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operation {
    pub kind: InstructionType,
    /// 11-bit normalized opcode
    pub opcode: u16,
    pub function: Function,
    /// Raw representation
    pub word: u32,
    /// Address the word was fetched from
    pub pc: u64,

    pub rm: u8,
    pub rn: u8,
    /// Destination, store data, compare register, or condition code
    pub rt: u8,
    /// Unsigned immediate (imm12, shifted imm16, or immr:imms)
    pub immediate: u64,
    /// Sign-extended byte offset for branches and memory accesses
    pub address: i64,
    /// shamt for R-type, hw for MOVZ
    pub misc: u8,

    pub modifies_register: bool,
    pub sets_flags: bool,
    pub is_load: bool,
    pub is_store: bool,
    pub will_branch: bool,
    pub is_bubble: bool,

    /// Next PC chosen by the front end after fetching this operation
    pub predicted_pc: u64,
}

impl Default for Operation {
    fn default() -> Self {
        Self::bubble()
    }
}

impl Operation {
    pub fn bubble() -> Self {
        Self {
            kind: InstructionType::Unclassified,
            opcode: 0,
            function: Function::NOP,
            word: 0,
            pc: 0,
            rm: 0,
            rn: 0,
            rt: 0,
            immediate: 0,
            address: 0,
            misc: 0,
            modifies_register: false,
            sets_flags: false,
            is_load: false,
            is_store: false,
            will_branch: false,
            is_bubble: true,
            predicted_pc: 0,
        }
    }

    /// A word straight out of Fetch, not yet classified
    pub fn fetched(word: u32, pc: u64) -> Self {
        Self { word, pc, is_bubble: false, ..Self::bubble() }
    }

    /// Registers this operation reads
    pub fn sources(&self) -> [Option<u8>; 2] {
        use Function::*;
        if self.is_bubble {
            return [None, None];
        }
        match self.kind {
            InstructionType::Register => match self.function {
                BR => [Some(self.rn), None],
                _ => [Some(self.rn), Some(self.rm)],
            },
            InstructionType::Immediate => [Some(self.rn), None],
            InstructionType::Memory if self.is_store => {
                [Some(self.rn), Some(self.rt)]
            }
            InstructionType::Memory => [Some(self.rn), None],
            InstructionType::CondBranch => match self.function {
                CBZ | CBNZ => [Some(self.rt), None],
                _ => [None, None],
            },
            _ => [None, None],
        }
    }

    /// True if `reg` is one of the registers this operation reads
    pub fn reads_register(&self, reg: u8) -> bool {
        reg != ZERO_REG && self.sources().contains(&Some(reg))
    }

    pub fn reads_flags(&self) -> bool {
        !self.is_bubble && self.function == Function::BCOND
    }

    /// Destination register, if this operation writes a live one
    pub fn destination(&self) -> Option<u8> {
        (!self.is_bubble && self.modifies_register && self.rt != ZERO_REG)
            .then_some(self.rt)
    }

    pub fn is_conditional(&self) -> bool {
        self.kind == InstructionType::CondBranch
    }
}

/// Instruction format, in decoder priority order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InstructionType {
    /// Fetched but not yet decoded, or a bubble
    #[default]
    Unclassified,
    /// B
    Branch,
    /// CB
    CondBranch,
    /// I
    Immediate,
    /// R
    Register,
    /// D
    Memory,
    /// IW
    Wide,
}

/// Mnemonic of a decoded instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Function {
    #[default]
    NOP,
    B,
    CBZ,
    CBNZ,
    BCOND,
    ADDI,
    ADDIS,
    SUBI,
    SUBIS,
    /// Bitfield move; refined into LSL or LSR by the decoder
    UBFM,
    LSL,
    LSR,
    ADD,
    ADDS,
    AND,
    ANDS,
    EOR,
    ORR,
    SUB,
    SUBS,
    MUL,
    BR,
    LDUR,
    LDURW,
    LDURB,
    LDURH,
    STUR,
    STURW,
    STURB,
    STURH,
    MOVZ,
    HLT,
}
