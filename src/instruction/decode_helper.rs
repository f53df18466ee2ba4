//! Decoding helper functions.
//!
//! The top bits of a word are tried against each instruction type in
//! `TYPE_LIST` order; the first type whose opcode table contains the
//! normalized opcode wins.

use std::ops::RangeInclusive;

use super::Function;
use super::InstructionType;
use super::Operation;
use crate::bits::{extract, sign_extend};
use crate::error::ExecutionError;

/// Width of the normalized opcode
pub const OPCODE_BITS: usize = 11;

/// (type, opcode width), narrowest first
pub const TYPE_LIST: [(InstructionType, usize); 6] = [
    (InstructionType::Branch, 6),
    (InstructionType::CondBranch, 8),
    (InstructionType::Immediate, 10),
    (InstructionType::Register, 11),
    (InstructionType::Memory, 11),
    (InstructionType::Wide, 11),
];

type OpcodeTable = &'static [(RangeInclusive<u16>, Function)];

const BRANCH_TABLE: OpcodeTable = &[(0x0A0..=0x0BF, Function::B)];

const COND_BRANCH_TABLE: OpcodeTable = &[
    (0x5A8..=0x5AF, Function::CBNZ),
    (0x5A0..=0x5A7, Function::CBZ),
    (0x2A0..=0x2A7, Function::BCOND),
];

const IMMEDIATE_TABLE: OpcodeTable = &[
    (0x488..=0x489, Function::ADDI),
    (0x588..=0x589, Function::ADDIS),
    (0x688..=0x689, Function::SUBI),
    (0x788..=0x789, Function::SUBIS),
    (0x69A..=0x69B, Function::UBFM),
];

const REGISTER_TABLE: OpcodeTable = &[
    (0x458..=0x458, Function::ADD),
    (0x558..=0x558, Function::ADDS),
    (0x450..=0x450, Function::AND),
    (0x750..=0x750, Function::ANDS),
    (0x650..=0x650, Function::EOR),
    (0x550..=0x550, Function::ORR),
    (0x658..=0x658, Function::SUB),
    (0x758..=0x758, Function::SUBS),
    (0x4D8..=0x4D8, Function::MUL),
    (0x6B0..=0x6B0, Function::BR),
];

const MEMORY_TABLE: OpcodeTable = &[
    (0x7C2..=0x7C2, Function::LDUR),
    (0x5C2..=0x5C2, Function::LDURW),
    (0x1C2..=0x1C2, Function::LDURB),
    (0x3C2..=0x3C2, Function::LDURH),
    (0x7C0..=0x7C0, Function::STUR),
    (0x5C0..=0x5C0, Function::STURW),
    (0x1C0..=0x1C0, Function::STURB),
    (0x3C0..=0x3C0, Function::STURH),
];

const WIDE_TABLE: OpcodeTable = &[
    (0x694..=0x697, Function::MOVZ),
    (0x6A2..=0x6A2, Function::HLT),
];

/// Opcode table for one instruction type
pub fn opcode_table(kind: InstructionType) -> OpcodeTable {
    match kind {
        InstructionType::Branch => BRANCH_TABLE,
        InstructionType::CondBranch => COND_BRANCH_TABLE,
        InstructionType::Immediate => IMMEDIATE_TABLE,
        InstructionType::Register => REGISTER_TABLE,
        InstructionType::Memory => MEMORY_TABLE,
        InstructionType::Wide => WIDE_TABLE,
        InstructionType::Unclassified => &[],
    }
}

/// Top `width` bits of the word, left-aligned to `OPCODE_BITS`
pub fn normalized_opcode(word: u32, width: usize) -> u16 {
    ((word >> (32 - width)) << (OPCODE_BITS - width)) as u16
}

/// Finds the mnemonic for an opcode within one type
pub fn lookup_function(kind: InstructionType, opcode: u16) -> Option<Function> {
    opcode_table(kind)
        .iter()
        .find(|(range, _)| range.contains(&opcode))
        .map(|(_, function)| *function)
}

/// Classifies a raw word into a typed operation
pub fn classify(word: u32, pc: u64) -> Result<Operation, ExecutionError> {
    let (kind, opcode, function) = TYPE_LIST
        .iter()
        .find_map(|&(kind, width)| {
            let opcode = normalized_opcode(word, width);
            lookup_function(kind, opcode).map(|f| (kind, opcode, f))
        })
        .ok_or(ExecutionError::UnknownInstruction { word, pc })?;

    let mut op = Operation::fetched(word, pc);
    op.kind = kind;
    op.opcode = opcode;
    op.function = function;

    match kind {
        InstructionType::Branch => parse_format_b(&mut op),
        InstructionType::CondBranch => parse_format_cb(&mut op),
        InstructionType::Immediate => parse_format_i(&mut op),
        InstructionType::Register => parse_format_r(&mut op),
        InstructionType::Memory => parse_format_d(&mut op),
        InstructionType::Wide => parse_format_iw(&mut op),
        InstructionType::Unclassified => {}
    }
    Ok(op)
}

/// Parses attributes for an R-type instruction
fn parse_format_r(op: &mut Operation) {
    use Function::*;
    op.rm = get_rm(op.word);
    op.misc = extract(op.word, 10, 6) as u8;
    op.rn = get_rn(op.word);
    op.rt = get_rt(op.word);
    op.modifies_register = op.function != BR;
    op.sets_flags = matches!(op.function, ADDS | ANDS | SUBS);
}

/// Parses attributes for an I-type instruction
fn parse_format_i(op: &mut Operation) {
    use Function::*;
    op.immediate = extract(op.word, 10, 12) as u64;
    op.rn = get_rn(op.word);
    op.rt = get_rt(op.word);
    op.modifies_register = true;
    op.sets_flags = matches!(op.function, ADDIS | SUBIS);
    if op.function == UBFM {
        // imms == 63 is LSR, anything else is the LSL alias
        op.function = if op.immediate & 0x3F == 0x3F { LSR } else { LSL };
    }
}

/// Parses attributes for a D-type instruction
fn parse_format_d(op: &mut Operation) {
    use Function::*;
    op.address = sign_extend(extract(op.word, 12, 9) as u64, 9);
    op.misc = extract(op.word, 10, 2) as u8;
    op.rn = get_rn(op.word);
    op.rt = get_rt(op.word);
    op.is_load = matches!(op.function, LDUR | LDURW | LDURB | LDURH);
    op.is_store = !op.is_load;
    op.modifies_register = op.is_load;
}

/// Parses attributes for a B-type instruction
fn parse_format_b(op: &mut Operation) {
    op.address = sign_extend(extract(op.word, 0, 26) as u64, 26) << 2;
}

/// Parses attributes for a CB-type instruction
fn parse_format_cb(op: &mut Operation) {
    op.address = sign_extend(extract(op.word, 5, 19) as u64, 19) << 2;
    op.rt = get_rt(op.word);
}

/// Parses attributes for an IW-type instruction
fn parse_format_iw(op: &mut Operation) {
    op.misc = extract(op.word, 21, 2) as u8;
    op.immediate = (extract(op.word, 5, 16) as u64) << (16 * op.misc as u64);
    op.rt = get_rt(op.word);
    op.modifies_register = op.function == Function::MOVZ;
}

fn get_rm(word: u32) -> u8 {
    extract(word, 16, 5) as u8
}

fn get_rn(word: u32) -> u8 {
    extract(word, 5, 5) as u8
}

fn get_rt(word: u32) -> u8 {
    extract(word, 0, 5) as u8
}
