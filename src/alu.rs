//! ALU implementation

use crate::instruction::Function;

/// Performs an atomic ALU operation
pub fn alu(op: ALUOp, op1: i64, op2: i64) -> i64 {
    match op {
        ALUOp::ADD => op1.wrapping_add(op2),
        ALUOp::SUB => op1.wrapping_sub(op2),
        ALUOp::AND => op1 & op2,
        ALUOp::ORR => op1 | op2,
        ALUOp::EOR => op1 ^ op2,
        ALUOp::MUL => op1.wrapping_mul(op2),
        ALUOp::LSL => op1.wrapping_shl(op2 as u32),
        ALUOp::LSR => ((op1 as u64).wrapping_shr(op2 as u32)) as i64,
    }
}

/// Selects the ALU operation for an arithmetic/logic mnemonic
pub fn alu_op(function: Function) -> Option<ALUOp> {
    use Function::*;
    Some(match function {
        ADD | ADDS | ADDI | ADDIS => ALUOp::ADD,
        SUB | SUBS | SUBI | SUBIS => ALUOp::SUB,
        AND | ANDS => ALUOp::AND,
        ORR => ALUOp::ORR,
        EOR => ALUOp::EOR,
        MUL => ALUOp::MUL,
        LSL => ALUOp::LSL,
        LSR => ALUOp::LSR,
        _ => return None,
    })
}

/// Set of ALU operations needed for the supported subset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ALUOp {
    // Arithmetic
    #[default]
    ADD,
    SUB,
    MUL,
    // Logical
    AND,
    ORR,
    EOR,
    // Shift
    LSL,
    LSR,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ALUOp::ADD, 7, -3, 4)]
    #[case(ALUOp::ADD, i64::MAX, 1, i64::MIN)]
    #[case(ALUOp::SUB, 3, 5, -2)]
    #[case(ALUOp::MUL, -4, 6, -24)]
    #[case(ALUOp::AND, 0b1100, 0b1010, 0b1000)]
    #[case(ALUOp::ORR, 0b1100, 0b1010, 0b1110)]
    #[case(ALUOp::EOR, 0b1100, 0b1010, 0b0110)]
    #[case(ALUOp::LSL, 1, 4, 16)]
    #[case(ALUOp::LSR, -1, 60, 0xF)]
    fn computes(#[case] op: ALUOp, #[case] a: i64, #[case] b: i64, #[case] expected: i64) {
        assert_eq!(alu(op, a, b), expected);
    }

    #[test]
    fn non_alu_functions_have_no_op() {
        assert_eq!(alu_op(Function::LDUR), None);
        assert_eq!(alu_op(Function::SUBIS), Some(ALUOp::SUB));
    }
}
