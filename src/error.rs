use std::path::PathBuf;

use thiserror::Error;

use crate::instruction::InstructionType;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to load program: {0}")]
    ElfLoadError(#[from] ElfError),

    #[error("CPU execution error: {0}")]
    ExecutionError(#[from] ExecutionError),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Errors related to program files
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("Failed to read program file '{0}': {1}")]
    FileReadError(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse program file '{0}': {1}")]
    ParseError(PathBuf, String),

    #[error("Invalid ELF format: {0}")]
    InvalidFormat(String),

    #[error("Memory address out of bounds: {0:#018x}")]
    AddressOutOfBounds(u64),

    #[error("Invalid ELF machine type: {0}")]
    InvalidMachine(u16),
}

/// Fatal conditions raised while cycling the pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Unknown instruction {word:#010x} at PC={pc:#018x}")]
    UnknownInstruction { word: u32, pc: u64 },

    #[error("Unknown {kind:?} opcode {opcode:#05x} at PC={pc:#018x}")]
    UnknownOpcode {
        opcode: u16,
        kind: InstructionType,
        pc: u64,
    },

    #[error("Execution limit reached: {0} cycles")]
    ExecutionLimitReached(u64),
}

/// Errors related to placing data in main memory
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Program does not fit below the top of memory at {0:#018x}")]
    Overflow(u64),

    #[error("Invalid memory alignment: address {0:#018x} is not aligned to {1} bytes")]
    AlignmentError(u64, u64),
}

/// Errors in interactive shell input; reported and the shell continues
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShellError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Missing argument for '{0}'")]
    MissingArgument(&'static str),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Register must be between 0 and 31, got {0}")]
    InvalidRegister(u64),
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
