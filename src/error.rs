use serde::Serialize;
use thiserror::Error;

use crate::command::{AddressingMode, Opcode};

pub type Result<T> = std::result::Result<T, Error>;

/// Raised while turning source lines into a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("line {line}: label '{label}' already declared at line {first_line}")]
    DuplicateLabel {
        line: usize,
        label: String,
        first_line: usize,
    },
}

/// Raised by the engine. Every variant carries the 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("line {line}: {opcode} does not accept a {mode} argument")]
    InvalidArgumentMode {
        line: usize,
        opcode: Opcode,
        mode: AddressingMode,
    },
    #[error("line {line}: {opcode} requires an argument")]
    MissingArgument { line: usize, opcode: Opcode },
    #[error("line {line}: unknown label '{label}'")]
    UnknownLabel { line: usize, label: String },
    #[error("line {line}: memory cell {address} is not initialized")]
    UninitializedCell { line: usize, address: String },
    #[error("line {line}: accumulator is not initialized")]
    AccumulatorUninitialized { line: usize },
    #[error("line {line}: input tape is empty")]
    InputTapeEmpty { line: usize },
    #[error("line {line}: division by zero")]
    DivisionByZero { line: usize },
    #[error("line {line}: '{text}' is not an integer")]
    InvalidNumber { line: usize, text: String },
    #[error("line {line}: unknown instruction '{keyword}'")]
    UnknownInstruction { line: usize, keyword: String },
}

impl RuntimeError {
    pub fn line(&self) -> usize {
        match self {
            RuntimeError::InvalidArgumentMode { line, .. }
            | RuntimeError::MissingArgument { line, .. }
            | RuntimeError::UnknownLabel { line, .. }
            | RuntimeError::UninitializedCell { line, .. }
            | RuntimeError::AccumulatorUninitialized { line }
            | RuntimeError::InputTapeEmpty { line }
            | RuntimeError::DivisionByZero { line }
            | RuntimeError::InvalidNumber { line, .. }
            | RuntimeError::UnknownInstruction { line, .. } => *line,
        }
    }

    /// Stable name of the error kind, for hosts and serialized reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::InvalidArgumentMode { .. } => "InvalidArgumentMode",
            RuntimeError::MissingArgument { .. } => "MissingArgument",
            RuntimeError::UnknownLabel { .. } => "UnknownLabel",
            RuntimeError::UninitializedCell { .. } => "UninitializedCell",
            RuntimeError::AccumulatorUninitialized { .. } => "AccumulatorUninitialized",
            RuntimeError::InputTapeEmpty { .. } => "InputTapeEmpty",
            RuntimeError::DivisionByZero { .. } => "DivisionByZero",
            RuntimeError::InvalidNumber { .. } => "InvalidNumber",
            RuntimeError::UnknownInstruction { .. } => "UnknownInstruction",
        }
    }
}

/// Serializable form of a runtime error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub line: usize,
    pub message: String,
}

impl From<&RuntimeError> for ErrorReport {
    fn from(err: &RuntimeError) -> Self {
        ErrorReport {
            kind: err.kind(),
            line: err.line(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
