//! Error types for the bytecode assembler.

use thiserror::Error;

/// Errors produced while assembling text into generic bytecode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    /// An unrecognized opcode mnemonic was encountered.
    #[error("line {line}: unknown opcode '{token}'")]
    UnknownOpcode { line: usize, token: String },

    /// An opcode did not have enough operands.
    #[error("line {line}: {opcode} expects {expected} argument(s)")]
    MissingArgument {
        line: usize,
        opcode: &'static str,
        expected: usize,
    },

    /// A numeric literal could not be parsed or does not fit in a word.
    #[error("line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },

    /// A token appeared where it was not expected.
    #[error("line {line}: unexpected token '{token}'")]
    UnexpectedToken { line: usize, token: String },

    /// The same label was defined twice.
    #[error("line {line}: duplicate label '{label}'")]
    DuplicateLabel { line: usize, label: String },
}
