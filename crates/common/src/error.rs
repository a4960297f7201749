//! Decode errors for generic bytecode streams and raw descriptors.

use thiserror::Error;

/// Errors that occur while decoding generic bytecode or raw block metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The word at `at` is not a known opcode.
    #[error("unknown opcode {word:#x} at offset {at}")]
    UnknownOpcode { at: usize, word: u32 },

    /// The instruction at `at` needs more operand words than the stream has.
    #[error("{mnemonic} at offset {at} runs past the end of the bytecode")]
    Truncated { at: usize, mnemonic: &'static str },

    /// Block kind outside 0..=2.
    #[error("bad block kind {0}")]
    InvalidBlockKind(u32),
}
