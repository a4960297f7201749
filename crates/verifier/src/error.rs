//! Verification errors for generic bytecode units.
//!
//! The display text of each variant is the message a failed compile reports,
//! so it carries no location; the location is kept in the fields and
//! available through [`VerifyError::at`].

use blockvm_common::DecodeError;
use thiserror::Error;

/// Errors found during static verification of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("{0}")]
    Decode(#[from] DecodeError),

    // --- Structural ---
    /// A block's body list has fewer than 1 or more than 5 slots.
    #[error("Unexpected body list length")]
    BodyListLength { block: usize, len: usize },

    /// A dispatch slot lists bodies out of ascending order.
    #[error("Expected body indices to be sorted")]
    UnsortedBodies { block: usize, slot: usize },

    /// A body index is past the end of the body table.
    #[error("Body index out of bounds")]
    BodyOutOfRange { block: usize, body: usize },

    /// A body starts past the end of the bytecode.
    #[error("Bytecode index out of bounds")]
    StartOutOfRange { body: usize, start: usize },

    /// A body's name list does not cover its declared variables.
    #[error("Body name list doesn't match its variable count")]
    NamesLength { body: usize },

    /// A body declares fewer variables than the block passes in.
    #[error("Body has fewer variables than the block's arguments")]
    TooFewVariables {
        body: usize,
        declared: u32,
        required: usize,
    },

    // --- Operands ---
    #[error("Literal index out of bounds")]
    LiteralOutOfRange { at: usize, index: u32 },

    #[error("Name index out of bounds")]
    NameOutOfRange { at: usize, index: u32 },

    #[error("DFND index out-of-bounds")]
    BlockOutOfRange { at: usize, block: u32 },

    #[error("DFND of the same block in multiple places")]
    DuplicateBlock { at: usize, block: u32 },

    #[error("VAR_ has an out-of-bounds depth")]
    DepthOutOfRange { at: usize, depth: u32 },

    #[error("Unsupported instruction {mnemonic}")]
    Unsupported { at: usize, mnemonic: &'static str },

    // --- Stack ---
    #[error("Stack size goes negative")]
    NegativeStack { at: usize },

    #[error("RETN expected to be called with one item on the stack")]
    RetnHeight { at: usize, height: i64 },

    #[error("RETD expected to be called with no more than 1 item on the stack")]
    RetdHeight { at: usize, height: i64 },

    #[error("PRED expected to be called with one item on the stack")]
    PredHeight { at: usize, height: i64 },

    #[error("No RETN/RETD found before end of bytecode")]
    MissingReturn { body: usize },

    // --- Limits ---
    #[error(">2⋆16 variables not supported")]
    TooManyVariables { body: usize, count: u32 },

    #[error("Block too deep")]
    TooDeep { body: usize, depth: u32 },
}

impl VerifyError {
    /// Generic bytecode offset the error refers to, when it concerns a
    /// single instruction.
    pub fn at(&self) -> Option<usize> {
        match self {
            VerifyError::Decode(DecodeError::UnknownOpcode { at, .. })
            | VerifyError::Decode(DecodeError::Truncated { at, .. })
            | VerifyError::LiteralOutOfRange { at, .. }
            | VerifyError::NameOutOfRange { at, .. }
            | VerifyError::BlockOutOfRange { at, .. }
            | VerifyError::DuplicateBlock { at, .. }
            | VerifyError::DepthOutOfRange { at, .. }
            | VerifyError::Unsupported { at, .. }
            | VerifyError::NegativeStack { at }
            | VerifyError::RetnHeight { at, .. }
            | VerifyError::RetdHeight { at, .. }
            | VerifyError::PredHeight { at, .. } => Some(*at),
            VerifyError::StartOutOfRange { start, .. } => Some(*start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_variants_display() {
        let errors: Vec<VerifyError> = vec![
            VerifyError::Decode(DecodeError::InvalidBlockKind(5)),
            VerifyError::BodyListLength { block: 0, len: 6 },
            VerifyError::UnsortedBodies { block: 0, slot: 1 },
            VerifyError::BodyOutOfRange { block: 0, body: 9 },
            VerifyError::StartOutOfRange { body: 0, start: 99 },
            VerifyError::NamesLength { body: 0 },
            VerifyError::TooFewVariables {
                body: 0,
                declared: 1,
                required: 3,
            },
            VerifyError::LiteralOutOfRange { at: 0, index: 4 },
            VerifyError::NameOutOfRange { at: 0, index: 4 },
            VerifyError::BlockOutOfRange { at: 0, block: 4 },
            VerifyError::DuplicateBlock { at: 0, block: 1 },
            VerifyError::DepthOutOfRange { at: 0, depth: 2 },
            VerifyError::Unsupported {
                at: 0,
                mnemonic: "SYSV",
            },
            VerifyError::NegativeStack { at: 0 },
            VerifyError::RetnHeight { at: 0, height: 2 },
            VerifyError::RetdHeight { at: 0, height: 2 },
            VerifyError::PredHeight { at: 0, height: 0 },
            VerifyError::MissingReturn { body: 0 },
            VerifyError::TooManyVariables {
                body: 0,
                count: 70000,
            },
            VerifyError::TooDeep {
                body: 0,
                depth: 70000,
            },
        ];

        for error in &errors {
            assert!(!error.to_string().is_empty(), "empty display for {error:?}");
        }
    }

    #[test]
    fn messages_match_compiler_wording() {
        assert_eq!(
            VerifyError::NegativeStack { at: 3 }.to_string(),
            "Stack size goes negative"
        );
        assert_eq!(
            VerifyError::TooManyVariables { body: 0, count: 1 << 17 }.to_string(),
            ">2⋆16 variables not supported"
        );
        assert_eq!(
            VerifyError::Unsupported {
                at: 0,
                mnemonic: "DYNO"
            }
            .to_string(),
            "Unsupported instruction DYNO"
        );
    }

    #[test]
    fn location_reported_for_instruction_errors() {
        assert_eq!(VerifyError::PredHeight { at: 7, height: 2 }.at(), Some(7));
        assert_eq!(VerifyError::MissingReturn { body: 1 }.at(), None);
    }
}
