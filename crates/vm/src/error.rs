//! Compile and runtime errors for the blockvm VM.
//!
//! Compile errors abort a [`compile`](crate::compile) call. Runtime
//! conditions raised by the core are [`RuntimeError`]s; everything that
//! propagates through the interpreter is a [`Thrown`] carrying a message
//! value, which is what catch sites and builtins see.

use crate::value::{Inverse, Value};
use blockvm_common::{BlockKind, DecodeError};
use blockvm_verifier::VerifyError;
use thiserror::Error;

/// Errors from the block compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A static check on the generic bytecode or its descriptors failed.
    #[error("VM compiler: {0}")]
    Verify(#[from] VerifyError),

    /// Position tables don't have one entry per bytecode word.
    #[error("VM compiler: Bad indices")]
    BadIndices,

    /// A root body declares more variables than the live scope holds, but
    /// came without variable names.
    #[error("VM compiler: Full block info must be provided for extending scopes")]
    MissingNames,

    /// A body containing PRED was compiled directly against a live scope.
    #[error("Predicates cannot be used directly in a REPL")]
    PredicateInRepl,
}

impl From<DecodeError> for CompileError {
    fn from(e: DecodeError) -> Self {
        CompileError::Verify(VerifyError::Decode(e))
    }
}

/// Conditions raised by the interpreter core itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Reading variable before its defined")]
    UnboundRead,

    #[error("↩: Updating undefined variable")]
    UpdateUndefined,

    #[error("↩: Reading variable that hasn't been set")]
    ModifyUnset,

    #[error("Assignment: Mismatched shape for spread assignment")]
    SpreadShape,

    #[error("Assignment: extracting non-name from namespace")]
    NonNameExtract,

    /// A verified target outside a header saw a different value.
    #[error("Assignment: value does not match")]
    VerifyMismatch,

    #[error("Trying to read a field from non-namespace")]
    NotNamespace,

    #[error("No key found")]
    MissingField { name: String },

    #[error("Unexpected Nothing (·)")]
    UnexpectedNothing,

    #[error("Cannot call a modifier as a function")]
    ModifierAsFunction,

    #[error("Expected a 1-modifier")]
    NotModifier1,

    #[error("Expected a 2-modifier")]
    NotModifier2,

    #[error("Predicate value must be 0 or 1")]
    NotBoolean,

    /// Every header or predicate of the dispatch chain failed.
    #[error("No header matched argument{}", plural(.dyadic))]
    NoHeaderMatch { dyadic: bool },

    /// The block has no body for the requested arity.
    #[error("This block cannot be called {}", arity_adverb(.dyadic))]
    CannotCall { dyadic: bool },

    #[error("No {} undo header found for this {}", inverse_words(.inverse), .kind.noun())]
    NoUndoHeader { inverse: Inverse, kind: BlockKind },

    /// Inversion requested on something that has no inverse.
    #[error("No inverse available")]
    NoInverse,

    #[error("interrupted")]
    Interrupted,

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Root block must be an immediate function")]
    RootNotImmediate,

    #[error("Internal error: operand stack underflow")]
    StackUnderflow,

    #[error("Internal error: scope chain shorter than the body addresses")]
    ScopeChain,

    #[error("Internal error: variable slot out of range")]
    BadSlot,
}

fn plural(dyadic: &bool) -> &'static str {
    if *dyadic {
        "s"
    } else {
        ""
    }
}

fn arity_adverb(dyadic: &bool) -> &'static str {
    if *dyadic {
        "dyadically"
    } else {
        "monadically"
    }
}

fn inverse_words(inverse: &Inverse) -> &'static str {
    match inverse {
        Inverse::Monadic => "monadic",
        Inverse::OnW => "dyadic F˜⁼",
        Inverse::OnX => "dyadic F⁼",
    }
}

/// A raised error on its way to the nearest catch frame.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", .message.to_text())]
pub struct Thrown {
    pub message: Value,
}

impl Thrown {
    pub fn new(message: Value) -> Self {
        Self { message }
    }

    /// A thrown error whose message is the character list `text`.
    pub fn msg(text: &str) -> Self {
        Self::new(Value::str(text))
    }
}

impl From<RuntimeError> for Thrown {
    fn from(e: RuntimeError) -> Self {
        Thrown::msg(&e.to_string())
    }
}

impl From<CompileError> for Thrown {
    fn from(e: CompileError) -> Self {
        Thrown::msg(&e.to_string())
    }
}
