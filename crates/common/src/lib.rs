//! blockvm common types and generic bytecode encoding.
//!
//! This crate provides the value-free foundation shared by the verifier, the
//! VM and the assembler:
//!
//! - [`Opcode`]: the generic opcode set with stack-effect tables
//! - [`Instruction`]: one decoded generic instruction, plus [`Decoder`]
//! - [`Program`]: a whole generic bytecode stream
//! - [`BlockDesc`], [`BodyDesc`]: block and body metadata from the parser
//! - [`SourceIndices`]: bytecode word → source character range
//! - [`DecodeError`]: errors from decoding word streams

pub mod descriptor;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod position;
pub mod program;

pub use descriptor::{BlockDesc, BlockKind, BodyDesc, BodyList, BodyNames};
pub use error::DecodeError;
pub use instruction::{Decoder, Instruction};
pub use opcode::Opcode;
pub use position::{SourceIndices, SourceLines};
pub use program::Program;
