//! Whole generic bytecode streams.
//!
//! A stream is a flat concatenation of instructions with no header. Block
//! bodies start at arbitrary offsets inside it.

use crate::error::DecodeError;
use crate::instruction::{Decoder, Instruction};

/// A generic bytecode stream: a sequence of instructions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    /// The instruction stream.
    pub instructions: Vec<Instruction>,
}

impl Program {
    /// Create a program from instructions.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// Encode the whole program to words.
    pub fn encode(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(self.instructions.iter().map(Instruction::len).sum());
        for instr in &self.instructions {
            instr.encode_into(&mut words);
        }
        words
    }

    /// Decode a complete word stream.
    pub fn decode(words: &[u32]) -> Result<Self, DecodeError> {
        let instructions = Decoder::new(words, 0)
            .map(|r| r.map(|(_, instr)| instr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { instructions })
    }

    /// Word offset of each instruction.
    pub fn offsets(&self) -> Vec<usize> {
        let mut at = 0;
        self.instructions
            .iter()
            .map(|instr| {
                let here = at;
                at += instr.len();
                here
            })
            .collect()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
