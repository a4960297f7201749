//! Decoding and encoding of single generic instructions.
//!
//! A generic instruction occupies `1 + operand_count` consecutive words:
//! ```text
//! word 0:     opcode
//! word 1..=2: operands (PUSH N, VARO D S, ...)
//! ```

use crate::error::DecodeError;
use crate::opcode::Opcode;

/// A single decoded generic instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The operation.
    pub opcode: Opcode,
    /// Operand words. Only the first `opcode.operand_count()` are meaningful;
    /// the rest are zero.
    pub args: [u32; 2],
}

impl Instruction {
    /// Instruction without operands.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            args: [0, 0],
        }
    }

    /// Instruction with one operand.
    pub fn with1(opcode: Opcode, a: u32) -> Self {
        Self {
            opcode,
            args: [a, 0],
        }
    }

    /// Instruction with two operands.
    pub fn with2(opcode: Opcode, a: u32, b: u32) -> Self {
        Self {
            opcode,
            args: [a, b],
        }
    }

    /// The meaningful operand words.
    pub fn operands(&self) -> &[u32] {
        &self.args[..self.opcode.operand_count()]
    }

    /// Number of words this instruction occupies.
    pub fn len(&self) -> usize {
        self.opcode.len()
    }

    /// Append the encoded words to `out`.
    pub fn encode_into(&self, out: &mut Vec<u32>) {
        out.push(self.opcode as u32);
        out.extend_from_slice(self.operands());
    }

    /// Decode the instruction starting at word offset `at`.
    pub fn decode_at(words: &[u32], at: usize) -> Result<Self, DecodeError> {
        let word = *words.get(at).ok_or(DecodeError::Truncated {
            at,
            mnemonic: "instruction",
        })?;
        let opcode = Opcode::decode(word, at)?;
        let n = opcode.operand_count();
        if at + 1 + n > words.len() {
            return Err(DecodeError::Truncated {
                at,
                mnemonic: opcode.mnemonic(),
            });
        }
        let mut args = [0u32; 2];
        args[..n].copy_from_slice(&words[at + 1..at + 1 + n]);
        Ok(Self { opcode, args })
    }

    /// Stack items consumed.
    pub fn stack_pops(&self) -> u32 {
        self.opcode.stack_pops(self.operands())
    }

    /// Stack items produced.
    pub fn stack_pushes(&self) -> u32 {
        self.opcode.stack_pushes()
    }
}

/// Iterator over the instructions of a word stream, starting at some offset.
///
/// Yields `(offset, instruction)` pairs. Stops after the first decode error,
/// which is yielded, or at the end of the stream.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    words: &'a [u32],
    at: usize,
    failed: bool,
}

impl<'a> Decoder<'a> {
    /// Decode from `start` onwards.
    pub fn new(words: &'a [u32], start: usize) -> Self {
        Self {
            words,
            at: start,
            failed: false,
        }
    }

    /// Offset of the next instruction to be yielded.
    pub fn offset(&self) -> usize {
        self.at
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.at >= self.words.len() {
            return None;
        }
        let at = self.at;
        match Instruction::decode_at(self.words, at) {
            Ok(instr) => {
                self.at += instr.len();
                Some(Ok((at, instr)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
