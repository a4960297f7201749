//! Assembler for blockvm generic bytecode.
//!
//! A mechanical 1:1 translation between text and the flat word stream the
//! VM compiler consumes. Besides instructions, a line may carry an
//! `@name:` label that records the word offset of the next instruction,
//! which is how test fixtures find body start offsets.
//!
//! # Usage
//!
//! ```
//! use blockvm_assembler::{assemble, assemble_labeled, disassemble};
//!
//! let text = "PUSH 0\nRETN\n";
//! let program = assemble(text).unwrap();
//! assert_eq!(program.encode(), vec![0x00, 0, 0x07]);
//! assert_eq!(disassemble(&program), text);
//!
//! let unit = assemble_labeled("PUSH 0\nRETN\n@second: PUSH 1\nRETN\n").unwrap();
//! assert_eq!(unit.label("second"), Some(3));
//! ```
//!
//! # Roundtrip Guarantee
//!
//! `assemble(disassemble(program)) == program` holds for every program.
//! The disassembler prints decimal operands; the assembler also accepts hex.

pub mod error;

mod disassembler;
mod lexer;
mod parser;

pub use error::AsmError;

use blockvm_common::Program;
use lexer::tokenize_line;
use parser::parse_line;
use std::collections::BTreeMap;

/// An assembled program together with its label offsets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assembly {
    pub program: Program,
    /// Label name to word offset.
    pub labels: BTreeMap<String, usize>,
}

impl Assembly {
    /// Word offset of `name`, if it was defined.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn words(&self) -> Vec<u32> {
        self.program.encode()
    }
}

/// Assemble text, keeping label offsets.
///
/// Returns the first error encountered.
pub fn assemble_labeled(text: &str) -> Result<Assembly, AsmError> {
    let mut assembly = Assembly::default();
    let mut offset = 0;

    for (idx, line) in text.lines().enumerate() {
        let line_num = idx + 1;
        let tokens = tokenize_line(line, line_num)?;
        let parsed = parse_line(&tokens, line_num)?;
        if let Some(label) = parsed.label {
            if assembly.labels.contains_key(&label) {
                return Err(AsmError::DuplicateLabel {
                    line: line_num,
                    label,
                });
            }
            assembly.labels.insert(label, offset);
        }
        if let Some(instr) = parsed.instr {
            offset += instr.len();
            assembly.program.instructions.push(instr);
        }
    }

    Ok(assembly)
}

/// Assemble text into a program, discarding labels.
pub fn assemble(text: &str) -> Result<Program, AsmError> {
    assemble_labeled(text).map(|assembly| assembly.program)
}

/// Disassemble a program into canonical assembly text.
pub fn disassemble(program: &Program) -> String {
    disassembler::disassemble(program)
}

/// Canonical text with `; @offset` comments. Reassembles to the same program.
pub fn listing(program: &Program) -> String {
    disassembler::listing(program)
}
