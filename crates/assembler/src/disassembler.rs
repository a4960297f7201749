//! Disassembler: converts generic bytecode into canonical assembly text.
//!
//! Canonical form is one instruction per line, the uppercase mnemonic
//! followed by its operands in decimal, separated by single spaces.

use blockvm_common::{Instruction, Program};
use std::fmt::Write;

fn render(instr: &Instruction) -> String {
    let mut line = instr.opcode.mnemonic().to_string();
    for arg in instr.operands() {
        let _ = write!(line, " {arg}");
    }
    line
}

/// Canonical text, no comments.
pub(crate) fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    for instr in &program.instructions {
        out.push_str(&render(instr));
        out.push('\n');
    }
    out
}

/// Canonical text with each line's word offset appended as a comment.
pub(crate) fn listing(program: &Program) -> String {
    let mut out = String::new();
    for (at, instr) in program.offsets().into_iter().zip(&program.instructions) {
        let _ = writeln!(out, "{} ; @{at}", render(instr));
    }
    out
}
