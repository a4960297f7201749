//! Operand stack simulation for single bodies.
//!
//! A body is straight-line code from its start offset up to and including
//! the first RETN or RETD. Every instruction has a static stack effect, so
//! one linear walk gives the height before each instruction and the maximum
//! height the body can reach.

use crate::error::VerifyError;
use blockvm_common::{DecodeError, Instruction, Opcode};

/// Upper bound on the number of variables a block passes to its bodies.
pub const MAX_ARGS: usize = 6;

/// One instruction of a body, with the stack height before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub at: usize,
    pub instr: Instruction,
    pub height: i64,
}

/// Everything the compiler needs to know about a body's generic code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyFacts {
    /// Instructions up to and including the terminating return.
    pub steps: Vec<Step>,
    /// Highest stack height reached.
    pub max_height: u32,
    /// Number of scopes, counting the body's own, that its code can address.
    pub max_depth: u32,
    /// Whether the body contains a PRED before its return.
    pub has_predicate: bool,
    /// Which argument slots are read or written at depth 0.
    pub args_used: [bool; MAX_ARGS],
}

impl BodyFacts {
    /// The terminating RETN or RETD.
    pub fn terminator(&self) -> Option<&Step> {
        self.steps.last()
    }
}

/// Simulate the body starting at `start`.
///
/// `body` is only used to label errors. `arg_count` is the number of
/// leading variable slots filled by the caller.
pub fn analyze_body(
    code: &[u32],
    body: usize,
    start: usize,
    arg_count: usize,
) -> Result<BodyFacts, VerifyError> {
    let mut steps = Vec::new();
    let mut height: i64 = 0;
    let mut max_height: i64 = 0;
    let mut max_depth: u32 = 0;
    let mut at = start;

    loop {
        let instr = match Instruction::decode_at(code, at) {
            Ok(instr) => instr,
            Err(DecodeError::Truncated { .. }) => {
                return Err(VerifyError::MissingReturn { body });
            }
            Err(e) => return Err(e.into()),
        };

        match instr.opcode {
            Opcode::Retn if height != 1 => {
                return Err(VerifyError::RetnHeight { at, height });
            }
            Opcode::Retd if height != 1 && height != 0 => {
                return Err(VerifyError::RetdHeight { at, height });
            }
            Opcode::Pred if height != 1 => {
                return Err(VerifyError::PredHeight { at, height });
            }
            Opcode::Varo | Opcode::Varm | Opcode::Varu => {
                max_depth = max_depth.max(instr.args[0].saturating_add(1));
            }
            Opcode::Seth | Opcode::Pred => max_depth = max_depth.max(1),
            _ => {}
        }

        steps.push(Step { at, instr, height });
        height += instr.opcode.stack_delta(instr.operands());
        if height < 0 {
            return Err(VerifyError::NegativeStack { at });
        }
        max_height = max_height.max(height);

        if instr.opcode.is_return() {
            break;
        }
        at += instr.len();
    }

    let mut args_used = [false; MAX_ARGS];
    for step in &steps {
        if matches!(step.instr.opcode, Opcode::Varo | Opcode::Varm | Opcode::Varu) {
            let [depth, slot] = step.instr.args;
            if depth == 0 && (slot as usize) < arg_count.min(MAX_ARGS) {
                args_used[slot as usize] = true;
            }
        }
    }

    Ok(BodyFacts {
        steps,
        max_height: max_height as u32,
        max_depth,
        has_predicate: scan_predicates(code, start),
        args_used,
    })
}

/// True if a PRED appears before the first RETN/RETD from `start`.
///
/// The stop test evaluates both comparisons on every step.
pub fn scan_predicates(code: &[u32], start: usize) -> bool {
    let mut at = start;
    while let Ok(instr) = Instruction::decode_at(code, at) {
        let op = instr.opcode;
        if !((op != Opcode::Retn) & (op != Opcode::Retd)) {
            return false;
        }
        if op == Opcode::Pred {
            return true;
        }
        at += instr.len();
    }
    false
}
