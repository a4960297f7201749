//! Structural checks on block and body descriptors and on instruction
//! operands.
//!
//! These checks need no stack simulation; they validate the metadata the
//! parser hands over and the table indices embedded in the bytecode.

use crate::error::VerifyError;
use crate::stack::BodyFacts;
use blockvm_common::{BodyDesc, BodyList, Opcode};

/// Table sizes operands are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTables {
    pub literals: usize,
    pub names: usize,
    pub blocks: usize,
}

/// Check the shape of a block's body list.
pub fn check_body_list(block: usize, list: &BodyList, body_count: usize) -> Vec<VerifyError> {
    let mut errors = Vec::new();
    match list {
        BodyList::Single(body) => {
            if *body >= body_count {
                errors.push(VerifyError::BodyOutOfRange {
                    block,
                    body: *body,
                });
            }
        }
        BodyList::Slots(slots) => {
            if slots.is_empty() || slots.len() > 5 {
                errors.push(VerifyError::BodyListLength {
                    block,
                    len: slots.len(),
                });
            }
            for (slot, bodies) in slots.iter().enumerate() {
                if bodies.windows(2).any(|w| w[1] <= w[0]) {
                    errors.push(VerifyError::UnsortedBodies { block, slot });
                }
                for &body in bodies {
                    if body >= body_count {
                        errors.push(VerifyError::BodyOutOfRange { block, body });
                    }
                }
            }
        }
    }
    errors
}

/// Check a body descriptor against the unit it belongs to.
///
/// `arg_count` is the number of variables the owning block passes in.
pub fn check_body_desc(
    body: usize,
    desc: &BodyDesc,
    code_len: usize,
    name_count: usize,
    arg_count: usize,
) -> Vec<VerifyError> {
    let mut errors = Vec::new();

    if desc.start >= code_len {
        errors.push(VerifyError::StartOutOfRange {
            body,
            start: desc.start,
        });
    }

    if (desc.var_count as usize) < arg_count {
        errors.push(VerifyError::TooFewVariables {
            body,
            declared: desc.var_count,
            required: arg_count,
        });
    }

    if let Some(names) = &desc.names {
        let n = desc.var_count as usize;
        if names.var_ids.len() != n || names.exported.len() != n {
            errors.push(VerifyError::NamesLength { body });
        }
        for &id in &names.var_ids {
            if id as usize >= name_count {
                errors.push(VerifyError::NameOutOfRange {
                    at: desc.start,
                    index: id,
                });
            }
        }
    }

    errors
}

/// Check the operands of an analyzed body.
///
/// `nesting` is the block nesting depth of the body when it is compiled
/// without a live enclosing scope; variable references may then reach at
/// most that many scopes up. Pass `None` to skip the depth check.
pub fn check_operands(
    facts: &BodyFacts,
    tables: UnitTables,
    nesting: Option<u32>,
) -> Vec<VerifyError> {
    let mut errors = Vec::new();

    for step in &facts.steps {
        let at = step.at;
        let [a, _] = step.instr.args;
        match step.instr.opcode {
            Opcode::Push if a as usize >= tables.literals => {
                errors.push(VerifyError::LiteralOutOfRange { at, index: a });
            }
            Opcode::Fldo | Opcode::Alim if a as usize >= tables.names => {
                errors.push(VerifyError::NameOutOfRange { at, index: a });
            }
            Opcode::Dfnd if a as usize >= tables.blocks => {
                errors.push(VerifyError::BlockOutOfRange { at, block: a });
            }
            Opcode::Varo | Opcode::Varm | Opcode::Varu => {
                if let Some(nesting) = nesting {
                    if a > nesting {
                        errors.push(VerifyError::DepthOutOfRange { at, depth: a });
                    }
                }
            }
            op @ (Opcode::Sysv | Opcode::Dyno | Opcode::Dynm | Opcode::Md2l | Opcode::Fldm) => {
                errors.push(VerifyError::Unsupported {
                    at,
                    mnemonic: op.mnemonic(),
                });
            }
            _ => {}
        }
    }

    errors
}
