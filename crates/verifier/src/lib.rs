//! blockvm verifier: static analysis for generic bytecode units.
//!
//! The block compiler uses the individual checks directly and stops at the
//! first error. [`verify_unit`] runs every check over a whole unit and
//! collects ALL errors, which is what tooling wants.
//!
//! # Usage
//!
//! ```
//! use blockvm_common::{BlockDesc, BlockKind, BodyDesc, BodyList, Instruction, Opcode, Program};
//! use blockvm_verifier::{verify_unit, UnitView};
//!
//! let code = Program::new(vec![
//!     Instruction::with1(Opcode::Push, 0),
//!     Instruction::new(Opcode::Retn),
//! ])
//! .encode();
//! let blocks = [BlockDesc::new(BlockKind::Function, true, BodyList::Single(0))];
//! let bodies = [BodyDesc::new(0, 0)];
//! let unit = UnitView {
//!     code: &code,
//!     literal_count: 1,
//!     name_count: 0,
//!     blocks: &blocks,
//!     bodies: &bodies,
//! };
//! assert!(verify_unit(&unit).is_ok());
//! ```
//!
//! # Passes
//!
//! 1. **Structural**: body list shape, sortedness, index ranges, names
//! 2. **Limits**: 16-bit variable count and scope depth
//! 3. **Stack**: per-body stack simulation up to the terminating return
//! 4. **Operands**: literal/name/block indices, variable depth, unsupported
//!    instructions, blocks defined more than once

pub mod error;
pub mod limits;
pub mod stack;
pub mod structural;

pub use error::VerifyError;
pub use stack::{analyze_body, scan_predicates, BodyFacts, Step, MAX_ARGS};
pub use structural::UnitTables;

use blockvm_common::{BlockDesc, BodyDesc, Opcode};
use std::collections::BTreeSet;
use tracing::debug;

/// Borrowed view of everything the parser produced for one unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitView<'a> {
    pub code: &'a [u32],
    pub literal_count: usize,
    pub name_count: usize,
    pub blocks: &'a [BlockDesc],
    pub bodies: &'a [BodyDesc],
}

impl UnitView<'_> {
    pub fn tables(&self) -> UnitTables {
        UnitTables {
            literals: self.literal_count,
            names: self.name_count,
            blocks: self.blocks.len(),
        }
    }
}

/// Turn a pass result into the first error, if any.
pub fn first_error(errors: Vec<VerifyError>) -> Result<(), VerifyError> {
    match errors.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Verify every block reachable from the root block 0.
///
/// Returns `Ok(())` if the unit passes all checks, or `Err(Vec<VerifyError>)`
/// with all errors found.
pub fn verify_unit(unit: &UnitView<'_>) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();
    if unit.blocks.is_empty() {
        return Err(vec![VerifyError::BlockOutOfRange { at: 0, block: 0 }]);
    }

    let tables = unit.tables();
    let mut defined = vec![false; unit.blocks.len()];
    let mut pending = vec![(0usize, 0u32)];
    let mut visited_blocks = 0usize;

    while let Some((block, nesting)) = pending.pop() {
        visited_blocks += 1;
        let desc = &unit.blocks[block];
        errors.extend(structural::check_body_list(
            block,
            &desc.bodies,
            unit.bodies.len(),
        ));
        let arg_count = desc.kind.arg_count(desc.immediate);

        let bodies: BTreeSet<usize> = desc
            .bodies
            .padded()
            .into_iter()
            .flatten()
            .filter(|&b| b < unit.bodies.len())
            .collect();

        for body in bodies {
            let bd = &unit.bodies[body];
            errors.extend(structural::check_body_desc(
                body,
                bd,
                unit.code.len(),
                unit.name_count,
                arg_count,
            ));
            errors.extend(limits::check_variable_count(body, bd.var_count));
            if bd.start >= unit.code.len() {
                continue;
            }

            let facts = match stack::analyze_body(unit.code, body, bd.start, arg_count) {
                Ok(facts) => facts,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            errors.extend(limits::check_scope_depth(body, facts.max_depth));
            errors.extend(structural::check_operands(&facts, tables, Some(nesting)));

            for step in &facts.steps {
                if step.instr.opcode != Opcode::Dfnd {
                    continue;
                }
                let id = step.instr.args[0];
                let Some(done) = defined.get_mut(id as usize) else {
                    continue;
                };
                if *done {
                    errors.push(VerifyError::DuplicateBlock {
                        at: step.at,
                        block: id,
                    });
                } else {
                    *done = true;
                    pending.push((id as usize, nesting + 1));
                }
            }
        }
    }

    debug!(
        blocks = visited_blocks,
        errors = errors.len(),
        "verified unit"
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
