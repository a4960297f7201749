//! Block compiler: generic bytecode to resolved, position-mapped blocks.
//!
//! Each block's bodies are compiled in groups of two dispatch lists,
//! `(monadic, dyadic)`, `(inverse-monadic, inverse-x)` and `(_, inverse-w)`.
//! Within a group the two ascending lists are merged so a body listed in
//! both is compiled once. SETH and PRED name the next candidate of each
//! list, which is only known once the whole group has been compiled, so
//! they are emitted with empty operands and patched afterwards.
//!
//! The resolved code of a block starts with the failure body's FAIL. Once
//! all groups are done the first monadic body is swapped into `bodies[0]`.

use crate::block::{Block, Body, BodyId, Instr};
use crate::comp::{Comp, UnitDesc};
use crate::error::CompileError;
use crate::scope::Scope;
use crate::value::{NsDesc, Value};
use blockvm_common::{BlockDesc, BlockKind, BodyDesc, BodyList, Opcode};
use blockvm_verifier::limits::{check_scope_depth, check_variable_count};
use blockvm_verifier::structural::{check_body_desc, check_body_list, check_operands};
use blockvm_verifier::{analyze_body, first_error, BodyFacts, UnitTables, VerifyError};
use std::rc::Rc;
use tracing::debug;

/// Compile the root block (block 0) of `unit`.
///
/// With `scope`, the result is meant to run exactly once, directly in that
/// scope (see [`Vm::run_in_scope`](crate::Vm::run_in_scope)): references
/// reaching it resolve against its live slots, and a root body declaring
/// more variables than the scope holds grows the scope's extension.
pub fn compile(unit: UnitDesc, scope: Option<&Rc<Scope>>) -> Result<Rc<Block>, CompileError> {
    if let (Some(_), Some(indices)) = (&unit.source, &unit.indices) {
        if !indices.covers(unit.code.len()) {
            return Err(CompileError::BadIndices);
        }
    }
    if unit.blocks.is_empty() {
        return Err(VerifyError::BlockOutOfRange { at: 0, block: 0 }.into());
    }

    let mut compiler = Compiler {
        unit: &unit,
        comp: Rc::new(Comp::new(&unit)),
        tables: UnitTables {
            literals: unit.literals.len(),
            names: unit.names.len(),
            blocks: unit.blocks.len(),
        },
        done: vec![false; unit.blocks.len()],
        scope,
    };
    compiler.compile_block(0, 0, 0)
}

/// A SETH or PRED waiting for its group's body map.
struct Patch {
    at: usize,
    /// Merge position of the next monadic candidate.
    pos1: usize,
    /// Merge position of the next dyadic candidate; `None` in immediate
    /// blocks.
    pos2: Option<usize>,
}

/// Resolved code of the block being compiled.
#[derive(Default)]
struct Emit {
    code: Vec<Instr>,
    map: Vec<usize>,
    blocks: Vec<Rc<Block>>,
    patches: Vec<Patch>,
}

impl Emit {
    fn push(&mut self, instr: Instr, at: usize) {
        self.code.push(instr);
        self.map.push(at);
    }
}

struct Compiler<'a> {
    unit: &'a UnitDesc,
    comp: Rc<Comp>,
    tables: UnitTables,
    /// Blocks already compiled by some DFND.
    done: Vec<bool>,
    scope: Option<&'a Rc<Scope>>,
}

impl Compiler<'_> {
    fn compile_block(&mut self, id: usize, depth: u32, my_pos: usize) -> Result<Rc<Block>, CompileError> {
        let unit = self.unit;
        let desc = &unit.blocks[id];
        first_error(check_body_list(id, &desc.bodies, unit.bodies.len()))?;

        let mut emit = Emit::default();
        emit.push(Instr::Fail, my_pos);
        let mut bodies = vec![Body::failure()];
        // First body of each of the six dispatch positions; slot 4 is unused.
        let mut starts: [usize; 6] = [0; 6];
        let mut first_monadic = 0;

        let lists = desc.bodies.padded();
        let group_count = match &desc.bodies {
            BodyList::Single(_) => 1,
            BodyList::Slots(slots) => slots.len(),
        };
        for group in (0..6).step_by(2) {
            if group >= group_count {
                break;
            }
            let (list1, list2): (&[usize], &[usize]) = if group == 4 {
                (&[], lists[4].as_slice())
            } else {
                (lists[group].as_slice(), lists[group + 1].as_slice())
            };

            // Merge positions: list1 at 0..m, a sentinel at m, list2 after it,
            // then a second sentinel.
            let m = list1.len();
            let mut body_map: Vec<Option<usize>> = vec![None; m + list2.len() + 2];
            let mut pos1 = 0;
            let mut pos2 = m + 1;
            let mut first1 = true;
            let mut first2 = true;

            loop {
                let cur1 = list1.get(pos1).copied();
                let cur2 = list2.get(pos2 - m - 1).copied();
                let current = match (cur1, cur2) {
                    (None, None) => break,
                    (Some(a), None) => a,
                    (None, Some(b)) => b,
                    (Some(a), Some(b)) => a.min(b),
                };
                let is1 = cur1 == Some(current);
                if is1 {
                    pos1 += 1;
                }
                let is2 = cur2 == Some(current);
                if is2 {
                    pos2 += 1;
                }

                let body = self.compile_body(&mut emit, desc, current, depth, pos1, pos2)?;
                let index = bodies.len();
                if is1 {
                    body_map[pos1 - 1] = Some(index);
                    if first1 {
                        first1 = false;
                        starts[group] = index;
                        if group == 0 {
                            first_monadic = index;
                        }
                    }
                }
                if is2 {
                    body_map[pos2 - 1] = Some(index);
                    if first2 {
                        first2 = false;
                        starts[group + 1] = index;
                    }
                }
                bodies.push(body);
            }

            let at_pos = |pos: usize| body_map.get(pos).copied().flatten().map(|i| BodyId(i as u32));
            for patch in std::mem::take(&mut emit.patches) {
                let next1 = at_pos(patch.pos1);
                let next2 = patch.pos2.and_then(at_pos);
                match &mut emit.code[patch.at] {
                    Instr::Seth1(n) | Instr::Pred1(n) => *n = next1,
                    Instr::Seth2(a, b) | Instr::Pred2(a, b) => {
                        *a = next1;
                        *b = next2;
                    }
                    _ => {}
                }
            }
        }

        let relabel = move |id: BodyId| {
            if id.index() == 0 {
                BodyId(first_monadic as u32)
            } else if id.index() == first_monadic {
                BodyId(0)
            } else {
                id
            }
        };
        if first_monadic != 0 {
            bodies.swap(0, first_monadic);
            for instr in &mut emit.code {
                match instr {
                    Instr::Seth1(n) | Instr::Pred1(n) => *n = n.map(relabel),
                    Instr::Seth2(a, b) | Instr::Pred2(a, b) => {
                        *a = a.map(relabel);
                        *b = b.map(relabel);
                    }
                    _ => {}
                }
            }
        }
        let entry = |slot: usize| relabel(BodyId(starts[slot] as u32));

        debug!(
            block = id,
            kind = ?desc.kind,
            immediate = desc.immediate,
            bodies = bodies.len(),
            instrs = emit.code.len(),
            depth,
            "compiled block"
        );

        Ok(Rc::new(Block {
            comp: self.comp.clone(),
            kind: desc.kind,
            immediate: desc.immediate,
            code: emit.code,
            map: emit.map,
            bodies,
            blocks: emit.blocks,
            dyadic: entry(1),
            inv_monadic: entry(2),
            inv_x: entry(3),
            inv_w: entry(5),
        }))
    }

    fn compile_body(
        &mut self,
        emit: &mut Emit,
        block: &BlockDesc,
        id: usize,
        depth: u32,
        pos1: usize,
        pos2: usize,
    ) -> Result<Body, CompileError> {
        let unit = self.unit;
        let desc = &unit.bodies[id];
        let arg_count = block.kind.arg_count(block.immediate);
        first_error(check_body_desc(id, desc, unit.code.len(), unit.names.len(), arg_count))?;
        first_error(check_variable_count(id, desc.var_count))?;
        let declared = desc.var_count as usize;

        if depth == 0 {
            if let Some(scope) = self.scope {
                if declared > scope.var_count() {
                    let names = desc.names.as_ref().ok_or(CompileError::MissingNames)?;
                    scope.grow_ext(declared, |i| unit.names[names.var_ids[i] as usize].clone());
                }
            }
        }

        let facts = analyze_body(&unit.code, id, desc.start, arg_count)?;
        let nesting = if self.scope.is_some() { None } else { Some(depth) };
        first_error(check_operands(&facts, self.tables, nesting))?;
        first_error(check_scope_depth(id, facts.max_depth))?;

        let remap = facts.has_predicate;
        if remap && depth == 0 && self.scope.is_some() {
            return Err(CompileError::PredicateInRepl);
        }

        let start = emit.code.len();
        if remap {
            // Copy every argument the body reads into a slot of its own, so
            // a later body of the chain still sees the original arguments.
            for (slot, _) in facts.args_used.iter().enumerate().filter(|(_, used)| **used) {
                let slot = slot as u32;
                emit.push(Instr::Varo { depth: 0, slot }, 0);
                emit.push(
                    Instr::Varm {
                        depth: 0,
                        slot: declared as u32 + slot,
                    },
                    0,
                );
                emit.push(Instr::Setn, 0);
                emit.push(Instr::Pops, 0);
            }
        }

        let remap_args = remap.then_some((declared as u32, arg_count as u32));
        for step in &facts.steps {
            self.emit_step(emit, block, step, depth, remap_args, pos1, pos2)?;
        }

        self.finish_body(id, desc, &facts, start, remap.then_some(arg_count))
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_step(
        &mut self,
        emit: &mut Emit,
        block: &BlockDesc,
        step: &blockvm_verifier::Step,
        depth: u32,
        remap_args: Option<(u32, u32)>,
        pos1: usize,
        pos2: usize,
    ) -> Result<(), CompileError> {
        let unit = self.unit;
        let at = step.at;
        let [a, b] = step.instr.args;
        let instr = match step.instr.opcode {
            Opcode::Push => {
                let v = unit.literals[a as usize].clone();
                if v.is_heap() {
                    Instr::Addi(v)
                } else {
                    Instr::Addu(v)
                }
            }
            Opcode::Notm => Instr::Addu(Value::Nothing),
            Opcode::Dfnd => {
                let child = self.define(a, depth, at)?;
                emit.blocks.push(child.clone());
                match child.kind {
                    BlockKind::Function => Instr::Dfnd0(child),
                    BlockKind::Modifier1 => Instr::Dfnd1(child),
                    BlockKind::Modifier2 => Instr::Dfnd2(child),
                }
            }
            Opcode::Pops => Instr::Pops,
            Opcode::Retn => Instr::Retn,
            Opcode::Retd => {
                if step.height == 1 {
                    emit.push(Instr::Pops, at);
                }
                Instr::Retd
            }
            Opcode::Arro => Instr::Arro(a),
            Opcode::Arrm => Instr::Arrm(a),
            Opcode::Fn1c => Instr::Fn1c,
            Opcode::Fn2c => Instr::Fn2c,
            Opcode::Fn1o => Instr::Fn1o,
            Opcode::Fn2o => Instr::Fn2o,
            Opcode::Tr2d => Instr::Tr2d,
            Opcode::Tr3d => Instr::Tr3d,
            Opcode::Tr3o => Instr::Tr3o,
            Opcode::Chkv => Instr::Chkv,
            Opcode::Md1c => Instr::Md1c,
            Opcode::Md2c => Instr::Md2c,
            Opcode::Md2r => Instr::Md2r,
            op @ (Opcode::Varo | Opcode::Varm | Opcode::Varu) => {
                self.resolve_var(op, a, b, depth, at, remap_args)?
            }
            op @ (Opcode::Seth | Opcode::Pred) => {
                emit.patches.push(Patch {
                    at: emit.code.len(),
                    pos1,
                    pos2: (!block.immediate).then_some(pos2),
                });
                match (op, block.immediate) {
                    (Opcode::Seth, true) => Instr::Seth1(None),
                    (Opcode::Seth, false) => Instr::Seth2(None, None),
                    (_, true) => Instr::Pred1(None),
                    (_, false) => Instr::Pred2(None, None),
                }
            }
            Opcode::Vfym => Instr::Vfym,
            Opcode::Setn => Instr::Setn,
            Opcode::Setu => Instr::Setu,
            Opcode::Setm => Instr::Setm,
            Opcode::Setc => Instr::Setc,
            Opcode::Fldo => Instr::Fldo(unit.names[a as usize].clone()),
            Opcode::Alim => Instr::Alim(unit.names[a as usize].clone()),
            op @ (Opcode::Sysv | Opcode::Dyno | Opcode::Dynm | Opcode::Md2l | Opcode::Fldm) => {
                return Err(VerifyError::Unsupported {
                    at,
                    mnemonic: op.mnemonic(),
                }
                .into());
            }
        };
        emit.push(instr, at);
        Ok(())
    }

    /// Compile the block a DFND at `at` refers to.
    fn define(&mut self, id: u32, depth: u32, at: usize) -> Result<Rc<Block>, CompileError> {
        let done = self
            .done
            .get_mut(id as usize)
            .ok_or(VerifyError::BlockOutOfRange { at, block: id })?;
        if *done {
            return Err(VerifyError::DuplicateBlock { at, block: id }.into());
        }
        *done = true;
        self.compile_block(id as usize, depth + 1, at)
    }

    /// Resolve a VARO/VARM/VARU reference against the live scope, if any.
    fn resolve_var(
        &self,
        op: Opcode,
        var_depth: u32,
        slot: u32,
        depth: u32,
        at: usize,
        remap_args: Option<(u32, u32)>,
    ) -> Result<Instr, CompileError> {
        let mut slot = slot;
        let mut ext = false;
        if let Some(scope) = self.scope {
            if var_depth >= depth {
                let target = scope
                    .ancestor((var_depth - depth) as usize)
                    .ok_or(VerifyError::DepthOutOfRange { at, depth: var_depth })?;
                let fixed = target.var_count() as u32;
                if slot >= fixed {
                    slot -= fixed;
                    ext = true;
                }
            }
        }
        if let Some((declared, args)) = remap_args {
            if var_depth == 0 && slot < args {
                slot += declared;
            }
        }
        let depth = var_depth;
        Ok(match (op, ext) {
            (Opcode::Varm, false) => Instr::Varm { depth, slot },
            (Opcode::Varm, true) => Instr::Extm { depth, slot },
            (Opcode::Varu, false) => Instr::Varu { depth, slot },
            (_, false) => Instr::Varo { depth, slot },
            // Use-once reads of extension slots stay plain reads.
            (_, true) => Instr::Exto { depth, slot },
        })
    }

    fn finish_body(
        &self,
        id: usize,
        desc: &BodyDesc,
        facts: &BodyFacts,
        start: usize,
        remapped: Option<usize>,
    ) -> Result<Body, CompileError> {
        let declared = desc.var_count as usize;
        let total = declared + remapped.unwrap_or(0);
        let var_count = u16::try_from(total).map_err(|_| VerifyError::TooManyVariables {
            body: id,
            count: total as u32,
        })?;
        let max_psc = u16::try_from(facts.max_depth).map_err(|_| VerifyError::TooDeep {
            body: id,
            depth: facts.max_depth,
        })?;
        let max_stack = if remapped.is_some() {
            facts.max_height.max(2)
        } else {
            facts.max_height
        };

        let mut names: Vec<Option<Rc<str>>> = vec![None; total];
        let mut ns_desc = None;
        if let Some(body_names) = &desc.names {
            let mut fields = Vec::new();
            for (slot, (&name_id, &exported)) in body_names
                .var_ids
                .iter()
                .zip(&body_names.exported)
                .enumerate()
            {
                let name = self.unit.names[name_id as usize].clone();
                if exported {
                    fields.push((name.clone(), slot));
                }
                names[slot] = Some(name);
            }
            ns_desc = Some(Rc::new(NsDesc { fields }));
        }

        Ok(Body {
            start,
            max_stack,
            max_psc,
            var_count,
            names,
            ns_desc,
            exists: true,
        })
    }
}
