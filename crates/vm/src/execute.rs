//! Main execution loop and instruction dispatch for the blockvm VM.

use crate::assign;
use crate::block::{Block, BodyId, Instr};
use crate::error::{RuntimeError, Thrown};
use crate::machine::Vm;
use crate::scope::{Binding, Scope};
use crate::value::{Function, Modifier1, Modifier2, Namespace, Target, Value};
use std::rc::Rc;
use tracing::trace;

/// How a body run ended.
enum Flow {
    Return(Value),
    /// A header or predicate failed; continue with this body.
    Next(BodyId),
}

impl Vm {
    /// Run `body_id` of `block` in `scope`, following the dispatch chain
    /// to later bodies when headers or predicates fail.
    ///
    /// On error the env entries and operands of the failing bodies are
    /// left in place for the enclosing catch frame to freeze.
    pub(crate) fn exec_body(
        &mut self,
        block: Rc<Block>,
        mut body_id: BodyId,
        mut scope: Rc<Scope>,
    ) -> Result<Value, Thrown> {
        loop {
            match self.run_body(&block, body_id, &scope)? {
                Flow::Return(value) => return Ok(value),
                Flow::Next(next) => {
                    trace!(from = body_id.0, to = next.0, "header mismatch, next body");
                    let given = scope.given(block.arg_count());
                    scope = Scope::new(block.clone(), next, scope.parent.clone(), given);
                    body_id = next;
                }
            }
        }
    }

    fn run_body(&mut self, block: &Rc<Block>, body_id: BodyId, scope: &Rc<Scope>) -> Result<Flow, Thrown> {
        let body = block.body(body_id);
        self.push_env(block.clone(), scope.clone(), body.start)?;
        self.reserve(body.max_stack as usize)?;
        let base = self.stack.len();
        let scopes = ancestors(scope, usize::from(body.max_psc).max(1))?;

        let mut pc = body.start;
        loop {
            let instr = block.code.get(pc).ok_or(RuntimeError::StackUnderflow)?;
            self.set_pc(pc);
            if let Some(profiler) = self.profiler.as_mut() {
                if profiler.due() {
                    profiler.record(&block.comp, block.position(pc));
                }
            }
            if self.config.trace_execution {
                trace!(pc, pos = block.position(pc), depth = self.stack.len(), %instr, "exec");
            }
            pc += 1;

            match instr {
                Instr::Addi(v) | Instr::Addu(v) => self.push(v.clone()),
                Instr::Pops => {
                    self.pop()?;
                }
                Instr::Arro(n) => {
                    let items = self.pop_n(*n as usize)?;
                    self.push(Value::list(items));
                }
                Instr::Arrm(n) => {
                    let items = self.pop_n(*n as usize)?;
                    self.push(Value::Target(Rc::new(Target::List(items))));
                }

                Instr::Fn1c => {
                    let f = self.pop()?;
                    let x = self.pop()?;
                    let r = self.call1(&f, x)?;
                    self.push(r);
                }
                Instr::Fn2c => {
                    let w = self.pop()?;
                    let f = self.pop()?;
                    let x = self.pop()?;
                    let r = self.call2(&f, w, x)?;
                    self.push(r);
                }
                Instr::Fn1o => {
                    let f = self.pop()?;
                    let x = self.pop()?;
                    let r = if x.is_nothing() { x } else { self.call1(&f, x)? };
                    self.push(r);
                }
                Instr::Fn2o => {
                    let w = self.pop()?;
                    let f = self.pop()?;
                    let x = self.pop()?;
                    let r = if x.is_nothing() {
                        x
                    } else if w.is_nothing() {
                        self.call1(&f, x)?
                    } else {
                        self.call2(&f, w, x)?
                    };
                    self.push(r);
                }

                Instr::Tr2d => {
                    let g = self.pop()?;
                    let h = self.pop()?;
                    self.push(Value::Function(Rc::new(Function::Atop { g, h })));
                }
                Instr::Tr3d | Instr::Tr3o => {
                    let f = self.pop()?;
                    let g = self.pop()?;
                    let h = self.pop()?;
                    let train = if f.is_nothing() && matches!(instr, Instr::Tr3o) {
                        Function::Atop { g, h }
                    } else {
                        Function::Fork { f, g, h }
                    };
                    self.push(Value::Function(Rc::new(train)));
                }
                Instr::Md1c => {
                    let f = self.pop()?;
                    let m = self.pop()?;
                    let r = self.derive1(&m, f)?;
                    self.push(r);
                }
                Instr::Md2c => {
                    let f = self.pop()?;
                    let m = self.pop()?;
                    let g = self.pop()?;
                    let r = self.derive2(&m, f, g)?;
                    self.push(r);
                }
                Instr::Md2r => {
                    let m = self.pop()?;
                    let g = self.pop()?;
                    let r = partial2(&m, g)?;
                    self.push(r);
                }
                Instr::Chkv => {
                    if self.peek()?.is_nothing() {
                        return Err(RuntimeError::UnexpectedNothing.into());
                    }
                }

                Instr::Varo { depth, slot } => {
                    let v = load_var(&scopes, *depth, *slot, false)?;
                    self.push(v);
                }
                Instr::Varu { depth, slot } => {
                    let v = load_var(&scopes, *depth, *slot, true)?;
                    self.push(v);
                }
                Instr::Exto { depth, slot } => {
                    let v = load_ext(&scopes, *depth, *slot, false)?;
                    self.push(v);
                }
                Instr::Extu { depth, slot } => {
                    let v = load_ext(&scopes, *depth, *slot, true)?;
                    self.push(v);
                }
                Instr::Varm { depth, slot } => {
                    let t = Target::Var { depth: *depth, slot: *slot };
                    self.push(Value::Target(Rc::new(t)));
                }
                Instr::Extm { depth, slot } => {
                    let t = Target::Ext { depth: *depth, slot: *slot };
                    self.push(Value::Target(Rc::new(t)));
                }

                Instr::Setn | Instr::Setu => {
                    let s = self.pop()?;
                    let x = self.pop()?;
                    assign::set(&scopes, &s, x.clone(), matches!(instr, Instr::Setu))?;
                    self.push(x);
                }
                Instr::Setm => self.exec_setm(&scopes)?,
                Instr::Setc => self.exec_setc(&scopes)?,
                Instr::Seth1(_) | Instr::Seth2(..) => {
                    let s = self.pop()?;
                    let x = self.pop()?;
                    if !assign::set_header(&scopes, &s, x)? {
                        return self.next_body(instr, scope, base);
                    }
                }
                Instr::Pred1(_) | Instr::Pred2(..) => {
                    let x = self.pop()?;
                    match x.to_bool() {
                        Some(true) => {}
                        Some(false) => return self.next_body(instr, scope, base),
                        None => return Err(RuntimeError::NotBoolean.into()),
                    }
                }

                Instr::Fldo(name) => {
                    let ns = self.pop()?;
                    let Value::Namespace(ns) = ns else {
                        return Err(RuntimeError::NotNamespace.into());
                    };
                    let v = ns.get(name).ok_or_else(|| RuntimeError::MissingField {
                        name: name.to_string(),
                    })?;
                    self.push(v);
                }
                Instr::Alim(name) => {
                    let target = self.pop()?;
                    let t = Target::Alias {
                        target,
                        field: name.clone(),
                    };
                    self.push(Value::Target(Rc::new(t)));
                }
                Instr::Vfym => {
                    let v = self.pop()?;
                    self.push(Value::Target(Rc::new(Target::Verify(v))));
                }

                Instr::Dfnd0(child) => {
                    let r = self.define_function(child, scope)?;
                    self.push(r);
                }
                Instr::Dfnd1(child) => {
                    let m = Modifier1::Block {
                        block: child.clone(),
                        scope: scope.clone(),
                    };
                    self.push(Value::Modifier1(Rc::new(m)));
                }
                Instr::Dfnd2(child) => {
                    let m = Modifier2::Block {
                        block: child.clone(),
                        scope: scope.clone(),
                    };
                    self.push(Value::Modifier2(Rc::new(m)));
                }

                Instr::Fail => {
                    return Err(RuntimeError::CannotCall {
                        dyadic: !scope.holds_nothing(2),
                    }
                    .into());
                }
                Instr::Retn => {
                    let r = self.pop()?;
                    self.pop_env();
                    return Ok(Flow::Return(r));
                }
                Instr::Retd => {
                    let ns = Namespace {
                        scope: scope.clone(),
                        desc: body.ns_desc.clone().unwrap_or_default(),
                    };
                    self.pop_env();
                    return Ok(Flow::Return(Value::Namespace(Rc::new(ns))));
                }
            }
        }
    }

    /// `𝕤 F↩ 𝕩`: pops target, function, argument.
    fn exec_setm(&mut self, scopes: &[Rc<Scope>]) -> Result<(), Thrown> {
        let s = self.pop()?;
        let f = self.pop()?;
        let x = self.pop()?;
        let w = assign::get(scopes, &s)?;
        let r = self.call2(&f, w, x)?;
        assign::set(scopes, &s, r.clone(), true)?;
        self.push(r);
        Ok(())
    }

    /// `𝕤 F↩`: pops target, function.
    fn exec_setc(&mut self, scopes: &[Rc<Scope>]) -> Result<(), Thrown> {
        let s = self.pop()?;
        let f = self.pop()?;
        let x = assign::get(scopes, &s)?;
        let r = self.call1(&f, x)?;
        assign::set(scopes, &s, r.clone(), true)?;
        self.push(r);
        Ok(())
    }

    /// Leave the current body for the next candidate named by `instr`.
    fn next_body(&mut self, instr: &Instr, scope: &Scope, base: usize) -> Result<Flow, Thrown> {
        let monadic = scope.holds_nothing(2);
        let next = match instr {
            Instr::Seth1(next) | Instr::Pred1(next) => *next,
            Instr::Seth2(m, d) | Instr::Pred2(m, d) => {
                if monadic {
                    *m
                } else {
                    *d
                }
            }
            _ => None,
        };
        let next = next.ok_or(RuntimeError::NoHeaderMatch { dyadic: !monadic })?;
        self.stack.truncate(base);
        self.pop_env();
        Ok(Flow::Next(next))
    }

    /// Pop `n` values, returned in push order.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, Thrown> {
        let len = self.stack.len();
        if n > len {
            return Err(RuntimeError::StackUnderflow.into());
        }
        Ok(self.stack.split_off(len - n))
    }
}

/// The running scope and its first `count - 1` ancestors.
fn ancestors(scope: &Rc<Scope>, count: usize) -> Result<Vec<Rc<Scope>>, Thrown> {
    let mut out = Vec::with_capacity(count);
    let mut current = Some(scope);
    for _ in 0..count {
        let s = current.ok_or(RuntimeError::ScopeChain)?;
        out.push(s.clone());
        current = s.parent.as_ref();
    }
    Ok(out)
}

/// Read a binding, leaving it moved when `consume` is set.
fn load(binding: &mut Binding, consume: bool) -> Result<Value, Thrown> {
    let value = match binding {
        Binding::Value(v) => v.clone(),
        _ => return Err(RuntimeError::UnboundRead.into()),
    };
    if consume {
        *binding = Binding::Moved;
    }
    Ok(value)
}

fn load_var(scopes: &[Rc<Scope>], depth: u32, slot: u32, consume: bool) -> Result<Value, Thrown> {
    let scope = scopes.get(depth as usize).ok_or(RuntimeError::ScopeChain)?;
    let mut vars = scope.vars.borrow_mut();
    let binding = vars.get_mut(slot as usize).ok_or(RuntimeError::BadSlot)?;
    load(binding, consume)
}

fn load_ext(scopes: &[Rc<Scope>], depth: u32, slot: u32, consume: bool) -> Result<Value, Thrown> {
    let scope = scopes.get(depth as usize).ok_or(RuntimeError::ScopeChain)?;
    let mut ext = scope.ext.borrow_mut();
    let binding = ext
        .as_mut()
        .and_then(|e| e.values.get_mut(slot as usize))
        .ok_or(RuntimeError::BadSlot)?;
    load(binding, consume)
}

/// `m _g`: bind the right operand of a 2-modifier.
fn partial2(m: &Value, g: Value) -> Result<Value, Thrown> {
    let Value::Modifier2(m) = m else {
        return Err(RuntimeError::NotModifier2.into());
    };
    Ok(Value::Modifier1(Rc::new(Modifier1::Partial { m: m.clone(), g })))
}
