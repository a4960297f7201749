//! Calling values: functions, derived functions, trains and block
//! closures, plus modifier application and inverse lookup.
//!
//! A block call fills the first slots of the new scope in a fixed order:
//! `𝕤 𝕩 𝕨` for functions, `𝕤 𝕩 𝕨 𝕣 𝕗` for 1-modifier derived functions,
//! `𝕤 𝕩 𝕨 𝕣 𝕗 𝕘` for 2-modifier derived functions. `𝕨` is `·` in a
//! monadic call, which is how headers tell the arities apart.

use crate::block::{Block, BodyId};
use crate::error::{RuntimeError, Thrown};
use crate::machine::Vm;
use crate::scope::{Binding, Scope};
use crate::value::{Function, Inverse, Modifier1, Modifier2, Value};
use std::rc::Rc;
use tracing::debug;

/// Native stack left before a block call moves to a fresh segment.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each fresh native stack segment.
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

impl Vm {
    /// `F 𝕩`. Data values called as functions return themselves.
    pub fn call1(&mut self, f: &Value, x: Value) -> Result<Value, Thrown> {
        self.call(f, None, x)
    }

    /// `𝕨 F 𝕩`.
    pub fn call2(&mut self, f: &Value, w: Value, x: Value) -> Result<Value, Thrown> {
        self.call(f, Some(w), x)
    }

    fn call(&mut self, f: &Value, w: Option<Value>, x: Value) -> Result<Value, Thrown> {
        let func = match f {
            Value::Function(func) => func,
            Value::Modifier1(_) | Value::Modifier2(_) | Value::Target(_) => {
                return Err(RuntimeError::ModifierAsFunction.into());
            }
            _ => return Ok(f.clone()),
        };
        match &**func {
            Function::Builtin(p) => match w {
                Some(w) => p.call2(self, w, x),
                None => p.call1(self, x),
            },
            Function::Block { block, scope } => {
                let body = entry(block, w.is_some());
                let given = vec![f.clone(), x, w.unwrap_or(Value::Nothing)];
                self.exec_block(block, body, scope, given)
            }
            Function::Derived1 { m, f: op } => match &**m {
                Modifier1::Builtin(p) => match w {
                    Some(w) => p.call2(self, op, w, x),
                    None => p.call1(self, op, x),
                },
                Modifier1::Block { block, scope } => {
                    let body = entry(block, w.is_some());
                    let given = vec![
                        f.clone(),
                        x,
                        w.unwrap_or(Value::Nothing),
                        Value::Modifier1(m.clone()),
                        op.clone(),
                    ];
                    self.exec_block(block, body, scope, given)
                }
                Modifier1::Partial { m: m2, g } => self.call_derived2(f, m2, op, g, w, x),
            },
            Function::Derived2 { m, f: op, g } => self.call_derived2(f, m, op, g, w, x),
            Function::Atop { g, h } => {
                let r = self.call(h, w, x)?;
                self.call1(g, r)
            }
            Function::Fork { f: l, g, h } => {
                let r = self.call(h, w.clone(), x.clone())?;
                let l = self.call(l, w, x)?;
                self.call2(g, l, r)
            }
        }
    }

    fn call_derived2(
        &mut self,
        this: &Value,
        m: &Rc<Modifier2>,
        f: &Value,
        g: &Value,
        w: Option<Value>,
        x: Value,
    ) -> Result<Value, Thrown> {
        match &**m {
            Modifier2::Builtin(p) => match w {
                Some(w) => p.call2(self, f, g, w, x),
                None => p.call1(self, f, g, x),
            },
            Modifier2::Block { block, scope } => {
                let body = entry(block, w.is_some());
                let given = vec![
                    this.clone(),
                    x,
                    w.unwrap_or(Value::Nothing),
                    Value::Modifier2(m.clone()),
                    f.clone(),
                    g.clone(),
                ];
                self.exec_block(block, body, scope, given)
            }
        }
    }

    /// Call an inverse of `f`. `w` is `·` for [`Inverse::Monadic`].
    ///
    /// A block without the requested undo header fails with an env entry
    /// for its failure body, so the backtrace points at the block.
    pub fn call_inverse(
        &mut self,
        f: &Value,
        inverse: Inverse,
        w: Value,
        x: Value,
    ) -> Result<Value, Thrown> {
        let func = match f {
            Value::Function(func) => func,
            Value::Modifier1(_) | Value::Modifier2(_) | Value::Target(_) => {
                return Err(RuntimeError::ModifierAsFunction.into());
            }
            _ => return Err(RuntimeError::NoInverse.into()),
        };
        match &**func {
            Function::Builtin(p) => p.inverse(self, inverse, w, x),
            Function::Block { block, scope } => {
                self.exec_inverse(block, scope, inverse, vec![f.clone(), x, w])
            }
            Function::Derived1 { m, f: op } => match &**m {
                Modifier1::Block { block, scope } => {
                    let given = vec![f.clone(), x, w, Value::Modifier1(m.clone()), op.clone()];
                    self.exec_inverse(block, scope, inverse, given)
                }
                Modifier1::Partial { m: m2, g } => {
                    self.inverse_derived2(f, m2, op, g, inverse, w, x)
                }
                Modifier1::Builtin(_) => Err(RuntimeError::NoInverse.into()),
            },
            Function::Derived2 { m, f: op, g } => self.inverse_derived2(f, m, op, g, inverse, w, x),
            Function::Atop { .. } | Function::Fork { .. } => Err(RuntimeError::NoInverse.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn inverse_derived2(
        &mut self,
        this: &Value,
        m: &Rc<Modifier2>,
        f: &Value,
        g: &Value,
        inverse: Inverse,
        w: Value,
        x: Value,
    ) -> Result<Value, Thrown> {
        match &**m {
            Modifier2::Block { block, scope } => {
                let given = vec![
                    this.clone(),
                    x,
                    w,
                    Value::Modifier2(m.clone()),
                    f.clone(),
                    g.clone(),
                ];
                self.exec_inverse(block, scope, inverse, given)
            }
            Modifier2::Builtin(_) => Err(RuntimeError::NoInverse.into()),
        }
    }

    fn exec_inverse(
        &mut self,
        block: &Rc<Block>,
        parent: &Rc<Scope>,
        inverse: Inverse,
        given: Vec<Value>,
    ) -> Result<Value, Thrown> {
        let body = block.inverse(inverse);
        if block.body(body).exists {
            return self.exec_block(block, body, parent, given);
        }
        let scope = Scope::new(block.clone(), body, Some(parent.clone()), []);
        self.push_env(block.clone(), scope, block.body(body).start)?;
        debug!(?inverse, kind = ?block.kind, "no undo header");
        Err(RuntimeError::NoUndoHeader {
            inverse,
            kind: block.kind,
        }
        .into())
    }

    /// `F _m`. An immediate block modifier runs at once; anything else
    /// produces a derived function.
    pub fn derive1(&mut self, m: &Value, f: Value) -> Result<Value, Thrown> {
        let Value::Modifier1(rc) = m else {
            return Err(RuntimeError::NotModifier1.into());
        };
        match &**rc {
            Modifier1::Block { block, scope } if block.immediate => {
                self.exec_block(block, BodyId(0), scope, vec![m.clone(), f])
            }
            Modifier1::Partial { m: m2, g } => {
                self.derive2(&Value::Modifier2(m2.clone()), f, g.clone())
            }
            _ => Ok(Value::Function(Rc::new(Function::Derived1 { m: rc.clone(), f }))),
        }
    }

    /// `F _m_ G`.
    pub fn derive2(&mut self, m: &Value, f: Value, g: Value) -> Result<Value, Thrown> {
        let Value::Modifier2(rc) = m else {
            return Err(RuntimeError::NotModifier2.into());
        };
        match &**rc {
            Modifier2::Block { block, scope } if block.immediate => {
                self.exec_block(block, BodyId(0), scope, vec![m.clone(), f, g])
            }
            _ => Ok(Value::Function(Rc::new(Function::Derived2 {
                m: rc.clone(),
                f,
                g,
            }))),
        }
    }

    /// The value of a DFND0: an immediate block's result, or a closure.
    pub(crate) fn define_function(&mut self, block: &Rc<Block>, scope: &Rc<Scope>) -> Result<Value, Thrown> {
        if block.immediate {
            return self.exec_block(block, BodyId(0), scope, Vec::new());
        }
        Ok(Value::Function(Rc::new(Function::Block {
            block: block.clone(),
            scope: scope.clone(),
        })))
    }

    /// Run `body` of `block` in a new scope under `parent` whose first
    /// slots are `given`. Honors pending interrupts.
    ///
    /// Block calls recurse natively; the native stack grows on demand so
    /// that `max_env_depth` is the limit that raises "Stack overflow".
    pub(crate) fn exec_block(
        &mut self,
        block: &Rc<Block>,
        body: BodyId,
        parent: &Rc<Scope>,
        given: Vec<Value>,
    ) -> Result<Value, Thrown> {
        if self.interrupt.take() {
            debug!("interrupt observed at block call");
            return Err(RuntimeError::Interrupted.into());
        }
        let scope = Scope::new(
            block.clone(),
            body,
            Some(parent.clone()),
            given.into_iter().map(Binding::Value),
        );
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.exec_body(block.clone(), body, scope)
        })
    }
}

fn entry(block: &Block, dyadic: bool) -> BodyId {
    if dyadic {
        block.dyadic
    } else {
        block.monadic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Primitive;

    struct Negate;

    impl Primitive for Negate {
        fn name(&self) -> &str {
            "-"
        }

        fn call1(&self, _vm: &mut Vm, x: Value) -> Result<Value, Thrown> {
            match x {
                Value::Num(n) => Ok(Value::Num(-n)),
                _ => Err(Thrown::msg("-: expected number")),
            }
        }

        fn call2(&self, _vm: &mut Vm, w: Value, x: Value) -> Result<Value, Thrown> {
            match (w, x) {
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a - b)),
                _ => Err(Thrown::msg("-: expected numbers")),
            }
        }

        fn inverse(&self, vm: &mut Vm, inverse: Inverse, _w: Value, x: Value) -> Result<Value, Thrown> {
            match inverse {
                Inverse::Monadic => self.call1(vm, x),
                _ => Err(RuntimeError::NoInverse.into()),
            }
        }
    }

    fn negate() -> Value {
        Value::Function(Rc::new(Function::Builtin(Rc::new(Negate))))
    }

    #[test]
    fn data_calls_itself() {
        let mut vm = Vm::new();
        assert_eq!(vm.call1(&Value::Num(3.0), Value::Num(1.0)), Ok(Value::Num(3.0)));
        assert_eq!(
            vm.call2(&Value::Char('a'), Value::Nothing, Value::Num(1.0)),
            Ok(Value::Char('a'))
        );
    }

    #[test]
    fn builtin_arity() {
        let mut vm = Vm::new();
        let f = negate();
        assert_eq!(vm.call1(&f, Value::Num(3.0)), Ok(Value::Num(-3.0)));
        assert_eq!(
            vm.call2(&f, Value::Num(5.0), Value::Num(3.0)),
            Ok(Value::Num(2.0))
        );
    }

    #[test]
    fn trains() {
        let mut vm = Vm::new();
        let atop = Value::Function(Rc::new(Function::Atop {
            g: negate(),
            h: negate(),
        }));
        assert_eq!(vm.call1(&atop, Value::Num(3.0)), Ok(Value::Num(3.0)));
        // (10 - -) x  →  10 - (-x)
        let fork = Value::Function(Rc::new(Function::Fork {
            f: Value::Num(10.0),
            g: negate(),
            h: negate(),
        }));
        assert_eq!(vm.call1(&fork, Value::Num(3.0)), Ok(Value::Num(13.0)));
    }

    #[test]
    fn builtin_inverse() {
        let mut vm = Vm::new();
        let f = negate();
        assert_eq!(
            vm.call_inverse(&f, Inverse::Monadic, Value::Nothing, Value::Num(2.0)),
            Ok(Value::Num(-2.0))
        );
        assert_eq!(
            vm.call_inverse(&f, Inverse::OnX, Value::Num(1.0), Value::Num(2.0)),
            Err(RuntimeError::NoInverse.into())
        );
        assert_eq!(
            vm.call_inverse(&Value::Num(1.0), Inverse::Monadic, Value::Nothing, Value::Num(2.0)),
            Err(RuntimeError::NoInverse.into())
        );
    }

    #[test]
    fn modifiers_are_not_functions() {
        let mut vm = Vm::new();
        assert_eq!(
            vm.derive1(&Value::Num(1.0), negate()),
            Err(RuntimeError::NotModifier1.into())
        );
        assert_eq!(
            vm.derive2(&negate(), negate(), negate()),
            Err(RuntimeError::NotModifier2.into())
        );
    }
}
