//! Assignment through targets.
//!
//! Targets are built by VARM/EXTM/ARRM/ALIM/VFYM and consumed by the SET
//! family. `scopes` is the ancestor array of the running body; depth `d`
//! addresses `scopes[d]`.

use crate::error::{RuntimeError, Thrown};
use crate::scope::{Binding, Scope};
use crate::value::{Namespace, Target, Value};
use std::rc::Rc;

fn scope_at(scopes: &[Rc<Scope>], depth: u32) -> Result<&Rc<Scope>, Thrown> {
    scopes
        .get(depth as usize)
        .ok_or_else(|| RuntimeError::ScopeChain.into())
}

fn write_slot(slot: Option<&mut Binding>, x: Value, update: bool) -> Result<(), Thrown> {
    let slot = slot.ok_or(RuntimeError::BadSlot)?;
    if update && matches!(slot, Binding::Unbound) {
        return Err(RuntimeError::UpdateUndefined.into());
    }
    *slot = Binding::Value(x);
    Ok(())
}

fn read_slot(slot: Option<&Binding>) -> Result<Value, Thrown> {
    match slot {
        Some(Binding::Value(v)) => Ok(v.clone()),
        Some(_) => Err(RuntimeError::ModifyUnset.into()),
        None => Err(RuntimeError::BadSlot.into()),
    }
}

/// The name a target destructures from a namespace.
fn target_name(scopes: &[Rc<Scope>], target: &Target) -> Result<Rc<str>, Thrown> {
    let name = match target {
        Target::Var { depth, slot } => scope_at(scopes, *depth)?.slot_name(*slot as usize),
        Target::Ext { depth, slot } => scope_at(scopes, *depth)?.ext_name(*slot as usize),
        Target::Alias { field, .. } => Some(field.clone()),
        _ => None,
    };
    name.ok_or_else(|| RuntimeError::NonNameExtract.into())
}

/// The value a namespace destructuring hands to `element`.
fn ns_field(
    scopes: &[Rc<Scope>],
    ns: &Namespace,
    element: &Value,
) -> Result<Option<(Value, Value)>, Thrown> {
    let Value::Target(t) = element else {
        return Err(RuntimeError::NonNameExtract.into());
    };
    let name = target_name(scopes, t)?;
    let inner = match &**t {
        Target::Alias { target, .. } => target.clone(),
        _ => element.clone(),
    };
    Ok(ns.get(&name).map(|v| (inner, v)))
}

/// Assign `x` to `target`. With `update`, every variable written must
/// already hold a value.
pub(crate) fn set(
    scopes: &[Rc<Scope>],
    target: &Value,
    x: Value,
    update: bool,
) -> Result<(), Thrown> {
    let t = match target {
        Value::Nothing => return Ok(()),
        Value::Target(t) => t,
        _ => return Err(RuntimeError::NonNameExtract.into()),
    };
    match &**t {
        Target::Var { depth, slot } => {
            let scope = scope_at(scopes, *depth)?;
            let mut vars = scope.vars.borrow_mut();
            write_slot(vars.get_mut(*slot as usize), x, update)
        }
        Target::Ext { depth, slot } => {
            let scope = scope_at(scopes, *depth)?;
            let mut ext = scope.ext.borrow_mut();
            let slot = ext.as_mut().and_then(|e| e.values.get_mut(*slot as usize));
            write_slot(slot, x, update)
        }
        Target::Alias { target, .. } => set(scopes, target, x, update),
        Target::Verify(v) => {
            if v.matches(&x) {
                Ok(())
            } else {
                Err(RuntimeError::VerifyMismatch.into())
            }
        }
        Target::List(elements) => match &x {
            Value::Array(items) if items.len() == elements.len() => {
                for (element, item) in elements.iter().zip(items.iter()) {
                    set(scopes, element, item.clone(), update)?;
                }
                Ok(())
            }
            Value::Namespace(ns) => {
                for element in elements {
                    match ns_field(scopes, ns, element)? {
                        Some((inner, v)) => set(scopes, &inner, v, update)?,
                        None => {
                            let name = match element {
                                Value::Target(t) => target_name(scopes, t)?.to_string(),
                                _ => String::new(),
                            };
                            return Err(RuntimeError::MissingField { name }.into());
                        }
                    }
                }
                Ok(())
            }
            _ => Err(RuntimeError::SpreadShape.into()),
        },
    }
}

/// Header assignment: like [`set`], but a mismatch answers `false`
/// instead of raising.
pub(crate) fn set_header(
    scopes: &[Rc<Scope>],
    target: &Value,
    x: Value,
) -> Result<bool, Thrown> {
    let t = match target {
        Value::Nothing => return Ok(true),
        Value::Target(t) => t,
        _ => return Ok(false),
    };
    match &**t {
        Target::Verify(v) => Ok(v.matches(&x)),
        Target::Var { .. } | Target::Ext { .. } => {
            set(scopes, target, x, false)?;
            Ok(true)
        }
        Target::Alias { target, .. } => set_header(scopes, target, x),
        Target::List(elements) => match &x {
            Value::Array(items) => {
                if items.len() != elements.len() {
                    return Ok(false);
                }
                for (element, item) in elements.iter().zip(items.iter()) {
                    if !set_header(scopes, element, item.clone())? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Value::Namespace(ns) => {
                for element in elements {
                    match ns_field(scopes, ns, element)? {
                        Some((inner, v)) => {
                            if !set_header(scopes, &inner, v)? {
                                return Ok(false);
                            }
                        }
                        None => return Ok(false),
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        },
    }
}

/// Current value held by `target`, for modified assignment.
pub(crate) fn get(scopes: &[Rc<Scope>], target: &Value) -> Result<Value, Thrown> {
    let Value::Target(t) = target else {
        return Err(RuntimeError::ModifyUnset.into());
    };
    match &**t {
        Target::Var { depth, slot } => {
            let scope = scope_at(scopes, *depth)?;
            let vars = scope.vars.borrow();
            read_slot(vars.get(*slot as usize))
        }
        Target::Ext { depth, slot } => {
            let scope = scope_at(scopes, *depth)?;
            let ext = scope.ext.borrow();
            read_slot(ext.as_ref().and_then(|e| e.values.get(*slot as usize)))
        }
        Target::List(elements) => {
            let items = elements
                .iter()
                .map(|e| get(scopes, e))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(items))
        }
        Target::Alias { target, .. } => get(scopes, target),
        Target::Verify(_) => Err(RuntimeError::ModifyUnset.into()),
    }
}
