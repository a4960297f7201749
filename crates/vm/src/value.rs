//! The value boundary between the interpreter core and the value subsystem.
//!
//! The core only needs a handful of value kinds: the `Nothing` sentinel,
//! atoms to compare headers against, lists for stranding and destructuring,
//! namespaces, and the three callable kinds. Builtins plug in through the
//! [`Primitive`], [`Primitive1`] and [`Primitive2`] traits.

use crate::block::Block;
use crate::error::Thrown;
use crate::machine::Vm;
use crate::scope::{Binding, Scope};
use std::fmt;
use std::rc::Rc;

/// Which inverse of a function is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inverse {
    /// `F⁼ 𝕩`
    Monadic,
    /// `𝕨 F˜⁼ 𝕩`, solving for the left argument.
    OnW,
    /// `𝕨 F⁼ 𝕩`, solving for the right argument.
    OnX,
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// The `·` sentinel: "no argument".
    Nothing,
    Num(f64),
    Char(char),
    /// A rank-1 list.
    Array(Rc<[Value]>),
    Namespace(Rc<Namespace>),
    Function(Rc<Function>),
    Modifier1(Rc<Modifier1>),
    Modifier2(Rc<Modifier2>),
    /// An assignment target; only ever lives on the operand stack.
    Target(Rc<Target>),
}

impl Value {
    /// A character list holding `text`.
    pub fn str(text: &str) -> Value {
        Value::Array(text.chars().map(Value::Char).collect())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::Array(items.into())
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }

    /// Whether the value owns heap data; literals of this kind compile to
    /// ADDI, everything else to ADDU.
    pub fn is_heap(&self) -> bool {
        !matches!(self, Value::Nothing | Value::Num(_) | Value::Char(_))
    }

    /// The characters of a character list.
    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Char(c) => Some(*c),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    /// Message text: the raw characters of a character list, the display
    /// form of anything else.
    pub fn to_text(&self) -> String {
        self.as_str().unwrap_or_else(|| self.to_string())
    }

    /// Interpret a predicate result.
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Num(n) if *n == 0.0 => Some(false),
            Value::Num(n) if *n == 1.0 => Some(true),
            _ => None,
        }
    }

    /// Structural equality: atoms by value, lists elementwise, everything
    /// else by identity.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.matches(y))
            }
            (Value::Namespace(a), Value::Namespace(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Modifier1(a), Value::Modifier1(b)) => Rc::ptr_eq(a, b),
            (Value::Modifier2(a), Value::Modifier2(b)) => Rc::ptr_eq(a, b),
            (Value::Target(a), Value::Target(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "·"),
            Value::Num(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Num(n) => write!(f, "{n}"),
            Value::Char(c) => write!(f, "'{c}'"),
            Value::Array(items) => {
                if !items.is_empty() {
                    if let Some(text) = self.as_str() {
                        return write!(f, "\"{text}\"");
                    }
                }
                write!(f, "⟨")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "⟩")
            }
            Value::Namespace(_) => write!(f, "{{namespace}}"),
            Value::Function(func) => match &**func {
                Function::Builtin(p) => write!(f, "{}", p.name()),
                Function::Block { .. } => write!(f, "{{function block}}"),
                _ => write!(f, "{{derived function}}"),
            },
            Value::Modifier1(m) => match &**m {
                Modifier1::Builtin(p) => write!(f, "{}", p.name()),
                Modifier1::Block { .. } => write!(f, "{{1-modifier block}}"),
                Modifier1::Partial { .. } => write!(f, "{{partial 2-modifier}}"),
            },
            Value::Modifier2(m) => match &**m {
                Modifier2::Builtin(p) => write!(f, "{}", p.name()),
                Modifier2::Block { .. } => write!(f, "{{2-modifier block}}"),
            },
            Value::Target(_) => write!(f, "{{assignment target}}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A builtin function.
pub trait Primitive {
    fn name(&self) -> &str;

    fn call1(&self, vm: &mut Vm, x: Value) -> Result<Value, Thrown>;

    fn call2(&self, vm: &mut Vm, w: Value, x: Value) -> Result<Value, Thrown>;

    /// `w` is `Nothing` for [`Inverse::Monadic`].
    fn inverse(&self, _vm: &mut Vm, _inverse: Inverse, _w: Value, _x: Value) -> Result<Value, Thrown> {
        Err(crate::RuntimeError::NoInverse.into())
    }
}

/// A builtin 1-modifier; its derived function calls back with the operand.
pub trait Primitive1 {
    fn name(&self) -> &str;

    fn call1(&self, vm: &mut Vm, f: &Value, x: Value) -> Result<Value, Thrown>;

    fn call2(&self, vm: &mut Vm, f: &Value, w: Value, x: Value) -> Result<Value, Thrown>;
}

/// A builtin 2-modifier.
pub trait Primitive2 {
    fn name(&self) -> &str;

    fn call1(&self, vm: &mut Vm, f: &Value, g: &Value, x: Value) -> Result<Value, Thrown>;

    fn call2(&self, vm: &mut Vm, f: &Value, g: &Value, w: Value, x: Value)
        -> Result<Value, Thrown>;
}

pub enum Function {
    Builtin(Rc<dyn Primitive>),
    /// A closure: a non-immediate function block and its defining scope.
    Block { block: Rc<Block>, scope: Rc<Scope> },
    Derived1 { m: Rc<Modifier1>, f: Value },
    Derived2 { m: Rc<Modifier2>, f: Value, g: Value },
    /// `g h`
    Atop { g: Value, h: Value },
    /// `f g h`
    Fork { f: Value, g: Value, h: Value },
}

pub enum Modifier1 {
    Builtin(Rc<dyn Primitive1>),
    Block { block: Rc<Block>, scope: Rc<Scope> },
    /// A 2-modifier with its right operand bound.
    Partial { m: Rc<Modifier2>, g: Value },
}

pub enum Modifier2 {
    Builtin(Rc<dyn Primitive2>),
    Block { block: Rc<Block>, scope: Rc<Scope> },
}

/// Where an assignment writes.
pub enum Target {
    /// A slot of the scope `depth` levels up.
    Var { depth: u32, slot: u32 },
    /// A slot of that scope's extension.
    Ext { depth: u32, slot: u32 },
    /// A destructuring list.
    List(Vec<Value>),
    /// Take field `field` of a namespace and assign it to `target`.
    Alias { target: Value, field: Rc<str> },
    /// Only succeeds for a value matching the one held.
    Verify(Value),
}

/// Which fields of a scope a namespace exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NsDesc {
    /// Exported names and the slots they live in.
    pub fields: Vec<(Rc<str>, usize)>,
}

impl NsDesc {
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|&(_, slot)| slot)
    }
}

/// The scope of a body that ended with RETD.
pub struct Namespace {
    pub scope: Rc<Scope>,
    pub desc: Rc<NsDesc>,
}

impl Namespace {
    /// The current value of an exported field.
    pub fn get(&self, name: &str) -> Option<Value> {
        let slot = self.desc.slot(name)?;
        match self.scope.vars.borrow().get(slot) {
            Some(Binding::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.desc.fields.iter().map(|(n, _)| &**n)
    }
}
