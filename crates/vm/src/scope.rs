//! Lexical scopes.
//!
//! A scope holds the variable slots of one body activation. Closures keep
//! the scope they were defined in alive, so a write through a depth > 0
//! address is seen by every closure sharing that ancestor.

use crate::block::{Block, BodyId};
use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// The state of one variable slot.
#[derive(Debug, Clone, Default)]
pub enum Binding {
    /// Not assigned yet. Distinct from the language's `·`.
    #[default]
    Unbound,
    /// Consumed by a use-once read.
    Moved,
    Value(Value),
}

impl Binding {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Binding::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Value(v)
    }
}

/// Slots added to a live scope by later compilations against it.
#[derive(Debug, Clone, Default)]
pub struct ScopeExt {
    pub(crate) values: Vec<Binding>,
    pub(crate) names: Vec<Rc<str>>,
}

impl ScopeExt {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub struct Scope {
    pub block: Rc<Block>,
    /// The body whose variables the slots hold.
    pub body: BodyId,
    pub parent: Option<Rc<Scope>>,
    pub(crate) vars: RefCell<Vec<Binding>>,
    pub(crate) ext: RefCell<Option<ScopeExt>>,
}

impl Scope {
    /// A scope for `body` whose first slots are `given`; the rest start
    /// unbound.
    pub fn new(
        block: Rc<Block>,
        body: BodyId,
        parent: Option<Rc<Scope>>,
        given: impl IntoIterator<Item = Binding>,
    ) -> Rc<Scope> {
        let count = block.body(body).var_count as usize;
        let mut vars: Vec<Binding> = given.into_iter().take(count).collect();
        vars.resize(count, Binding::Unbound);
        Rc::new(Scope {
            block,
            body,
            parent,
            vars: RefCell::new(vars),
            ext: RefCell::new(None),
        })
    }

    /// Number of fixed slots.
    pub fn var_count(&self) -> usize {
        self.vars.borrow().len()
    }

    /// Number of extension slots.
    pub fn ext_len(&self) -> usize {
        self.ext.borrow().as_ref().map_or(0, ScopeExt::len)
    }

    /// Current value of a fixed slot.
    pub fn get(&self, slot: usize) -> Option<Value> {
        self.vars.borrow().get(slot)?.value().cloned()
    }

    /// Current value of an extension slot.
    pub fn get_ext(&self, slot: usize) -> Option<Value> {
        self.ext.borrow().as_ref()?.values.get(slot)?.value().cloned()
    }

    /// Look a variable up by name, fixed slots first.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let body = self.block.body(self.body);
        if let Some(slot) = body.names.iter().position(|n| n.as_deref() == Some(name)) {
            return self.get(slot);
        }
        let slot = self
            .ext
            .borrow()
            .as_ref()?
            .names
            .iter()
            .position(|n| &**n == name)?;
        self.get_ext(slot)
    }

    /// Names of every named slot, then of every extension slot.
    pub fn list_vars(&self) -> Vec<Rc<str>> {
        let body = self.block.body(self.body);
        let mut out: Vec<Rc<str>> = body.names.iter().flatten().cloned().collect();
        if let Some(ext) = self.ext.borrow().as_ref() {
            out.extend(ext.names.iter().cloned());
        }
        out
    }

    /// Name of fixed slot `slot`, if the body was compiled with names.
    pub(crate) fn slot_name(&self, slot: usize) -> Option<Rc<str>> {
        self.block.body(self.body).name(slot).cloned()
    }

    pub(crate) fn ext_name(&self, slot: usize) -> Option<Rc<str>> {
        self.ext.borrow().as_ref()?.names.get(slot).cloned()
    }

    /// Grow the extension so that fixed plus extension slots total `total`.
    /// New slots start unbound and are named by `name_of(i)`, `i` counting
    /// from the first fixed slot.
    pub(crate) fn grow_ext(&self, total: usize, mut name_of: impl FnMut(usize) -> Rc<str>) {
        let fixed = self.var_count();
        let mut ext = self.ext.borrow_mut();
        let ext = ext.get_or_insert_with(ScopeExt::default);
        let old = ext.len();
        let new = total.saturating_sub(fixed);
        if new <= old {
            return;
        }
        ext.values.resize(new, Binding::Unbound);
        ext.names.extend((old..new).map(|i| name_of(fixed + i)));
        debug!(old, new, "extended scope");
    }

    /// The ancestor `depth` levels up; 0 is the scope itself.
    pub fn ancestor(self: &Rc<Self>, depth: usize) -> Option<Rc<Scope>> {
        let mut scope = self;
        for _ in 0..depth {
            scope = scope.parent.as_ref()?;
        }
        Some(scope.clone())
    }

    /// Copies of the first `n` slots, carried to the next body of a
    /// dispatch chain.
    pub(crate) fn given(&self, n: usize) -> Vec<Binding> {
        self.vars.borrow().iter().take(n).cloned().collect()
    }

    /// Whether slot `slot` holds `·`; slot 2 is 𝕨 in a called block.
    pub(crate) fn holds_nothing(&self, slot: usize) -> bool {
        matches!(self.vars.borrow().get(slot), Some(Binding::Value(Value::Nothing)))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("body", &self.body)
            .field("vars", &self.var_count())
            .field("ext", &self.ext_len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
