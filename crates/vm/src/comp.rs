//! Compilation units.
//!
//! A [`UnitDesc`] is what the parser hands to [`compile`](crate::compile).
//! The immutable parts that must outlive compilation (bytecode, literals,
//! names, source and positions) become a [`Comp`] shared by every block
//! compiled from the unit.

use crate::value::Value;
use blockvm_common::{BlockDesc, BodyDesc, SourceIndices};
use std::rc::Rc;

/// Everything the parser produced for one compilation unit.
#[derive(Debug, Clone)]
pub struct UnitDesc {
    pub code: Vec<u32>,
    pub literals: Vec<Value>,
    pub names: Vec<Rc<str>>,
    /// Block 0 is the root.
    pub blocks: Vec<BlockDesc>,
    pub bodies: Vec<BodyDesc>,
    pub source: Option<String>,
    pub path: Option<String>,
    pub indices: Option<SourceIndices>,
}

impl UnitDesc {
    pub fn new(
        code: Vec<u32>,
        literals: Vec<Value>,
        blocks: Vec<BlockDesc>,
        bodies: Vec<BodyDesc>,
    ) -> Self {
        Self {
            code,
            literals,
            names: Vec::new(),
            blocks,
            bodies,
            source: None,
            path: None,
            indices: None,
        }
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.names = names.into_iter().map(|s| Rc::from(s.as_ref())).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>, indices: SourceIndices) -> Self {
        self.source = Some(source.into());
        self.indices = Some(indices);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// The shared, immutable remainder of a compiled unit.
#[derive(Debug)]
pub struct Comp {
    pub code: Vec<u32>,
    pub literals: Vec<Value>,
    pub names: Vec<Rc<str>>,
    pub source: Option<String>,
    pub path: Option<String>,
    pub indices: Option<SourceIndices>,
    fingerprint: [u8; 32],
}

impl Comp {
    pub fn new(unit: &UnitDesc) -> Self {
        let mut hasher = blake3::Hasher::new();
        for word in &unit.code {
            hasher.update(&word.to_le_bytes());
        }
        if let Some(source) = &unit.source {
            hasher.update(source.as_bytes());
        }
        Self {
            code: unit.code.clone(),
            literals: unit.literals.clone(),
            names: unit.names.clone(),
            source: unit.source.clone(),
            path: unit.path.clone(),
            indices: unit.indices.clone(),
            fingerprint: *hasher.finalize().as_bytes(),
        }
    }

    /// Content hash of the bytecode and source text.
    pub fn fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    /// Source character span `(start, end)` of a generic-bytecode offset,
    /// end inclusive. Only available with both source and indices.
    pub fn span(&self, pos: usize) -> Option<(usize, usize)> {
        self.source.as_ref()?;
        self.indices.as_ref()?.span(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockvm_common::{BlockKind, BodyList};

    fn unit(code: Vec<u32>) -> UnitDesc {
        UnitDesc::new(
            code,
            vec![Value::Num(1.0)],
            vec![BlockDesc::new(BlockKind::Function, true, BodyList::Single(0))],
            vec![BodyDesc::new(0, 0)],
        )
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = Comp::new(&unit(vec![0, 0, 7]));
        let b = Comp::new(&unit(vec![0, 0, 7]));
        let c = Comp::new(&unit(vec![0, 1, 7]));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        let sourced = unit(vec![0, 0, 7]).with_source("1", SourceIndices::new(vec![0; 3], vec![0; 3]));
        let d = Comp::new(&sourced);
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn span_requires_source() {
        let indices = SourceIndices::new(vec![0, 0, 2], vec![0, 0, 3]);
        let mut u = unit(vec![0, 0, 7]);
        u.indices = Some(indices.clone());
        assert_eq!(Comp::new(&u).span(2), None);
        let with_source = unit(vec![0, 0, 7]).with_source("a←1", indices);
        assert_eq!(Comp::new(&with_source).span(2), Some((2, 3)));
    }

    #[test]
    fn builder_names() {
        let u = unit(vec![]).with_names(["a", "b"]).with_path("x.bqn");
        assert_eq!(&*u.names[1], "b");
        assert_eq!(u.path.as_deref(), Some("x.bqn"));
    }
}
