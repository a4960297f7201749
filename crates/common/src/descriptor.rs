//! Block and body descriptors handed to the block compiler.
//!
//! The parser describes every block of a compilation unit as a
//! [`BlockDesc`] and every body as a [`BodyDesc`]. Blocks refer to bodies by
//! index into the unit's body table; DFND instructions refer to blocks by
//! index into the block table. Block 0 is the root.

use crate::error::DecodeError;

/// What a block evaluates to when called or applied.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Function = 0,
    Modifier1 = 1,
    Modifier2 = 2,
}

impl BlockKind {
    /// Number of variables a body of this kind receives from its caller.
    ///
    /// Non-immediate blocks get `𝕤 𝕩 𝕨` plus `𝕣 𝕗 (𝕘)` for modifiers;
    /// immediate modifiers get `𝕣 𝕗 (𝕘)` only.
    pub fn arg_count(self, immediate: bool) -> usize {
        let ty = self as usize;
        (if immediate { 0 } else { 3 }) + ty + usize::from(ty > 0)
    }

    /// Short lowercase name, used in dispatch error messages.
    pub fn noun(self) -> &'static str {
        match self {
            BlockKind::Function => "block",
            BlockKind::Modifier1 => "1-modifier block",
            BlockKind::Modifier2 => "2-modifier block",
        }
    }
}

impl TryFrom<u32> for BlockKind {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BlockKind::Function),
            1 => Ok(BlockKind::Modifier1),
            2 => Ok(BlockKind::Modifier2),
            other => Err(DecodeError::InvalidBlockKind(other)),
        }
    }
}

/// Which bodies make up a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyList {
    /// One body serves both the monadic and the dyadic case.
    Single(usize),
    /// Up to five ascending lists of body indices:
    /// `[monadic, dyadic, inverse-monadic, inverse-x, inverse-w]`.
    Slots(Vec<Vec<usize>>),
}

impl BodyList {
    /// The five dispatch lists, padding missing ones with empty lists.
    pub fn padded(&self) -> [Vec<usize>; 5] {
        let mut out: [Vec<usize>; 5] = Default::default();
        match self {
            BodyList::Single(i) => {
                out[0] = vec![*i];
                out[1] = vec![*i];
            }
            BodyList::Slots(lists) => {
                for (slot, list) in out.iter_mut().zip(lists) {
                    slot.clone_from(list);
                }
            }
        }
        out
    }
}

/// A block as described by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDesc {
    pub kind: BlockKind,
    /// Immediate blocks run at definition time instead of producing a
    /// callable.
    pub immediate: bool,
    pub bodies: BodyList,
}

impl BlockDesc {
    pub fn new(kind: BlockKind, immediate: bool, bodies: BodyList) -> Self {
        Self {
            kind,
            immediate,
            bodies,
        }
    }
}

/// Variable naming for a body whose scope may be exported as a namespace
/// or extended interactively.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyNames {
    /// Index into the unit's name list, one per declared variable.
    pub var_ids: Vec<u32>,
    /// Whether each declared variable is exported from a namespace.
    pub exported: Vec<bool>,
}

/// A body as described by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDesc {
    /// Word offset of the body's first instruction in the generic bytecode.
    pub start: usize,
    /// Declared variable count, argument slots included.
    pub var_count: u32,
    pub names: Option<BodyNames>,
}

impl BodyDesc {
    /// Body without name information.
    pub fn new(start: usize, var_count: u32) -> Self {
        Self {
            start,
            var_count,
            names: None,
        }
    }

    /// Body with name information.
    pub fn named(start: usize, var_count: u32, names: BodyNames) -> Self {
        Self {
            start,
            var_count,
            names: Some(names),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_counts() {
        assert_eq!(BlockKind::Function.arg_count(false), 3);
        assert_eq!(BlockKind::Modifier1.arg_count(false), 5);
        assert_eq!(BlockKind::Modifier2.arg_count(false), 6);
        assert_eq!(BlockKind::Function.arg_count(true), 0);
        assert_eq!(BlockKind::Modifier1.arg_count(true), 2);
        assert_eq!(BlockKind::Modifier2.arg_count(true), 3);
    }

    #[test]
    fn kind_from_u32() {
        assert_eq!(BlockKind::try_from(2), Ok(BlockKind::Modifier2));
        assert_eq!(
            BlockKind::try_from(3),
            Err(DecodeError::InvalidBlockKind(3))
        );
    }

    #[test]
    fn single_pads_to_monadic_and_dyadic() {
        let p = BodyList::Single(4).padded();
        assert_eq!(p[0], vec![4]);
        assert_eq!(p[1], vec![4]);
        assert!(p[2..].iter().all(Vec::is_empty));
    }

    #[test]
    fn slots_pad_missing_lists() {
        let p = BodyList::Slots(vec![vec![0, 2], vec![1]]).padded();
        assert_eq!(p[0], vec![0, 2]);
        assert_eq!(p[1], vec![1]);
        assert!(p[4].is_empty());
    }
}
