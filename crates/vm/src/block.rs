//! Compiled blocks: resolved instructions, bodies and disassembly.
//!
//! A [`Block`] owns one flat stream of resolved instructions shared by all
//! of its bodies. Every instruction has an entry in the position map
//! pointing back at the generic-bytecode word it came from. Bodies are
//! addressed by [`BodyId`]; `bodies[0]` is always the monadic entry.

use crate::comp::Comp;
use crate::value::{Inverse, NsDesc, Value};
use blockvm_common::BlockKind;
use std::fmt;
use std::rc::Rc;

/// Index of a body within its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BodyId(pub u32);

impl BodyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A resolved instruction.
#[derive(Debug, Clone)]
pub enum Instr {
    /// Push a reference-tracked literal.
    Addi(Value),
    /// Push an immediate literal.
    Addu(Value),
    Pops,
    Retn,
    Retd,
    Arro(u32),
    Arrm(u32),
    Fn1c,
    Fn2c,
    Fn1o,
    Fn2o,
    Tr2d,
    Tr3d,
    Tr3o,
    Chkv,
    Md1c,
    Md2c,
    Md2r,
    Varo { depth: u32, slot: u32 },
    Varm { depth: u32, slot: u32 },
    Varu { depth: u32, slot: u32 },
    Exto { depth: u32, slot: u32 },
    Extm { depth: u32, slot: u32 },
    Extu { depth: u32, slot: u32 },
    Setn,
    Setu,
    Setm,
    Setc,
    /// Header match in an immediate block: the next candidate for the
    /// single call arity.
    Seth1(Option<BodyId>),
    /// Header match: next monadic candidate, next dyadic candidate.
    Seth2(Option<BodyId>, Option<BodyId>),
    Pred1(Option<BodyId>),
    Pred2(Option<BodyId>, Option<BodyId>),
    Fldo(Rc<str>),
    Alim(Rc<str>),
    Vfym,
    Dfnd0(Rc<Block>),
    Dfnd1(Rc<Block>),
    Dfnd2(Rc<Block>),
    Fail,
}

impl Instr {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instr::Addi(_) => "ADDI",
            Instr::Addu(_) => "ADDU",
            Instr::Pops => "POPS",
            Instr::Retn => "RETN",
            Instr::Retd => "RETD",
            Instr::Arro(_) => "ARRO",
            Instr::Arrm(_) => "ARRM",
            Instr::Fn1c => "FN1C",
            Instr::Fn2c => "FN2C",
            Instr::Fn1o => "FN1O",
            Instr::Fn2o => "FN2O",
            Instr::Tr2d => "TR2D",
            Instr::Tr3d => "TR3D",
            Instr::Tr3o => "TR3O",
            Instr::Chkv => "CHKV",
            Instr::Md1c => "MD1C",
            Instr::Md2c => "MD2C",
            Instr::Md2r => "MD2R",
            Instr::Varo { .. } => "VARO",
            Instr::Varm { .. } => "VARM",
            Instr::Varu { .. } => "VARU",
            Instr::Exto { .. } => "EXTO",
            Instr::Extm { .. } => "EXTM",
            Instr::Extu { .. } => "EXTU",
            Instr::Setn => "SETN",
            Instr::Setu => "SETU",
            Instr::Setm => "SETM",
            Instr::Setc => "SETC",
            Instr::Seth1(_) => "SETH1",
            Instr::Seth2(..) => "SETH2",
            Instr::Pred1(_) => "PRED1",
            Instr::Pred2(..) => "PRED2",
            Instr::Fldo(_) => "FLDO",
            Instr::Alim(_) => "ALIM",
            Instr::Vfym => "VFYM",
            Instr::Dfnd0(_) => "DFND0",
            Instr::Dfnd1(_) => "DFND1",
            Instr::Dfnd2(_) => "DFND2",
            Instr::Fail => "FAIL",
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instr::Retn | Instr::Retd)
    }

    /// Operand stack effect as (pops, pushes), for instructions whose
    /// effect doesn't depend on control flow.
    pub fn stack_effect(&self) -> (u32, u32) {
        match self {
            Instr::Addi(_) | Instr::Addu(_) => (0, 1),
            Instr::Pops | Instr::Retn => (1, 0),
            Instr::Retd => (0, 1),
            Instr::Arro(n) | Instr::Arrm(n) => (*n, 1),
            Instr::Fn1c | Instr::Fn1o => (2, 1),
            Instr::Fn2c | Instr::Fn2o => (3, 1),
            Instr::Tr2d | Instr::Md2r => (2, 1),
            Instr::Tr3d | Instr::Tr3o => (3, 1),
            Instr::Chkv => (1, 1),
            Instr::Md1c => (2, 1),
            Instr::Md2c => (3, 1),
            Instr::Varo { .. }
            | Instr::Varm { .. }
            | Instr::Varu { .. }
            | Instr::Exto { .. }
            | Instr::Extm { .. }
            | Instr::Extu { .. }
            | Instr::Dfnd0(_)
            | Instr::Dfnd1(_)
            | Instr::Dfnd2(_) => (0, 1),
            Instr::Setn | Instr::Setu | Instr::Setc => (2, 1),
            Instr::Setm => (3, 1),
            Instr::Seth1(_) | Instr::Seth2(..) => (2, 0),
            Instr::Pred1(_) | Instr::Pred2(..) => (1, 0),
            Instr::Fldo(_) | Instr::Alim(_) | Instr::Vfym => (1, 1),
            Instr::Fail => (0, 0),
        }
    }

    fn write_operands(&self, out: &mut String) {
        use std::fmt::Write;
        let next = |b: &Option<BodyId>| match b {
            Some(id) => format!("{:X}", id.0),
            None => "-".to_string(),
        };
        // Writing to a String cannot fail.
        let _ = match self {
            Instr::Addi(v) | Instr::Addu(v) => write!(out, " {v}"),
            Instr::Arro(n) | Instr::Arrm(n) => write!(out, " {n:X}"),
            Instr::Varo { depth, slot }
            | Instr::Varm { depth, slot }
            | Instr::Varu { depth, slot }
            | Instr::Exto { depth, slot }
            | Instr::Extm { depth, slot }
            | Instr::Extu { depth, slot } => write!(out, " {depth:X} {slot:X}"),
            Instr::Seth1(a) | Instr::Pred1(a) => write!(out, " {}", next(a)),
            Instr::Seth2(a, b) | Instr::Pred2(a, b) => {
                write!(out, " {} {}", next(a), next(b))
            }
            Instr::Fldo(name) | Instr::Alim(name) => write!(out, " {name}"),
            Instr::Dfnd0(b) | Instr::Dfnd1(b) | Instr::Dfnd2(b) => {
                write!(out, " @{:X}", b.map.first().copied().unwrap_or(0))
            }
            _ => Ok(()),
        };
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = self.mnemonic().to_string();
        self.write_operands(&mut text);
        f.write_str(&text)
    }
}

/// An instruction padded with spaces to at least `width` characters.
pub fn format_instr(instr: &Instr, width: usize) -> String {
    format!("{:<width$}", instr.to_string())
}

/// One alternative implementation of a block.
#[derive(Debug, Clone)]
pub struct Body {
    /// Index of the first instruction in the block's code.
    pub start: usize,
    pub max_stack: u32,
    /// Number of scopes, counting its own, the body addresses.
    pub max_psc: u16,
    pub var_count: u16,
    /// Name of each variable slot, where known.
    pub names: Vec<Option<Rc<str>>>,
    /// Present when the body came with full naming information.
    pub ns_desc: Option<Rc<NsDesc>>,
    /// False only for the synthetic failure body.
    pub exists: bool,
}

impl Body {
    /// The body whose single FAIL instruction sits at the start of every
    /// block's code.
    pub(crate) fn failure() -> Self {
        Self {
            start: 0,
            max_stack: 1,
            max_psc: 0,
            var_count: 6,
            names: Vec::new(),
            ns_desc: None,
            exists: false,
        }
    }

    pub fn name(&self, slot: usize) -> Option<&Rc<str>> {
        self.names.get(slot)?.as_ref()
    }
}

/// A compiled block.
#[derive(Debug)]
pub struct Block {
    pub comp: Rc<Comp>,
    pub kind: BlockKind,
    pub immediate: bool,
    pub code: Vec<Instr>,
    /// Generic-bytecode offset of each instruction in `code`.
    pub map: Vec<usize>,
    pub bodies: Vec<Body>,
    /// Blocks defined by this block's code.
    pub blocks: Vec<Rc<Block>>,
    pub dyadic: BodyId,
    pub inv_monadic: BodyId,
    pub inv_x: BodyId,
    pub inv_w: BodyId,
}

impl Block {
    pub fn body(&self, id: BodyId) -> &Body {
        &self.bodies[id.index()]
    }

    pub fn monadic(&self) -> BodyId {
        BodyId(0)
    }

    pub fn inverse(&self, inverse: Inverse) -> BodyId {
        match inverse {
            Inverse::Monadic => self.inv_monadic,
            Inverse::OnW => self.inv_w,
            Inverse::OnX => self.inv_x,
        }
    }

    /// Number of variables the caller fills in.
    pub fn arg_count(&self) -> usize {
        self.kind.arg_count(self.immediate)
    }

    /// Generic-bytecode offset of the instruction at `pc`.
    pub fn position(&self, pc: usize) -> usize {
        self.map.get(pc).copied().unwrap_or(0)
    }

    /// One line per instruction from the body's start through its return.
    pub fn disassemble_body(&self, id: BodyId) -> String {
        let mut out = String::new();
        let start = self.body(id).start;
        for (pc, instr) in self.code.iter().enumerate().skip(start) {
            out.push_str(&format_instr(instr, 10));
            out.push_str(&format!("; @{}\n", self.position(pc)));
            if instr.is_return() || matches!(instr, Instr::Fail) {
                break;
            }
        }
        out
    }

    /// Every body of the block, with its layout.
    pub fn disassemble(&self) -> String {
        let mut out = format!(
            "{} block{}: dyadic {}, inverse {} {} {}\n",
            match self.kind {
                BlockKind::Function => "function",
                BlockKind::Modifier1 => "1-modifier",
                BlockKind::Modifier2 => "2-modifier",
            },
            if self.immediate { " (immediate)" } else { "" },
            self.dyadic.0,
            self.inv_monadic.0,
            self.inv_x.0,
            self.inv_w.0,
        );
        for (i, body) in self.bodies.iter().enumerate() {
            out.push_str(&format!(
                "body {i}{}: vars {}, stack {}, scopes {}\n",
                if body.exists { "" } else { " (failure)" },
                body.var_count,
                body.max_stack,
                body.max_psc,
            ));
            out.push_str(&self.disassemble_body(BodyId(i as u32)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_operands_in_hex() {
        assert_eq!(Instr::Varo { depth: 1, slot: 26 }.to_string(), "VARO 1 1A");
        assert_eq!(Instr::Arro(16).to_string(), "ARRO 10");
        assert_eq!(Instr::Retn.to_string(), "RETN");
        assert_eq!(
            Instr::Seth2(Some(BodyId(2)), None).to_string(),
            "SETH2 2 -"
        );
        assert_eq!(Instr::Fldo(Rc::from("name")).to_string(), "FLDO name");
        assert_eq!(Instr::Addu(Value::Num(3.0)).to_string(), "ADDU 3");
    }

    #[test]
    fn padding() {
        assert_eq!(format_instr(&Instr::Pops, 8), "POPS    ");
        assert_eq!(format_instr(&Instr::Varm { depth: 0, slot: 1 }, 4), "VARM 0 1");
    }

    #[test]
    fn stack_effects_of_calls() {
        assert_eq!(Instr::Fn2o.stack_effect(), (3, 1));
        assert_eq!(Instr::Seth2(None, None).stack_effect(), (2, 0));
        assert_eq!(Instr::Arrm(4).stack_effect(), (4, 1));
    }

    #[test]
    fn failure_body_shape() {
        let body = Body::failure();
        assert!(!body.exists);
        assert_eq!(body.var_count, 6);
        assert_eq!(body.max_stack, 1);
        assert_eq!(body.start, 0);
    }
}
