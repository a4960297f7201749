//! Opcode definitions for the generic bytecode.
//!
//! The generic bytecode is what the external parser emits: a flat stream of
//! `u32` words where each instruction is an opcode word followed by a fixed
//! number of operand words. The block compiler rewrites it into resolved
//! bytecode; this module only describes the generic form.

use crate::error::DecodeError;

/// Identifies a generic bytecode operation.
///
/// Stack pictures list the top of the stack last: `⟨…, x, f⟩` means `f` is
/// on top.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Literals and definitions
    /// `N`; push literal `N` from the literal table.
    Push = 0x00,
    /// `N`; push block `N` closed over the current scope.
    Dfnd = 0x01,
    /// `N`; push system value `N`.
    Sysv = 0x02,

    // Stack and returns
    /// Pop and discard the top of the stack.
    Pops = 0x06,
    /// Return the top of the stack.
    Retn = 0x07,
    /// Return the current scope as a namespace.
    Retd = 0x08,

    // Lists
    /// `N`; build a list of the top `N` items.
    Arro = 0x0B,
    /// `N`; build an assignment target list of the top `N` targets.
    Arrm = 0x0C,

    // Calls and trains
    /// `⟨…, x, f⟩ → F x`
    Fn1c = 0x10,
    /// `⟨…, x, f, w⟩ → w F x`
    Fn2c = 0x11,
    /// Like FN1C, but passes a `·` argument through.
    Fn1o = 0x12,
    /// Like FN2C, but passes `·` in x through and calls monadically on `·` w.
    Fn2o = 0x13,
    /// `⟨…, h, g⟩ → (g h)`
    Tr2d = 0x14,
    /// `⟨…, h, g, f⟩ → (f g h)`
    Tr3d = 0x15,
    /// Error if the top of the stack is `·`.
    Chkv = 0x16,
    /// Like TR3D, but builds an atop when `f` is `·`.
    Tr3o = 0x17,

    // Modifiers
    /// `⟨…, m, f⟩ → (f _m)`
    Md1c = 0x1A,
    /// `⟨…, g, m, f⟩ → (f _m_ g)`
    Md2c = 0x1B,
    /// `⟨…, m, f⟩ → (f _m_)`
    Md2l = 0x1C,
    /// `⟨…, g, m⟩ → (_m_ g)`
    Md2r = 0x1D,

    // Variables
    /// `D S`; push the variable at depth `D`, slot `S`.
    Varo = 0x20,
    /// `D S`; push a reference to the variable at depth `D`, slot `S`.
    Varm = 0x21,
    /// `D S`; push the variable and mark the slot as consumed.
    Varu = 0x22,
    /// `N`; push the variable named by literal `N`.
    Dyno = 0x26,
    /// `N`; push a reference to the variable named by literal `N`.
    Dynm = 0x27,

    // Headers and assignment
    /// Pop a boolean; continue on 1, try the next body on 0.
    Pred = 0x2A,
    /// Wrap the top of the stack as a target that only accepts equal values.
    Vfym = 0x2B,
    /// Push a target that ignores the assigned value.
    Notm = 0x2C,
    /// `⟨…, x, t⟩`; header assignment, tries the next body on mismatch.
    Seth = 0x2F,
    /// `⟨…, x, t⟩ → x`; define.
    Setn = 0x30,
    /// `⟨…, x, t⟩ → x`; update.
    Setu = 0x31,
    /// `⟨…, x, f, t⟩ → t F↩ x`
    Setm = 0x32,
    /// `⟨…, f, t⟩ → t F↩`
    Setc = 0x33,

    // Namespaces
    /// `N`; read field `names[N]` from the namespace on top of the stack.
    Fldo = 0x40,
    /// `N`; push a reference to field `names[N]`.
    Fldm = 0x41,
    /// `N`; alias the target on top of the stack to field `names[N]`.
    Alim = 0x42,
}

/// All generic opcodes, in encoding order.
pub const ALL_OPCODES: [Opcode; 36] = [
    Opcode::Push,
    Opcode::Dfnd,
    Opcode::Sysv,
    Opcode::Pops,
    Opcode::Retn,
    Opcode::Retd,
    Opcode::Arro,
    Opcode::Arrm,
    Opcode::Fn1c,
    Opcode::Fn2c,
    Opcode::Fn1o,
    Opcode::Fn2o,
    Opcode::Tr2d,
    Opcode::Tr3d,
    Opcode::Chkv,
    Opcode::Tr3o,
    Opcode::Md1c,
    Opcode::Md2c,
    Opcode::Md2l,
    Opcode::Md2r,
    Opcode::Varo,
    Opcode::Varm,
    Opcode::Varu,
    Opcode::Dyno,
    Opcode::Dynm,
    Opcode::Pred,
    Opcode::Vfym,
    Opcode::Notm,
    Opcode::Seth,
    Opcode::Setn,
    Opcode::Setu,
    Opcode::Setm,
    Opcode::Setc,
    Opcode::Fldo,
    Opcode::Fldm,
    Opcode::Alim,
];

impl Opcode {
    /// Decode an opcode word. `at` is only used for the error.
    pub fn decode(word: u32, at: usize) -> Result<Self, DecodeError> {
        Opcode::try_from(word).map_err(|_| DecodeError::UnknownOpcode { at, word })
    }

    /// Returns the mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Push => "PUSH",
            Opcode::Dfnd => "DFND",
            Opcode::Sysv => "SYSV",
            Opcode::Pops => "POPS",
            Opcode::Retn => "RETN",
            Opcode::Retd => "RETD",
            Opcode::Arro => "ARRO",
            Opcode::Arrm => "ARRM",
            Opcode::Fn1c => "FN1C",
            Opcode::Fn2c => "FN2C",
            Opcode::Fn1o => "FN1O",
            Opcode::Fn2o => "FN2O",
            Opcode::Tr2d => "TR2D",
            Opcode::Tr3d => "TR3D",
            Opcode::Chkv => "CHKV",
            Opcode::Tr3o => "TR3O",
            Opcode::Md1c => "MD1C",
            Opcode::Md2c => "MD2C",
            Opcode::Md2l => "MD2L",
            Opcode::Md2r => "MD2R",
            Opcode::Varo => "VARO",
            Opcode::Varm => "VARM",
            Opcode::Varu => "VARU",
            Opcode::Dyno => "DYNO",
            Opcode::Dynm => "DYNM",
            Opcode::Pred => "PRED",
            Opcode::Vfym => "VFYM",
            Opcode::Notm => "NOTM",
            Opcode::Seth => "SETH",
            Opcode::Setn => "SETN",
            Opcode::Setu => "SETU",
            Opcode::Setm => "SETM",
            Opcode::Setc => "SETC",
            Opcode::Fldo => "FLDO",
            Opcode::Fldm => "FLDM",
            Opcode::Alim => "ALIM",
        }
    }

    /// Number of operand words following the opcode word.
    pub fn operand_count(&self) -> usize {
        match self {
            Opcode::Varo | Opcode::Varm | Opcode::Varu => 2,
            Opcode::Push
            | Opcode::Dfnd
            | Opcode::Sysv
            | Opcode::Arro
            | Opcode::Arrm
            | Opcode::Dyno
            | Opcode::Dynm
            | Opcode::Fldo
            | Opcode::Fldm
            | Opcode::Alim => 1,
            _ => 0,
        }
    }

    /// Total instruction length in words, opcode included.
    pub fn len(&self) -> usize {
        1 + self.operand_count()
    }

    /// Number of stack items the instruction consumes.
    ///
    /// `operands` are the instruction's operand words; only ARRO and ARRM
    /// depend on them.
    pub fn stack_pops(&self, operands: &[u32]) -> u32 {
        match self {
            Opcode::Arro | Opcode::Arrm => operands.first().copied().unwrap_or(0),

            Opcode::Push
            | Opcode::Dfnd
            | Opcode::Sysv
            | Opcode::Varo
            | Opcode::Varm
            | Opcode::Varu
            | Opcode::Dyno
            | Opcode::Dynm
            | Opcode::Notm
            | Opcode::Chkv
            | Opcode::Retd => 0,

            Opcode::Pops
            | Opcode::Retn
            | Opcode::Pred
            | Opcode::Vfym
            | Opcode::Fldo
            | Opcode::Fldm
            | Opcode::Alim => 1,

            Opcode::Fn1c
            | Opcode::Fn1o
            | Opcode::Tr2d
            | Opcode::Md1c
            | Opcode::Md2l
            | Opcode::Md2r
            | Opcode::Seth
            | Opcode::Setn
            | Opcode::Setu
            | Opcode::Setc => 2,

            Opcode::Fn2c
            | Opcode::Fn2o
            | Opcode::Tr3d
            | Opcode::Tr3o
            | Opcode::Md2c
            | Opcode::Setm => 3,
        }
    }

    /// Number of stack items the instruction produces.
    pub fn stack_pushes(&self) -> u32 {
        match self {
            Opcode::Pops | Opcode::Retn | Opcode::Retd | Opcode::Pred | Opcode::Seth => 0,
            Opcode::Chkv => 0,
            _ => 1,
        }
    }

    /// Net change of the stack height.
    pub fn stack_delta(&self, operands: &[u32]) -> i64 {
        self.stack_pushes() as i64 - self.stack_pops(operands) as i64
    }

    /// True for RETN and RETD.
    pub fn is_return(&self) -> bool {
        matches!(self, Opcode::Retn | Opcode::Retd)
    }
}

impl TryFrom<u32> for Opcode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        ALL_OPCODES
            .iter()
            .copied()
            .find(|op| *op as u32 == value)
            .ok_or(value)
    }
}
