//! blockvm virtual machine: block compiler and interpreter.
//!
//! The VM turns a compilation unit of generic bytecode into [`Block`]s of
//! resolved instructions and runs them on a stack machine with:
//! - An operand stack for intermediate values
//! - Lexical [`Scope`]s shared by closures
//! - Multi-body blocks whose headers and predicates pick a body per call
//! - Catch frames that unwind to a recorded depth, keeping a [`Backtrace`]
//!
//! # Usage
//!
//! ```
//! use blockvm_common::{BlockDesc, BlockKind, BodyDesc, BodyList, Instruction, Opcode, Program};
//! use blockvm_vm::{compile, UnitDesc, Value, Vm};
//!
//! let code = Program::new(vec![
//!     Instruction::with1(Opcode::Push, 0),
//!     Instruction::new(Opcode::Retn),
//! ])
//! .encode();
//! let unit = UnitDesc::new(
//!     code,
//!     vec![Value::Num(42.0)],
//!     vec![BlockDesc::new(BlockKind::Function, true, BodyList::Single(0))],
//!     vec![BodyDesc::new(0, 0)],
//! );
//!
//! let block = compile(unit, None).unwrap();
//! let result = Vm::new().evaluate(&block).unwrap();
//! assert_eq!(result, Value::Num(42.0));
//! ```

mod assign;

pub mod backtrace;
pub mod block;
pub mod comp;
pub mod compile;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod execute;
pub mod interrupt;
pub mod machine;
pub mod profiler;
pub mod scope;
pub mod value;

pub use backtrace::{format_point, Backtrace, Frame};
pub use block::{format_instr, Block, Body, BodyId, Instr};
pub use comp::{Comp, UnitDesc};
pub use compile::compile;
pub use config::VmConfig;
pub use error::{CompileError, RuntimeError, Thrown};
pub use interrupt::InterruptHandle;
pub use machine::{CatchFrame, Vm};
pub use profiler::{Profile, Sample, UnitProfile};
pub use scope::{Binding, Scope, ScopeExt};
pub use value::{
    Function, Inverse, Modifier1, Modifier2, Namespace, NsDesc, Primitive, Primitive1, Primitive2,
    Target, Value,
};

/// Compile a unit and evaluate its root block on a fresh VM.
///
/// Compile errors surface as a [`Thrown`] carrying the compiler's message.
pub fn run(unit: UnitDesc) -> Result<Value, Thrown> {
    let block = compile(unit, None)?;
    Vm::new().evaluate(&block)
}
