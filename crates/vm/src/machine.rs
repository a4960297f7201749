//! VM state: operand stack, env stack, catch frames, host entry points.

use crate::backtrace::{Backtrace, Frame};
use crate::block::{Block, BodyId};
use crate::config::VmConfig;
use crate::error::{RuntimeError, Thrown};
use crate::interrupt::InterruptHandle;
use crate::profiler::{Profile, Profiler};
use crate::scope::Scope;
use crate::value::Value;
use blockvm_common::BlockKind;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::debug;

/// Depths recorded when a protected region is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchFrame {
    pub stack_depth: usize,
    pub env_depth: usize,
    pub frame_depth: usize,
}

/// One active body evaluation.
#[derive(Debug, Clone)]
pub(crate) struct Env {
    pub(crate) block: Rc<Block>,
    pub(crate) scope: Rc<Scope>,
    /// Index of the running instruction in `block.code`.
    pub(crate) pc: usize,
}

impl Env {
    fn freeze(&self) -> Frame {
        Frame {
            comp: self.block.comp.clone(),
            pos: self.block.position(self.pc),
        }
    }
}

/// The interpreter.
pub struct Vm {
    pub(crate) stack: Vec<Value>,
    pub(crate) envs: Vec<Env>,
    catches: Vec<CatchFrame>,
    pub(crate) config: VmConfig,
    pub(crate) interrupt: InterruptHandle,
    pub(crate) profiler: Option<Profiler>,
    out_of_memory: Thrown,
    last_caught: Option<Backtrace>,
    uncaught: Option<Backtrace>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: Vec::new(),
            envs: Vec::new(),
            catches: Vec::new(),
            config,
            interrupt: InterruptHandle::new(),
            profiler: None,
            out_of_memory: Thrown::msg("Out of memory"),
            last_caught: None,
            uncaught: None,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn env_depth(&self) -> usize {
        self.envs.len()
    }

    pub fn catch_depth(&self) -> usize {
        self.catches.len()
    }

    /// A handle other threads can use to interrupt this VM.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Frames discarded by the most recent [`catch`](Self::catch) that
    /// absorbed an error.
    pub fn last_caught(&self) -> Option<&Backtrace> {
        self.last_caught.as_ref()
    }

    /// Frames of the last error that escaped a host entry point.
    pub fn uncaught_backtrace(&self) -> Option<&Backtrace> {
        self.uncaught.as_ref()
    }

    /// Scope of the innermost running body, for builtins that inspect
    /// their caller's variables.
    pub fn current_scope(&self) -> Option<Rc<Scope>> {
        self.envs.last().map(|env| env.scope.clone())
    }

    /// Frames of every body currently running, oldest first.
    pub fn live_backtrace(&self) -> Backtrace {
        Backtrace {
            frames: self.envs.iter().map(Env::freeze).collect(),
        }
    }

    /// Run `f` as a protected region.
    ///
    /// If `f` fails, the operand and env stacks are cut back to their
    /// depths at entry; the discarded envs are kept as
    /// [`last_caught`](Self::last_caught). The error is returned for the
    /// caller to handle or re-raise.
    pub fn catch<T>(&mut self, f: impl FnOnce(&mut Vm) -> Result<T, Thrown>) -> Result<T, Thrown> {
        let frame = CatchFrame {
            stack_depth: self.stack.len(),
            env_depth: self.envs.len(),
            frame_depth: self.catches.len(),
        };
        self.catches.push(frame);
        let result = f(self);
        let popped = self.catches.pop();
        debug_assert_eq!(popped, Some(frame), "catch frames out of order");

        if result.is_err() {
            self.last_caught = Some(self.unwind(frame.stack_depth, frame.env_depth));
            debug!(
                stack = frame.stack_depth,
                envs = frame.env_depth,
                frames = frame.frame_depth,
                "catch frame absorbed error"
            );
        }
        result
    }

    /// Drop operand values and env entries above the given depths,
    /// freezing the discarded envs.
    fn unwind(&mut self, stack_depth: usize, env_depth: usize) -> Backtrace {
        self.stack.truncate(stack_depth);
        let frames = self
            .envs
            .drain(env_depth.min(self.envs.len())..)
            .map(|env| env.freeze())
            .collect();
        Backtrace { frames }
    }

    fn host_entry(&mut self, f: impl FnOnce(&mut Vm) -> Result<Value, Thrown>) -> Result<Value, Thrown> {
        let stack_depth = self.stack.len();
        let env_depth = self.envs.len();
        let result = f(self);
        if result.is_err() {
            self.uncaught = Some(self.unwind(stack_depth, env_depth));
        }
        result
    }

    /// Evaluate the root block of a compilation unit in a fresh scope.
    pub fn evaluate(&mut self, block: &Rc<Block>) -> Result<Value, Thrown> {
        if !block.immediate || block.kind != BlockKind::Function {
            return Err(RuntimeError::RootNotImmediate.into());
        }
        let scope = Scope::new(block.clone(), BodyId(0), None, []);
        let block = block.clone();
        self.host_entry(|vm| vm.exec_body(block, BodyId(0), scope))
    }

    /// Evaluate a block compiled against `scope` directly in that scope.
    pub fn run_in_scope(&mut self, block: &Rc<Block>, scope: &Rc<Scope>) -> Result<Value, Thrown> {
        let block = block.clone();
        let scope = scope.clone();
        self.host_entry(|vm| vm.exec_body(block, BodyId(0), scope))
    }

    /// Write `Error: <message>` and the uncaught backtrace.
    pub fn report_uncaught(&self, err: &Thrown, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "Error: {}", err.message.to_text())?;
        if let Some(trace) = &self.uncaught {
            trace.write_to(out)?;
        }
        Ok(())
    }

    /// Report an uncaught error on stderr and end the process.
    pub fn exit_on_uncaught(&self, err: &Thrown) -> ! {
        let stderr = io::stderr();
        let _ = self.report_uncaught(err, &mut stderr.lock());
        std::process::exit(1)
    }

    /// Start sampling at `hz` ticks per second. Returns false if a profiler
    /// is already running or `hz` is zero.
    pub fn start_profiler(&mut self, hz: u32) -> bool {
        if self.profiler.is_some() || hz == 0 {
            return false;
        }
        self.profiler = Some(Profiler::start(hz, self.config.profile_capacity));
        true
    }

    pub fn stop_profiler(&mut self) -> Option<Profile> {
        self.profiler.take().map(Profiler::finish)
    }

    pub(crate) fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    pub(crate) fn pop(&mut self) -> Result<Value, Thrown> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::StackUnderflow.into())
    }

    pub(crate) fn peek(&self) -> Result<&Value, Thrown> {
        self.stack
            .last()
            .ok_or_else(|| RuntimeError::StackUnderflow.into())
    }

    /// Make room for `n` more operands.
    pub(crate) fn reserve(&mut self, n: usize) -> Result<(), Thrown> {
        if self.stack.len() + n > self.config.max_stack {
            return Err(RuntimeError::StackOverflow.into());
        }
        if self.stack.try_reserve(n).is_err() {
            return Err(self.out_of_memory.clone());
        }
        Ok(())
    }

    pub(crate) fn push_env(&mut self, block: Rc<Block>, scope: Rc<Scope>, pc: usize) -> Result<(), Thrown> {
        if self.envs.len() >= self.config.max_env_depth {
            return Err(RuntimeError::StackOverflow.into());
        }
        self.envs.push(Env { block, scope, pc });
        Ok(())
    }

    /// Record the running instruction of the innermost env.
    pub(crate) fn set_pc(&mut self, pc: usize) {
        if let Some(env) = self.envs.last_mut() {
            env.pc = pc;
        }
    }

    pub(crate) fn pop_env(&mut self) {
        self.envs.pop();
    }
}
