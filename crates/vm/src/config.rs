//! Interpreter limits and switches.

/// Default operand stack capacity, in values.
pub const DEFAULT_MAX_STACK: usize = 65_536;

/// Default maximum number of simultaneously active body evaluations.
pub const DEFAULT_MAX_ENV_DEPTH: usize = 4096;

/// Default profiler sample buffer size.
pub const DEFAULT_PROFILE_CAPACITY: usize = 1 << 20;

/// Configuration for a [`Vm`](crate::Vm).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Operand stack limit; exceeding it raises "Stack overflow".
    pub max_stack: usize,
    /// Env stack limit; exceeding it raises "Stack overflow".
    pub max_env_depth: usize,
    /// Number of samples the profiler keeps before it stops recording.
    pub profile_capacity: usize,
    /// Emit a `trace!` event for every executed instruction.
    pub trace_execution: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack: DEFAULT_MAX_STACK,
            max_env_depth: DEFAULT_MAX_ENV_DEPTH,
            profile_capacity: DEFAULT_PROFILE_CAPACITY,
            trace_execution: false,
        }
    }
}

impl VmConfig {
    pub fn with_max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }

    pub fn with_max_env_depth(mut self, depth: usize) -> Self {
        self.max_env_depth = depth;
        self
    }

    pub fn with_profile_capacity(mut self, capacity: usize) -> Self {
        self.profile_capacity = capacity;
        self
    }

    pub fn with_trace_execution(mut self, on: bool) -> Self {
        self.trace_execution = on;
        self
    }
}
