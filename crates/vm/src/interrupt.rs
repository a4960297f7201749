//! Cross-thread interrupt requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag another thread can raise to stop the interpreter at its next
/// block call with the error "interrupted".
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Clear the flag, reporting whether it was set.
    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::Relaxed)
    }
}
