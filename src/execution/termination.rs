use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal of the enclosing invocation. Polled, never blocks.
pub trait TerminationGuard: Send + Sync {
    fn is_terminated(&self) -> bool;
}

/// Shared flag that any clone can raise.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag {
    terminated: Arc<AtomicBool>,
}

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }
}

impl TerminationGuard for TerminationFlag {
    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// Guard for invocations that cannot be cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverTerminated;

impl TerminationGuard for NeverTerminated {
    fn is_terminated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let flag = TerminationFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_terminated());

        flag.terminate();
        assert!(observer.is_terminated());
    }
}
