//! Deferred tasks.
//!
//! A [`Scheduler`] runs a task once after a delay without blocking the
//! caller. The returned [`Deferred`] handle cancels the task as long as it
//! has not started. Scheduled tasks live in process memory only: a restart
//! drops them.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A unit of deferred work.
pub type DeferredTask = BoxFuture<'static, ()>;

/// Cancellation handle for a scheduled task.
#[derive(Debug, Clone, Default)]
pub struct Deferred {
    cancelled: Arc<AtomicBool>,
}

impl Deferred {
    /// Create a live (not cancelled) handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the task. No effect once it started.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs tasks after a delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay` unless the returned handle is cancelled first.
    fn schedule(&self, delay: Duration, task: DeferredTask) -> Deferred;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let handle = Deferred::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }
}
