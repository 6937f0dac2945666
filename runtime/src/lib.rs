//! # Ticketdesk Runtime
//!
//! Runtime pieces shared by every ticketdesk process:
//!
//! - [`TokioScheduler`]: executes deferred tasks (the countdown before a
//!   ticket channel is deleted) on the tokio runtime
//! - [`metrics`]: Prometheus recorder and metric helpers
//!
//! ## Example
//!
//! ```ignore
//! use ticketdesk_core::schedule::Scheduler;
//! use ticketdesk_runtime::TokioScheduler;
//!
//! let scheduler = TokioScheduler::new();
//! let handle = scheduler.schedule(Duration::from_secs(5), Box::pin(async {
//!     // delete the channel
//! }));
//! handle.cancel(); // changed our mind
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use ticketdesk_core::schedule::{Deferred, DeferredTask, Scheduler};

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur while draining deferred tasks
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum SchedulerError {
        /// Shutdown timed out waiting for deferred tasks to complete
        ///
        /// Tasks still pending are dropped with the process.
        #[error("Shutdown timed out with {0} deferred tasks still pending")]
        ShutdownTimeout(usize),
    }
}

pub use error::SchedulerError;

/// Decrements the pending counter when a spawned task ends, even on panic.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs deferred tasks as detached tokio tasks.
///
/// Each task sleeps for its delay, then runs unless its [`Deferred`]
/// handle was cancelled. The caller is never blocked during the wait.
#[derive(Clone, Debug, Default)]
pub struct TokioScheduler {
    pending: Arc<AtomicUsize>,
}

impl TokioScheduler {
    /// Create a scheduler with no pending tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks scheduled but not finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait for pending tasks to finish.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutdownTimeout`] if tasks are still
    /// pending when `timeout` elapses.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let drained = tokio::time::timeout(timeout, async {
            while self.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => Ok(()),
            Err(_) => {
                let remaining = self.pending();
                tracing::warn!(remaining, "Deferred tasks still pending at shutdown");
                Err(SchedulerError::ShutdownTimeout(remaining))
            }
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: DeferredTask) -> Deferred {
        let handle = Deferred::new();
        let task_handle = handle.clone();

        self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(Arc::clone(&self.pending));

        tracing::trace!(?delay, "Scheduling deferred task");
        tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;
            if task_handle.is_cancelled() {
                tracing::debug!("Deferred task cancelled before running");
                return;
            }
            task.await;
        });

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        let scheduler = TokioScheduler::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        scheduler.schedule(
            Duration::from_secs(5),
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            }),
        );
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!ran.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        let scheduler = TokioScheduler::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let handle = scheduler.schedule(
            Duration::from_secs(5),
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_pending_tasks() {
        let scheduler = TokioScheduler::new();
        scheduler.schedule(Duration::from_secs(1), Box::pin(async {}));

        assert_eq!(scheduler.shutdown(Duration::from_secs(5)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_times_out() {
        let scheduler = TokioScheduler::new();
        scheduler.schedule(Duration::from_secs(60), Box::pin(async {}));

        assert_eq!(
            scheduler.shutdown(Duration::from_secs(1)).await,
            Err(SchedulerError::ShutdownTimeout(1))
        );
    }
}
