//! Scheduler whose tasks run only when the test says so.

#![allow(clippy::unwrap_used)] // Test infrastructure, panics are acceptable
#![allow(clippy::missing_panics_doc)] // Test infrastructure

use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketdesk_core::schedule::{Deferred, DeferredTask, Scheduler};

struct Entry {
    handle: Deferred,
    task: DeferredTask,
}

/// Records scheduled tasks instead of running them.
///
/// Call [`run_all`](Self::run_all) to fire every task whose handle was not
/// cancelled, as if the delay had elapsed.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    entries: Arc<Mutex<Vec<Entry>>>,
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("queued", &self.queued())
            .finish()
    }
}

impl ManualScheduler {
    /// Create a scheduler with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks queued and not cancelled.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.handle.is_cancelled())
            .count()
    }

    /// Delay of every task ever scheduled, in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    /// Run every queued, non-cancelled task. Returns how many ran.
    pub async fn run_all(&self) -> usize {
        let entries = std::mem::take(&mut *self.entries.lock().unwrap());
        let mut ran = 0;
        for entry in entries {
            if entry.handle.is_cancelled() {
                continue;
            }
            entry.task.await;
            ran += 1;
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: DeferredTask) -> Deferred {
        let handle = Deferred::new();
        self.delays.lock().unwrap().push(delay);
        self.entries.lock().unwrap().push(Entry {
            handle: handle.clone(),
            task,
        });
        handle
    }
}
