//! Collaborators injected into the engine.

use crate::cooldown::{CooldownStore, InMemoryCooldowns};
use std::sync::Arc;
use ticketdesk_core::environment::{Clock, NotificationSink, SystemClock, Transport};
use ticketdesk_core::repository::TicketRepository;
use ticketdesk_core::schedule::Scheduler;

/// Everything the engine talks to.
///
/// Production wires the platform client, the Postgres repository, the
/// system clock and a `TokioScheduler`. Tests wire the in-memory
/// collaborators from `ticketdesk-testing`.
#[derive(Clone)]
pub struct TicketEnvironment {
    /// Source of "now"
    pub clock: Arc<dyn Clock>,
    /// Durable ticket store
    pub repository: Arc<dyn TicketRepository>,
    /// Chat platform
    pub transport: Arc<dyn Transport>,
    /// Fire-and-forget messages
    pub notifier: Arc<dyn NotificationSink>,
    /// Deferred tasks (channel deletion countdown)
    pub scheduler: Arc<dyn Scheduler>,
    /// Creation cooldown cache
    pub cooldowns: Arc<dyn CooldownStore>,
}

impl TicketEnvironment {
    /// Wire the engine with the system clock and an in-memory cooldown cache.
    #[must_use]
    pub fn new(
        repository: Arc<dyn TicketRepository>,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn NotificationSink>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            repository,
            transport,
            notifier,
            scheduler,
            cooldowns: Arc::new(InMemoryCooldowns::new()),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the cooldown cache.
    #[must_use]
    pub fn with_cooldowns(mut self, cooldowns: Arc<dyn CooldownStore>) -> Self {
        self.cooldowns = cooldowns;
        self
    }
}

impl std::fmt::Debug for TicketEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketEnvironment").finish_non_exhaustive()
    }
}
