//! Auto-expiry sweep.
//!
//! Periodically force-closes tickets that stayed open longer than their
//! community's `auto_close_hours`. A ticket closed concurrently by a
//! moderator is counted as already closed, never as a failure, and one
//! failing ticket never stops the sweep.

use crate::config::DeskSettings;
use crate::lifecycle::{CloseOutcome, LifecycleManager};
use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};
use ticketdesk_core::config::CommunityTicketConfig;
use ticketdesk_core::error::TicketError;
use ticketdesk_core::ids::CommunityId;
use ticketdesk_core::ticket::{Closer, Ticket};
use ticketdesk_runtime::metrics::SweepMetrics;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Open tickets looked at
    pub examined: usize,
    /// Tickets this sweep closed
    pub closed: usize,
    /// Expired tickets closed by someone else in the meantime
    pub already_closed: usize,
    /// Expired tickets whose close failed
    pub failed: usize,
}

/// Closes idle tickets on a timer.
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    lifecycle: LifecycleManager,
    interval: Duration,
    evict_cooldowns: bool,
}

impl ExpiryScheduler {
    /// Create a sweeper running every `settings.sweep_interval`.
    ///
    /// With `settings.cooldown_from_repository`, each sweep also evicts
    /// cooldown entries that can no longer deny anything, since a later
    /// miss is re-derived from the repository.
    #[must_use]
    pub const fn new(lifecycle: LifecycleManager, settings: &DeskSettings) -> Self {
        Self {
            lifecycle,
            interval: settings.sweep_interval,
            evict_cooldowns: settings.cooldown_from_repository,
        }
    }

    /// Run one sweep over every open ticket.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Repository`] only if the open tickets cannot
    /// be listed. Per-ticket failures are counted in the report.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, TicketError> {
        let started = Instant::now();
        let env = self.lifecycle.env();
        let open = env.repository.list_open().await?;
        let now = env.clock.now();

        let mut report = SweepReport {
            examined: open.len(),
            ..SweepReport::default()
        };
        let mut configs: HashMap<CommunityId, Option<CommunityTicketConfig>> = HashMap::new();

        for ticket in open {
            let config = match configs.entry(ticket.community) {
                Entry::Occupied(cached) => cached.into_mut(),
                Entry::Vacant(slot) => {
                    let loaded = match env.repository.load_config(ticket.community).await {
                        Ok(config) => Some(config),
                        Err(e) => {
                            error!(community = %ticket.community, error = %e, "Could not load config, skipping community");
                            None
                        }
                    };
                    slot.insert(loaded)
                }
            };
            let Some(config) = config.as_ref() else {
                report.failed += 1;
                continue;
            };
            let Some(threshold) = config.auto_close_after() else {
                continue;
            };
            if ticket.age(now) < threshold {
                continue;
            }

            self.expire(ticket, config.auto_close_hours, &mut report).await;
        }

        if self.evict_cooldowns {
            let retention = configs
                .values()
                .flatten()
                .map(CommunityTicketConfig::cooldown)
                .max()
                .unwrap_or_else(ChronoDuration::zero)
                .max(ChronoDuration::from_std(self.interval).unwrap_or_else(|_| ChronoDuration::zero()));
            let evicted = env.cooldowns.evict_older_than(now - retention);
            if evicted > 0 {
                tracing::debug!(evicted, "Stale cooldown entries evicted");
            }
        }

        SweepMetrics::record_sweep(report.closed, report.failed, started.elapsed());
        info!(
            examined = report.examined,
            closed = report.closed,
            already_closed = report.already_closed,
            failed = report.failed,
            "Expiry sweep finished"
        );
        Ok(report)
    }

    async fn expire(&self, ticket: Ticket, hours: u32, report: &mut SweepReport) {
        let (community, id) = (ticket.community, ticket.id);
        let reason = format!("auto-close: idle > {hours} hours");
        match self.lifecycle.close_ticket(ticket, Closer::System, reason).await {
            Ok(CloseOutcome::Closed { .. }) => report.closed += 1,
            Ok(CloseOutcome::AlreadyClosed) => report.already_closed += 1,
            Err(e) => {
                error!(%community, ticket = %id, error = %e, "Auto-close failed");
                report.failed += 1;
            }
        }
    }

    /// Sweep every interval until `shutdown` fires.
    ///
    /// The first sweep runs one full interval after start.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "Expiry scheduler started");
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Expiry scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "Expiry sweep aborted");
                    }
                }
            }
        }

        info!("Expiry scheduler stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    #[must_use]
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
