//! Admission control for new tickets.
//!
//! Runs before any side effect. Checks, in order, short-circuiting on the
//! first failure:
//!
//! 1. cooldown since the author's last creation
//! 2. open-ticket quota
//! 3. configuration completeness (a category is bound)
//! 4. the requested type exists in the catalog
//!
//! These checks read without locking and answer the common case cheaply.
//! The lifecycle manager enforces both limits again where it counts: it
//! reserves the cooldown slot before allocating a channel and inserts the
//! ticket under the store's quota guard.

use crate::environment::TicketEnvironment;
use chrono::{DateTime, Utc};
use ticketdesk_core::config::{CommunityTicketConfig, DEFAULT_TICKET_TYPE, TicketType};
use ticketdesk_core::error::{DenyReason, RepositoryError};
use ticketdesk_core::ids::UserId;

/// Admission verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Creation may proceed with the resolved type.
    Allow(TicketType),
    /// Creation is refused.
    Deny(DenyReason),
}

/// Decides whether a ticket request may proceed.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    env: TicketEnvironment,
    cooldown_from_repository: bool,
}

impl AdmissionController {
    /// Create a controller.
    ///
    /// With `cooldown_from_repository`, a cache miss is re-derived from the
    /// author's most recent stored ticket.
    #[must_use]
    pub const fn new(env: TicketEnvironment, cooldown_from_repository: bool) -> Self {
        Self {
            env,
            cooldown_from_repository,
        }
    }

    /// Evaluate a request against a community configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if the fallback lookup or the open count fails.
    pub async fn check(
        &self,
        config: &CommunityTicketConfig,
        author: UserId,
        requested_type: Option<&str>,
    ) -> Result<Admission, RepositoryError> {
        let now = self.env.clock.now();

        if config.cooldown_secs > 0 {
            if let Some(last) = self.last_creation(config, author).await? {
                if let Some(remaining_secs) = cooldown_remaining(config.cooldown_secs, last, now) {
                    return Ok(Admission::Deny(DenyReason::CooldownActive { remaining_secs }));
                }
            }
        }

        let current = self.env.repository.count_open(config.community, author).await?;
        if current >= config.max_open_tickets {
            return Ok(Admission::Deny(DenyReason::QuotaExceeded {
                current,
                max: config.max_open_tickets,
            }));
        }

        if !config.is_configured() {
            return Ok(Admission::Deny(DenyReason::NotConfigured));
        }

        Ok(config.ticket_types.resolve(requested_type).map_or_else(
            || {
                Admission::Deny(DenyReason::UnknownType(
                    requested_type.unwrap_or(DEFAULT_TICKET_TYPE).to_string(),
                ))
            },
            |ticket_type| Admission::Allow(ticket_type.clone()),
        ))
    }

    async fn last_creation(
        &self,
        config: &CommunityTicketConfig,
        author: UserId,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let cached = self.env.cooldowns.last_creation(config.community, author);
        if cached.is_some() || !self.cooldown_from_repository {
            return Ok(cached);
        }

        let stored = self
            .env
            .repository
            .latest_created_at(config.community, author)
            .await?;
        if let Some(at) = stored {
            tracing::debug!(community = %config.community, %author, "Cooldown re-derived from repository");
            self.env.cooldowns.record_creation(config.community, author, at);
        }
        Ok(stored)
    }
}

/// Seconds left before `cooldown_secs` have elapsed since `last`, or
/// `None` when the cooldown is over. Partial seconds round up.
pub(crate) fn cooldown_remaining(cooldown_secs: u64, last: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    let elapsed_ms = now.signed_duration_since(last).num_milliseconds();
    let cooldown_ms = i64::try_from(cooldown_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    if elapsed_ms >= cooldown_ms {
        return None;
    }
    // A clock behind the last creation never extends the wait past one cooldown.
    let remaining_ms = (cooldown_ms - elapsed_ms.max(0)).unsigned_abs();
    Some(remaining_ms.div_ceil(1000).min(cooldown_secs))
}
