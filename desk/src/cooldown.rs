//! Creation cooldown cache.
//!
//! Remembers when each author last created a ticket in a community. The
//! cache is process-local and best effort: a miss is not proof that the
//! author never created a ticket, which is why admission can fall back to
//! the repository.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use ticketdesk_core::ids::{CommunityId, UserId};

/// A creation slot claimed by [`CooldownStore::try_reserve`].
///
/// Hand it back to [`CooldownStore::release`] when the creation does not
/// happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Reservation {
    /// Timestamp written by the reservation
    pub at: DateTime<Utc>,
    /// Entry the reservation replaced
    pub previous: Option<DateTime<Utc>>,
}

/// Last-creation timestamps keyed by `(community, author)`.
///
/// # Eviction contract
///
/// Entries older than the largest configured cooldown carry no
/// information and may be dropped at any time.
pub trait CooldownStore: Send + Sync {
    /// When the author last created a ticket, if known.
    fn last_creation(&self, community: CommunityId, author: UserId) -> Option<DateTime<Utc>>;

    /// Record a durable creation. Never moves an entry backwards.
    fn record_creation(&self, community: CommunityId, author: UserId, at: DateTime<Utc>);

    /// Claim the author's creation slot at `at` unless a known creation
    /// lies less than `cooldown` before it.
    ///
    /// Check and write are one atomic step, so of two concurrent requests
    /// only one obtains the slot.
    ///
    /// # Errors
    ///
    /// Returns the last known creation when the slot is still cooling down.
    fn try_reserve(
        &self,
        community: CommunityId,
        author: UserId,
        at: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Reservation, DateTime<Utc>>;

    /// Undo a reservation whose creation failed. A no-op once the entry
    /// has moved past the reservation.
    fn release(&self, community: CommunityId, author: UserId, reservation: Reservation);

    /// Drop entries last touched before `cutoff`. Returns how many were dropped.
    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize;
}

/// `HashMap`-backed [`CooldownStore`].
#[derive(Debug, Default)]
pub struct InMemoryCooldowns {
    entries: RwLock<HashMap<(CommunityId, UserId), DateTime<Utc>>>,
}

impl InMemoryCooldowns {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CooldownStore for InMemoryCooldowns {
    fn last_creation(&self, community: CommunityId, author: UserId) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(community, author))
            .copied()
    }

    fn record_creation(&self, community: CommunityId, author: UserId, at: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry((community, author)).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    fn try_reserve(
        &self,
        community: CommunityId,
        author: UserId,
        at: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Reservation, DateTime<Utc>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.get(&(community, author)).copied();
        if let Some(last) = previous {
            if at.signed_duration_since(last) < cooldown {
                return Err(last);
            }
        }
        entries.insert((community, author), at);
        Ok(Reservation { at, previous })
    }

    fn release(&self, community: CommunityId, author: UserId, reservation: Reservation) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(&(community, author)) != Some(&reservation.at) {
            return;
        }
        match reservation.previous {
            Some(previous) => entries.insert((community, author), previous),
            None => entries.remove(&(community, author)),
        };
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, at| *at >= cutoff);
        before - entries.len()
    }
}
