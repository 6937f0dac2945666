//! In-memory ticket repository.
//!
//! Applies the pure transitions of [`Ticket`] under a single lock, which
//! gives the same compare-and-swap outcomes as the SQL store.

#![allow(clippy::unwrap_used)] // Test infrastructure, panics are acceptable
#![allow(clippy::missing_panics_doc)] // Test infrastructure

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use ticketdesk_core::config::CommunityTicketConfig;
use ticketdesk_core::error::RepositoryError;
use ticketdesk_core::ids::{ChannelId, CommunityId, TicketId, UserId};
use ticketdesk_core::repository::{ConditionalUpdate, QuotaInsert, Result, TicketRepository};
use ticketdesk_core::ticket::{Closure, NewTicket, Ticket, TicketStats};
use ticketdesk_core::transcript::TranscriptRecord;

#[derive(Debug, Default)]
struct Tables {
    configs: HashMap<CommunityId, CommunityTicketConfig>,
    counters: HashMap<CommunityId, u64>,
    tickets: BTreeMap<(CommunityId, TicketId), Ticket>,
    transcripts: HashMap<(CommunityId, TicketId), TranscriptRecord>,
}

impl Tables {
    fn insert(&mut self, ticket: NewTicket) -> Ticket {
        let counter = self.counters.entry(ticket.community).or_insert(0);
        *counter += 1;
        let ticket = Ticket::from_new(TicketId::new(*counter), ticket);
        self.tickets
            .insert((ticket.community, ticket.id), ticket.clone());
        ticket
    }

    fn open_count(&self, community: CommunityId, author: UserId) -> Result<u32> {
        let count = self
            .tickets
            .values()
            .filter(|t| t.community == community && t.author == author && t.is_open())
            .count();
        u32::try_from(count).map_err(|e| RepositoryError::Serialization(e.to_string()))
    }
}

/// `HashMap`-backed [`TicketRepository`].
///
/// Clones share the same tables, so one instance can be handed to the
/// engine while the test inspects it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketRepository {
    tables: Arc<RwLock<Tables>>,
    fail_next_insert: Arc<Mutex<Option<RepositoryError>>>,
}

impl InMemoryTicketRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `insert_ticket` call fail with `error`.
    pub fn fail_next_insert(&self, error: RepositoryError) {
        *self.fail_next_insert.lock().unwrap() = Some(error);
    }

    /// Store a configuration without going through the trait.
    pub fn put_config(&self, config: CommunityTicketConfig) {
        self.tables
            .write()
            .unwrap()
            .configs
            .insert(config.community, config);
    }

    /// Snapshot of a stored ticket.
    #[must_use]
    pub fn ticket(&self, community: CommunityId, id: TicketId) -> Option<Ticket> {
        self.tables
            .read()
            .unwrap()
            .tickets
            .get(&(community, id))
            .cloned()
    }

    /// Snapshot of all tickets, ordered by community then id.
    #[must_use]
    pub fn tickets(&self) -> Vec<Ticket> {
        self.tables.read().unwrap().tickets.values().cloned().collect()
    }

    /// Number of stored transcripts.
    #[must_use]
    pub fn transcript_count(&self) -> usize {
        self.tables.read().unwrap().transcripts.len()
    }

    /// Overwrite a stored ticket, e.g. to backdate `created_at`.
    pub fn put_ticket(&self, ticket: Ticket) {
        self.tables
            .write()
            .unwrap()
            .tickets
            .insert((ticket.community, ticket.id), ticket);
    }

    fn take_insert_failure(&self) -> Result<()> {
        self.fail_next_insert.lock().unwrap().take().map_or(Ok(()), Err)
    }

    fn conditional(
        &self,
        community: CommunityId,
        id: TicketId,
        apply: impl FnOnce(&mut Ticket) -> bool,
    ) -> ConditionalUpdate {
        let mut tables = self.tables.write().unwrap();
        let Some(stored) = tables.tickets.get_mut(&(community, id)) else {
            return ConditionalUpdate::NotFound;
        };
        let mut candidate = stored.clone();
        if apply(&mut candidate) {
            *stored = candidate.clone();
            ConditionalUpdate::Applied(candidate)
        } else {
            ConditionalUpdate::Rejected(stored.clone())
        }
    }
}

impl TicketRepository for InMemoryTicketRepository {
    fn load_config(&self, community: CommunityId) -> BoxFuture<'_, Result<CommunityTicketConfig>> {
        Box::pin(async move {
            let mut tables = self.tables.write().unwrap();
            Ok(tables
                .configs
                .entry(community)
                .or_insert_with(|| CommunityTicketConfig::with_defaults(community))
                .clone())
        })
    }

    fn save_config(&self, config: CommunityTicketConfig) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.put_config(config);
            Ok(())
        })
    }

    fn insert_ticket(&self, ticket: NewTicket) -> BoxFuture<'_, Result<Ticket>> {
        Box::pin(async move {
            self.take_insert_failure()?;
            Ok(self.tables.write().unwrap().insert(ticket))
        })
    }

    fn insert_within_quota(
        &self,
        ticket: NewTicket,
        max_open: u32,
    ) -> BoxFuture<'_, Result<QuotaInsert>> {
        Box::pin(async move {
            self.take_insert_failure()?;
            let mut tables = self.tables.write().unwrap();
            let current = tables.open_count(ticket.community, ticket.author)?;
            if current >= max_open {
                return Ok(QuotaInsert::QuotaExceeded { current });
            }
            Ok(QuotaInsert::Inserted(tables.insert(ticket)))
        })
    }

    fn get_ticket(
        &self,
        community: CommunityId,
        id: TicketId,
    ) -> BoxFuture<'_, Result<Option<Ticket>>> {
        Box::pin(async move { Ok(self.ticket(community, id)) })
    }

    fn find_by_channel(&self, channel: ChannelId) -> BoxFuture<'_, Result<Option<Ticket>>> {
        Box::pin(async move {
            let tables = self.tables.read().unwrap();
            Ok(tables
                .tickets
                .values()
                .find(|t| t.channel == channel)
                .cloned())
        })
    }

    fn count_open(&self, community: CommunityId, author: UserId) -> BoxFuture<'_, Result<u32>> {
        Box::pin(async move { self.tables.read().unwrap().open_count(community, author) })
    }

    fn latest_created_at(
        &self,
        community: CommunityId,
        author: UserId,
    ) -> BoxFuture<'_, Result<Option<DateTime<Utc>>>> {
        Box::pin(async move {
            let tables = self.tables.read().unwrap();
            Ok(tables
                .tickets
                .values()
                .filter(|t| t.community == community && t.author == author)
                .map(|t| t.created_at)
                .max())
        })
    }

    fn list_open(&self) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let tables = self.tables.read().unwrap();
            let mut open: Vec<Ticket> = tables
                .tickets
                .values()
                .filter(|t| t.is_open())
                .cloned()
                .collect();
            open.sort_by_key(|t| t.created_at);
            Ok(open)
        })
    }

    fn assign_if_unassigned(
        &self,
        community: CommunityId,
        id: TicketId,
        moderator: UserId,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>> {
        Box::pin(async move {
            Ok(self.conditional(community, id, |ticket| ticket.assign(moderator).is_ok()))
        })
    }

    fn close_if_open(
        &self,
        community: CommunityId,
        id: TicketId,
        closure: Closure,
        transcript: Option<TranscriptRecord>,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>> {
        Box::pin(async move {
            let mut tables = self.tables.write().unwrap();
            let Some(stored) = tables.tickets.get_mut(&(community, id)) else {
                return Ok(ConditionalUpdate::NotFound);
            };
            if stored.close(&closure).is_err() {
                return Ok(ConditionalUpdate::Rejected(stored.clone()));
            }
            let closed = stored.clone();
            if let Some(record) = transcript {
                tables.transcripts.insert((community, id), record);
            }
            Ok(ConditionalUpdate::Applied(closed))
        })
    }

    fn set_participant(
        &self,
        community: CommunityId,
        id: TicketId,
        user: UserId,
        present: bool,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>> {
        Box::pin(async move {
            Ok(self.conditional(community, id, |ticket| {
                ticket.set_participant(user, present).is_ok()
            }))
        })
    }

    fn get_transcript(
        &self,
        community: CommunityId,
        id: TicketId,
    ) -> BoxFuture<'_, Result<Option<TranscriptRecord>>> {
        Box::pin(async move {
            Ok(self
                .tables
                .read()
                .unwrap()
                .transcripts
                .get(&(community, id))
                .cloned())
        })
    }

    fn stats(&self, community: CommunityId) -> BoxFuture<'_, Result<TicketStats>> {
        Box::pin(async move {
            let tables = self.tables.read().unwrap();
            let mut stats = TicketStats::default();
            for ticket in tables.tickets.values().filter(|t| t.community == community) {
                stats.record(ticket);
            }
            Ok(stats)
        })
    }
}
