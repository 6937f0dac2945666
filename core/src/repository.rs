//! Ticket repository trait.
//!
//! The repository is the single source of truth for ticket status and
//! moderator assignment. Besides plain CRUD it provides conditional
//! updates: each one applies only while a guard holds and reports the
//! current record when it does not. Two racing callers, possibly in
//! different processes, therefore resolve to exactly one winner.
//!
//! # Implementations
//!
//! - `PostgresTicketRepository` (in `ticketdesk-postgres`): production
//! - `InMemoryTicketRepository` (in `ticketdesk-testing`): tests and demos

use crate::config::CommunityTicketConfig;
use crate::error::RepositoryError;
use crate::ids::{ChannelId, CommunityId, TicketId, UserId};
use crate::ticket::{Closure, NewTicket, Ticket, TicketStats};
use crate::transcript::TranscriptRecord;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

/// Result alias for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Outcome of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalUpdate {
    /// The guard held; the updated ticket.
    Applied(Ticket),
    /// The guard failed; the ticket as currently stored, unchanged.
    Rejected(Ticket),
    /// No such ticket.
    NotFound,
}

/// Outcome of a quota-guarded insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaInsert {
    /// The author was under quota; the persisted ticket.
    Inserted(Ticket),
    /// The author already holds `current` open tickets. Nothing was written.
    QuotaExceeded {
        /// Open tickets of the author at the time of the check
        current: u32,
    },
}

/// Durable store for tickets, transcripts and community configuration.
pub trait TicketRepository: Send + Sync {
    /// Load a community configuration, creating it with defaults if absent.
    fn load_config(&self, community: CommunityId) -> BoxFuture<'_, Result<CommunityTicketConfig>>;

    /// Replace a community configuration.
    fn save_config(&self, config: CommunityTicketConfig) -> BoxFuture<'_, Result<()>>;

    /// Persist a new open ticket, allocating the next id of its community.
    fn insert_ticket(&self, ticket: NewTicket) -> BoxFuture<'_, Result<Ticket>>;

    /// Persist a new open ticket only while its author holds fewer than
    /// `max_open` open tickets in the community.
    ///
    /// The count and the insert are one atomic step with respect to other
    /// inserts for the same author, so concurrent requests cannot overshoot
    /// the quota.
    fn insert_within_quota(
        &self,
        ticket: NewTicket,
        max_open: u32,
    ) -> BoxFuture<'_, Result<QuotaInsert>>;

    /// Load a ticket.
    fn get_ticket(&self, community: CommunityId, id: TicketId)
    -> BoxFuture<'_, Result<Option<Ticket>>>;

    /// Load the ticket bound to a channel.
    fn find_by_channel(&self, channel: ChannelId) -> BoxFuture<'_, Result<Option<Ticket>>>;

    /// Count open tickets of an author.
    fn count_open(&self, community: CommunityId, author: UserId) -> BoxFuture<'_, Result<u32>>;

    /// Creation time of the author's most recent ticket, any status.
    fn latest_created_at(
        &self,
        community: CommunityId,
        author: UserId,
    ) -> BoxFuture<'_, Result<Option<DateTime<Utc>>>>;

    /// All open tickets across communities, oldest first.
    fn list_open(&self) -> BoxFuture<'_, Result<Vec<Ticket>>>;

    /// Set the moderator where it is still unset and the ticket is open.
    fn assign_if_unassigned(
        &self,
        community: CommunityId,
        id: TicketId,
        moderator: UserId,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>>;

    /// Close the ticket where it is still open.
    ///
    /// The status change, closure fields and the transcript (if any) are
    /// written as one atomic unit. When the guard fails nothing is written,
    /// so at most one transcript exists per ticket. A transcript the store
    /// cannot hold never blocks the closure: it is dropped and the ticket
    /// is flagged `transcript_complete = false`.
    fn close_if_open(
        &self,
        community: CommunityId,
        id: TicketId,
        closure: Closure,
        transcript: Option<TranscriptRecord>,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>>;

    /// Add (`present = true`) or remove a participant where the ticket is open.
    fn set_participant(
        &self,
        community: CommunityId,
        id: TicketId,
        user: UserId,
        present: bool,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>>;

    /// Load the transcript of a closed ticket.
    fn get_transcript(
        &self,
        community: CommunityId,
        id: TicketId,
    ) -> BoxFuture<'_, Result<Option<TranscriptRecord>>>;

    /// Aggregate counts for a community.
    fn stats(&self, community: CommunityId) -> BoxFuture<'_, Result<TicketStats>>;
}
