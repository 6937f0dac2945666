//! The ticket record and its state machine.
//!
//! A ticket moves through `Open → Assigned → Closed`, where `Assigned` is
//! optional and `Closed` is terminal. The transitions here are pure: they
//! validate and mutate an in-memory [`Ticket`]. Stores apply the same rules
//! atomically (see [`crate::repository`]), so the in-memory store can reuse
//! these functions under its lock while SQL stores encode them as `WHERE`
//! conditions.

use crate::error::RepositoryError;
use crate::ids::{ChannelId, CommunityId, TicketId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Ticket is active; its channel exists
    Open,
    /// Ticket is finished; terminal
    Closed,
}

impl TicketStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(RepositoryError::Serialization(format!(
                "Invalid ticket status: {s}"
            ))),
        }
    }
}

/// Lifecycle state derived from status and moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Open, waiting for a moderator
    Open,
    /// Open, a moderator accepted it
    Assigned,
    /// Closed
    Closed,
}

/// Who closed a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "user")]
pub enum Closer {
    /// A human (moderator or administrator)
    Moderator(UserId),
    /// The auto-expiry sweep
    System,
}

impl Closer {
    /// The closing user, if a human closed the ticket.
    #[must_use]
    pub const fn user(&self) -> Option<UserId> {
        match self {
            Self::Moderator(user) => Some(*user),
            Self::System => None,
        }
    }
}

impl std::fmt::Display for Closer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Moderator(user) => write!(f, "<@{user}>"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Fields written by the closing transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    /// Who closed the ticket
    pub closed_by: Closer,
    /// Free-form closure reason
    pub reason: String,
    /// When the close was requested
    pub closed_at: DateTime<Utc>,
    /// Whether the transcript was captured in full
    pub transcript_complete: bool,
}

impl Closure {
    /// Describe a closing transition.
    #[must_use]
    pub fn new(
        closed_by: Closer,
        reason: impl Into<String>,
        closed_at: DateTime<Utc>,
        transcript_complete: bool,
    ) -> Self {
        Self {
            closed_by,
            reason: reason.into(),
            closed_at,
            transcript_complete,
        }
    }
}

/// Why a transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// A moderator already accepted the ticket
    AlreadyAssigned(UserId),
    /// The ticket is closed
    AlreadyClosed,
}

/// A ticket about to be persisted. The store allocates the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    /// Owning community
    pub community: CommunityId,
    /// User who requested the ticket
    pub author: UserId,
    /// Catalog type name
    pub ticket_type: String,
    /// Channel allocated for the ticket
    pub channel: ChannelId,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A support ticket bound to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Owning community
    pub community: CommunityId,
    /// Per-community ticket number
    pub id: TicketId,
    /// User who requested the ticket
    pub author: UserId,
    /// Moderator who accepted the ticket; set at most once
    pub moderator: Option<UserId>,
    /// Catalog type name
    pub ticket_type: String,
    /// Persisted status
    pub status: TicketStatus,
    /// Dedicated channel; immutable
    pub channel: ChannelId,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Closure timestamp; set exactly once on close
    pub closed_at: Option<DateTime<Utc>>,
    /// Closure reason; set exactly once on close
    pub close_reason: Option<String>,
    /// Who closed the ticket
    pub closed_by: Option<Closer>,
    /// `Some(false)` when the transcript could not be captured at close
    pub transcript_complete: Option<bool>,
    /// Extra users granted access to the channel
    pub participants: Vec<UserId>,
}

impl Ticket {
    /// Materialize a freshly inserted ticket.
    #[must_use]
    pub fn from_new(id: TicketId, new: NewTicket) -> Self {
        Self {
            community: new.community,
            id,
            author: new.author,
            moderator: None,
            ticket_type: new.ticket_type,
            status: TicketStatus::Open,
            channel: new.channel,
            created_at: new.created_at,
            closed_at: None,
            close_reason: None,
            closed_by: None,
            transcript_complete: None,
            participants: Vec::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        match (self.status, self.moderator) {
            (TicketStatus::Closed, _) => LifecycleState::Closed,
            (TicketStatus::Open, Some(_)) => LifecycleState::Assigned,
            (TicketStatus::Open, None) => LifecycleState::Open,
        }
    }

    /// Whether the ticket is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    /// Time elapsed since creation.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }

    /// Whether `user` belongs in the ticket channel.
    #[must_use]
    pub fn is_member(&self, user: UserId) -> bool {
        user == self.author || self.moderator == Some(user) || self.participants.contains(&user)
    }

    /// Bind a moderator. First acceptance wins.
    ///
    /// # Errors
    ///
    /// - [`TransitionError::AlreadyClosed`] if the ticket is closed
    /// - [`TransitionError::AlreadyAssigned`] with the existing moderator otherwise
    pub fn assign(&mut self, moderator: UserId) -> Result<(), TransitionError> {
        if self.status == TicketStatus::Closed {
            return Err(TransitionError::AlreadyClosed);
        }
        if let Some(existing) = self.moderator {
            return Err(TransitionError::AlreadyAssigned(existing));
        }
        self.moderator = Some(moderator);
        Ok(())
    }

    /// Close the ticket, writing every closure field exactly once.
    ///
    /// The closure timestamp never precedes creation.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::AlreadyClosed`] if the ticket is closed.
    pub fn close(&mut self, closure: &Closure) -> Result<(), TransitionError> {
        if self.status == TicketStatus::Closed {
            return Err(TransitionError::AlreadyClosed);
        }
        self.status = TicketStatus::Closed;
        self.closed_at = Some(closure.closed_at.max(self.created_at));
        self.close_reason = Some(closure.reason.clone());
        self.closed_by = Some(closure.closed_by);
        self.transcript_complete = Some(closure.transcript_complete);
        Ok(())
    }

    /// Add or remove a participant.
    ///
    /// Returns whether the participant list changed.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::AlreadyClosed`] if the ticket is closed.
    pub fn set_participant(&mut self, user: UserId, present: bool) -> Result<bool, TransitionError> {
        if self.status == TicketStatus::Closed {
            return Err(TransitionError::AlreadyClosed);
        }
        let position = self.participants.iter().position(|p| *p == user);
        match (present, position) {
            (true, None) => {
                self.participants.push(user);
                Ok(true)
            }
            (false, Some(index)) => {
                self.participants.remove(index);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Aggregate counts for one community.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStats {
    /// All tickets ever created
    pub total: u64,
    /// Open tickets (assigned or not)
    pub open: u64,
    /// Open tickets with a moderator
    pub assigned: u64,
    /// Closed tickets
    pub closed: u64,
    /// Closed tickets whose transcript is missing
    pub incomplete_transcripts: u64,
    /// Ticket count per catalog type
    pub by_type: BTreeMap<String, u64>,
}

impl TicketStats {
    /// Fold one ticket into the counts.
    pub fn record(&mut self, ticket: &Ticket) {
        self.total += 1;
        match ticket.state() {
            LifecycleState::Open => self.open += 1,
            LifecycleState::Assigned => {
                self.open += 1;
                self.assigned += 1;
            }
            LifecycleState::Closed => {
                self.closed += 1;
                if ticket.transcript_complete == Some(false) {
                    self.incomplete_transcripts += 1;
                }
            }
        }
        *self.by_type.entry(ticket.ticket_type.clone()).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use proptest::prelude::*;

    fn open_ticket(created_at: DateTime<Utc>) -> Ticket {
        Ticket::from_new(
            TicketId::new(1),
            NewTicket {
                community: CommunityId::new(1),
                author: UserId::new(100),
                ticket_type: "general".to_string(),
                channel: ChannelId::new(900),
                created_at,
            },
        )
    }

    #[test]
    fn test_new_ticket_is_open_without_closure_fields() {
        let ticket = open_ticket(Utc::now());
        assert_eq!(ticket.state(), LifecycleState::Open);
        assert!(ticket.closed_at.is_none());
        assert!(ticket.close_reason.is_none());
    }

    #[test]
    fn test_first_assignment_wins() {
        let mut ticket = open_ticket(Utc::now());
        ticket.assign(UserId::new(7)).unwrap();
        assert_eq!(
            ticket.assign(UserId::new(8)),
            Err(TransitionError::AlreadyAssigned(UserId::new(7)))
        );
        assert_eq!(ticket.moderator, Some(UserId::new(7)));
        assert_eq!(ticket.state(), LifecycleState::Assigned);
    }

    #[test]
    fn test_open_ticket_can_close_without_assignment() {
        let mut ticket = open_ticket(Utc::now());
        let closure = Closure::new(Closer::System, "idle", Utc::now(), true);
        ticket.close(&closure).unwrap();
        assert_eq!(ticket.state(), LifecycleState::Closed);
        assert_eq!(ticket.closed_by, Some(Closer::System));
    }

    #[test]
    fn test_closed_ticket_rejects_assignment_and_participants() {
        let mut ticket = open_ticket(Utc::now());
        ticket
            .close(&Closure::new(Closer::System, "idle", Utc::now(), true))
            .unwrap();
        assert_eq!(ticket.assign(UserId::new(7)), Err(TransitionError::AlreadyClosed));
        assert_eq!(
            ticket.set_participant(UserId::new(5), true),
            Err(TransitionError::AlreadyClosed)
        );
    }

    #[test]
    fn test_closed_at_is_clamped_to_creation() {
        let created = Utc::now();
        let mut ticket = open_ticket(created);
        let early = created - Duration::seconds(30);
        ticket
            .close(&Closure::new(Closer::System, "skewed clock", early, false))
            .unwrap();
        assert_eq!(ticket.closed_at, Some(created));
    }

    #[test]
    fn test_participants_are_deduplicated() {
        let mut ticket = open_ticket(Utc::now());
        assert!(ticket.set_participant(UserId::new(5), true).unwrap());
        assert!(!ticket.set_participant(UserId::new(5), true).unwrap());
        assert!(ticket.is_member(UserId::new(5)));
        assert!(ticket.set_participant(UserId::new(5), false).unwrap());
        assert!(!ticket.is_member(UserId::new(5)));
    }

    #[test]
    fn test_stats_fold() {
        let mut stats = TicketStats::default();
        let open = open_ticket(Utc::now());
        let mut assigned = open_ticket(Utc::now());
        assigned.assign(UserId::new(3)).unwrap();
        let mut closed = open_ticket(Utc::now());
        closed
            .close(&Closure::new(Closer::System, "x", Utc::now(), false))
            .unwrap();

        for ticket in [&open, &assigned, &closed] {
            stats.record(ticket);
        }

        assert_eq!(stats.total, 3);
        assert_eq!(stats.open, 2);
        assert_eq!(stats.assigned, 1);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.incomplete_transcripts, 1);
        assert_eq!(stats.by_type.get("general"), Some(&3));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Assign(u64),
        Close(i64),
        Participant(u64, bool),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..5).prop_map(Op::Assign),
            (-100i64..100).prop_map(Op::Close),
            ((1u64..5), any::<bool>()).prop_map(|(u, p)| Op::Participant(u, p)),
        ]
    }

    proptest! {
        #[test]
        fn prop_closure_and_moderator_are_write_once(ops in prop::collection::vec(op_strategy(), 0..20)) {
            let created = Utc::now();
            let mut ticket = open_ticket(created);
            let mut first_moderator = None;
            let mut first_closed_at = None;

            for op in ops {
                match op {
                    Op::Assign(m) => { let _ = ticket.assign(UserId::new(m)); }
                    Op::Close(offset) => {
                        let closure = Closure::new(
                            Closer::System,
                            format!("offset {offset}"),
                            created + Duration::seconds(offset),
                            true,
                        );
                        let _ = ticket.close(&closure);
                    }
                    Op::Participant(u, p) => { let _ = ticket.set_participant(UserId::new(u), p); }
                }

                if first_moderator.is_none() {
                    first_moderator = ticket.moderator;
                }
                prop_assert_eq!(ticket.moderator, first_moderator);

                if ticket.status == TicketStatus::Open {
                    prop_assert!(ticket.closed_at.is_none());
                    prop_assert!(ticket.close_reason.is_none());
                } else {
                    if first_closed_at.is_none() {
                        first_closed_at = ticket.closed_at;
                    }
                    prop_assert_eq!(ticket.closed_at, first_closed_at);
                    prop_assert!(ticket.closed_at.unwrap() >= ticket.created_at);
                }
            }
        }
    }
}
