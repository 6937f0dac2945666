//! Commands accepted by the [`TicketDesk`](crate::TicketDesk).
//!
//! Every user-facing operation is one [`TicketCommand`] variant dispatched
//! through [`TicketDesk::handle`](crate::TicketDesk::handle), which answers
//! with the matching [`CommandOutcome`] variant.

use crate::lifecycle::{AssignOutcome, CloseOutcome, ParticipantOutcome, RequestOutcome};
use crate::setup::SetupOutcome;
use ticketdesk_core::ids::{ChannelId, CommunityId, MessageId, TicketId, UserId};
use ticketdesk_core::ticket::{Ticket, TicketStats};
use ticketdesk_core::transcript::TranscriptRecord;

/// How a command addresses a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketLocator {
    /// By community and ticket number
    Id(CommunityId, TicketId),
    /// By the ticket's channel, as buttons inside the channel do
    Channel(ChannelId),
}

/// A user acting on a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Acting user
    pub user: UserId,
    /// Whether the user administers the community
    pub is_admin: bool,
}

impl Actor {
    /// A user without administrator rights.
    #[must_use]
    pub const fn member(user: UserId) -> Self {
        Self {
            user,
            is_admin: false,
        }
    }

    /// A community administrator.
    #[must_use]
    pub const fn admin(user: UserId) -> Self {
        Self {
            user,
            is_admin: true,
        }
    }

    /// Whether the actor may manage `ticket`: its moderator or an admin.
    #[must_use]
    pub fn may_manage(&self, ticket: &Ticket) -> bool {
        self.is_admin || ticket.moderator == Some(self.user)
    }
}

/// Who asks for a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    /// A user, subject to authorization
    User(Actor),
    /// The engine itself; never refused
    System,
}

/// An operation on the ticket system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketCommand {
    /// Admission-checked ticket creation.
    RequestTicket {
        /// Target community
        community: CommunityId,
        /// Requesting user
        author: UserId,
        /// Catalog type; `None` means the default type
        ticket_type: Option<String>,
    },
    /// A moderator takes a ticket.
    AcceptTicket {
        /// Target ticket
        ticket: TicketLocator,
        /// Accepting moderator
        moderator: UserId,
    },
    /// Close a ticket.
    CloseTicket {
        /// Target ticket
        ticket: TicketLocator,
        /// Who asks
        requester: Requester,
        /// Closure reason
        reason: String,
    },
    /// Grant a user access to a ticket channel.
    AddParticipant {
        /// Target ticket
        ticket: TicketLocator,
        /// Acting moderator or admin
        actor: Actor,
        /// User to add
        user: UserId,
    },
    /// Revoke a user's access to a ticket channel.
    RemoveParticipant {
        /// Target ticket
        ticket: TicketLocator,
        /// Acting moderator or admin
        actor: Actor,
        /// User to remove
        user: UserId,
    },
    /// Ticket counts of a community.
    GetStats {
        /// Target community
        community: CommunityId,
    },
    /// Stored transcript of a closed ticket.
    GetTranscript {
        /// Target community
        community: CommunityId,
        /// Target ticket
        ticket: TicketId,
    },
    /// Create the ticket category and creation channel.
    Setup {
        /// Target community
        community: CommunityId,
    },
    /// Screen a message posted in a channel.
    GuardMessage {
        /// Channel the message was posted in
        channel: ChannelId,
        /// The message
        message: MessageId,
        /// Its author
        author: UserId,
        /// Whether the author is a bot
        author_is_bot: bool,
        /// Whether the author administers the community
        author_is_admin: bool,
    },
    /// The ticket bound to a channel.
    FindByChannel {
        /// Channel to look up
        channel: ChannelId,
    },
}

impl TicketCommand {
    /// Stable command name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestTicket { .. } => "request_ticket",
            Self::AcceptTicket { .. } => "accept_ticket",
            Self::CloseTicket { .. } => "close_ticket",
            Self::AddParticipant { .. } => "add_participant",
            Self::RemoveParticipant { .. } => "remove_participant",
            Self::GetStats { .. } => "get_stats",
            Self::GetTranscript { .. } => "get_transcript",
            Self::Setup { .. } => "setup",
            Self::GuardMessage { .. } => "guard_message",
            Self::FindByChannel { .. } => "find_by_channel",
        }
    }
}

/// What the guard did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// The message may stay.
    Allowed,
    /// The message was deleted and its author warned.
    Removed,
}

/// Answer to a [`TicketCommand`].
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// Answer to `RequestTicket`
    Requested(RequestOutcome),
    /// Answer to `AcceptTicket`
    Accepted(AssignOutcome),
    /// Answer to `CloseTicket`
    Closed(CloseOutcome),
    /// Answer to `AddParticipant` / `RemoveParticipant`
    Participants(ParticipantOutcome),
    /// Answer to `GetStats`
    Stats(TicketStats),
    /// Answer to `GetTranscript`; `None` while open or when capture failed
    Transcript(Option<TranscriptRecord>),
    /// Answer to `Setup`
    Setup(SetupOutcome),
    /// Answer to `GuardMessage`
    Guard(GuardVerdict),
    /// Answer to `FindByChannel`
    Ticket(Option<Ticket>),
}
