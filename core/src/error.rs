//! Error taxonomy.
//!
//! Three layers, each with its own enum:
//!
//! - [`RepositoryError`]: the durable store failed
//! - [`TransportError`]: the chat platform refused or failed a call
//! - [`TicketError`]: an engine operation failed
//!
//! Expected refusals are not errors. Admission denials are returned as
//! [`DenyReason`] and idempotency signals (`AlreadyAssigned`,
//! `AlreadyClosed`) as outcome variants, so callers can answer users
//! without matching on failures.

use crate::ids::{ChannelId, CommunityId, TicketId, UserId};
use thiserror::Error;

/// Errors raised by a ticket repository.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by the chat transport or the notification sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel was deleted (possibly by a concurrent manual deletion).
    #[error("Channel {0} no longer exists")]
    ChannelGone(ChannelId),

    /// The platform refused the call (missing permission, invalid name, ...).
    #[error("Request rejected by platform: {0}")]
    Rejected(String),

    /// The platform could not be reached.
    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}

/// Why a ticket request was denied by admission control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The author created a ticket too recently.
    CooldownActive {
        /// Seconds until the author may create again
        remaining_secs: u64,
    },
    /// The author has too many open tickets.
    QuotaExceeded {
        /// Open tickets the author currently has
        current: u32,
        /// Configured maximum
        max: u32,
    },
    /// The community has no ticket category bound.
    NotConfigured,
    /// The requested type is not in the community catalog.
    UnknownType(String),
}

impl DenyReason {
    /// Stable label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CooldownActive { .. } => "cooldown",
            Self::QuotaExceeded { .. } => "quota",
            Self::NotConfigured => "not_configured",
            Self::UnknownType(_) => "unknown_type",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CooldownActive { remaining_secs } => write!(
                f,
                "You can open another ticket in {remaining_secs} seconds."
            ),
            Self::QuotaExceeded { current, max } => write!(
                f,
                "You already have {current}/{max} open tickets. Close one before opening another."
            ),
            Self::NotConfigured => write!(
                f,
                "Tickets are not set up in this community yet. Ask an administrator to run setup."
            ),
            Self::UnknownType(name) => write!(f, "Unknown ticket type: {name}"),
        }
    }
}

/// Errors raised by engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    /// The community has no ticket category bound.
    #[error("Ticket system is not configured for community {0}")]
    Configuration(CommunityId),

    /// The ticket type is not in the community catalog.
    #[error("Unknown ticket type: {0}")]
    UnknownType(String),

    /// The transport could not allocate the ticket channel.
    ///
    /// Nothing was persisted.
    #[error("Failed to create ticket channel: {0}")]
    ChannelCreation(TransportError),

    /// The ticket channel no longer exists.
    #[error("Ticket channel {0} no longer exists")]
    ChannelGone(ChannelId),

    /// No ticket matches the given id.
    #[error("Ticket {1} not found in community {0}")]
    NotFound(CommunityId, TicketId),

    /// No ticket is bound to the given channel.
    #[error("No ticket is bound to channel {0}")]
    ChannelNotTicket(ChannelId),

    /// The actor may not perform this operation on the ticket.
    #[error("User {user} may not manage ticket {ticket}")]
    PermissionDenied {
        /// Acting user
        user: UserId,
        /// Target ticket
        ticket: TicketId,
    },

    /// Repository failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Transport failure on a critical path.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TicketError {
    /// Whether the user can fix this by themselves (or an admin can).
    #[must_use]
    pub const fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnknownType(_)
                | Self::PermissionDenied { .. }
                | Self::ChannelNotTicket(_)
        )
    }
}
