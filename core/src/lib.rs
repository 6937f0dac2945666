//! # Ticketdesk Core
//!
//! Domain types and collaborator traits for the ticketdesk lifecycle engine.
//!
//! This crate holds everything the engine and its collaborators agree on:
//!
//! - **Identifiers**: platform snowflakes wrapped in newtypes ([`ids`])
//! - **Ticket**: the persisted record and its pure state transitions ([`ticket`])
//! - **Configuration**: per-community ticket settings ([`config`])
//! - **Transcript**: the captured channel history ([`transcript`])
//! - **Environment**: injected collaborators (`Clock`, `Transport`,
//!   `NotificationSink`, `Scheduler`) ([`environment`], [`schedule`])
//! - **Repository**: the durable store with its conditional updates ([`repository`])
//!
//! ## Architecture Principles
//!
//! - Functional core: ticket transitions are pure functions on [`ticket::Ticket`]
//! - Imperative shell: all I/O goes through traits injected by the caller
//! - Atomicity lives in the store (compare-and-swap), never in process locks
//!
//! ## Example
//!
//! ```
//! use chrono::Utc;
//! use ticketdesk_core::ids::{ChannelId, CommunityId, TicketId, UserId};
//! use ticketdesk_core::ticket::{Closer, Closure, NewTicket, Ticket, TicketStatus};
//!
//! let mut ticket = Ticket::from_new(
//!     TicketId::new(1),
//!     NewTicket {
//!         community: CommunityId::new(10),
//!         author: UserId::new(42),
//!         ticket_type: "general".to_string(),
//!         channel: ChannelId::new(500),
//!         created_at: Utc::now(),
//!     },
//! );
//!
//! ticket.assign(UserId::new(7)).unwrap();
//! ticket
//!     .close(&Closure::new(Closer::Moderator(UserId::new(7)), "resolved", Utc::now(), true))
//!     .unwrap();
//! assert_eq!(ticket.status, TicketStatus::Closed);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use futures::future::BoxFuture;
pub use serde::{Deserialize, Serialize};

pub mod config;
pub mod environment;
pub mod error;
pub mod ids;
pub mod repository;
pub mod schedule;
pub mod ticket;
pub mod transcript;

pub use config::{CommunityTicketConfig, TicketType, TicketTypeCatalog};
pub use environment::{
    Clock, HistoryMessage, NotificationSink, NotificationTarget, PermissionOverride, Principal,
    SystemClock, Transport,
};
pub use error::{DenyReason, RepositoryError, TicketError, TransportError};
pub use ids::{ChannelId, CommunityId, MessageId, RoleId, TicketId, UserId};
pub use repository::{ConditionalUpdate, QuotaInsert, TicketRepository};
pub use schedule::{Deferred, DeferredTask, Scheduler};
pub use ticket::{Closer, Closure, LifecycleState, NewTicket, Ticket, TicketStats, TicketStatus};
pub use transcript::{TranscriptEntry, TranscriptRecord};
