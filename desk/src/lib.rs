//! Ticketdesk - support ticket lifecycle engine
//!
//! Members of a community request a ticket; the engine allocates a private
//! channel, lets one moderator take it, closes it (by hand or after an idle
//! period) and keeps a transcript of the conversation.
//!
//! # Architecture
//!
//! ```text
//!                     TicketCommand
//!                          │
//!                          ▼
//!                   ┌─────────────┐
//!                   │ TicketDesk  │  authorization, lookup by channel, guard
//!                   └─────────────┘
//!                          │
//!        ┌─────────────────┼─────────────────┐
//!        ▼                 ▼                 ▼
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │  Admission  │◄──│  Lifecycle  │──►│ Transcript  │
//! │ (cooldown,  │   │   Manager   │   │  Recorder   │
//! │   quota)    │   └─────────────┘   └─────────────┘
//! └─────────────┘          ▲
//!                          │ Close(system)
//!                   ┌─────────────┐
//!                   │   Expiry    │  periodic sweep
//!                   └─────────────┘
//! ```
//!
//! All I/O goes through the collaborators in [`TicketEnvironment`].
//! Concurrent operations on one ticket are decided by the repository's
//! conditional updates: exactly one `AcceptTicket` wins, exactly one
//! `CloseTicket` closes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ticketdesk::{DeskSettings, TicketCommand, TicketDesk, TicketEnvironment};
//! use ticketdesk_core::ids::{CommunityId, UserId};
//! use ticketdesk_runtime::TokioScheduler;
//! use ticketdesk_testing::{InMemoryTicketRepository, MockTransport, RecordingNotifier};
//!
//! # async fn run() -> Result<(), ticketdesk_core::error::TicketError> {
//! let env = TicketEnvironment::new(
//!     Arc::new(InMemoryTicketRepository::new()),
//!     Arc::new(MockTransport::new()),
//!     Arc::new(RecordingNotifier::new()),
//!     Arc::new(TokioScheduler::new()),
//! );
//! let desk = TicketDesk::new(env, &DeskSettings::default());
//!
//! let community = CommunityId::new(1);
//! desk.handle(TicketCommand::Setup { community }).await?;
//! desk.handle(TicketCommand::RequestTicket {
//!     community,
//!     author: UserId::new(42),
//!     ticket_type: None,
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod admission;
pub mod commands;
pub mod config;
pub mod cooldown;
pub mod desk;
pub mod environment;
pub mod expiry;
pub mod lifecycle;
pub mod setup;
pub mod transcript;

pub use admission::{Admission, AdmissionController};
pub use commands::{
    Actor, CommandOutcome, GuardVerdict, Requester, TicketCommand, TicketLocator,
};
pub use config::{Config, DeskSettings, PostgresConfig};
pub use cooldown::{CooldownStore, InMemoryCooldowns, Reservation};
pub use desk::TicketDesk;
pub use environment::TicketEnvironment;
pub use expiry::{ExpiryScheduler, SweepReport};
pub use lifecycle::{
    AssignOutcome, CloseOutcome, LifecycleManager, ParticipantOutcome, RequestOutcome,
};
pub use setup::SetupOutcome;
pub use transcript::TranscriptRecorder;
