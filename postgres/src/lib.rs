//! `PostgreSQL` ticket repository for ticketdesk.
//!
//! This crate provides the production implementation of the
//! `TicketRepository` trait from `ticketdesk-core`. It uses sqlx and supports:
//!
//! - Per-community ticket numbering through a counter table
//! - Conditional updates (`UPDATE ... WHERE guard RETURNING`) so racing
//!   moderators, closers and the expiry sweep resolve to one winner even
//!   across processes
//! - Closure and transcript written in one transaction
//! - Connection pooling
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ticketdesk_postgres::PostgresTicketRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repository =
//!     PostgresTicketRepository::connect("postgres://localhost/tickets", 10, Duration::from_secs(5))
//!         .await?;
//! repository.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod tickets;

pub use tickets::PostgresTicketRepository;
