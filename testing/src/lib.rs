//! # Ticketdesk Testing
//!
//! Testing utilities and in-memory collaborators for ticketdesk.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryTicketRepository`]: a `HashMap`-backed repository with the
//!   same conditional-update semantics as the Postgres one
//! - [`MockTransport`]: a scriptable chat platform
//! - [`RecordingNotifier`]: captures notifications
//! - [`ManualScheduler`]: deferred tasks run on demand
//!
//! ## Example
//!
//! ```ignore
//! use ticketdesk_testing::{InMemoryTicketRepository, ManualClock, MockTransport};
//!
//! #[tokio::test]
//! async fn test_ticket_flow() {
//!     let clock = Arc::new(ManualClock::at(test_time()));
//!     let repository = Arc::new(InMemoryTicketRepository::new());
//!     let transport = Arc::new(MockTransport::with_clock(clock.clone()));
//!     // build the engine from these and drive it
//! }
//! ```

use chrono::{DateTime, Utc};
use ticketdesk_core::environment::Clock;

mod repository;
mod scheduler;
mod transport;

pub use repository::InMemoryTicketRepository;
pub use scheduler::ManualScheduler;
pub use transport::{MockChannel, MockTransport, RecordingNotifier};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::RwLock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketdesk_testing::mocks::FixedClock;
    /// use ticketdesk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Cooldown and auto-expiry scenarios advance it between steps.
    ///
    /// ```
    /// use chrono::Duration;
    /// use ticketdesk_core::environment::Clock;
    /// use ticketdesk_testing::mocks::{ManualClock, test_time};
    ///
    /// let clock = ManualClock::at(test_time());
    /// clock.advance(Duration::seconds(100));
    /// assert_eq!(clock.now(), test_time() + Duration::seconds(100));
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start the clock at `time`.
        #[must_use]
        pub const fn at(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Move the clock forward (or backward for negative durations).
        pub fn advance(&self, by: Duration) {
            if let Ok(mut time) = self.time.write() {
                *time += by;
            }
        }

        /// Jump to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            if let Ok(mut time) = self.time.write() {
                *time = to;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time.read().map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// The reference instant used across tests: 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }
}

/// Install a test-friendly tracing subscriber once.
///
/// Honors `RUST_LOG`; output is captured by the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock, test_time};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), test_time());
    }

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::at(test_time());
        assert_eq!(clock.now(), test_time());
        clock.advance(Duration::hours(24));
        assert_eq!(clock.now(), test_time() + Duration::hours(24));
        clock.set(test_time());
        assert_eq!(clock.now(), test_time());
    }
}
