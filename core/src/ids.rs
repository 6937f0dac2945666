//! Strongly typed identifiers.
//!
//! Chat-platform objects (communities, users, channels, messages, roles) are
//! addressed by 64-bit snowflakes. Ticket ids are small per-community
//! sequence numbers. Each gets its own newtype so a channel id can never be
//! passed where a user id is expected.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Get the raw identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// A community (tenant). Owns its own configuration and ticket numbering.
    CommunityId
);

define_id!(
    /// A platform user: ticket author, moderator, participant or bystander.
    UserId
);

define_id!(
    /// A channel or channel category.
    ChannelId
);

define_id!(
    /// A message inside a channel.
    MessageId
);

define_id!(
    /// A community role (e.g. the support role).
    RoleId
);

define_id!(
    /// Per-community ticket number, allocated monotonically starting at 1.
    TicketId
);
