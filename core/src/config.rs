//! Per-community ticket configuration.
//!
//! Exactly one [`CommunityTicketConfig`] exists per community. Stores create
//! it with defaults the first time it is read, so callers never observe a
//! missing configuration, only an incomplete one (no category bound).

use crate::ids::{ChannelId, CommunityId, MessageId, RoleId};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default quota of open tickets per author.
pub const DEFAULT_MAX_OPEN_TICKETS: u32 = 3;

/// Default cooldown between two creations by the same author.
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

/// Default idle threshold for auto-close. Zero disables auto-close.
pub const DEFAULT_AUTO_CLOSE_HOURS: u32 = 24;

/// Type name used when a request does not name one.
pub const DEFAULT_TICKET_TYPE: &str = "general";

/// Default welcome text posted in every new ticket channel.
pub const DEFAULT_WELCOME_TEXT: &str =
    "Thanks for reaching out! A moderator will be with you shortly.";

/// One entry of the ticket-type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Stable name stored on tickets (e.g. `general`, `appeal`)
    pub name: String,
    /// Label shown on the creation prompt
    pub label: String,
}

impl TicketType {
    /// Create a catalog entry.
    #[must_use]
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
        }
    }
}

/// Ordered set of ticket types offered by a community.
///
/// Names are unique; insertion order is display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketTypeCatalog(Vec<TicketType>);

impl TicketTypeCatalog {
    /// Build a catalog, dropping later duplicates of a name.
    #[must_use]
    pub fn new(types: impl IntoIterator<Item = TicketType>) -> Self {
        let mut catalog = Self(Vec::new());
        for ticket_type in types {
            catalog.insert(ticket_type);
        }
        catalog
    }

    /// Append a type unless its name is already present.
    ///
    /// Returns whether the catalog changed.
    pub fn insert(&mut self, ticket_type: TicketType) -> bool {
        if self.contains(&ticket_type.name) {
            return false;
        }
        self.0.push(ticket_type);
        true
    }

    /// Whether a type with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|t| t.name == name)
    }

    /// Resolve a requested type; `None` means the default type.
    #[must_use]
    pub fn resolve(&self, requested: Option<&str>) -> Option<&TicketType> {
        let name = requested.unwrap_or(DEFAULT_TICKET_TYPE);
        self.0.iter().find(|t| t.name == name)
    }

    /// Iterate in display order.
    pub fn iter(&self) -> impl Iterator<Item = &TicketType> {
        self.0.iter()
    }

    /// Number of types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for TicketTypeCatalog {
    fn default() -> Self {
        Self(vec![TicketType::new(DEFAULT_TICKET_TYPE, "General support")])
    }
}

/// Ticket settings for one community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityTicketConfig {
    /// Community this configuration belongs to
    pub community: CommunityId,
    /// Category under which ticket channels are created
    pub category: Option<ChannelId>,
    /// Channel hosting the creation prompt
    pub creation_channel: Option<ChannelId>,
    /// The creation prompt message
    pub creation_message: Option<MessageId>,
    /// Channel receiving closure notices
    pub log_channel: Option<ChannelId>,
    /// Role granted access to every ticket channel
    pub support_role: Option<RoleId>,
    /// Maximum open tickets per author
    pub max_open_tickets: u32,
    /// Minimum seconds between two creations by one author
    pub cooldown_secs: u64,
    /// Idle hours before auto-close; 0 disables it
    pub auto_close_hours: u32,
    /// Text posted in every new ticket channel
    pub welcome_text: String,
    /// Offered ticket types
    pub ticket_types: TicketTypeCatalog,
}

impl CommunityTicketConfig {
    /// Configuration a community starts with before any setup.
    #[must_use]
    pub fn with_defaults(community: CommunityId) -> Self {
        Self {
            community,
            category: None,
            creation_channel: None,
            creation_message: None,
            log_channel: None,
            support_role: None,
            max_open_tickets: DEFAULT_MAX_OPEN_TICKETS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            auto_close_hours: DEFAULT_AUTO_CLOSE_HOURS,
            welcome_text: DEFAULT_WELCOME_TEXT.to_string(),
            ticket_types: TicketTypeCatalog::default(),
        }
    }

    /// Whether tickets can be created (a category is bound).
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.category.is_some()
    }

    /// Cooldown as a duration.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::seconds(i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX))
    }

    /// Auto-close threshold, `None` when disabled.
    #[must_use]
    pub fn auto_close_after(&self) -> Option<Duration> {
        (self.auto_close_hours > 0).then(|| Duration::hours(i64::from(self.auto_close_hours)))
    }
}
