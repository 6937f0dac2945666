//! Environment - injected collaborator traits.
//!
//! All external dependencies are abstracted behind traits and injected by
//! the caller. Production wires the chat platform client and the system
//! clock; tests wire the mocks from `ticketdesk-testing`.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] instead of using `async fn` so the
//! traits can be used as `Arc<dyn Transport>`. Arguments that the future
//! needs are taken by value.

use crate::error::TransportError;
use crate::ids::{ChannelId, CommunityId, MessageId, RoleId, UserId};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Production - uses system clock
/// let clock = SystemClock;
///
/// // Test - fixed time for deterministic tests
/// let clock = FixedClock::new(Utc::now());
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Subject of a channel permission override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    /// A single user
    User(UserId),
    /// Every member holding a role
    Role(RoleId),
    /// The community default role
    Everyone,
}

/// Read/write grant for one principal on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    /// Who the override applies to
    pub principal: Principal,
    /// May see the channel and its history
    pub allow_read: bool,
    /// May post in the channel
    pub allow_write: bool,
}

impl PermissionOverride {
    /// Read and write access.
    #[must_use]
    pub const fn allow(principal: Principal) -> Self {
        Self {
            principal,
            allow_read: true,
            allow_write: true,
        }
    }

    /// No access at all.
    #[must_use]
    pub const fn deny(principal: Principal) -> Self {
        Self {
            principal,
            allow_read: false,
            allow_write: false,
        }
    }
}

/// A message as returned by the channel history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Message id
    pub id: MessageId,
    /// Author id
    pub author: UserId,
    /// Whether the author is an automated account
    pub author_is_bot: bool,
    /// When the message was posted
    pub timestamp: DateTime<Utc>,
    /// Text content; empty for embed-only or attachment-only messages
    pub content: String,
    /// Attachment file names
    pub attachments: Vec<String>,
}

/// Chat transport: channels, messages, permissions.
///
/// Every call may suspend. Implementations must be safe to call
/// concurrently from independent tasks.
pub trait Transport: Send + Sync {
    /// Create a channel category.
    fn create_category(
        &self,
        community: CommunityId,
        name: String,
    ) -> BoxFuture<'_, Result<ChannelId, TransportError>>;

    /// Create a text channel, optionally inside a category.
    fn create_channel(
        &self,
        community: CommunityId,
        name: String,
        category: Option<ChannelId>,
        overrides: Vec<PermissionOverride>,
    ) -> BoxFuture<'_, Result<ChannelId, TransportError>>;

    /// Delete a channel.
    fn delete_channel(&self, channel: ChannelId) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Post a message.
    fn send_message(
        &self,
        channel: ChannelId,
        content: String,
    ) -> BoxFuture<'_, Result<MessageId, TransportError>>;

    /// Delete a message.
    fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Full history of a channel, oldest first.
    ///
    /// Finite, and restartable: every call reads from the beginning.
    fn fetch_history(
        &self,
        channel: ChannelId,
    ) -> BoxFuture<'_, Result<Vec<HistoryMessage>, TransportError>>;

    /// Set the read/write grant of a principal on a channel.
    fn set_permission(
        &self,
        channel: ChannelId,
        principal: Principal,
        allow_read: bool,
        allow_write: bool,
    ) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Destination of a fire-and-forget notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTarget {
    /// Direct message to a user
    User(UserId),
    /// Message in a channel
    Channel(ChannelId),
}

/// Fire-and-forget message delivery.
///
/// Callers log a failed delivery and carry on; a notification never
/// aborts the operation that emitted it.
pub trait NotificationSink: Send + Sync {
    /// Deliver `content` to `target`.
    fn notify(
        &self,
        target: NotificationTarget,
        content: String,
    ) -> BoxFuture<'_, Result<(), TransportError>>;
}
