//! Scriptable chat transport and notification sink.

#![allow(clippy::unwrap_used)] // Test infrastructure, panics are acceptable
#![allow(clippy::missing_panics_doc)] // Test infrastructure

use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use ticketdesk_core::environment::{
    Clock, HistoryMessage, NotificationSink, NotificationTarget, PermissionOverride, Principal,
    SystemClock, Transport,
};
use ticketdesk_core::error::TransportError;
use ticketdesk_core::ids::{ChannelId, CommunityId, MessageId, UserId};

/// A channel (or category) living in the mock platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockChannel {
    /// Owning community
    pub community: CommunityId,
    /// Channel name
    pub name: String,
    /// Parent category
    pub category: Option<ChannelId>,
    /// Whether this is a category
    pub is_category: bool,
    /// Read/write grant per principal
    pub permissions: HashMap<Principal, (bool, bool)>,
    /// Posted messages, oldest first
    pub messages: Vec<HistoryMessage>,
}

impl MockChannel {
    /// Whether `principal` may read the channel.
    #[must_use]
    pub fn can_read(&self, principal: Principal) -> bool {
        self.permissions.get(&principal).is_some_and(|(read, _)| *read)
    }

    /// Text of every posted message.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.content.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct PlatformState {
    next_id: u64,
    channels: BTreeMap<ChannelId, MockChannel>,
    deleted_channels: Vec<ChannelId>,
    deleted_messages: Vec<(ChannelId, MessageId)>,
    fail_channel_creation: Option<TransportError>,
    fail_deletion: bool,
}

impl PlatformState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process chat platform.
///
/// Channels, messages and permissions are kept in memory. Messages sent
/// through the [`Transport`] are authored by [`MockTransport::BOT`];
/// tests post human messages with [`MockTransport::post`].
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<PlatformState>>,
    clock: Arc<dyn Clock>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// User id of the bot account.
    pub const BOT: UserId = UserId::new(1);

    /// Create a platform that timestamps messages with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a platform that timestamps messages with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlatformState {
                next_id: 1000,
                ..PlatformState::default()
            })),
            clock,
        }
    }

    /// Post a message as a user (or as a bot with `is_bot`).
    pub fn post(
        &self,
        channel: ChannelId,
        author: UserId,
        is_bot: bool,
        content: &str,
        attachments: &[&str],
    ) -> MessageId {
        let timestamp = self.clock.now();
        let mut state = self.state.lock().unwrap();
        let id = MessageId::new(state.allocate());
        let message = HistoryMessage {
            id,
            author,
            author_is_bot: is_bot,
            timestamp,
            content: content.to_string(),
            attachments: attachments.iter().map(ToString::to_string).collect(),
        };
        if let Some(ch) = state.channels.get_mut(&channel) {
            ch.messages.push(message);
        }
        id
    }

    /// Delete a channel behind the engine's back.
    pub fn remove_channel(&self, channel: ChannelId) {
        self.state.lock().unwrap().channels.remove(&channel);
    }

    /// Make every channel creation fail with `error` until cleared.
    pub fn fail_channel_creation(&self, error: Option<TransportError>) {
        self.state.lock().unwrap().fail_channel_creation = error;
    }

    /// Make channel deletion fail.
    pub fn fail_deletion(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletion = fail;
    }

    /// Snapshot of a channel.
    #[must_use]
    pub fn channel(&self, channel: ChannelId) -> Option<MockChannel> {
        self.state.lock().unwrap().channels.get(&channel).cloned()
    }

    /// Whether a channel exists.
    #[must_use]
    pub fn exists(&self, channel: ChannelId) -> bool {
        self.state.lock().unwrap().channels.contains_key(&channel)
    }

    /// Non-category channels in a community.
    #[must_use]
    pub fn text_channels(&self, community: CommunityId) -> Vec<ChannelId> {
        self.state
            .lock()
            .unwrap()
            .channels
            .iter()
            .filter(|(_, ch)| ch.community == community && !ch.is_category)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Channels deleted through the transport, in order.
    #[must_use]
    pub fn deleted_channels(&self) -> Vec<ChannelId> {
        self.state.lock().unwrap().deleted_channels.clone()
    }

    /// Messages deleted through the transport, in order.
    #[must_use]
    pub fn deleted_messages(&self) -> Vec<(ChannelId, MessageId)> {
        self.state.lock().unwrap().deleted_messages.clone()
    }

    fn with_channel<T>(
        &self,
        channel: ChannelId,
        f: impl FnOnce(&mut MockChannel) -> T,
    ) -> Result<T, TransportError> {
        let mut state = self.state.lock().unwrap();
        state
            .channels
            .get_mut(&channel)
            .map(f)
            .ok_or(TransportError::ChannelGone(channel))
    }
}

impl Transport for MockTransport {
    fn create_category(
        &self,
        community: CommunityId,
        name: String,
    ) -> BoxFuture<'_, Result<ChannelId, TransportError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let id = ChannelId::new(state.allocate());
            state.channels.insert(
                id,
                MockChannel {
                    community,
                    name,
                    category: None,
                    is_category: true,
                    permissions: HashMap::new(),
                    messages: Vec::new(),
                },
            );
            Ok(id)
        })
    }

    fn create_channel(
        &self,
        community: CommunityId,
        name: String,
        category: Option<ChannelId>,
        overrides: Vec<PermissionOverride>,
    ) -> BoxFuture<'_, Result<ChannelId, TransportError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if let Some(error) = state.fail_channel_creation.clone() {
                return Err(error);
            }
            if let Some(parent) = category {
                if !state.channels.contains_key(&parent) {
                    return Err(TransportError::ChannelGone(parent));
                }
            }
            let id = ChannelId::new(state.allocate());
            let permissions = overrides
                .into_iter()
                .map(|o| (o.principal, (o.allow_read, o.allow_write)))
                .collect();
            state.channels.insert(
                id,
                MockChannel {
                    community,
                    name,
                    category,
                    is_category: false,
                    permissions,
                    messages: Vec::new(),
                },
            );
            Ok(id)
        })
    }

    fn delete_channel(&self, channel: ChannelId) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.fail_deletion {
                return Err(TransportError::Rejected("missing permissions".to_string()));
            }
            if state.channels.remove(&channel).is_none() {
                return Err(TransportError::ChannelGone(channel));
            }
            state.deleted_channels.push(channel);
            Ok(())
        })
    }

    fn send_message(
        &self,
        channel: ChannelId,
        content: String,
    ) -> BoxFuture<'_, Result<MessageId, TransportError>> {
        Box::pin(async move {
            if !self.exists(channel) {
                return Err(TransportError::ChannelGone(channel));
            }
            Ok(self.post(channel, Self::BOT, true, &content, &[]))
        })
    }

    fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.with_channel(channel, |ch| ch.messages.retain(|m| m.id != message))?;
            self.state
                .lock()
                .unwrap()
                .deleted_messages
                .push((channel, message));
            Ok(())
        })
    }

    fn fetch_history(
        &self,
        channel: ChannelId,
    ) -> BoxFuture<'_, Result<Vec<HistoryMessage>, TransportError>> {
        Box::pin(async move { self.with_channel(channel, |ch| ch.messages.clone()) })
    }

    fn set_permission(
        &self,
        channel: ChannelId,
        principal: Principal,
        allow_read: bool,
        allow_write: bool,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.with_channel(channel, |ch| {
                ch.permissions.insert(principal, (allow_read, allow_write));
            })
        })
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    delivered: Vec<(NotificationTarget, String)>,
    fail: bool,
}

/// [`NotificationSink`] that records every delivery.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl RecordingNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail (user has DMs closed, channel gone, ...).
    pub fn fail_all(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    /// Every successful delivery, in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<(NotificationTarget, String)> {
        self.state.lock().unwrap().delivered.clone()
    }

    /// Messages delivered to one target.
    #[must_use]
    pub fn sent_to(&self, target: NotificationTarget) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .delivered
            .iter()
            .filter(|(t, _)| *t == target)
            .map(|(_, content)| content.clone())
            .collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(
        &self,
        target: NotificationTarget,
        content: String,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.fail {
                return Err(TransportError::Rejected("cannot deliver".to_string()));
            }
            state.delivered.push((target, content));
            Ok(())
        })
    }
}
