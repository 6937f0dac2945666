//! Shared harness for desk integration tests.

#![allow(dead_code)] // Each test binary uses a subset
#![allow(clippy::expect_used, clippy::panic)]

use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use ticketdesk::{
    Actor, AssignOutcome, CloseOutcome, CommandOutcome, DeskSettings, RequestOutcome, Requester,
    TicketCommand, TicketDesk, TicketEnvironment, TicketLocator,
};
use ticketdesk_core::BoxFuture;
use ticketdesk_core::config::CommunityTicketConfig;
use ticketdesk_core::environment::{HistoryMessage, PermissionOverride, Principal, Transport};
use ticketdesk_core::error::{TicketError, TransportError};
use ticketdesk_core::ids::{ChannelId, CommunityId, MessageId, RoleId, UserId};
use ticketdesk_core::repository::TicketRepository;
use ticketdesk_core::ticket::Ticket;
use ticketdesk_testing::{
    InMemoryTicketRepository, ManualClock, ManualScheduler, MockTransport, RecordingNotifier,
    init_test_tracing, test_time,
};

pub const COMMUNITY: CommunityId = CommunityId::new(1);
pub const AUTHOR: UserId = UserId::new(42);
pub const MODERATOR: UserId = UserId::new(7);
pub const OTHER_MODERATOR: UserId = UserId::new(8);
pub const ADMIN: UserId = UserId::new(3);
pub const STRANGER: UserId = UserId::new(99);
pub const SUPPORT_ROLE: RoleId = RoleId::new(500);
pub const LOG_CHANNEL: ChannelId = ChannelId::new(600);

/// [`MockTransport`] that sleeps before allocating a channel.
struct SlowChannelCreation {
    inner: MockTransport,
    delay: StdDuration,
}

impl Transport for SlowChannelCreation {
    fn create_category(
        &self,
        community: CommunityId,
        name: String,
    ) -> BoxFuture<'_, Result<ChannelId, TransportError>> {
        self.inner.create_category(community, name)
    }

    fn create_channel(
        &self,
        community: CommunityId,
        name: String,
        category: Option<ChannelId>,
        overrides: Vec<PermissionOverride>,
    ) -> BoxFuture<'_, Result<ChannelId, TransportError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.inner
                .create_channel(community, name, category, overrides)
                .await
        })
    }

    fn delete_channel(&self, channel: ChannelId) -> BoxFuture<'_, Result<(), TransportError>> {
        self.inner.delete_channel(channel)
    }

    fn send_message(
        &self,
        channel: ChannelId,
        content: String,
    ) -> BoxFuture<'_, Result<MessageId, TransportError>> {
        self.inner.send_message(channel, content)
    }

    fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.inner.delete_message(channel, message)
    }

    fn fetch_history(
        &self,
        channel: ChannelId,
    ) -> BoxFuture<'_, Result<Vec<HistoryMessage>, TransportError>> {
        self.inner.fetch_history(channel)
    }

    fn set_permission(
        &self,
        channel: ChannelId,
        principal: Principal,
        allow_read: bool,
        allow_write: bool,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.inner
            .set_permission(channel, principal, allow_read, allow_write)
    }
}

/// A desk wired to in-memory collaborators on a manual clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub repository: InMemoryTicketRepository,
    pub transport: MockTransport,
    pub notifier: RecordingNotifier,
    pub scheduler: ManualScheduler,
    pub desk: TicketDesk,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(DeskSettings::default())
    }

    pub fn with_settings(settings: DeskSettings) -> Self {
        Self::build(settings, None)
    }

    /// A harness whose channel creation suspends for `delay` first, which
    /// lets concurrent requests interleave around it.
    pub fn with_slow_channel_creation(delay: StdDuration) -> Self {
        Self::build(DeskSettings::default(), Some(delay))
    }

    fn build(settings: DeskSettings, channel_delay: Option<StdDuration>) -> Self {
        init_test_tracing();
        let clock = Arc::new(ManualClock::at(test_time()));
        let repository = InMemoryTicketRepository::new();
        let transport = MockTransport::with_clock(clock.clone());
        let notifier = RecordingNotifier::new();
        let scheduler = ManualScheduler::new();
        let platform: Arc<dyn Transport> = match channel_delay {
            Some(delay) => Arc::new(SlowChannelCreation {
                inner: transport.clone(),
                delay,
            }),
            None => Arc::new(transport.clone()),
        };
        let env = TicketEnvironment::new(
            Arc::new(repository.clone()),
            platform,
            Arc::new(notifier.clone()),
            Arc::new(scheduler.clone()),
        )
        .with_clock(clock.clone());

        Self {
            clock,
            repository,
            transport,
            notifier,
            scheduler,
            desk: TicketDesk::new(env, &settings),
        }
    }

    /// Run setup, then adjust the stored configuration.
    pub async fn configure(&self, adjust: impl FnOnce(&mut CommunityTicketConfig)) {
        self.desk
            .handle(TicketCommand::Setup {
                community: COMMUNITY,
            })
            .await
            .expect("setup");
        let mut config = self
            .repository
            .load_config(COMMUNITY)
            .await
            .expect("load config");
        config.support_role = Some(SUPPORT_ROLE);
        config.log_channel = Some(LOG_CHANNEL);
        adjust(&mut config);
        self.repository.put_config(config);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    pub async fn request(&self, author: UserId) -> RequestOutcome {
        self.request_type(author, None).await
    }

    pub async fn request_type(&self, author: UserId, ticket_type: Option<&str>) -> RequestOutcome {
        match self
            .desk
            .handle(TicketCommand::RequestTicket {
                community: COMMUNITY,
                author,
                ticket_type: ticket_type.map(ToString::to_string),
            })
            .await
            .expect("request")
        {
            CommandOutcome::Requested(outcome) => outcome,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// Request a ticket that must be created.
    pub async fn open(&self, author: UserId) -> Ticket {
        match self.request(author).await {
            RequestOutcome::Created(ticket) => ticket,
            RequestOutcome::Denied(reason) => panic!("request denied: {reason}"),
        }
    }

    pub async fn accept(&self, ticket: &Ticket, moderator: UserId) -> AssignOutcome {
        match self
            .desk
            .handle(TicketCommand::AcceptTicket {
                ticket: TicketLocator::Id(ticket.community, ticket.id),
                moderator,
            })
            .await
            .expect("accept")
        {
            CommandOutcome::Accepted(outcome) => outcome,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    pub async fn close_as(
        &self,
        ticket: &Ticket,
        requester: Requester,
    ) -> Result<CloseOutcome, TicketError> {
        self.desk
            .handle(TicketCommand::CloseTicket {
                ticket: TicketLocator::Id(ticket.community, ticket.id),
                requester,
                reason: "resolved".to_string(),
            })
            .await
            .map(|outcome| match outcome {
                CommandOutcome::Closed(outcome) => outcome,
                other => panic!("unexpected outcome: {other:?}"),
            })
    }

    /// Close as an administrator.
    pub async fn close(&self, ticket: &Ticket) -> CloseOutcome {
        self.close_as(ticket, Requester::User(Actor::admin(ADMIN)))
            .await
            .expect("close")
    }

    pub fn stored(&self, ticket: &Ticket) -> Ticket {
        self.repository
            .ticket(ticket.community, ticket.id)
            .expect("stored ticket")
    }

    pub fn deletion_delays(&self) -> Vec<StdDuration> {
        self.scheduler.delays()
    }
}
