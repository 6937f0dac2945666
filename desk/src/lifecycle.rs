//! Ticket lifecycle manager.
//!
//! Drives tickets through `Open → Assigned → Closed` (or `Open → Closed`)
//! and performs the side effects of each transition. Transitions are
//! decided by the repository's conditional updates, so concurrent callers
//! in any number of processes agree on a single winner. No lock is held
//! across a repository or transport call.
//!
//! Side effects fall in two classes:
//!
//! - **Critical**: channel creation, ticket persistence, the guarded
//!   status change. Failures surface as [`TicketError`].
//! - **Best effort**: notifications, transcript capture, channel deletion.
//!   Failures are logged and counted, never propagated.

use crate::admission::{Admission, AdmissionController, cooldown_remaining};
use crate::config::DeskSettings;
use crate::environment::TicketEnvironment;
use crate::transcript::TranscriptRecorder;
use std::sync::Arc;
use std::time::Duration;
use ticketdesk_core::config::{CommunityTicketConfig, TicketType};
use ticketdesk_core::environment::{NotificationTarget, PermissionOverride, Principal};
use ticketdesk_core::error::{DenyReason, RepositoryError, TicketError, TransportError};
use ticketdesk_core::ids::{ChannelId, CommunityId, TicketId, UserId};
use ticketdesk_core::repository::{ConditionalUpdate, QuotaInsert};
use ticketdesk_core::schedule::Deferred;
use ticketdesk_core::ticket::{Closer, Closure, NewTicket, Ticket};
use ticketdesk_runtime::metrics::LifecycleMetrics;

/// Result of a ticket request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The ticket was created.
    Created(Ticket),
    /// Admission control refused the request. Nothing was created.
    Denied(DenyReason),
}

/// Result of an acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The caller is now the ticket's moderator.
    Assigned(Ticket),
    /// Another moderator accepted first.
    AlreadyAssigned(UserId),
    /// The ticket is closed.
    AlreadyClosed,
}

/// Result of a close request.
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// This call closed the ticket.
    Closed {
        /// The closed ticket as persisted
        ticket: Ticket,
        /// Pending channel deletion; `None` when the channel was already gone
        deletion: Option<Deferred>,
    },
    /// The ticket was already closed. Nothing changed.
    AlreadyClosed,
}

/// Result of a participant change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantOutcome {
    /// The ticket after the change.
    Updated(Ticket),
    /// The ticket is closed.
    AlreadyClosed,
}

const fn closer_label(closer: Closer) -> &'static str {
    match closer {
        Closer::Moderator(_) => "moderator",
        Closer::System => "system",
    }
}

fn channel_error(error: TransportError) -> TicketError {
    match error {
        TransportError::ChannelGone(channel) => TicketError::ChannelGone(channel),
        other => TicketError::Transport(other),
    }
}

/// The ticket state machine and its side effects.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    env: TicketEnvironment,
    admission: AdmissionController,
    recorder: TranscriptRecorder,
    delete_countdown: Duration,
}

impl LifecycleManager {
    /// Create a lifecycle manager.
    #[must_use]
    pub fn new(env: TicketEnvironment, settings: &DeskSettings) -> Self {
        Self {
            admission: AdmissionController::new(env.clone(), settings.cooldown_from_repository),
            recorder: TranscriptRecorder::new(env.clone()),
            delete_countdown: settings.delete_countdown,
            env,
        }
    }

    /// The injected collaborators.
    #[must_use]
    pub const fn env(&self) -> &TicketEnvironment {
        &self.env
    }

    /// Admission-checked creation.
    ///
    /// Admission answers the common case without side effects. The
    /// cooldown slot is then reserved before the channel is allocated and
    /// the quota is re-checked atomically with the insert, so concurrent
    /// requests of one author cannot overshoot either limit. A request
    /// that loses at the insert has its channel removed and is denied.
    ///
    /// # Errors
    ///
    /// See [`create`](Self::create). Denials are not errors.
    #[tracing::instrument(skip(self))]
    pub async fn request(
        &self,
        community: CommunityId,
        author: UserId,
        ticket_type: Option<&str>,
    ) -> Result<RequestOutcome, TicketError> {
        let config = self.env.repository.load_config(community).await?;
        let ticket_type = match self.admission.check(&config, author, ticket_type).await? {
            Admission::Deny(reason) => return Ok(Self::denied(reason)),
            Admission::Allow(ticket_type) => ticket_type,
        };

        let reservation = if config.cooldown_secs > 0 {
            let now = self.env.clock.now();
            match self
                .env
                .cooldowns
                .try_reserve(community, author, now, config.cooldown())
            {
                Ok(reservation) => Some(reservation),
                Err(last) => {
                    let remaining_secs =
                        cooldown_remaining(config.cooldown_secs, last, now).unwrap_or(1);
                    return Ok(Self::denied(DenyReason::CooldownActive { remaining_secs }));
                }
            }
        } else {
            None
        };

        let outcome = self
            .open(&config, author, &ticket_type, Some(config.max_open_tickets))
            .await;
        if let Some(reservation) = reservation {
            if !matches!(outcome, Ok(RequestOutcome::Created(_))) {
                self.env.cooldowns.release(community, author, reservation);
            }
        }

        match outcome? {
            RequestOutcome::Denied(reason) => Ok(Self::denied(reason)),
            created @ RequestOutcome::Created(_) => Ok(created),
        }
    }

    fn denied(reason: DenyReason) -> RequestOutcome {
        LifecycleMetrics::record_denied(reason.label());
        tracing::info!(reason = reason.label(), "Ticket request denied");
        RequestOutcome::Denied(reason)
    }

    /// Create a ticket without admission control.
    ///
    /// Allocates the channel (author and support role may read and write,
    /// everyone else is hidden), persists the ticket and posts the welcome
    /// text.
    ///
    /// # Errors
    ///
    /// - [`TicketError::Configuration`] if no category is bound
    /// - [`TicketError::UnknownType`] if the type is not in the catalog
    /// - [`TicketError::ChannelCreation`] if the channel cannot be allocated
    /// - [`TicketError::Repository`] if the ticket cannot be persisted; the
    ///   allocated channel is deleted best effort
    #[tracing::instrument(skip(self))]
    pub async fn create(
        &self,
        community: CommunityId,
        author: UserId,
        ticket_type: &str,
    ) -> Result<Ticket, TicketError> {
        let config = self.env.repository.load_config(community).await?;
        let ticket_type = config
            .ticket_types
            .resolve(Some(ticket_type))
            .cloned()
            .ok_or_else(|| TicketError::UnknownType(ticket_type.to_string()))?;
        match self.open(&config, author, &ticket_type, None).await? {
            RequestOutcome::Created(ticket) => Ok(ticket),
            RequestOutcome::Denied(reason) => Err(RepositoryError::Database(format!(
                "Insert without quota refused: {reason}"
            ))
            .into()),
        }
    }

    /// Allocate the channel and persist the ticket. With `quota`, the insert
    /// is refused once the author holds that many open tickets.
    async fn open(
        &self,
        config: &CommunityTicketConfig,
        author: UserId,
        ticket_type: &TicketType,
        quota: Option<u32>,
    ) -> Result<RequestOutcome, TicketError> {
        let community = config.community;
        let Some(category) = config.category else {
            return Err(TicketError::Configuration(community));
        };

        let mut overrides = vec![
            PermissionOverride::deny(Principal::Everyone),
            PermissionOverride::allow(Principal::User(author)),
        ];
        if let Some(role) = config.support_role {
            overrides.push(PermissionOverride::allow(Principal::Role(role)));
        }

        let channel = self
            .env
            .transport
            .create_channel(
                community,
                format!("{}-{author}", ticket_type.name),
                Some(category),
                overrides,
            )
            .await
            .map_err(|e| {
                LifecycleMetrics::record_channel_creation_failure();
                tracing::warn!(error = %e, "Ticket channel creation failed");
                TicketError::ChannelCreation(e)
            })?;

        let new = NewTicket {
            community,
            author,
            ticket_type: ticket_type.name.clone(),
            channel,
            created_at: self.env.clock.now(),
        };
        let inserted = match quota {
            Some(max) => match self.env.repository.insert_within_quota(new, max).await {
                Ok(QuotaInsert::Inserted(ticket)) => Ok(ticket),
                Ok(QuotaInsert::QuotaExceeded { current }) => {
                    tracing::info!(%channel, current, max, "Quota filled concurrently, removing channel");
                    self.discard_channel(channel).await;
                    return Ok(RequestOutcome::Denied(DenyReason::QuotaExceeded {
                        current,
                        max,
                    }));
                }
                Err(e) => Err(e),
            },
            None => self.env.repository.insert_ticket(new).await,
        };
        let ticket = match inserted {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::error!(%channel, error = %e, "Ticket persistence failed, removing channel");
                self.discard_channel(channel).await;
                return Err(e.into());
            }
        };

        self.env
            .cooldowns
            .record_creation(community, author, ticket.created_at);
        LifecycleMetrics::record_created(&ticket.ticket_type);
        tracing::info!(ticket = %ticket.id, %channel, ticket_type = %ticket.ticket_type, "Ticket created");

        self.notify(
            NotificationTarget::Channel(channel),
            format!("<@{author}> {}", config.welcome_text),
        )
        .await;

        Ok(RequestOutcome::Created(ticket))
    }

    async fn discard_channel(&self, channel: ChannelId) {
        if let Err(e) = self.env.transport.delete_channel(channel).await {
            tracing::warn!(%channel, error = %e, "Orphan ticket channel left behind");
        }
    }

    /// Bind a moderator to an open ticket. First acceptance wins.
    ///
    /// # Errors
    ///
    /// - [`TicketError::NotFound`] if the ticket does not exist
    /// - [`TicketError::Repository`] on store failure
    #[tracing::instrument(skip(self))]
    pub async fn assign(
        &self,
        community: CommunityId,
        id: TicketId,
        moderator: UserId,
    ) -> Result<AssignOutcome, TicketError> {
        match self
            .env
            .repository
            .assign_if_unassigned(community, id, moderator)
            .await?
        {
            ConditionalUpdate::Applied(ticket) => {
                LifecycleMetrics::record_assigned();
                tracing::info!("Ticket assigned");
                self.notify(
                    NotificationTarget::Channel(ticket.channel),
                    format!(
                        "<@{}>, your ticket will be handled by <@{moderator}>.",
                        ticket.author
                    ),
                )
                .await;
                Ok(AssignOutcome::Assigned(ticket))
            }
            ConditionalUpdate::Rejected(current) => {
                LifecycleMetrics::record_assign_conflict();
                if !current.is_open() {
                    return Ok(AssignOutcome::AlreadyClosed);
                }
                current.moderator.map(AssignOutcome::AlreadyAssigned).ok_or_else(|| {
                    RepositoryError::Database(format!(
                        "Assignment of ticket {id} rejected without a moderator"
                    ))
                    .into()
                })
            }
            ConditionalUpdate::NotFound => Err(TicketError::NotFound(community, id)),
        }
    }

    /// Close a ticket.
    ///
    /// Captures the transcript, then writes the closure and the transcript
    /// in one guarded update. A failed capture flags the ticket's
    /// transcript incomplete and never blocks the closure. When the channel
    /// still exists a notice is posted and its deletion is scheduled after
    /// the countdown.
    ///
    /// # Errors
    ///
    /// - [`TicketError::NotFound`] if the ticket does not exist
    /// - [`TicketError::Repository`] on store failure
    #[tracing::instrument(skip(self, reason))]
    pub async fn close(
        &self,
        community: CommunityId,
        id: TicketId,
        closer: Closer,
        reason: impl Into<String> + Send,
    ) -> Result<CloseOutcome, TicketError> {
        let ticket = self.load(community, id).await?;
        self.close_ticket(ticket, closer, reason.into()).await
    }

    /// Close an already loaded ticket.
    pub(crate) async fn close_ticket(
        &self,
        ticket: Ticket,
        closer: Closer,
        reason: String,
    ) -> Result<CloseOutcome, TicketError> {
        if !ticket.is_open() {
            LifecycleMetrics::record_close_conflict();
            return Ok(CloseOutcome::AlreadyClosed);
        }
        let (community, id, channel) = (ticket.community, ticket.id, ticket.channel);

        let (transcript, channel_alive) =
            match self.recorder.capture(community, id, channel).await {
                Ok(record) => (Some(record), true),
                Err(e) => {
                    LifecycleMetrics::record_transcript_failure();
                    tracing::warn!(ticket = %id, error = %e, "Transcript capture failed, closing anyway");
                    (None, !matches!(e, TicketError::ChannelGone(_)))
                }
            };

        let closure = Closure::new(closer, reason, self.env.clock.now(), transcript.is_some());
        let closed = match self
            .env
            .repository
            .close_if_open(community, id, closure, transcript)
            .await?
        {
            ConditionalUpdate::Applied(closed) => closed,
            ConditionalUpdate::Rejected(_) => {
                LifecycleMetrics::record_close_conflict();
                tracing::info!(ticket = %id, "Ticket closed concurrently");
                return Ok(CloseOutcome::AlreadyClosed);
            }
            ConditionalUpdate::NotFound => return Err(TicketError::NotFound(community, id)),
        };

        LifecycleMetrics::record_closed(closer_label(closer));
        tracing::info!(ticket = %id, closer = %closer, "Ticket closed");

        match self.env.repository.load_config(community).await {
            Ok(config) => {
                if let Some(log_channel) = config.log_channel {
                    self.notify(
                        NotificationTarget::Channel(log_channel),
                        format!(
                            "Ticket #{id} of <@{}> closed by {closer}: {}",
                            closed.author,
                            closed.close_reason.as_deref().unwrap_or_default()
                        ),
                    )
                    .await;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not load config for the closure log"),
        }

        let deletion = if channel_alive {
            self.notify(
                NotificationTarget::Channel(channel),
                format!(
                    "Ticket closed. This channel will be deleted in {} seconds.",
                    self.delete_countdown.as_secs()
                ),
            )
            .await;
            Some(self.schedule_deletion(channel))
        } else {
            None
        };

        Ok(CloseOutcome::Closed {
            ticket: closed,
            deletion,
        })
    }

    fn schedule_deletion(&self, channel: ChannelId) -> Deferred {
        let transport = Arc::clone(&self.env.transport);
        self.env.scheduler.schedule(
            self.delete_countdown,
            Box::pin(async move {
                match transport.delete_channel(channel).await {
                    Ok(()) => {
                        LifecycleMetrics::record_channel_deletion(true);
                        tracing::info!(%channel, "Ticket channel deleted");
                    }
                    Err(e) => {
                        LifecycleMetrics::record_channel_deletion(false);
                        tracing::warn!(%channel, error = %e, "Ticket channel deletion failed");
                    }
                }
            }),
        )
    }

    /// Grant (`present = true`) or revoke a user's access to an open ticket.
    ///
    /// # Errors
    ///
    /// - [`TicketError::NotFound`] if the ticket does not exist
    /// - [`TicketError::ChannelGone`] if the channel was deleted
    /// - [`TicketError::Transport`] / [`TicketError::Repository`] on failure
    #[tracing::instrument(skip(self))]
    pub async fn set_participant(
        &self,
        community: CommunityId,
        id: TicketId,
        user: UserId,
        present: bool,
    ) -> Result<ParticipantOutcome, TicketError> {
        let ticket = self.load(community, id).await?;
        if !ticket.is_open() {
            return Ok(ParticipantOutcome::AlreadyClosed);
        }

        self.env
            .transport
            .set_permission(ticket.channel, Principal::User(user), present, present)
            .await
            .map_err(channel_error)?;

        match self
            .env
            .repository
            .set_participant(community, id, user, present)
            .await?
        {
            ConditionalUpdate::Applied(ticket) => {
                tracing::info!(%user, present, "Ticket participants updated");
                Ok(ParticipantOutcome::Updated(ticket))
            }
            ConditionalUpdate::Rejected(_) => Ok(ParticipantOutcome::AlreadyClosed),
            ConditionalUpdate::NotFound => Err(TicketError::NotFound(community, id)),
        }
    }

    /// Number of open tickets of an author.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Repository`] on store failure.
    pub async fn get_open_count(
        &self,
        community: CommunityId,
        author: UserId,
    ) -> Result<u32, TicketError> {
        Ok(self.env.repository.count_open(community, author).await?)
    }

    /// Configuration of a community, created with defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Repository`] on store failure.
    pub async fn get_config(
        &self,
        community: CommunityId,
    ) -> Result<CommunityTicketConfig, TicketError> {
        Ok(self.env.repository.load_config(community).await?)
    }

    async fn load(&self, community: CommunityId, id: TicketId) -> Result<Ticket, TicketError> {
        self.env
            .repository
            .get_ticket(community, id)
            .await?
            .ok_or(TicketError::NotFound(community, id))
    }

    async fn notify(&self, target: NotificationTarget, content: String) {
        if let Err(e) = self.env.notifier.notify(target, content).await {
            LifecycleMetrics::record_notification_failure();
            tracing::warn!(?target, error = %e, "Notification failed");
        }
    }
}
