//! Single entry point for ticket commands.

use crate::commands::{
    Actor, CommandOutcome, GuardVerdict, Requester, TicketCommand, TicketLocator,
};
use crate::config::DeskSettings;
use crate::environment::TicketEnvironment;
use crate::expiry::ExpiryScheduler;
use crate::lifecycle::{LifecycleManager, ParticipantOutcome};
use crate::setup;
use ticketdesk_core::environment::NotificationTarget;
use ticketdesk_core::error::TicketError;
use ticketdesk_core::ids::{ChannelId, MessageId, UserId};
use ticketdesk_core::ticket::{Closer, Ticket};

/// Direct message sent to a user whose message was removed by the guard.
pub const GUARD_WARNING: &str =
    "Please do not interfere with moderators' work: do not post in tickets you are not part of.";

/// The ticket system: dispatches [`TicketCommand`]s to the lifecycle
/// manager and applies the authorization rules.
#[derive(Debug, Clone)]
pub struct TicketDesk {
    lifecycle: LifecycleManager,
    settings: DeskSettings,
}

impl TicketDesk {
    /// Wire a desk.
    #[must_use]
    pub fn new(env: TicketEnvironment, settings: &DeskSettings) -> Self {
        Self {
            lifecycle: LifecycleManager::new(env, settings),
            settings: *settings,
        }
    }

    /// The lifecycle manager behind the desk.
    #[must_use]
    pub const fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// An auto-expiry scheduler sharing this desk's collaborators.
    #[must_use]
    pub fn expiry(&self) -> ExpiryScheduler {
        ExpiryScheduler::new(self.lifecycle.clone(), &self.settings)
    }

    /// Execute a command.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError`] for failures and refused authorizations.
    /// Admission denials and idempotency signals are outcomes, not errors.
    #[tracing::instrument(skip_all, fields(command = command.name()))]
    pub async fn handle(&self, command: TicketCommand) -> Result<CommandOutcome, TicketError> {
        let env = self.lifecycle.env();
        match command {
            TicketCommand::RequestTicket {
                community,
                author,
                ticket_type,
            } => self
                .lifecycle
                .request(community, author, ticket_type.as_deref())
                .await
                .map(CommandOutcome::Requested),
            TicketCommand::AcceptTicket { ticket, moderator } => {
                let ticket = self.locate(ticket).await?;
                self.lifecycle
                    .assign(ticket.community, ticket.id, moderator)
                    .await
                    .map(CommandOutcome::Accepted)
            }
            TicketCommand::CloseTicket {
                ticket,
                requester,
                reason,
            } => {
                let ticket = self.locate(ticket).await?;
                let closer = match requester {
                    Requester::System => Closer::System,
                    Requester::User(actor) => {
                        if ticket.is_open() {
                            authorize(actor, &ticket)?;
                        }
                        Closer::Moderator(actor.user)
                    }
                };
                self.lifecycle
                    .close_ticket(ticket, closer, reason)
                    .await
                    .map(CommandOutcome::Closed)
            }
            TicketCommand::AddParticipant {
                ticket,
                actor,
                user,
            } => self
                .change_participant(ticket, actor, user, true)
                .await
                .map(CommandOutcome::Participants),
            TicketCommand::RemoveParticipant {
                ticket,
                actor,
                user,
            } => self
                .change_participant(ticket, actor, user, false)
                .await
                .map(CommandOutcome::Participants),
            TicketCommand::GetStats { community } => Ok(CommandOutcome::Stats(
                env.repository.stats(community).await?,
            )),
            TicketCommand::GetTranscript { community, ticket } => Ok(CommandOutcome::Transcript(
                env.repository.get_transcript(community, ticket).await?,
            )),
            TicketCommand::Setup { community } => setup::setup(env, community)
                .await
                .map(CommandOutcome::Setup),
            TicketCommand::GuardMessage {
                channel,
                message,
                author,
                author_is_bot,
                author_is_admin,
            } => {
                if author_is_bot || author_is_admin {
                    return Ok(CommandOutcome::Guard(GuardVerdict::Allowed));
                }
                self.guard(channel, message, author)
                    .await
                    .map(CommandOutcome::Guard)
            }
            TicketCommand::FindByChannel { channel } => Ok(CommandOutcome::Ticket(
                env.repository.find_by_channel(channel).await?,
            )),
        }
    }

    async fn locate(&self, locator: TicketLocator) -> Result<Ticket, TicketError> {
        let repository = &self.lifecycle.env().repository;
        match locator {
            TicketLocator::Id(community, id) => repository
                .get_ticket(community, id)
                .await?
                .ok_or(TicketError::NotFound(community, id)),
            TicketLocator::Channel(channel) => repository
                .find_by_channel(channel)
                .await?
                .ok_or(TicketError::ChannelNotTicket(channel)),
        }
    }

    async fn change_participant(
        &self,
        locator: TicketLocator,
        actor: Actor,
        user: UserId,
        present: bool,
    ) -> Result<ParticipantOutcome, TicketError> {
        let ticket = self.locate(locator).await?;
        if !ticket.is_open() {
            return Ok(ParticipantOutcome::AlreadyClosed);
        }
        authorize(actor, &ticket)?;
        self.lifecycle
            .set_participant(ticket.community, ticket.id, user, present)
            .await
    }

    /// Only assigned tickets are guarded; the author, the moderator and
    /// participants may always post.
    async fn guard(
        &self,
        channel: ChannelId,
        message: MessageId,
        author: UserId,
    ) -> Result<GuardVerdict, TicketError> {
        let env = self.lifecycle.env();
        let Some(ticket) = env.repository.find_by_channel(channel).await? else {
            return Ok(GuardVerdict::Allowed);
        };
        if !ticket.is_open() || ticket.moderator.is_none() || ticket.is_member(author) {
            return Ok(GuardVerdict::Allowed);
        }

        if let Err(e) = env.transport.delete_message(channel, message).await {
            tracing::warn!(%channel, %message, error = %e, "Could not remove intruding message");
        }
        if let Err(e) = env
            .notifier
            .notify(NotificationTarget::User(author), GUARD_WARNING.to_string())
            .await
        {
            tracing::debug!(%author, error = %e, "Guard warning not delivered");
        }
        tracing::info!(ticket = %ticket.id, %author, "Intruding message removed");
        Ok(GuardVerdict::Removed)
    }
}

fn authorize(actor: Actor, ticket: &Ticket) -> Result<(), TicketError> {
    if actor.may_manage(ticket) {
        Ok(())
    } else {
        tracing::info!(user = %actor.user, ticket = %ticket.id, "Ticket management refused");
        Err(TicketError::PermissionDenied {
            user: actor.user,
            ticket: ticket.id,
        })
    }
}
