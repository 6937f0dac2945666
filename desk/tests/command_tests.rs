//! Command dispatch tests: authorization, participants, guard, setup and
//! read-only queries.

#![allow(clippy::expect_used, clippy::panic)]
#![allow(clippy::unwrap_used)]

mod common;

use common::{ADMIN, AUTHOR, COMMUNITY, Harness, MODERATOR, OTHER_MODERATOR, STRANGER};
use ticketdesk::desk::GUARD_WARNING;
use ticketdesk::{
    Actor, CloseOutcome, CommandOutcome, GuardVerdict, ParticipantOutcome, Requester,
    SetupOutcome, TicketCommand, TicketLocator,
};
use ticketdesk_core::environment::{NotificationTarget, Principal};
use ticketdesk_core::error::TicketError;
use ticketdesk_core::ids::{ChannelId, CommunityId, TicketId, UserId};
use ticketdesk_core::repository::TicketRepository;
use ticketdesk_core::ticket::{Closer, Ticket};
use ticketdesk_testing::MockTransport;

async fn participant(
    h: &Harness,
    ticket: &Ticket,
    actor: Actor,
    user: UserId,
    present: bool,
) -> Result<ParticipantOutcome, TicketError> {
    let locator = TicketLocator::Channel(ticket.channel);
    let command = if present {
        TicketCommand::AddParticipant {
            ticket: locator,
            actor,
            user,
        }
    } else {
        TicketCommand::RemoveParticipant {
            ticket: locator,
            actor,
            user,
        }
    };
    h.desk.handle(command).await.map(|outcome| match outcome {
        CommandOutcome::Participants(outcome) => outcome,
        other => panic!("unexpected outcome: {other:?}"),
    })
}

async fn guard(h: &Harness, channel: ChannelId, author: UserId, is_bot: bool, is_admin: bool) -> GuardVerdict {
    let message = h.transport.post(channel, author, is_bot, "hi", &[]);
    match h
        .desk
        .handle(TicketCommand::GuardMessage {
            channel,
            message,
            author,
            author_is_bot: is_bot,
            author_is_admin: is_admin,
        })
        .await
        .expect("guard")
    {
        CommandOutcome::Guard(verdict) => verdict,
        other => panic!("unexpected outcome: {other:?}"),
    }
}

mod close_authorization {
    use super::*;

    #[tokio::test]
    async fn test_stranger_may_not_close() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.accept(&ticket, MODERATOR).await;

        let result = h
            .close_as(&ticket, Requester::User(Actor::member(OTHER_MODERATOR)))
            .await;

        assert_eq!(
            result.unwrap_err(),
            TicketError::PermissionDenied {
                user: OTHER_MODERATOR,
                ticket: ticket.id,
            }
        );
        assert!(h.stored(&ticket).is_open());
    }

    #[tokio::test]
    async fn test_author_may_not_close_unassigned_ticket() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;

        let result = h
            .close_as(&ticket, Requester::User(Actor::member(AUTHOR)))
            .await;

        assert!(matches!(result, Err(TicketError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn test_admin_and_system_bypass_assignment() {
        let h = Harness::new();
        h.configure(|c| c.max_open_tickets = 5).await;
        let by_admin = h.open(AUTHOR).await;
        h.advance_secs(600);
        let by_system = h.open(AUTHOR).await;

        let admin = h
            .close_as(&by_admin, Requester::User(Actor::admin(ADMIN)))
            .await
            .unwrap();
        let system = h.close_as(&by_system, Requester::System).await.unwrap();

        assert!(matches!(admin, CloseOutcome::Closed { .. }));
        assert!(matches!(system, CloseOutcome::Closed { .. }));
        assert_eq!(h.stored(&by_admin).closed_by, Some(Closer::Moderator(ADMIN)));
        assert_eq!(h.stored(&by_system).closed_by, Some(Closer::System));
    }

    #[tokio::test]
    async fn test_closed_ticket_reports_already_closed_to_anyone() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.close(&ticket).await;

        let result = h
            .close_as(&ticket, Requester::User(Actor::member(STRANGER)))
            .await
            .unwrap();

        assert!(matches!(result, CloseOutcome::AlreadyClosed));
    }

    #[tokio::test]
    async fn test_close_by_channel() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.accept(&ticket, MODERATOR).await;

        let outcome = h
            .desk
            .handle(TicketCommand::CloseTicket {
                ticket: TicketLocator::Channel(ticket.channel),
                requester: Requester::User(Actor::member(MODERATOR)),
                reason: "done".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            CommandOutcome::Closed(CloseOutcome::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_locators() {
        let h = Harness::new();
        h.configure(|_| {}).await;

        let by_channel = h
            .desk
            .handle(TicketCommand::CloseTicket {
                ticket: TicketLocator::Channel(ChannelId::new(31337)),
                requester: Requester::System,
                reason: String::new(),
            })
            .await;
        let by_id = h
            .desk
            .handle(TicketCommand::CloseTicket {
                ticket: TicketLocator::Id(COMMUNITY, TicketId::new(9)),
                requester: Requester::System,
                reason: String::new(),
            })
            .await;

        assert!(matches!(by_channel, Err(TicketError::ChannelNotTicket(_))));
        assert!(matches!(by_id, Err(TicketError::NotFound(_, _))));
    }
}

mod participants {
    use super::*;

    #[tokio::test]
    async fn test_moderator_grants_and_revokes_access() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.accept(&ticket, MODERATOR).await;

        let added = participant(&h, &ticket, Actor::member(MODERATOR), STRANGER, true)
            .await
            .unwrap();
        let ParticipantOutcome::Updated(updated) = added else {
            panic!("expected an update");
        };
        assert_eq!(updated.participants, vec![STRANGER]);
        let channel = h.transport.channel(ticket.channel).unwrap();
        assert!(channel.can_read(Principal::User(STRANGER)));

        participant(&h, &ticket, Actor::member(MODERATOR), STRANGER, false)
            .await
            .unwrap();
        assert!(h.stored(&ticket).participants.is_empty());
        let channel = h.transport.channel(ticket.channel).unwrap();
        assert!(!channel.can_read(Principal::User(STRANGER)));
    }

    #[tokio::test]
    async fn test_only_moderator_or_admin() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.accept(&ticket, MODERATOR).await;

        let by_author = participant(&h, &ticket, Actor::member(AUTHOR), STRANGER, true).await;
        let by_admin = participant(&h, &ticket, Actor::admin(ADMIN), STRANGER, true).await;

        assert!(matches!(by_author, Err(TicketError::PermissionDenied { .. })));
        assert!(matches!(by_admin, Ok(ParticipantOutcome::Updated(_))));
    }

    #[tokio::test]
    async fn test_closed_ticket_rejects_changes() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.close(&ticket).await;

        let result = participant(&h, &ticket, Actor::admin(ADMIN), STRANGER, true).await;

        assert_eq!(result, Ok(ParticipantOutcome::AlreadyClosed));
        assert!(h.stored(&ticket).participants.is_empty());
    }
}

mod message_guard {
    use super::*;

    #[tokio::test]
    async fn test_intruder_is_removed_and_warned() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.accept(&ticket, MODERATOR).await;

        assert_eq!(
            guard(&h, ticket.channel, STRANGER, false, false).await,
            GuardVerdict::Removed
        );

        assert_eq!(h.transport.deleted_messages().len(), 1);
        assert!(h.transport.channel(ticket.channel).unwrap().messages.is_empty());
        assert_eq!(
            h.notifier.sent_to(NotificationTarget::User(STRANGER)),
            vec![GUARD_WARNING.to_string()]
        );
    }

    #[tokio::test]
    async fn test_members_bots_and_admins_may_post() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.accept(&ticket, MODERATOR).await;
        participant(&h, &ticket, Actor::member(MODERATOR), OTHER_MODERATOR, true)
            .await
            .unwrap();

        for (author, is_bot, is_admin) in [
            (AUTHOR, false, false),
            (MODERATOR, false, false),
            (OTHER_MODERATOR, false, false),
            (MockTransport::BOT, true, false),
            (ADMIN, false, true),
        ] {
            assert_eq!(
                guard(&h, ticket.channel, author, is_bot, is_admin).await,
                GuardVerdict::Allowed,
                "{author} should be allowed"
            );
        }
        assert!(h.transport.deleted_messages().is_empty());
    }

    #[tokio::test]
    async fn test_unassigned_and_foreign_channels_are_not_guarded() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        let config = h.repository.load_config(COMMUNITY).await.unwrap();

        assert_eq!(
            guard(&h, ticket.channel, STRANGER, false, false).await,
            GuardVerdict::Allowed
        );
        assert_eq!(
            guard(&h, config.creation_channel.unwrap(), STRANGER, false, false).await,
            GuardVerdict::Allowed
        );
    }

    #[tokio::test]
    async fn test_undeliverable_warning_is_ignored() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.accept(&ticket, MODERATOR).await;
        h.notifier.fail_all(true);

        assert_eq!(
            guard(&h, ticket.channel, STRANGER, false, false).await,
            GuardVerdict::Removed
        );
    }
}

mod setup {
    use super::*;

    #[tokio::test]
    async fn test_setup_binds_category_and_prompt() {
        let h = Harness::new();
        let community = CommunityId::new(2);

        let outcome = h
            .desk
            .handle(TicketCommand::Setup { community })
            .await
            .unwrap();
        let CommandOutcome::Setup(SetupOutcome::Configured {
            category,
            creation_channel,
            creation_message,
        }) = outcome
        else {
            panic!("expected a fresh setup");
        };

        let config = h.repository.load_config(community).await.unwrap();
        assert_eq!(config.category, Some(category));
        assert_eq!(config.creation_channel, Some(creation_channel));
        assert_eq!(config.creation_message, Some(creation_message));

        let channel = h.transport.channel(creation_channel).unwrap();
        assert_eq!(channel.category, Some(category));
        assert_eq!(channel.messages.len(), 1);
        assert_eq!(channel.messages[0].author, MockTransport::BOT);
    }

    #[tokio::test]
    async fn test_second_setup_is_a_no_op() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let channels = h.transport.text_channels(COMMUNITY).len();

        let outcome = h
            .desk
            .handle(TicketCommand::Setup {
                community: COMMUNITY,
            })
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            CommandOutcome::Setup(SetupOutcome::AlreadyConfigured)
        ));
        assert_eq!(h.transport.text_channels(COMMUNITY).len(), channels);
    }
}

mod queries {
    use super::*;

    #[tokio::test]
    async fn test_stats() {
        let h = Harness::new();
        h.configure(|c| c.cooldown_secs = 0).await;
        let first = h.open(AUTHOR).await;
        let second = h.open(AUTHOR).await;
        h.open(STRANGER).await;
        h.accept(&second, MODERATOR).await;
        h.close(&first).await;
        h.transport.remove_channel(second.channel);
        h.close(&second).await;

        let CommandOutcome::Stats(stats) = h
            .desk
            .handle(TicketCommand::GetStats {
                community: COMMUNITY,
            })
            .await
            .unwrap()
        else {
            panic!("expected stats");
        };

        assert_eq!(stats.total, 3);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.assigned, 0);
        assert_eq!(stats.closed, 2);
        assert_eq!(stats.incomplete_transcripts, 1);
        assert_eq!(stats.by_type.get("general"), Some(&3));
    }

    #[tokio::test]
    async fn test_transcript_is_available_after_close() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;
        h.transport
            .post(ticket.channel, AUTHOR, false, "", &["screenshot.png"]);
        h.transport.post(ticket.channel, MockTransport::BOT, true, "", &[]);

        let query = TicketCommand::GetTranscript {
            community: COMMUNITY,
            ticket: ticket.id,
        };
        assert!(matches!(
            h.desk.handle(query.clone()).await.unwrap(),
            CommandOutcome::Transcript(None)
        ));

        h.close(&ticket).await;

        let CommandOutcome::Transcript(Some(record)) = h.desk.handle(query).await.unwrap() else {
            panic!("expected a transcript");
        };
        assert_eq!(record.len(), 1);
        assert_eq!(record.entries[0].text, "[attachment]");
        assert!(record.render_text().contains("screenshot.png"));
    }

    #[tokio::test]
    async fn test_find_by_channel() {
        let h = Harness::new();
        h.configure(|_| {}).await;
        let ticket = h.open(AUTHOR).await;

        let found = h
            .desk
            .handle(TicketCommand::FindByChannel {
                channel: ticket.channel,
            })
            .await
            .unwrap();
        let missing = h
            .desk
            .handle(TicketCommand::FindByChannel {
                channel: ChannelId::new(4),
            })
            .await
            .unwrap();

        assert!(matches!(found, CommandOutcome::Ticket(Some(t)) if t.id == ticket.id));
        assert!(matches!(missing, CommandOutcome::Ticket(None)));
    }
}
