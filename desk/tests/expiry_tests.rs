//! Auto-expiry sweep tests.

#![allow(clippy::expect_used, clippy::panic)]
#![allow(clippy::unwrap_used)]

mod common;

use common::{AUTHOR, COMMUNITY, Harness, LOG_CHANNEL, STRANGER};
use ticketdesk::{DeskSettings, SweepReport};
use ticketdesk_core::config::CommunityTicketConfig;
use ticketdesk_core::environment::NotificationTarget;
use ticketdesk_core::ids::{ChannelId, CommunityId, UserId};
use ticketdesk_core::repository::TicketRepository;
use ticketdesk_core::ticket::{Closer, NewTicket, TicketStatus};

const HOUR: i64 = 3600;

#[tokio::test]
async fn test_threshold_boundary() {
    let h = Harness::new();
    h.configure(|c| c.auto_close_hours = 24).await;
    let ticket = h.open(AUTHOR).await;
    let sweeper = h.desk.expiry();

    h.advance_secs(24 * HOUR - 1);
    let early = sweeper.sweep().await.unwrap();
    assert_eq!(
        early,
        SweepReport {
            examined: 1,
            ..SweepReport::default()
        }
    );
    assert!(h.stored(&ticket).is_open());

    h.advance_secs(1);
    let due = sweeper.sweep().await.unwrap();
    assert_eq!(due.closed, 1);

    let closed = h.stored(&ticket);
    assert_eq!(closed.status, TicketStatus::Closed);
    assert_eq!(closed.closed_by, Some(Closer::System));
    assert_eq!(
        closed.close_reason.as_deref(),
        Some("auto-close: idle > 24 hours")
    );
    assert!(h
        .notifier
        .sent_to(NotificationTarget::Channel(LOG_CHANNEL))
        .iter()
        .any(|m| m.contains("system")));
    assert_eq!(h.scheduler.queued(), 1);
}

#[tokio::test]
async fn test_closed_tickets_are_not_examined_again() {
    let h = Harness::new();
    h.configure(|c| c.auto_close_hours = 1).await;
    h.open(AUTHOR).await;
    let sweeper = h.desk.expiry();
    h.advance_secs(2 * HOUR);

    assert_eq!(sweeper.sweep().await.unwrap().closed, 1);
    assert_eq!(sweeper.sweep().await.unwrap(), SweepReport::default());
}

#[tokio::test]
async fn test_thresholds_are_per_community() {
    let h = Harness::new();
    h.configure(|c| c.auto_close_hours = 48).await;
    let long_lived = h.open(AUTHOR).await;

    let other = CommunityId::new(2);
    let mut config = CommunityTicketConfig::with_defaults(other);
    config.auto_close_hours = 1;
    h.repository.put_config(config);
    let short_lived = h
        .repository
        .insert_ticket(NewTicket {
            community: other,
            author: STRANGER,
            ticket_type: "general".to_string(),
            channel: ChannelId::new(9001),
            created_at: long_lived.created_at,
        })
        .await
        .unwrap();

    h.advance_secs(2 * HOUR);
    let report = h.desk.expiry().sweep().await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.closed, 1);
    assert!(h.stored(&long_lived).is_open());
    assert_eq!(h.stored(&short_lived).status, TicketStatus::Closed);
    // Channel 9001 never existed on the platform.
    assert_eq!(h.stored(&short_lived).transcript_complete, Some(false));
}

#[tokio::test]
async fn test_sweep_evicts_stale_cooldowns() {
    let h = Harness::new();
    h.configure(|c| {
        c.cooldown_secs = 300;
        c.auto_close_hours = 0;
    })
    .await;
    h.open(AUTHOR).await;
    let cooldowns = h.desk.lifecycle().env().cooldowns.clone();
    assert!(cooldowns.last_creation(COMMUNITY, AUTHOR).is_some());

    h.advance_secs(2 * HOUR);
    h.desk.expiry().sweep().await.unwrap();

    assert!(cooldowns.last_creation(COMMUNITY, AUTHOR).is_none());
}

#[tokio::test]
async fn test_cooldowns_kept_without_repository_fallback() {
    let h = Harness::with_settings(DeskSettings {
        cooldown_from_repository: false,
        ..DeskSettings::default()
    });
    h.configure(|c| c.auto_close_hours = 0).await;
    h.open(AUTHOR).await;

    h.advance_secs(2 * HOUR);
    h.desk.expiry().sweep().await.unwrap();

    let cooldowns = h.desk.lifecycle().env().cooldowns.clone();
    assert!(cooldowns.last_creation(COMMUNITY, AUTHOR).is_some());
    assert!(cooldowns.last_creation(COMMUNITY, UserId::new(1234)).is_none());
}
