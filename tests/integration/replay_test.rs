//! Integration tests for the replay validator over a full messy history,
//! and for user-facing visibility with grants and clicks.

mod helpers;

use helpers::*;

use std::sync::atomic::Ordering;

use notifyhub_core::event::Event;
use notifyhub_core::health::Subsystem;
use notifyhub_core::types::{CaseId, CaseStatus, Grants, Grouping, NotificationId, Recipient};

/// A history touching every applier: statuses with a retried key, a
/// reminder firing, an expiry, a postponement, a completion, a soft
/// delete, and a hard-deleted case with its cascade.
async fn seed_history(hub: &TestHub) {
    let case_id = CaseId::new();
    hub.publish(case(case_id, "g-1")).await;
    hub.publish(status_change(case_id, "k1", CaseStatus::InProgress, None)).await;
    hub.publish(status_change(case_id, "k1", CaseStatus::InProgress, None)).await;
    hub.publish(status_change(case_id, "k2", CaseStatus::Done, None)).await;

    let task_id = NotificationId::new();
    hub.publish(task(
        task_id,
        Some("g-1"),
        Some(date(2024, 6, 1)),
        Some(before_deadline_reminder(7, date(2024, 6, 1))),
    ))
    .await;
    hub.publish(message(NotificationId::new(), Some("g-1"))).await;

    let lone = NotificationId::new();
    hub.publish(message(lone, None)).await;
    hub.publish(envelope(
        lone.into_uuid(),
        Event::NotificationClicked {
            notification_id: lone,
            user_id: USER.to_string(),
        },
    ))
    .await;
    hub.drain().await;

    assert_eq!(hub.reminder.tick(at(2024, 5, 26, 12)).await.unwrap(), 1);
    hub.drain().await;
    assert_eq!(hub.expiry.tick(at(2024, 6, 2, 12)).await.unwrap(), 1);
    hub.drain().await;
    hub.publish(postpone(task_id, date(2024, 7, 1), None)).await;
    hub.publish(complete(task_id)).await;
    hub.publish(soft_delete(lone.into_uuid(), None)).await;

    let doomed = CaseId::new();
    hub.publish(case(doomed, "g-2")).await;
    hub.publish(message(NotificationId::new(), Some("g-2"))).await;
    hub.drain().await;
    hub.publish(hard_delete(doomed.into_uuid(), Some(Grouping::new(TAG, "g-2"))))
        .await;
    hub.drain().await;
    assert_eq!(hub.purge.tick(at(2024, 8, 2, 0)).await.unwrap(), 1);
    hub.drain().await;
    assert_eq!(hub.purge.tick(at(2024, 8, 2, 1)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_replay_validation_passes_over_a_full_history() {
    let hub = TestHub::new();
    seed_history(&hub).await;

    let expected: u64 = (0..hub.log.partition_count())
        .map(|p| hub.log.len(p))
        .sum();
    assert!(expected > 0);

    let replayed = hub.validator().validate().unwrap();
    assert_eq!(replayed as u64, expected);
    assert!(hub.health.is_ready(Subsystem::ReplayValidator));

    let gauge: u64 = hub
        .health
        .metrics
        .replay_events
        .iter()
        .map(|g| g.load(Ordering::Relaxed))
        .sum();
    assert_eq!(gauge, expected);

    // A replica rebuilt from the full log lands in the same state as the
    // stores that consumed it live.
    let (notifications, cases) = hub.replayed_stores("rebuild");
    assert_eq!(notifications.snapshot(), hub.notifications.snapshot());
    assert_eq!(cases.snapshot(), hub.cases.snapshot());
}

#[tokio::test]
async fn test_replay_validation_rewinds_between_runs() {
    let hub = TestHub::new();
    hub.publish(message(NotificationId::new(), None)).await;
    hub.publish(message(NotificationId::new(), None)).await;
    hub.drain().await;

    let validator = hub.validator();
    let first = validator.validate().unwrap();
    assert_eq!(first, 2);

    // New events land; the next run starts over from offset zero and
    // covers the whole log again.
    hub.publish(message(NotificationId::new(), None)).await;
    hub.drain().await;
    assert_eq!(validator.validate().unwrap(), 3);
}

#[tokio::test]
async fn test_visibility_follows_grants_and_clicks() {
    let hub = TestHub::new();
    let for_service = NotificationId::new();
    hub.publish(message(for_service, None)).await;

    let personal = NotificationId::new();
    hub.publish(envelope(
        personal.into_uuid(),
        Event::MessageCreated {
            notification_id: personal,
            tag: TAG.to_string(),
            external_id: personal.to_string(),
            group_id: None,
            text: "For one person".to_string(),
            link: "https://example.com/p".to_string(),
            recipients: vec![Recipient::Individual {
                tenant_id: TENANT.to_string(),
                user_id: USER.to_string(),
            }],
            channels: vec![],
            created_at: at(2024, 5, 1, 9).fixed_offset(),
            auto_delete: None,
        },
    ))
    .await;
    hub.publish(envelope(
        personal.into_uuid(),
        Event::NotificationClicked {
            notification_id: personal,
            user_id: USER.to_string(),
        },
    ))
    .await;
    hub.drain().await;

    // An individual recipient needs no grant; a service recipient does.
    let visible = hub.notifications.visible_for(&Grants::EMPTY, USER);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].notification.id(), personal);
    assert!(visible[0].clicked);

    let visible = hub.notifications.visible_for(&grants(), USER);
    assert_eq!(visible.len(), 2);
    let service_entry = visible
        .iter()
        .find(|v| v.notification.id() == for_service)
        .expect("service message visible");
    assert!(!service_entry.clicked);

    assert!(hub.notifications.visible_for(&Grants::EMPTY, "someone-else").is_empty());
    assert!(hub.notifications.clicked(personal, USER));
    assert!(!hub.notifications.clicked(personal, "someone-else"));
}
