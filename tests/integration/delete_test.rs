//! Integration tests for deletion: soft delete visibility, the hard
//! delete cascade over a grouping, and scheduled purges firing through
//! the log.

mod helpers;

use helpers::*;

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use uuid::Uuid;

use notifyhub_core::event::{DeleteSchedule, Event};
use notifyhub_core::types::{CaseId, Grouping, NotificationId};

#[tokio::test]
async fn test_soft_delete_hides_a_case_and_its_notifications() {
    let hub = TestHub::new();
    let case_id = CaseId::new();
    let grouped_message = NotificationId::new();
    let grouped_task = NotificationId::new();
    let lone_message = NotificationId::new();
    hub.publish(case(case_id, "g-1")).await;
    hub.publish(message(grouped_message, Some("g-1"))).await;
    hub.publish(task(grouped_task, Some("g-1"), None, None)).await;
    hub.publish(message(lone_message, None)).await;
    hub.drain().await;

    assert_eq!(hub.notifications.visible_for(&grants(), USER).len(), 3);
    assert_eq!(hub.cases.visible_for(&grants(), USER).len(), 1);

    let grouping = Grouping::new(TAG, "g-1");
    hub.publish(soft_delete(case_id.into_uuid(), Some(grouping.clone())))
        .await;
    hub.drain().await;

    // Only the ungrouped message is left; the case row stays, flagged.
    let visible = hub.notifications.visible_for(&grants(), USER);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].notification.id(), lone_message);
    assert!(hub.cases.visible_for(&grants(), USER).is_empty());
    assert!(hub.cases.get(case_id).is_some_and(|c| c.deleted));
    assert!(hub.cases.grouping_deleted(&grouping));

    // The history with its soft delete replays cleanly.
    assert!(hub.validator().validate().is_ok());
}

#[tokio::test]
async fn test_hard_delete_of_a_case_cascades_to_its_notifications() {
    let hub = TestHub::new();
    let case_id = CaseId::new();
    let first = NotificationId::new();
    let second = NotificationId::new();
    let case_created = case(case_id, "g-2");
    let first_created = message(first, Some("g-2"));
    hub.publish(case_created.clone()).await;
    hub.publish(first_created.clone()).await;
    hub.publish(task(second, Some("g-2"), None, None)).await;
    hub.drain().await;

    let grouping = Grouping::new(TAG, "g-2");
    hub.publish(hard_delete(case_id.into_uuid(), Some(grouping.clone())))
        .await;
    hub.drain().await;

    // The observed delete is registered for its cascade step; the views
    // have already dropped the case and its members.
    assert_eq!(hub.purge.store().registered_count(), 1);
    assert!(hub.cases.get(case_id).is_none());
    assert!(hub.notifications.get(first).is_none());
    assert!(hub.notifications.get(second).is_none());

    // The cascade emits one delete per member.
    assert_eq!(hub.purge.tick(at(2024, 8, 2, 0)).await.unwrap(), 2);
    hub.drain().await;

    let member_deletes: BTreeSet<Uuid> = hub
        .log
        .poll("inspect", 64)
        .into_iter()
        .filter_map(|polled| match polled.envelope.payload {
            Event::HardDeleted { grouping: None, .. } => Some(polled.envelope.aggregate_id),
            _ => None,
        })
        .collect();
    let expected: BTreeSet<Uuid> = [first.into_uuid(), second.into_uuid()].into();
    assert_eq!(member_deletes, expected);

    // The members' own deletes carry no grouping, so the next tick only
    // cleans them out of the store.
    assert_eq!(hub.purge.tick(at(2024, 8, 2, 1)).await.unwrap(), 0);
    assert!(hub.purge.store().is_empty());

    // Redelivered creations cannot resurrect anything.
    hub.publish(case_created).await;
    hub.publish(first_created).await;
    hub.drain().await;
    assert!(hub.cases.get(case_id).is_none());
    assert!(hub.notifications.get(first).is_none());
    assert!(hub.cases.grouping_deleted(&grouping));
}

#[tokio::test]
async fn test_scheduled_purge_fires_through_the_log() {
    let hub = TestHub::new();
    let id = NotificationId::new();
    hub.publish(envelope(
        id.into_uuid(),
        Event::MessageCreated {
            notification_id: id,
            tag: TAG.to_string(),
            external_id: id.to_string(),
            group_id: None,
            text: "Self-destructing".to_string(),
            link: "https://example.com/m".to_string(),
            recipients: vec![recipient()],
            channels: vec![],
            created_at: at(2024, 5, 1, 8).fixed_offset(),
            auto_delete: Some(DeleteSchedule::After {
                after: Duration::from_secs(30 * 24 * 3600),
            }),
        },
    ))
    .await;
    hub.drain().await;
    assert!(hub.notifications.get(id).is_some());

    // Thirty days after creation the message becomes purgeable.
    assert_eq!(hub.purge.tick(at(2024, 5, 31, 7)).await.unwrap(), 0);
    assert_eq!(hub.purge.tick(at(2024, 5, 31, 9)).await.unwrap(), 1);
    hub.drain().await;

    assert!(hub.notifications.get(id).is_none());
    assert_eq!(
        hub.health.metrics.purges_dispatched.load(Ordering::Relaxed),
        1
    );

    // Observing its own delete retires the row; the next tick emits
    // nothing and the store ends up empty.
    assert_eq!(hub.purge.tick(at(2024, 5, 31, 10)).await.unwrap(), 0);
    assert!(hub.purge.store().is_empty());
}
