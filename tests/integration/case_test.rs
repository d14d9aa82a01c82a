//! Integration tests for cases: status timelines through the log, the
//! first-claim rule for group ids, the grouped notification timeline, and
//! producer validation against the live views.

mod helpers;

use helpers::*;

use notifyhub_core::rejection::RejectionKind;
use notifyhub_core::types::{CaseId, CaseStatus, Grouping, NotificationId};
use notifyhub_projection::RequestValidator;

#[tokio::test]
async fn test_case_status_timeline_end_to_end() {
    let hub = TestHub::new();
    let id = CaseId::new();
    hub.publish(case(id, "g-1")).await;
    hub.publish(status_change(
        id,
        "k1",
        CaseStatus::InProgress,
        Some("https://example.com/v2"),
    ))
    .await;
    hub.drain().await;

    let view = hub.cases.get(id).expect("case present");
    assert_eq!(view.timeline.len(), 1);
    assert_eq!(
        view.current_status().map(|s| s.status),
        Some(CaseStatus::InProgress)
    );
    assert_eq!(view.current_status().unwrap().display_text(), "Under behandling");
    assert_eq!(view.link.as_deref(), Some("https://example.com/v2"));

    // A producer retry under the same key folds into the existing entry,
    // but a changed link still lands.
    hub.publish(status_change(
        id,
        "k1",
        CaseStatus::InProgress,
        Some("https://example.com/v3"),
    ))
    .await;
    hub.drain().await;
    let view = hub.cases.get(id).expect("case present");
    assert_eq!(view.timeline.len(), 1);
    assert_eq!(view.link.as_deref(), Some("https://example.com/v3"));

    hub.publish(status_change(id, "k2", CaseStatus::Done, None)).await;
    hub.drain().await;
    let view = hub.cases.get(id).expect("case present");
    assert_eq!(view.timeline.len(), 2);
    assert_eq!(view.current_status().unwrap().display_text(), "Ferdig");
}

#[tokio::test]
async fn test_first_case_claims_the_group_id() {
    let hub = TestHub::new();
    let first = CaseId::new();
    let second = CaseId::new();
    hub.publish(case(first, "g-dup")).await;
    hub.publish(case(second, "g-dup")).await;
    hub.drain().await;

    let grouping = Grouping::new(TAG, "g-dup");
    assert_eq!(hub.cases.lookup_grouping(&grouping), Some(first));
    assert!(hub.cases.get(second).is_none());
    assert_eq!(hub.cases.len(), 1);
}

#[tokio::test]
async fn test_notifications_attach_to_the_case_timeline() {
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

    let grouping = Grouping::new(TAG, "g-1");
    let timeline = hub.notifications.timeline(&grouping);
    assert_eq!(timeline.len(), 2);
    assert!(timeline.iter().all(|n| n.grouping() == Some(grouping.clone())));

    let counts = hub.notifications.task_state_counts(&grouping);
    assert_eq!(counts.new, 1);
    assert_eq!(counts.completed, 0);

    hub.publish(complete(grouped_task)).await;
    hub.drain().await;
    let counts = hub.notifications.task_state_counts(&grouping);
    assert_eq!(counts.new, 0);
    assert_eq!(counts.completed, 1);
}

#[tokio::test]
async fn test_validation_runs_against_the_live_views() {
    let hub = TestHub::new();
    let validator = RequestValidator::new(hub.notifications.clone(), hub.cases.clone());
    let id = CaseId::new();
    hub.publish(case(id, "g-1")).await;
    hub.drain().await;

    let duplicate = validator.check_create_case(TAG, "g-1").unwrap_err();
    assert_eq!(duplicate.kind, RejectionKind::DuplicateGroupId);
    assert_eq!(duplicate.existing, Some(id.into_uuid()));
    assert!(validator.check_create_case(TAG, "g-2").is_ok());

    assert!(validator.check_change_case_status(id).is_ok());
    assert_eq!(
        validator
            .check_change_case_status(CaseId::new())
            .unwrap_err()
            .kind,
        RejectionKind::CaseNotFound
    );

    // Once the case is deleted its group id is retired for good.
    hub.publish(soft_delete(id.into_uuid(), Some(Grouping::new(TAG, "g-1"))))
        .await;
    hub.drain().await;
    assert_eq!(
        validator.check_create_case(TAG, "g-1").unwrap_err().kind,
        RejectionKind::GroupIdReusedAfterDelete
    );
}
