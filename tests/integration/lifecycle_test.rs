//! Integration tests for the task lifecycle: deadline expiry, completion,
//! and postponement, driven through the log and observed in the view.

mod helpers;

use helpers::*;

use notifyhub_core::time;
use notifyhub_core::types::{NotificationId, TaskState};
use notifyhub_projection::{Notification, TaskView};

fn task_view(hub: &TestHub, id: NotificationId) -> TaskView {
    match hub.notifications.get(id).expect("notification present") {
        Notification::Task(view) => view,
        Notification::Message(_) => panic!("expected a task"),
    }
}

#[tokio::test]
async fn test_overdue_task_expires_end_to_end() {
    let hub = TestHub::new();
    let id = NotificationId::new();
    hub.publish(task(id, None, Some(date(2024, 6, 1)), None)).await;
    hub.drain().await;

    // On the deadline day itself nothing expires.
    assert_eq!(hub.expiry.tick(at(2024, 6, 1, 12)).await.unwrap(), 0);
    hub.drain().await;
    assert_eq!(task_view(&hub, id).state, TaskState::New);

    // The civil day after, the task expires, stamped at the deadline's
    // end of day.
    assert_eq!(hub.expiry.tick(at(2024, 6, 2, 12)).await.unwrap(), 1);
    hub.drain().await;
    let view = task_view(&hub, id);
    assert_eq!(view.state, TaskState::Expired);
    assert_eq!(view.expired_at, Some(time::end_of_day(date(2024, 6, 1))));

    // And only once.
    assert_eq!(hub.expiry.tick(at(2024, 6, 3, 12)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_completion_wins_over_expiry_in_either_order() {
    let hub = TestHub::new();

    // Expiry emitted before the completion is observed: the later
    // completion still lands.
    let first = NotificationId::new();
    hub.publish(task(first, None, Some(date(2024, 6, 1)), None)).await;
    hub.drain().await;
    assert_eq!(hub.expiry.tick(at(2024, 6, 2, 12)).await.unwrap(), 1);
    hub.publish(complete(first)).await;
    hub.drain().await;
    assert_eq!(task_view(&hub, first).state, TaskState::Completed);

    // Completion observed first: a racing expiry event is a no-op.
    let second = NotificationId::new();
    hub.publish(task(second, None, Some(date(2024, 6, 1)), None)).await;
    hub.publish(complete(second)).await;
    hub.drain().await;
    hub.publish(envelope(
        second.into_uuid(),
        notifyhub_core::event::Event::TaskExpired {
            notification_id: second,
            expired_at: time::end_of_day(date(2024, 6, 1)),
            new_link: None,
            auto_delete_update: None,
        },
    ))
    .await;
    hub.drain().await;
    let view = task_view(&hub, second);
    assert_eq!(view.state, TaskState::Completed);
    assert_eq!(view.expired_at, None);

    // A completed task never re-enters the expiry table.
    assert_eq!(hub.expiry.tick(at(2024, 6, 10, 12)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_postponement_reopens_an_expired_task() {
    let hub = TestHub::new();
    let id = NotificationId::new();
    hub.publish(task(id, None, Some(date(2024, 6, 1)), None)).await;
    hub.drain().await;

    assert_eq!(hub.expiry.tick(at(2024, 6, 2, 12)).await.unwrap(), 1);
    hub.drain().await;
    assert_eq!(task_view(&hub, id).state, TaskState::Expired);

    // Postponing clears the expiry and re-arms the scheduler.
    hub.publish(postpone(id, date(2024, 7, 1), None)).await;
    hub.drain().await;
    let view = task_view(&hub, id);
    assert_eq!(view.state, TaskState::New);
    assert_eq!(view.expired_at, None);
    assert_eq!(view.deadline, Some(date(2024, 7, 1)));

    // The task expires again against the new deadline.
    assert_eq!(hub.expiry.tick(at(2024, 7, 2, 12)).await.unwrap(), 1);
    hub.drain().await;
    let view = task_view(&hub, id);
    assert_eq!(view.state, TaskState::Expired);
    assert_eq!(view.expired_at, Some(time::end_of_day(date(2024, 7, 1))));
}

#[tokio::test]
async fn test_postponement_of_a_completed_task_changes_nothing() {
    let hub = TestHub::new();
    let id = NotificationId::new();
    hub.publish(task(id, None, Some(date(2024, 6, 1)), None)).await;
    hub.publish(complete(id)).await;
    hub.drain().await;

    hub.publish(postpone(id, date(2024, 7, 1), None)).await;
    hub.drain().await;

    let view = task_view(&hub, id);
    assert_eq!(view.state, TaskState::Completed);
    // The view keeps its original deadline and nothing expires.
    assert_eq!(view.deadline, Some(date(2024, 6, 1)));
    assert_eq!(hub.expiry.tick(at(2024, 7, 10, 12)).await.unwrap(), 0);
}
