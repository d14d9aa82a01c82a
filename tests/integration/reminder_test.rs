//! Integration tests for reminder scheduling: before-deadline orders,
//! postponement re-arming, and the fired event flowing back through the
//! log to close the order and stamp the view.

mod helpers;

use helpers::*;

use notifyhub_core::event::Event;
use notifyhub_core::types::{NotificationId, OrderId, TaskState};
use notifyhub_projection::{Notification, TaskView};

fn task_view(hub: &TestHub, id: NotificationId) -> TaskView {
    match hub.notifications.get(id).expect("notification present") {
        Notification::Task(view) => view,
        Notification::Message(_) => panic!("expected a task"),
    }
}

#[tokio::test]
async fn test_before_deadline_reminder_fires_end_to_end() {
    let hub = TestHub::new();
    let id = NotificationId::new();
    hub.publish(task(
        id,
        None,
        Some(date(2024, 6, 1)),
        Some(before_deadline_reminder(7, date(2024, 6, 1))),
    ))
    .await;
    hub.drain().await;
    assert_eq!(hub.reminder.queue().pending(), 1);

    // Seven days before the end of June 1 lands late on May 25, so noon
    // on the 25th is too early and noon on the 26th is past due.
    assert_eq!(hub.reminder.tick(at(2024, 5, 25, 12)).await.unwrap(), 0);
    assert_eq!(hub.reminder.tick(at(2024, 5, 26, 12)).await.unwrap(), 1);
    hub.drain().await;

    let view = task_view(&hub, id);
    assert_eq!(view.state, TaskState::New);
    assert_eq!(view.reminder_fired_at, Some(at(2024, 5, 26, 12)));

    // Fired means closed: nothing is pending and nothing fires again.
    assert_eq!(hub.reminder.queue().pending(), 0);
    assert_eq!(hub.reminder.tick(at(2024, 5, 27, 12)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_postponement_rearms_the_reminder_against_the_new_deadline() {
    let hub = TestHub::new();
    let id = NotificationId::new();
    hub.publish(task(
        id,
        None,
        Some(date(2024, 6, 1)),
        Some(before_deadline_reminder(7, date(2024, 6, 1))),
    ))
    .await;
    hub.drain().await;

    // Postpone before the first order comes due; the fresh order is
    // identified by the postponement event itself.
    let moved = postpone(
        id,
        date(2024, 6, 15),
        Some(before_deadline_reminder(7, date(2024, 6, 15))),
    );
    let new_order: OrderId = moved.event_id.into();
    hub.publish(moved).await;
    hub.drain().await;
    assert_eq!(hub.reminder.queue().pending(), 1);
    assert!(hub.reminder.queue().has_order(new_order));

    // The old order's time passes without a dispatch; it was closed by
    // the postponement.
    assert_eq!(hub.reminder.tick(at(2024, 5, 26, 12)).await.unwrap(), 0);

    // The new order fires seven days before the end of June 15.
    assert_eq!(hub.reminder.tick(at(2024, 6, 8, 12)).await.unwrap(), 0);
    assert_eq!(hub.reminder.tick(at(2024, 6, 9, 12)).await.unwrap(), 1);
    hub.drain().await;

    let fired: Vec<_> = hub
        .log
        .poll("inspect", 64)
        .into_iter()
        .filter_map(|polled| match polled.envelope.payload {
            Event::ReminderFired {
                notification_id,
                order_id,
                ..
            } => Some((notification_id, order_id)),
            _ => None,
        })
        .collect();
    assert_eq!(fired, vec![(id, new_order)]);

    assert_eq!(task_view(&hub, id).reminder_fired_at, Some(at(2024, 6, 9, 12)));
    assert_eq!(hub.reminder.tick(at(2024, 6, 10, 12)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_redelivered_creation_does_not_reopen_a_fired_order() {
    let hub = TestHub::new();
    let id = NotificationId::new();
    let created = task(
        id,
        None,
        Some(date(2024, 6, 1)),
        Some(before_deadline_reminder(7, date(2024, 6, 1))),
    );
    hub.publish(created.clone()).await;
    hub.drain().await;

    assert_eq!(hub.reminder.tick(at(2024, 5, 26, 12)).await.unwrap(), 1);
    hub.drain().await;

    // The same creation envelope delivered again maps onto the already
    // fired order and places nothing.
    hub.publish(created).await;
    hub.drain().await;
    assert_eq!(hub.reminder.queue().pending(), 0);
    assert_eq!(hub.reminder.tick(at(2024, 5, 27, 12)).await.unwrap(), 0);
}
