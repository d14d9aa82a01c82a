//! Event fixtures shared by tests across crates.
//!
//! `sample_events` tells one small story that touches every event kind:
//! a case with a message and a task, a standalone task, reminders, a
//! postponed deadline, deliveries, and both delete flavors.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use notifyhub_core::event::{
    DeleteSchedule, Event, EventEnvelope, ReminderSchedule, ReminderSpec,
};
use notifyhub_core::types::{
    CaseId, CaseStatus, Channel, ChannelRequest, DeliveryId, Grouping, NotificationId, OrderId,
    Recipient,
};

/// Tag used by all sample events.
pub const SAMPLE_TAG: &str = "payroll";

/// Group id of the sample case.
pub const SAMPLE_GROUP_ID: &str = "case-1001";

/// The grouping tying the sample case and its notifications together.
pub fn sample_grouping() -> Grouping {
    Grouping::new(SAMPLE_TAG, SAMPLE_GROUP_ID)
}

/// Recipient used by all sample events.
pub fn sample_recipient() -> Recipient {
    Recipient::ServiceGrant {
        tenant_id: "314".to_string(),
        service: "4936".to_string(),
        edition: "1".to_string(),
    }
}

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .unwrap_or_default()
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn envelope(aggregate_id: uuid::Uuid, payload: Event) -> EventEnvelope {
    EventEnvelope::new(
        aggregate_id,
        "314",
        Some("producer-1".to_string()),
        "test-app",
        payload,
    )
}

/// One envelope of every event kind, in a causally valid order.
pub fn sample_events() -> Vec<EventEnvelope> {
    let case_id = CaseId::new();
    let message_id = NotificationId::new();
    let grouped_task_id = NotificationId::new();
    let lone_task_id = NotificationId::new();
    let doomed_id = NotificationId::new();
    let message_delivery = DeliveryId::new();
    let lone_delivery = DeliveryId::new();

    let created_at = at(2024, 5, 1, 8).fixed_offset();
    let deadline = date(2024, 6, 1);

    vec![
        envelope(
            case_id.into_uuid(),
            Event::CaseCreated {
                case_id,
                tag: SAMPLE_TAG.to_string(),
                group_id: SAMPLE_GROUP_ID.to_string(),
                title: "Payroll report May".to_string(),
                link: Some("https://example.com/case/1001".to_string()),
                recipients: vec![sample_recipient()],
                reported_at: None,
                received_at: at(2024, 5, 1, 7),
                auto_delete: Some(DeleteSchedule::After {
                    after: std::time::Duration::from_secs(365 * 24 * 3600),
                }),
            },
        ),
        envelope(
            message_id.into_uuid(),
            Event::MessageCreated {
                notification_id: message_id,
                tag: SAMPLE_TAG.to_string(),
                external_id: "msg-1".to_string(),
                group_id: Some(SAMPLE_GROUP_ID.to_string()),
                text: "The report period has opened".to_string(),
                link: "https://example.com/report".to_string(),
                recipients: vec![sample_recipient()],
                channels: vec![ChannelRequest {
                    delivery_id: message_delivery,
                    channel: Channel::Email {
                        address: "payroll@example.com".to_string(),
                        subject: "Report period open".to_string(),
                        body: "You can now submit.".to_string(),
                    },
                }],
                created_at,
                auto_delete: None,
            },
        ),
        envelope(
            grouped_task_id.into_uuid(),
            Event::TaskCreated {
                notification_id: grouped_task_id,
                tag: SAMPLE_TAG.to_string(),
                external_id: "task-1".to_string(),
                group_id: Some(SAMPLE_GROUP_ID.to_string()),
                text: "Submit the payroll report".to_string(),
                link: "https://example.com/report/new".to_string(),
                recipients: vec![sample_recipient()],
                channels: vec![],
                created_at,
                deadline: Some(deadline),
                reminder: Some(ReminderSpec {
                    schedule: ReminderSchedule::before_deadline(
                        std::time::Duration::from_secs(7 * 24 * 3600),
                        deadline,
                    ),
                    channels: vec![],
                }),
                auto_delete: None,
            },
        ),
        envelope(
            lone_task_id.into_uuid(),
            Event::TaskCreated {
                notification_id: lone_task_id,
                tag: SAMPLE_TAG.to_string(),
                external_id: "task-2".to_string(),
                group_id: None,
                text: "Confirm contact details".to_string(),
                link: "https://example.com/contact".to_string(),
                recipients: vec![sample_recipient()],
                channels: vec![ChannelRequest {
                    delivery_id: lone_delivery,
                    channel: Channel::Sms {
                        phone: "+4740000000".to_string(),
                        body: "Please confirm your contact details".to_string(),
                    },
                }],
                created_at,
                deadline: None,
                reminder: None,
                auto_delete: None,
            },
        ),
        envelope(
            message_id.into_uuid(),
            Event::NotificationClicked {
                notification_id: message_id,
                user_id: "01017012345".to_string(),
            },
        ),
        envelope(
            grouped_task_id.into_uuid(),
            Event::ReminderFired {
                notification_id: grouped_task_id,
                order_id: OrderId::new(),
                fired_at: at(2024, 5, 25, 9),
                deadline: Some(deadline),
                schedule: ReminderSchedule::before_deadline(
                    std::time::Duration::from_secs(7 * 24 * 3600),
                    deadline,
                ),
                channels: vec![],
            },
        ),
        envelope(
            grouped_task_id.into_uuid(),
            Event::DeadlinePostponed {
                notification_id: grouped_task_id,
                deadline: date(2024, 6, 15),
                postponed_at: at(2024, 5, 28, 10),
                reminder: None,
            },
        ),
        envelope(
            case_id.into_uuid(),
            Event::CaseStatusChanged {
                case_id,
                status: CaseStatus::InProgress,
                status_text: None,
                new_link: None,
                reported_at: None,
                received_at: at(2024, 5, 10, 12),
                idempotency_key: "status-1".to_string(),
                auto_delete_update: None,
            },
        ),
        envelope(
            lone_task_id.into_uuid(),
            Event::TaskCompleted {
                notification_id: lone_task_id,
                completed_at: at(2024, 5, 12, 14).fixed_offset(),
                new_link: None,
                auto_delete_update: None,
            },
        ),
        envelope(
            grouped_task_id.into_uuid(),
            Event::TaskExpired {
                notification_id: grouped_task_id,
                expired_at: at(2024, 6, 15, 22).fixed_offset(),
                new_link: None,
                auto_delete_update: None,
            },
        ),
        envelope(
            case_id.into_uuid(),
            Event::CaseStatusChanged {
                case_id,
                status: CaseStatus::Done,
                status_text: Some("Report received".to_string()),
                new_link: None,
                reported_at: None,
                received_at: at(2024, 6, 16, 9),
                idempotency_key: "status-2".to_string(),
                auto_delete_update: None,
            },
        ),
        envelope(
            message_id.into_uuid(),
            Event::DeliverySucceeded {
                notification_id: message_id,
                delivery_id: message_delivery,
                response: "250 OK".to_string(),
            },
        ),
        envelope(
            lone_task_id.into_uuid(),
            Event::DeliveryFailed {
                notification_id: lone_task_id,
                delivery_id: lone_delivery,
                error_code: "30004".to_string(),
                response: "unreachable".to_string(),
            },
        ),
        envelope(
            message_id.into_uuid(),
            Event::SoftDeleted {
                grouping: None,
                deleted_at: at(2024, 7, 1, 0),
            },
        ),
        envelope(
            doomed_id.into_uuid(),
            Event::MessageCreated {
                notification_id: doomed_id,
                tag: SAMPLE_TAG.to_string(),
                external_id: "msg-2".to_string(),
                group_id: None,
                text: "Sent in error".to_string(),
                link: "https://example.com".to_string(),
                recipients: vec![sample_recipient()],
                channels: vec![],
                created_at,
                auto_delete: None,
            },
        ),
        envelope(
            doomed_id.into_uuid(),
            Event::HardDeleted {
                grouping: None,
                deleted_at: at(2024, 7, 2, 0),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_covers_every_event_kind() {
        let names: std::collections::HashSet<&str> = sample_events()
            .iter()
            .map(|e| e.payload.name())
            .collect();
        assert_eq!(names.len(), 13);
    }
}
