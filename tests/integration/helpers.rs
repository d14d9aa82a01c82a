//! Shared test helpers for integration tests.

// Each test binary compiles this module separately and uses its own subset.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use notifyhub_core::event::{Event, EventEnvelope, ReminderSchedule, ReminderSpec};
use notifyhub_core::health::Health;
use notifyhub_core::types::{
    CaseId, CaseStatus, Grant, Grants, Grouping, NotificationId, Recipient,
};
use notifyhub_eventlog::{EventProcessor, EventSink, InMemoryEventLog};
use notifyhub_projection::{CaseStore, NotificationStore};
use notifyhub_scheduler::{ExpiryService, PurgeService, ReminderService, ReplayValidator};

pub const TENANT: &str = "314";
pub const TAG: &str = "payroll";
pub const USER: &str = "user-1";

const PARTITIONS: usize = 4;

/// The whole engine wired together: one log, all projections, all
/// scheduler services. Tests publish events and drain them through every
/// consumer group deterministically instead of spawning timer loops.
pub struct TestHub {
    pub log: Arc<InMemoryEventLog>,
    pub health: Arc<Health>,
    pub notifications: Arc<NotificationStore>,
    pub cases: Arc<CaseStore>,
    pub reminder: Arc<ReminderService>,
    pub expiry: Arc<ExpiryService>,
    pub purge: Arc<PurgeService>,
}

impl TestHub {
    /// Create a fully wired hub.
    pub fn new() -> Self {
        let log = Arc::new(InMemoryEventLog::new(PARTITIONS));
        let health = Arc::new(Health::new(PARTITIONS));
        Self {
            notifications: Arc::new(NotificationStore::new()),
            cases: Arc::new(CaseStore::new()),
            reminder: Arc::new(ReminderService::new(
                log.clone(),
                health.clone(),
                "test-app",
            )),
            expiry: Arc::new(ExpiryService::new(log.clone(), health.clone(), "test-app")),
            purge: Arc::new(PurgeService::new(
                log.clone(),
                health.clone(),
                "test-app",
                Duration::ZERO,
            )),
            log,
            health,
        }
    }

    fn processors(&self) -> Vec<(&'static str, Arc<dyn EventProcessor>)> {
        vec![
            ("notification-view", self.notifications.clone()),
            ("case-view", self.cases.clone()),
            ("reminder-scheduler", self.reminder.clone()),
            ("expiry-scheduler", self.expiry.clone()),
            ("purge-scheduler", self.purge.clone()),
        ]
    }

    /// Publish one event to the log.
    pub async fn publish(&self, envelope: EventEnvelope) {
        self.log.publish(envelope).await.expect("publish");
    }

    /// Feed every pending event through every consumer group, exactly the
    /// way the server's consumer loops would, until all groups caught up.
    pub async fn drain(&self) {
        loop {
            let mut applied = 0usize;
            for (group, processor) in self.processors() {
                for polled in self.log.poll(group, 64) {
                    processor.process(&polled.envelope).await.expect("apply");
                    self.log.commit(group, polled.partition, polled.offset);
                    applied += 1;
                }
            }
            if applied == 0 {
                break;
            }
        }
    }

    /// A replay validator over this hub's log.
    pub fn validator(&self) -> ReplayValidator {
        ReplayValidator::new(self.log.clone(), self.health.clone(), 16)
    }

    /// Rebuild fresh stores from the full log, the way a replacement
    /// replica would.
    pub fn replayed_stores(&self, group: &str) -> (NotificationStore, CaseStore) {
        let notifications = NotificationStore::new();
        let cases = CaseStore::new();
        self.log.rewind(group);
        loop {
            let batch = self.log.poll(group, 64);
            if batch.is_empty() {
                break;
            }
            for polled in batch {
                notifications.apply(&polled.envelope);
                cases.apply(&polled.envelope);
                self.log.commit(group, polled.partition, polled.offset);
            }
        }
        (notifications, cases)
    }
}

/// A grant set covering the standard test recipient.
pub fn grants() -> Grants {
    Grants {
        grants: vec![Grant {
            tenant_id: TENANT.to_string(),
            service: "4936".to_string(),
            edition: "1".to_string(),
        }],
        degraded: false,
    }
}

pub fn recipient() -> Recipient {
    Recipient::ServiceGrant {
        tenant_id: TENANT.to_string(),
        service: "4936".to_string(),
        edition: "1".to_string(),
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().expect("valid time")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn envelope(aggregate_id: Uuid, payload: Event) -> EventEnvelope {
    EventEnvelope::new(
        aggregate_id,
        TENANT,
        Some("producer-1".to_string()),
        "test-app",
        payload,
    )
}

pub fn message(id: NotificationId, group_id: Option<&str>) -> EventEnvelope {
    envelope(
        id.into_uuid(),
        Event::MessageCreated {
            notification_id: id,
            tag: TAG.to_string(),
            external_id: id.to_string(),
            group_id: group_id.map(str::to_string),
            text: "A message".to_string(),
            link: "https://example.com/m".to_string(),
            recipients: vec![recipient()],
            channels: vec![],
            created_at: at(2024, 5, 1, 8).fixed_offset(),
            auto_delete: None,
        },
    )
}

pub fn task(
    id: NotificationId,
    group_id: Option<&str>,
    deadline: Option<NaiveDate>,
    reminder: Option<ReminderSpec>,
) -> EventEnvelope {
    envelope(
        id.into_uuid(),
        Event::TaskCreated {
            notification_id: id,
            tag: TAG.to_string(),
            external_id: id.to_string(),
            group_id: group_id.map(str::to_string),
            text: "A task".to_string(),
            link: "https://example.com/t".to_string(),
            recipients: vec![recipient()],
            channels: vec![],
            created_at: at(2024, 5, 1, 8).fixed_offset(),
            deadline,
            reminder,
            auto_delete: None,
        },
    )
}

pub fn case(id: CaseId, group_id: &str) -> EventEnvelope {
    envelope(
        id.into_uuid(),
        Event::CaseCreated {
            case_id: id,
            tag: TAG.to_string(),
            group_id: group_id.to_string(),
            title: "A case".to_string(),
            link: None,
            recipients: vec![recipient()],
            reported_at: None,
            received_at: at(2024, 5, 1, 8),
            auto_delete: None,
        },
    )
}

pub fn status_change(
    id: CaseId,
    key: &str,
    status: CaseStatus,
    link: Option<&str>,
) -> EventEnvelope {
    envelope(
        id.into_uuid(),
        Event::CaseStatusChanged {
            case_id: id,
            status,
            status_text: None,
            new_link: link.map(str::to_string),
            reported_at: None,
            received_at: at(2024, 5, 2, 9),
            idempotency_key: key.to_string(),
            auto_delete_update: None,
        },
    )
}

pub fn complete(id: NotificationId) -> EventEnvelope {
    envelope(
        id.into_uuid(),
        Event::TaskCompleted {
            notification_id: id,
            completed_at: at(2024, 5, 10, 12).fixed_offset(),
            new_link: None,
            auto_delete_update: None,
        },
    )
}

pub fn postpone(
    id: NotificationId,
    deadline: NaiveDate,
    reminder: Option<ReminderSpec>,
) -> EventEnvelope {
    envelope(
        id.into_uuid(),
        Event::DeadlinePostponed {
            notification_id: id,
            deadline,
            postponed_at: at(2024, 5, 20, 10),
            reminder,
        },
    )
}

pub fn soft_delete(aggregate_id: Uuid, grouping: Option<Grouping>) -> EventEnvelope {
    envelope(
        aggregate_id,
        Event::SoftDeleted {
            grouping,
            deleted_at: at(2024, 8, 1, 0),
        },
    )
}

pub fn hard_delete(aggregate_id: Uuid, grouping: Option<Grouping>) -> EventEnvelope {
    envelope(
        aggregate_id,
        Event::HardDeleted {
            grouping,
            deleted_at: at(2024, 8, 1, 0),
        },
    )
}

pub fn before_deadline_reminder(days: u64, deadline: NaiveDate) -> ReminderSpec {
    ReminderSpec {
        schedule: ReminderSchedule::before_deadline(
            Duration::from_secs(days * 24 * 3600),
            deadline,
        ),
        channels: vec![],
    }
}
