//! The domain event model.
//!
//! Events are the source of truth: they are appended to the event log by
//! producers and consumed by projections and scheduler services. Payloads
//! are serialized with an internal `type` tag so the log stays readable
//! and new kinds can be added without breaking old consumers.

pub mod schedule;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use schedule::{
    DeleteSchedule, DeleteScheduleUpdate, ReminderSchedule, ReminderSpec, UpdateStrategy,
};

use crate::types::{
    CaseId, CaseStatus, ChannelRequest, DeliveryId, EventId, Grouping, NotificationId, OrderId,
    Recipient,
};

/// Wrapper for all domain events with producer metadata.
///
/// `event_id` is assigned by the producer and doubles as the idempotency
/// key: the log may deliver an envelope more than once, and producers may
/// retry a publish, so every consumer treats a previously seen id as a
/// no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID, assigned by the producer.
    pub event_id: EventId,
    /// The notification or case the event belongs to. Also the log
    /// partition key: events for one aggregate are totally ordered.
    pub aggregate_id: Uuid,
    /// Tenant (organization) number the aggregate belongs to.
    pub tenant_id: String,
    /// The producer that owns the aggregate. Absent for events originated
    /// by end users, such as clicks.
    pub producer_id: Option<String>,
    /// Name of the producing application instance.
    pub source_app: String,
    /// The event payload.
    pub payload: Event,
}

impl EventEnvelope {
    /// Create an envelope with a fresh event id.
    pub fn new(
        aggregate_id: Uuid,
        tenant_id: impl Into<String>,
        producer_id: Option<String>,
        source_app: impl Into<String>,
        payload: Event,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_id,
            tenant_id: tenant_id.into(),
            producer_id,
            source_app: source_app.into(),
            payload,
        }
    }

    /// The grouping the event belongs to or targets, if any.
    pub fn grouping(&self) -> Option<Grouping> {
        self.payload.grouping()
    }
}

/// Union of all domain event kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A message notification was created.
    MessageCreated {
        /// The notification ID.
        notification_id: NotificationId,
        /// Producer-scoped label.
        tag: String,
        /// Producer's own id for the notification, unique per tag.
        external_id: String,
        /// Optional grouping under a case.
        group_id: Option<String>,
        /// The text shown to users.
        text: String,
        /// Where the notification links to.
        link: String,
        /// Who the message is addressed to.
        recipients: Vec<Recipient>,
        /// External-channel messages requested alongside.
        channels: Vec<ChannelRequest>,
        /// When the producer created the message.
        created_at: DateTime<FixedOffset>,
        /// Optional hard-delete schedule.
        auto_delete: Option<DeleteSchedule>,
    },
    /// A task notification was created.
    TaskCreated {
        /// The notification ID.
        notification_id: NotificationId,
        /// Producer-scoped label.
        tag: String,
        /// Producer's own id for the notification, unique per tag.
        external_id: String,
        /// Optional grouping under a case.
        group_id: Option<String>,
        /// The text shown to users.
        text: String,
        /// Where the notification links to.
        link: String,
        /// Who the task is addressed to.
        recipients: Vec<Recipient>,
        /// External-channel messages requested alongside.
        channels: Vec<ChannelRequest>,
        /// When the producer created the task.
        created_at: DateTime<FixedOffset>,
        /// Civil-date deadline for completing the task.
        deadline: Option<NaiveDate>,
        /// Optional reminder order.
        reminder: Option<ReminderSpec>,
        /// Optional hard-delete schedule.
        auto_delete: Option<DeleteSchedule>,
    },
    /// A task was completed by its recipient.
    TaskCompleted {
        /// The notification ID.
        notification_id: NotificationId,
        /// When the task was completed.
        completed_at: DateTime<FixedOffset>,
        /// Replacement link, if the producer supplied one.
        new_link: Option<String>,
        /// Optional change to the hard-delete schedule.
        auto_delete_update: Option<DeleteScheduleUpdate>,
    },
    /// A task's deadline passed without completion.
    TaskExpired {
        /// The notification ID.
        notification_id: NotificationId,
        /// The expiry moment: civil end of the deadline day.
        expired_at: DateTime<FixedOffset>,
        /// Replacement link, if the producer supplied one.
        new_link: Option<String>,
        /// Optional change to the hard-delete schedule.
        auto_delete_update: Option<DeleteScheduleUpdate>,
    },
    /// A task's deadline was moved.
    DeadlinePostponed {
        /// The notification ID.
        notification_id: NotificationId,
        /// The new civil-date deadline.
        deadline: NaiveDate,
        /// When the producer changed the deadline.
        postponed_at: DateTime<Utc>,
        /// Reminder order relative to the new deadline, if any.
        reminder: Option<ReminderSpec>,
    },
    /// A scheduled reminder fired.
    ReminderFired {
        /// The task the reminder belongs to.
        notification_id: NotificationId,
        /// The reminder order this event closes.
        order_id: OrderId,
        /// When the reminder was dispatched.
        fired_at: DateTime<Utc>,
        /// The task's deadline when the order was placed.
        deadline: Option<NaiveDate>,
        /// The schedule that was honored.
        schedule: ReminderSchedule,
        /// External-channel messages dispatched with the reminder.
        channels: Vec<ChannelRequest>,
    },
    /// A case was created.
    CaseCreated {
        /// The case ID.
        case_id: CaseId,
        /// Producer-scoped label.
        tag: String,
        /// The case's grouping id; notifications with the same
        /// (tag, group_id) belong to this case.
        group_id: String,
        /// The case title shown to users.
        title: String,
        /// Where the case links to.
        link: Option<String>,
        /// Who the case is addressed to.
        recipients: Vec<Recipient>,
        /// Producer-reported occurrence time, when it differs from receipt.
        reported_at: Option<DateTime<FixedOffset>>,
        /// When the producer's request was received.
        received_at: DateTime<Utc>,
        /// Optional hard-delete schedule.
        auto_delete: Option<DeleteSchedule>,
    },
    /// A case changed status.
    CaseStatusChanged {
        /// The case ID.
        case_id: CaseId,
        /// The new status.
        status: CaseStatus,
        /// Override of the status text shown to users.
        status_text: Option<String>,
        /// Replacement case link, if the producer supplied one.
        new_link: Option<String>,
        /// Producer-reported occurrence time, when it differs from receipt.
        reported_at: Option<DateTime<FixedOffset>>,
        /// When the producer's request was received.
        received_at: DateTime<Utc>,
        /// Producer-chosen key deduplicating status retries.
        idempotency_key: String,
        /// Optional change to the hard-delete schedule.
        auto_delete_update: Option<DeleteScheduleUpdate>,
    },
    /// A user clicked a notification.
    NotificationClicked {
        /// The notification ID.
        notification_id: NotificationId,
        /// The user who clicked.
        user_id: String,
    },
    /// An aggregate was soft-deleted: hidden from users, rows retained.
    SoftDeleted {
        /// Set when the target is a case; members of the grouping are
        /// deleted along with it.
        grouping: Option<Grouping>,
        /// When the delete was requested.
        deleted_at: DateTime<Utc>,
    },
    /// An aggregate was hard-deleted: all its rows are removed.
    HardDeleted {
        /// Set when the target is a case; members of the grouping are
        /// deleted along with it.
        grouping: Option<Grouping>,
        /// When the delete was requested.
        deleted_at: DateTime<Utc>,
    },
    /// An external-channel delivery succeeded.
    DeliverySucceeded {
        /// The notification the delivery belongs to.
        notification_id: NotificationId,
        /// The delivery request that completed.
        delivery_id: DeliveryId,
        /// Raw response from the channel provider.
        response: String,
    },
    /// An external-channel delivery failed.
    DeliveryFailed {
        /// The notification the delivery belongs to.
        notification_id: NotificationId,
        /// The delivery request that failed.
        delivery_id: DeliveryId,
        /// Provider-specific error code.
        error_code: String,
        /// Raw response from the channel provider.
        response: String,
    },
}

impl Event {
    /// Stable kind name for logging and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageCreated { .. } => "message_created",
            Self::TaskCreated { .. } => "task_created",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskExpired { .. } => "task_expired",
            Self::DeadlinePostponed { .. } => "deadline_postponed",
            Self::ReminderFired { .. } => "reminder_fired",
            Self::CaseCreated { .. } => "case_created",
            Self::CaseStatusChanged { .. } => "case_status_changed",
            Self::NotificationClicked { .. } => "notification_clicked",
            Self::SoftDeleted { .. } => "soft_deleted",
            Self::HardDeleted { .. } => "hard_deleted",
            Self::DeliverySucceeded { .. } => "delivery_succeeded",
            Self::DeliveryFailed { .. } => "delivery_failed",
        }
    }

    /// The grouping the event belongs to or targets, if any.
    pub fn grouping(&self) -> Option<Grouping> {
        match self {
            Self::MessageCreated { tag, group_id, .. }
            | Self::TaskCreated { tag, group_id, .. } => group_id
                .as_ref()
                .map(|group_id| Grouping::new(tag.clone(), group_id.clone())),
            Self::CaseCreated { tag, group_id, .. } => {
                Some(Grouping::new(tag.clone(), group_id.clone()))
            }
            Self::SoftDeleted { grouping, .. } | Self::HardDeleted { grouping, .. } => {
                grouping.clone()
            }
            _ => None,
        }
    }
}
