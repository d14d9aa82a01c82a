//! View types exposed by the projection stores.
//!
//! These are the shapes a query layer reads. Everything derivable is
//! computed on read (sort timestamps, display texts); the stores persist
//! only what events establish.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use notifyhub_core::types::{
    CaseId, CaseStatus, Grouping, NotificationId, Recipient, TaskState,
};

/// A notification as users see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Notification {
    /// A one-way message.
    Message(MessageView),
    /// A task awaiting action.
    Task(TaskView),
}

impl Notification {
    /// The notification's id.
    pub fn id(&self) -> NotificationId {
        match self {
            Self::Message(m) => m.id,
            Self::Task(t) => t.id,
        }
    }

    /// The tenant the notification belongs to.
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.tenant_id,
            Self::Task(t) => &t.tenant_id,
        }
    }

    /// The recipients the notification is addressed to.
    pub fn recipients(&self) -> &[Recipient] {
        match self {
            Self::Message(m) => &m.recipients,
            Self::Task(t) => &t.recipients,
        }
    }

    /// The grouping tying the notification to a case, if any.
    pub fn grouping(&self) -> Option<Grouping> {
        let (tag, group_id) = match self {
            Self::Message(m) => (&m.tag, &m.group_id),
            Self::Task(t) => (&t.tag, &t.group_id),
        };
        group_id
            .as_ref()
            .map(|group_id| Grouping::new(tag.clone(), group_id.clone()))
    }

    /// When the notification was created.
    pub fn created_at(&self) -> DateTime<FixedOffset> {
        match self {
            Self::Message(m) => m.created_at,
            Self::Task(t) => t.created_at,
        }
    }

    /// Whether the notification is soft-deleted.
    pub fn deleted(&self) -> bool {
        match self {
            Self::Message(m) => m.deleted,
            Self::Task(t) => t.deleted,
        }
    }

    pub(crate) fn set_deleted(&mut self) {
        match self {
            Self::Message(m) => m.deleted = true,
            Self::Task(t) => t.deleted = true,
        }
    }

    /// The timestamp lists are ordered by, newest first.
    ///
    /// A task that has had a reminder fire sorts by the reminder time so it
    /// resurfaces; everything else sorts by creation time.
    pub fn sort_time(&self) -> DateTime<Utc> {
        match self {
            Self::Message(m) => m.created_at.with_timezone(&Utc),
            Self::Task(t) => t
                .reminder_fired_at
                .unwrap_or_else(|| t.created_at.with_timezone(&Utc)),
        }
    }
}

/// A message notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    /// Notification id.
    pub id: NotificationId,
    /// Tenant (organization) number.
    pub tenant_id: String,
    /// Producer-scoped label.
    pub tag: String,
    /// Producer's own id, unique per tag.
    pub external_id: String,
    /// Grouping under a case, if any.
    pub group_id: Option<String>,
    /// Text shown to users.
    pub text: String,
    /// Where the notification links to.
    pub link: String,
    /// Audience.
    pub recipients: Vec<Recipient>,
    /// Creation time as reported by the producer.
    pub created_at: DateTime<FixedOffset>,
    /// Soft-delete flag; hidden from queries when set.
    pub deleted: bool,
}

/// A task notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    /// Notification id.
    pub id: NotificationId,
    /// Tenant (organization) number.
    pub tenant_id: String,
    /// Producer-scoped label.
    pub tag: String,
    /// Producer's own id, unique per tag.
    pub external_id: String,
    /// Grouping under a case, if any.
    pub group_id: Option<String>,
    /// Text shown to users.
    pub text: String,
    /// Where the notification links to.
    pub link: String,
    /// Audience.
    pub recipients: Vec<Recipient>,
    /// Creation time as reported by the producer.
    pub created_at: DateTime<FixedOffset>,
    /// Lifecycle state.
    pub state: TaskState,
    /// When the task was completed, if it was.
    pub completed_at: Option<DateTime<FixedOffset>>,
    /// When the task expired, if it did.
    pub expired_at: Option<DateTime<FixedOffset>>,
    /// When the latest reminder fired, if any.
    pub reminder_fired_at: Option<DateTime<Utc>>,
    /// Civil-date deadline.
    pub deadline: Option<NaiveDate>,
    /// Soft-delete flag; hidden from queries when set.
    pub deleted: bool,
}

/// A notification joined with the querying user's click state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibleNotification {
    /// The notification.
    pub notification: Notification,
    /// Whether the querying user has clicked it.
    pub clicked: bool,
}

/// A case with its status timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseView {
    /// Case id.
    pub id: CaseId,
    /// Tenant (organization) number.
    pub tenant_id: String,
    /// The case's natural key.
    pub grouping: Grouping,
    /// Title shown to users.
    pub title: String,
    /// Where the case links to.
    pub link: Option<String>,
    /// Audience.
    pub recipients: Vec<Recipient>,
    /// When the case was created: the producer-reported time when given,
    /// otherwise the receipt time.
    pub created_at: DateTime<Utc>,
    /// Status entries, ascending by status time.
    pub timeline: Vec<StatusEntry>,
    /// Soft-delete flag; hidden from queries when set.
    pub deleted: bool,
}

impl CaseView {
    /// The latest status entry, if any status has been reported.
    pub fn current_status(&self) -> Option<&StatusEntry> {
        self.timeline.last()
    }
}

/// One reported status on a case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    /// The reported status.
    pub status: CaseStatus,
    /// Producer override of the display text.
    pub text: Option<String>,
    /// When the status happened: producer-reported time when given,
    /// otherwise the receipt time.
    pub time: DateTime<FixedOffset>,
    /// When the report was received; tie-breaker for equal status times.
    pub received_at: DateTime<Utc>,
}

impl StatusEntry {
    /// The text shown to users.
    pub fn display_text(&self) -> &str {
        self.text.as_deref().unwrap_or(self.status.default_text())
    }
}

/// Task counts per state within one case's grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStateCounts {
    /// Tasks still open.
    pub new: usize,
    /// Tasks completed.
    pub completed: usize,
    /// Tasks expired.
    pub expired: usize,
}
