//! Business-rule rejections.
//!
//! A rejection is a deterministic "no" to a producer request: the request
//! was understood, checked against current projection state, and refused.
//! Rejections are values, not errors; infrastructure failures use
//! [`crate::error::AppError`] instead.
//!
//! Each operation declares the rejection kinds it may produce. The
//! whitelist is part of the producer contract and is asserted in tests so
//! a detector cannot quietly start returning a kind its operation never
//! advertised.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat categorization of every rejection the system can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionKind {
    /// The tag is malformed or empty.
    InvalidTag,
    /// A notification with the same (tag, external id) already exists.
    DuplicateExternalId,
    /// A live case with the same (tag, group id) already exists.
    DuplicateGroupId,
    /// The (tag, group id) was used by a case that has been deleted and
    /// cannot be reused.
    GroupIdReusedAfterDelete,
    /// The referenced notification does not exist.
    NotificationNotFound,
    /// The referenced case does not exist.
    CaseNotFound,
    /// The referenced task is already completed.
    TaskAlreadyCompleted,
    /// The reminder would fire outside the task's lifetime.
    InvalidReminderTime,
    /// The request conflicts with concurrent state in some other way.
    Conflict,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTag => write!(f, "INVALID_TAG"),
            Self::DuplicateExternalId => write!(f, "DUPLICATE_EXTERNAL_ID"),
            Self::DuplicateGroupId => write!(f, "DUPLICATE_GROUP_ID"),
            Self::GroupIdReusedAfterDelete => write!(f, "GROUP_ID_REUSED_AFTER_DELETE"),
            Self::NotificationNotFound => write!(f, "NOTIFICATION_NOT_FOUND"),
            Self::CaseNotFound => write!(f, "CASE_NOT_FOUND"),
            Self::TaskAlreadyCompleted => write!(f, "TASK_ALREADY_COMPLETED"),
            Self::InvalidReminderTime => write!(f, "INVALID_REMINDER_TIME"),
            Self::Conflict => write!(f, "CONFLICT"),
        }
    }
}

/// A concrete rejection issued to a producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// The category of rejection.
    pub kind: RejectionKind,
    /// A human-readable explanation.
    pub message: String,
    /// For duplicate kinds, the id of the already existing aggregate.
    pub existing: Option<Uuid>,
}

impl Rejection {
    /// Create a rejection without an existing-aggregate reference.
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            existing: None,
        }
    }

    /// Create a duplicate rejection pointing at the existing aggregate.
    pub fn duplicate(kind: RejectionKind, message: impl Into<String>, existing: Uuid) -> Self {
        Self {
            kind,
            message: message.into(),
            existing: Some(existing),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The producer-facing operations that can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create a message notification.
    CreateMessage,
    /// Create a task notification.
    CreateTask,
    /// Complete a task.
    CompleteTask,
    /// Postpone a task's deadline.
    PostponeDeadline,
    /// Create a case.
    CreateCase,
    /// Report a new case status.
    ChangeCaseStatus,
    /// Soft- or hard-delete an aggregate.
    Delete,
}

impl Operation {
    /// The rejection kinds this operation may produce.
    pub fn permitted_rejections(&self) -> &'static [RejectionKind] {
        use RejectionKind::*;
        match self {
            Self::CreateMessage => &[InvalidTag, DuplicateExternalId, Conflict],
            Self::CreateTask => &[
                InvalidTag,
                DuplicateExternalId,
                InvalidReminderTime,
                Conflict,
            ],
            Self::CompleteTask => &[NotificationNotFound, TaskAlreadyCompleted],
            Self::PostponeDeadline => &[NotificationNotFound, InvalidReminderTime],
            Self::CreateCase => &[
                InvalidTag,
                DuplicateGroupId,
                GroupIdReusedAfterDelete,
                Conflict,
            ],
            Self::ChangeCaseStatus => &[CaseNotFound, Conflict],
            Self::Delete => &[NotificationNotFound, CaseNotFound],
        }
    }

    /// Whether `kind` is within this operation's contract.
    pub fn permits(&self, kind: RejectionKind) -> bool {
        self.permitted_rejections().contains(&kind)
    }
}
