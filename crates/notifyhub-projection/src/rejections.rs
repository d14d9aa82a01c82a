//! Producer request validation.
//!
//! Checks a producer request against current projection state before the
//! corresponding event is published. A failed check is a [`Rejection`],
//! not an error: the request was understood and deterministically refused.
//!
//! Every check only issues kinds its [`Operation`] advertises; the helper
//! asserts the contract in debug builds.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};

use notifyhub_core::event::ReminderSpec;
use notifyhub_core::rejection::{Operation, Rejection, RejectionKind};
use notifyhub_core::types::{CaseId, Grouping, NotificationId, TaskState};

use crate::case_store::CaseStore;
use crate::model::Notification;
use crate::notification_store::NotificationStore;

/// Validates producer requests against the projected state.
pub struct RequestValidator {
    notifications: Arc<NotificationStore>,
    cases: Arc<CaseStore>,
}

impl RequestValidator {
    /// Create a validator over both views.
    pub fn new(notifications: Arc<NotificationStore>, cases: Arc<CaseStore>) -> Self {
        Self {
            notifications,
            cases,
        }
    }

    /// Check a message creation request.
    pub fn check_create_message(&self, tag: &str, external_id: &str) -> Result<(), Rejection> {
        const OP: Operation = Operation::CreateMessage;
        check_tag(OP, tag)?;
        if let Some(existing) = self.notifications.lookup_external(tag, external_id) {
            return refuse(
                OP,
                Rejection::duplicate(
                    RejectionKind::DuplicateExternalId,
                    format!("a notification with external id '{external_id}' already exists under tag '{tag}'"),
                    existing.into_uuid(),
                ),
            );
        }
        Ok(())
    }

    /// Check a task creation request, including its reminder.
    pub fn check_create_task(
        &self,
        tag: &str,
        external_id: &str,
        created_at: DateTime<FixedOffset>,
        deadline: Option<NaiveDate>,
        reminder: Option<&ReminderSpec>,
    ) -> Result<(), Rejection> {
        const OP: Operation = Operation::CreateTask;
        check_tag(OP, tag)?;
        if let Some(existing) = self.notifications.lookup_external(tag, external_id) {
            return refuse(
                OP,
                Rejection::duplicate(
                    RejectionKind::DuplicateExternalId,
                    format!("a notification with external id '{external_id}' already exists under tag '{tag}'"),
                    existing.into_uuid(),
                ),
            );
        }
        if let Some(reminder) = reminder {
            if let Err(reason) = reminder.schedule.validate(created_at, deadline) {
                return refuse(
                    OP,
                    Rejection::new(RejectionKind::InvalidReminderTime, reason),
                );
            }
        }
        Ok(())
    }

    /// Check a task completion request.
    pub fn check_complete_task(&self, id: NotificationId) -> Result<(), Rejection> {
        const OP: Operation = Operation::CompleteTask;
        match self.notifications.get(id) {
            Some(Notification::Task(task)) => {
                if task.state == TaskState::Completed {
                    return refuse(
                        OP,
                        Rejection::new(
                            RejectionKind::TaskAlreadyCompleted,
                            format!("task '{id}' is already completed"),
                        ),
                    );
                }
                Ok(())
            }
            Some(Notification::Message(_)) | None => refuse(
                OP,
                Rejection::new(
                    RejectionKind::NotificationNotFound,
                    format!("no task with id '{id}'"),
                ),
            ),
        }
    }

    /// Check a deadline postponement, including the replacement reminder.
    ///
    /// Postponing a completed task is permitted; the views ignore it.
    pub fn check_postpone_deadline(
        &self,
        id: NotificationId,
        new_deadline: NaiveDate,
        reminder: Option<&ReminderSpec>,
    ) -> Result<(), Rejection> {
        const OP: Operation = Operation::PostponeDeadline;
        let task = match self.notifications.get(id) {
            Some(Notification::Task(task)) => task,
            Some(Notification::Message(_)) | None => {
                return refuse(
                    OP,
                    Rejection::new(
                        RejectionKind::NotificationNotFound,
                        format!("no task with id '{id}'"),
                    ),
                );
            }
        };
        if let Some(reminder) = reminder {
            if let Err(reason) = reminder
                .schedule
                .validate(task.created_at, Some(new_deadline))
            {
                return refuse(
                    OP,
                    Rejection::new(RejectionKind::InvalidReminderTime, reason),
                );
            }
        }
        Ok(())
    }

    /// Check a case creation request.
    pub fn check_create_case(&self, tag: &str, group_id: &str) -> Result<(), Rejection> {
        const OP: Operation = Operation::CreateCase;
        check_tag(OP, tag)?;
        let grouping = Grouping::new(tag, group_id);
        if self.cases.grouping_deleted(&grouping) {
            return refuse(
                OP,
                Rejection::new(
                    RejectionKind::GroupIdReusedAfterDelete,
                    format!("group id '{group_id}' belonged to a deleted case and cannot be reused"),
                ),
            );
        }
        if let Some(existing) = self.cases.lookup_grouping(&grouping) {
            return refuse(
                OP,
                Rejection::duplicate(
                    RejectionKind::DuplicateGroupId,
                    format!("a case with group id '{group_id}' already exists under tag '{tag}'"),
                    existing.into_uuid(),
                ),
            );
        }
        Ok(())
    }

    /// Check a case status report.
    pub fn check_change_case_status(&self, id: CaseId) -> Result<(), Rejection> {
        const OP: Operation = Operation::ChangeCaseStatus;
        if self.cases.get(id).is_none() {
            return refuse(
                OP,
                Rejection::new(
                    RejectionKind::CaseNotFound,
                    format!("no case with id '{id}'"),
                ),
            );
        }
        Ok(())
    }

    /// Check a delete targeting a notification.
    pub fn check_delete_notification(&self, id: NotificationId) -> Result<(), Rejection> {
        const OP: Operation = Operation::Delete;
        if self.notifications.get(id).is_none() {
            return refuse(
                OP,
                Rejection::new(
                    RejectionKind::NotificationNotFound,
                    format!("no notification with id '{id}'"),
                ),
            );
        }
        Ok(())
    }

    /// Check a delete targeting a case.
    pub fn check_delete_case(&self, id: CaseId) -> Result<(), Rejection> {
        const OP: Operation = Operation::Delete;
        if self.cases.get(id).is_none() {
            return refuse(
                OP,
                Rejection::new(RejectionKind::CaseNotFound, format!("no case with id '{id}'")),
            );
        }
        Ok(())
    }
}

fn check_tag(operation: Operation, tag: &str) -> Result<(), Rejection> {
    if tag.trim().is_empty() {
        return refuse(
            operation,
            Rejection::new(RejectionKind::InvalidTag, "tag must not be blank"),
        );
    }
    Ok(())
}

/// Issue a rejection after asserting it is within the operation's contract.
fn refuse(operation: Operation, rejection: Rejection) -> Result<(), Rejection> {
    debug_assert!(
        operation.permits(rejection.kind),
        "{operation:?} does not permit {}",
        rejection.kind
    );
    Err(rejection)
}
