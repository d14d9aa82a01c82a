//! Notification view projection.
//!
//! Applies log events into an in-memory read model of messages and tasks.
//! The log delivers at least once, so every applier is idempotent: applying
//! an event a second time leaves the view exactly as it was.
//!
//! Hard deletes poison their aggregate id. A replay that starts after the
//! delete was applied would otherwise re-insert the deleted rows from the
//! surviving creation events; the poison set keeps them out.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use notifyhub_core::AppResult;
use notifyhub_core::event::{Event, EventEnvelope};
use notifyhub_core::types::{Grants, Grouping, NotificationId, TaskState};
use notifyhub_eventlog::EventProcessor;

use crate::model::{
    MessageView, Notification, TaskStateCounts, TaskView, VisibleNotification,
};

/// In-memory notification read model.
pub struct NotificationStore {
    /// Notification id → view row.
    rows: DashMap<NotificationId, Notification>,
    /// (tag, external id) → notification id, for duplicate detection.
    by_external: DashMap<(String, String), NotificationId>,
    /// (notification id, user id) pairs that have been clicked.
    clicks: DashMap<(NotificationId, String), ()>,
    /// Hard-deleted aggregate ids; all their events are ignored.
    hard_deleted: DashMap<Uuid, ()>,
    /// Hard-deleted groupings; creations under them are ignored.
    deleted_groupings: DashMap<Grouping, ()>,
}

impl NotificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            by_external: DashMap::new(),
            clicks: DashMap::new(),
            hard_deleted: DashMap::new(),
            deleted_groupings: DashMap::new(),
        }
    }

    /// Apply one event to the view.
    pub fn apply(&self, envelope: &EventEnvelope) {
        if self.hard_deleted.contains_key(&envelope.aggregate_id) {
            return;
        }

        match &envelope.payload {
            Event::MessageCreated {
                notification_id,
                tag,
                external_id,
                group_id,
                text,
                link,
                recipients,
                created_at,
                ..
            } => {
                let view = Notification::Message(MessageView {
                    id: *notification_id,
                    tenant_id: envelope.tenant_id.clone(),
                    tag: tag.clone(),
                    external_id: external_id.clone(),
                    group_id: group_id.clone(),
                    text: text.clone(),
                    link: link.clone(),
                    recipients: recipients.clone(),
                    created_at: *created_at,
                    deleted: false,
                });
                self.insert(*notification_id, view);
            }
            Event::TaskCreated {
                notification_id,
                tag,
                external_id,
                group_id,
                text,
                link,
                recipients,
                created_at,
                deadline,
                ..
            } => {
                let view = Notification::Task(TaskView {
                    id: *notification_id,
                    tenant_id: envelope.tenant_id.clone(),
                    tag: tag.clone(),
                    external_id: external_id.clone(),
                    group_id: group_id.clone(),
                    text: text.clone(),
                    link: link.clone(),
                    recipients: recipients.clone(),
                    created_at: *created_at,
                    state: TaskState::New,
                    completed_at: None,
                    expired_at: None,
                    reminder_fired_at: None,
                    deadline: *deadline,
                    deleted: false,
                });
                self.insert(*notification_id, view);
            }
            Event::TaskCompleted {
                notification_id,
                completed_at,
                new_link,
                ..
            } => {
                if let Some(mut row) = self.rows.get_mut(notification_id) {
                    if let Notification::Task(task) = row.value_mut() {
                        if let Some(link) = new_link {
                            task.link = link.clone();
                        }
                        if task.state != TaskState::Completed {
                            task.state = TaskState::Completed;
                            task.completed_at = Some(*completed_at);
                        }
                    }
                }
            }
            Event::TaskExpired {
                notification_id,
                expired_at,
                new_link,
                ..
            } => {
                if let Some(mut row) = self.rows.get_mut(notification_id) {
                    if let Notification::Task(task) = row.value_mut() {
                        // Completion and expiry race through the log;
                        // completion wins, so only an open task expires.
                        if task.state == TaskState::New {
                            task.state = TaskState::Expired;
                            task.expired_at = Some(*expired_at);
                            if let Some(link) = new_link {
                                task.link = link.clone();
                            }
                        }
                    }
                }
            }
            Event::DeadlinePostponed {
                notification_id,
                deadline,
                ..
            } => {
                if let Some(mut row) = self.rows.get_mut(notification_id) {
                    if let Notification::Task(task) = row.value_mut() {
                        match task.state {
                            TaskState::Completed => {}
                            TaskState::Expired => {
                                task.state = TaskState::New;
                                task.expired_at = None;
                                task.deadline = Some(*deadline);
                            }
                            TaskState::New => {
                                task.deadline = Some(*deadline);
                            }
                        }
                    }
                }
            }
            Event::ReminderFired {
                notification_id,
                fired_at,
                ..
            } => {
                if let Some(mut row) = self.rows.get_mut(notification_id) {
                    if let Notification::Task(task) = row.value_mut() {
                        task.reminder_fired_at = Some(*fired_at);
                    }
                }
            }
            Event::NotificationClicked {
                notification_id,
                user_id,
            } => {
                if self.rows.contains_key(notification_id) {
                    self.clicks
                        .insert((*notification_id, user_id.clone()), ());
                }
            }
            Event::SoftDeleted { grouping, .. } => match grouping {
                Some(grouping) => {
                    for mut row in self.rows.iter_mut() {
                        if row.grouping().as_ref() == Some(grouping) {
                            row.set_deleted();
                        }
                    }
                }
                None => {
                    let id = NotificationId::from_uuid(envelope.aggregate_id);
                    if let Some(mut row) = self.rows.get_mut(&id) {
                        row.set_deleted();
                    }
                }
            },
            Event::HardDeleted { grouping, .. } => {
                self.hard_deleted.insert(envelope.aggregate_id, ());
                self.remove(NotificationId::from_uuid(envelope.aggregate_id));
                if let Some(grouping) = grouping {
                    self.deleted_groupings.insert(grouping.clone(), ());
                    let members: Vec<NotificationId> = self
                        .rows
                        .iter()
                        .filter(|row| row.grouping().as_ref() == Some(grouping))
                        .map(|row| *row.key())
                        .collect();
                    debug!(
                        "Removing {} notification(s) under hard-deleted grouping '{}'",
                        members.len(),
                        grouping
                    );
                    for id in members {
                        self.hard_deleted.insert(id.into_uuid(), ());
                        self.remove(id);
                    }
                }
            }
            // Case and delivery events do not touch this view.
            Event::CaseCreated { .. }
            | Event::CaseStatusChanged { .. }
            | Event::DeliverySucceeded { .. }
            | Event::DeliveryFailed { .. } => {}
        }
    }

    /// Insert a freshly created notification unless it already exists or
    /// its grouping was hard-deleted.
    fn insert(&self, id: NotificationId, view: Notification) {
        if let Some(grouping) = view.grouping() {
            if self.deleted_groupings.contains_key(&grouping) {
                return;
            }
        }
        let key = match &view {
            Notification::Message(m) => (m.tag.clone(), m.external_id.clone()),
            Notification::Task(t) => (t.tag.clone(), t.external_id.clone()),
        };
        match self.rows.entry(id) {
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(view);
                self.by_external.insert(key, id);
            }
        }
    }

    /// Drop a notification together with its index entry and clicks.
    fn remove(&self, id: NotificationId) {
        if let Some((_, row)) = self.rows.remove(&id) {
            let key = match &row {
                Notification::Message(m) => (m.tag.clone(), m.external_id.clone()),
                Notification::Task(t) => (t.tag.clone(), t.external_id.clone()),
            };
            self.by_external.remove(&key);
        }
        self.clicks.retain(|(click_id, _), _| *click_id != id);
    }

    /// Look up a notification by id.
    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.rows.get(&id).map(|row| row.value().clone())
    }

    /// Look up a notification id by its producer-scoped key.
    pub fn lookup_external(&self, tag: &str, external_id: &str) -> Option<NotificationId> {
        self.by_external
            .get(&(tag.to_string(), external_id.to_string()))
            .map(|entry| *entry.value())
    }

    /// Whether `user_id` has clicked the notification.
    pub fn clicked(&self, id: NotificationId, user_id: &str) -> bool {
        self.clicks.contains_key(&(id, user_id.to_string()))
    }

    /// All notifications visible to a user holding `grants`, newest first.
    ///
    /// A task that has had a reminder fire sorts by the reminder time, so
    /// it resurfaces at the top of the list.
    pub fn visible_for(&self, grants: &Grants, user_id: &str) -> Vec<VisibleNotification> {
        let mut out: Vec<VisibleNotification> = self
            .rows
            .iter()
            .filter(|row| !row.deleted())
            .filter(|row| {
                row.recipients()
                    .iter()
                    .any(|recipient| grants.covers(recipient, user_id))
            })
            .map(|row| VisibleNotification {
                clicked: self.clicked(*row.key(), user_id),
                notification: row.value().clone(),
            })
            .collect();
        out.sort_by(|a, b| {
            b.notification
                .sort_time()
                .cmp(&a.notification.sort_time())
                .then_with(|| a.notification.id().cmp(&b.notification.id()))
        });
        out
    }

    /// All notifications under a grouping, newest first by creation time.
    ///
    /// State changes never move a notification within the timeline.
    pub fn timeline(&self, grouping: &Grouping) -> Vec<Notification> {
        let mut out: Vec<Notification> = self
            .rows
            .iter()
            .filter(|row| !row.deleted())
            .filter(|row| row.grouping().as_ref() == Some(grouping))
            .map(|row| row.value().clone())
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        out
    }

    /// Task counts per state under a grouping.
    pub fn task_state_counts(&self, grouping: &Grouping) -> TaskStateCounts {
        let mut counts = TaskStateCounts::default();
        for row in self.rows.iter() {
            if row.deleted() || row.grouping().as_ref() != Some(grouping) {
                continue;
            }
            if let Notification::Task(task) = row.value() {
                match task.state {
                    TaskState::New => counts.new += 1,
                    TaskState::Completed => counts.completed += 1,
                    TaskState::Expired => counts.expired += 1,
                }
            }
        }
        counts
    }

    /// Number of notifications in the view.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A deterministic copy of the whole view, for state comparison.
    pub fn snapshot(&self) -> NotificationSnapshot {
        let mut rows: Vec<Notification> =
            self.rows.iter().map(|row| row.value().clone()).collect();
        rows.sort_by_key(|n| n.id());
        let mut clicks: Vec<(NotificationId, String)> =
            self.clicks.iter().map(|entry| entry.key().clone()).collect();
        clicks.sort();
        NotificationSnapshot { rows, clicks }
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted dump of a [`NotificationStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSnapshot {
    /// All rows, ordered by notification id.
    pub rows: Vec<Notification>,
    /// All clicks, ordered by (notification id, user id).
    pub clicks: Vec<(NotificationId, String)>,
}

#[async_trait]
impl EventProcessor for NotificationStore {
    fn name(&self) -> &str {
        "notification-view"
    }

    async fn process(&self, envelope: &EventEnvelope) -> AppResult<()> {
        self.apply(envelope);
        Ok(())
    }
}
