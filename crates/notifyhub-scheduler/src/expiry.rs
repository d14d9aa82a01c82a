//! Deadline expiry over open tasks.
//!
//! The table mirrors the deadline of every open task. Once the civil-time
//! calendar moves past a deadline, the service emits `TaskExpired` stamped
//! at the end of the deadline day. Expiry removes the row; a later
//! postponement puts it back, so an expired task can expire again against
//! its new deadline. Completion retires the task for good.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use notifyhub_core::AppResult;
use notifyhub_core::event::{Event, EventEnvelope};
use notifyhub_core::health::Health;
use notifyhub_core::time;
use notifyhub_core::types::{Grouping, NotificationId};
use notifyhub_eventlog::{EventProcessor, EventSink};

/// The deadline of one open task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDeadline {
    /// The task the deadline belongs to.
    pub task_id: NotificationId,
    /// Expiry fires the first civil day after this date.
    pub deadline: NaiveDate,
    /// Grouping the task belongs to, if any.
    pub grouping: Option<Grouping>,
    /// Tenant for the emitted event.
    pub tenant_id: String,
    /// Producer for the emitted event.
    pub producer_id: Option<String>,
}

#[derive(Default)]
struct DeadlineState {
    deadlines: HashMap<NotificationId, TaskDeadline>,
    completed: HashSet<NotificationId>,
    deleted: HashSet<NotificationId>,
    deleted_groupings: HashSet<Grouping>,
}

/// Mirror of the deadlines of all open tasks.
pub struct DeadlineTable {
    state: Mutex<DeadlineState>,
}

impl DeadlineTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeadlineState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeadlineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one event to the table.
    pub fn apply(&self, envelope: &EventEnvelope) {
        let mut state = self.lock();
        match &envelope.payload {
            Event::TaskCreated {
                notification_id,
                deadline,
                ..
            } => {
                let Some(deadline) = deadline else {
                    return;
                };
                if state.deleted.contains(notification_id) {
                    return;
                }
                let grouping = envelope.grouping();
                if let Some(grouping) = &grouping {
                    if state.deleted_groupings.contains(grouping) {
                        return;
                    }
                }
                state
                    .deadlines
                    .entry(*notification_id)
                    .or_insert(TaskDeadline {
                        task_id: *notification_id,
                        deadline: *deadline,
                        grouping,
                        tenant_id: envelope.tenant_id.clone(),
                        producer_id: envelope.producer_id.clone(),
                    });
            }
            Event::DeadlinePostponed {
                notification_id,
                deadline,
                ..
            } => {
                if state.deleted.contains(notification_id)
                    || state.completed.contains(notification_id)
                {
                    return;
                }
                // Re-arms a task whose row was removed by expiry.
                state
                    .deadlines
                    .entry(*notification_id)
                    .and_modify(|row| row.deadline = *deadline)
                    .or_insert(TaskDeadline {
                        task_id: *notification_id,
                        deadline: *deadline,
                        grouping: None,
                        tenant_id: envelope.tenant_id.clone(),
                        producer_id: envelope.producer_id.clone(),
                    });
            }
            Event::TaskCompleted {
                notification_id, ..
            } => {
                state.deadlines.remove(notification_id);
                state.completed.insert(*notification_id);
            }
            Event::TaskExpired {
                notification_id, ..
            } => {
                state.deadlines.remove(notification_id);
            }
            Event::SoftDeleted { grouping, .. } | Event::HardDeleted { grouping, .. } => {
                match grouping {
                    Some(grouping) => {
                        state.deleted_groupings.insert(grouping.clone());
                        state
                            .deadlines
                            .retain(|_, row| row.grouping.as_ref() != Some(grouping));
                    }
                    None => {
                        let id = NotificationId::from_uuid(envelope.aggregate_id);
                        state.deadlines.remove(&id);
                        state.deleted.insert(id);
                    }
                }
            }
            Event::MessageCreated { .. }
            | Event::ReminderFired { .. }
            | Event::CaseCreated { .. }
            | Event::CaseStatusChanged { .. }
            | Event::NotificationClicked { .. }
            | Event::DeliverySucceeded { .. }
            | Event::DeliveryFailed { .. } => {}
        }
    }

    /// Remove and return every task whose deadline lies before `today`.
    pub fn take_expired(&self, today: NaiveDate) -> Vec<TaskDeadline> {
        let mut state = self.lock();
        let due: Vec<NotificationId> = state
            .deadlines
            .values()
            .filter(|row| row.deadline < today)
            .map(|row| row.task_id)
            .collect();

        let mut taken: Vec<TaskDeadline> = due
            .into_iter()
            .filter_map(|id| state.deadlines.remove(&id))
            .collect();
        taken.sort_by(|a, b| (a.deadline, a.task_id).cmp(&(b.deadline, b.task_id)));
        taken
    }

    /// Put taken rows back, undoing a partially failed dispatch.
    pub fn restore(&self, rows: Vec<TaskDeadline>) {
        let mut state = self.lock();
        for row in rows {
            state.deadlines.insert(row.task_id, row);
        }
    }

    /// Number of tracked deadlines.
    pub fn len(&self) -> usize {
        self.lock().deadlines.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().deadlines.is_empty()
    }
}

impl Default for DeadlineTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumes the log into a [`DeadlineTable`] and expires overdue tasks.
pub struct ExpiryService {
    table: DeadlineTable,
    sink: Arc<dyn EventSink>,
    health: Arc<Health>,
    source_app: String,
}

impl ExpiryService {
    /// Create the service.
    pub fn new(sink: Arc<dyn EventSink>, health: Arc<Health>, source_app: impl Into<String>) -> Self {
        Self {
            table: DeadlineTable::new(),
            sink,
            health,
            source_app: source_app.into(),
        }
    }

    /// The underlying deadline table.
    pub fn table(&self) -> &DeadlineTable {
        &self.table
    }

    /// Expire every task overdue at `now`; returns how many expired.
    ///
    /// A deadline is overdue once the civil date at `now` has moved past
    /// it. The emitted event is stamped at the end of the deadline day,
    /// not at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let today = time::civil_date(now);
        let due = self.table.take_expired(today);
        if due.is_empty() {
            return Ok(0);
        }
        debug!("Expiring {} overdue task(s)", due.len());

        let count = due.len();
        for (index, row) in due.iter().enumerate() {
            let envelope = EventEnvelope::new(
                row.task_id.into_uuid(),
                row.tenant_id.clone(),
                row.producer_id.clone(),
                self.source_app.clone(),
                Event::TaskExpired {
                    notification_id: row.task_id,
                    expired_at: time::end_of_day(row.deadline),
                    new_link: None,
                    auto_delete_update: None,
                },
            );
            if let Err(e) = self.sink.publish(envelope).await {
                self.table.restore(due[index..].to_vec());
                return Err(e);
            }
            self.health
                .metrics
                .tasks_expired
                .fetch_add(1, Ordering::Relaxed);
        }
        Ok(count)
    }
}

#[async_trait]
impl EventProcessor for ExpiryService {
    fn name(&self) -> &str {
        "expiry-scheduler"
    }

    async fn process(&self, envelope: &EventEnvelope) -> AppResult<()> {
        self.table.apply(envelope);
        Ok(())
    }
}
