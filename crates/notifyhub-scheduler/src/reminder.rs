//! Reminder order scheduling and dispatch.
//!
//! The queue mirrors reminder orders from the log. Creation and
//! postponement events place orders; firing closes them; deletes retire
//! the task so its orders never dispatch. A timer takes due orders and
//! publishes `ReminderFired`, which flows back through the log and closes
//! the order everywhere.
//!
//! Order ids are the id of the event that placed the order, so a
//! redelivered placement maps onto the same order. The closed set keeps a
//! fired or cancelled order from being re-placed by such a redelivery.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use notifyhub_core::AppResult;
use notifyhub_core::event::{Event, EventEnvelope, ReminderSchedule};
use notifyhub_core::health::Health;
use notifyhub_core::types::{ChannelRequest, Grouping, NotificationId, OrderId};
use notifyhub_eventlog::{EventProcessor, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskLifecycle {
    Active,
    Completed,
    Deleted,
}

#[derive(Debug)]
struct TaskEntry {
    lifecycle: TaskLifecycle,
    grouping: Option<Grouping>,
}

/// One pending reminder order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderOrder {
    /// Order id; the id of the event that placed the order.
    pub order_id: OrderId,
    /// The task the reminder belongs to.
    pub task_id: NotificationId,
    /// The task's deadline when the order was placed.
    pub deadline: Option<NaiveDate>,
    /// The schedule to honor.
    pub schedule: ReminderSchedule,
    /// Channel messages dispatched with the reminder.
    pub channels: Vec<ChannelRequest>,
    /// Tenant for the emitted event.
    pub tenant_id: String,
    /// Producer for the emitted event.
    pub producer_id: Option<String>,
}

#[derive(Default)]
struct QueueState {
    tasks: HashMap<NotificationId, TaskEntry>,
    orders: HashMap<OrderId, ReminderOrder>,
    by_task: HashMap<NotificationId, Vec<OrderId>>,
    closed: HashSet<OrderId>,
    deleted_groupings: HashSet<Grouping>,
}

impl QueueState {
    fn place(&mut self, order: ReminderOrder) {
        if self.closed.contains(&order.order_id) || self.orders.contains_key(&order.order_id) {
            return;
        }
        self.by_task
            .entry(order.task_id)
            .or_default()
            .push(order.order_id);
        self.orders.insert(order.order_id, order);
    }

    fn close(&mut self, order_id: OrderId) {
        self.closed.insert(order_id);
        if let Some(order) = self.orders.remove(&order_id) {
            if let Some(ids) = self.by_task.get_mut(&order.task_id) {
                ids.retain(|id| *id != order_id);
                if ids.is_empty() {
                    self.by_task.remove(&order.task_id);
                }
            }
        }
    }

    fn close_all_for(&mut self, task_id: NotificationId) {
        for order_id in self.by_task.remove(&task_id).unwrap_or_default() {
            self.orders.remove(&order_id);
            self.closed.insert(order_id);
        }
    }

    // Deleted is absorbing; a task entry is created when missing so a
    // replayed creation cannot resurrect a deleted task.
    fn mark(&mut self, task_id: NotificationId, lifecycle: TaskLifecycle) {
        let entry = self.tasks.entry(task_id).or_insert(TaskEntry {
            lifecycle,
            grouping: None,
        });
        if entry.lifecycle != TaskLifecycle::Deleted {
            entry.lifecycle = lifecycle;
        }
    }

    fn dispatchable(&self, order: &ReminderOrder) -> bool {
        match self.tasks.get(&order.task_id) {
            Some(task) if task.lifecycle == TaskLifecycle::Active => match &task.grouping {
                Some(grouping) => !self.deleted_groupings.contains(grouping),
                None => true,
            },
            _ => false,
        }
    }
}

/// Mirror of all pending reminder orders.
///
/// A single mutex guards the state; applying an event and taking due
/// orders both touch several tables and must be atomic.
pub struct ReminderQueue {
    state: Mutex<QueueState>,
}

impl ReminderQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one event to the queue.
    pub fn apply(&self, envelope: &EventEnvelope) {
        let mut state = self.lock();
        match &envelope.payload {
            Event::TaskCreated {
                notification_id,
                deadline,
                reminder,
                ..
            } => {
                let grouping = envelope.grouping();
                state.tasks.entry(*notification_id).or_insert(TaskEntry {
                    lifecycle: TaskLifecycle::Active,
                    grouping,
                });
                if let Some(reminder) = reminder {
                    state.place(ReminderOrder {
                        order_id: envelope.event_id.into(),
                        task_id: *notification_id,
                        deadline: *deadline,
                        schedule: reminder.schedule.clone(),
                        channels: reminder.channels.clone(),
                        tenant_id: envelope.tenant_id.clone(),
                        producer_id: envelope.producer_id.clone(),
                    });
                }
            }
            Event::DeadlinePostponed {
                notification_id,
                deadline,
                reminder,
                ..
            } => {
                // Orders against the old deadline are void either way; a
                // fresh one is armed only while the task is still open.
                state.close_all_for(*notification_id);
                let active = state
                    .tasks
                    .get(notification_id)
                    .is_some_and(|t| t.lifecycle == TaskLifecycle::Active);
                if active {
                    if let Some(reminder) = reminder {
                        state.place(ReminderOrder {
                            order_id: envelope.event_id.into(),
                            task_id: *notification_id,
                            deadline: Some(*deadline),
                            schedule: reminder.schedule.clone(),
                            channels: reminder.channels.clone(),
                            tenant_id: envelope.tenant_id.clone(),
                            producer_id: envelope.producer_id.clone(),
                        });
                    }
                }
            }
            Event::ReminderFired { order_id, .. } => {
                state.close(*order_id);
            }
            Event::TaskCompleted {
                notification_id, ..
            } => {
                state.mark(*notification_id, TaskLifecycle::Completed);
            }
            Event::TaskExpired {
                notification_id, ..
            } => {
                // The task stays Active: a later postponement may re-arm
                // a reminder against the new deadline.
                state.close_all_for(*notification_id);
            }
            Event::SoftDeleted { grouping, .. } | Event::HardDeleted { grouping, .. } => {
                match grouping {
                    Some(grouping) => {
                        state.deleted_groupings.insert(grouping.clone());
                        let members: Vec<NotificationId> = state
                            .tasks
                            .iter()
                            .filter(|(_, entry)| entry.grouping.as_ref() == Some(grouping))
                            .map(|(id, _)| *id)
                            .collect();
                        for id in members {
                            state.mark(id, TaskLifecycle::Deleted);
                        }
                    }
                    None => {
                        state.mark(
                            NotificationId::from_uuid(envelope.aggregate_id),
                            TaskLifecycle::Deleted,
                        );
                    }
                }
            }
            Event::MessageCreated { .. }
            | Event::CaseCreated { .. }
            | Event::CaseStatusChanged { .. }
            | Event::NotificationClicked { .. }
            | Event::DeliverySucceeded { .. }
            | Event::DeliveryFailed { .. } => {}
        }
    }

    /// Remove and return every due, dispatchable order.
    ///
    /// Due orders whose task is completed or deleted are dropped here
    /// without dispatching; their task will never become active again.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ReminderOrder> {
        let mut state = self.lock();
        let due: Vec<OrderId> = state
            .orders
            .values()
            .filter(|order| order.schedule.fire_at() <= now)
            .map(|order| order.order_id)
            .collect();

        let mut taken = Vec::new();
        for order_id in due {
            let Some(order) = state.orders.remove(&order_id) else {
                continue;
            };
            if let Some(ids) = state.by_task.get_mut(&order.task_id) {
                ids.retain(|id| *id != order_id);
                if ids.is_empty() {
                    state.by_task.remove(&order.task_id);
                }
            }
            state.closed.insert(order_id);
            if state.dispatchable(&order) {
                taken.push(order);
            }
        }
        taken.sort_by(|a, b| {
            (a.schedule.fire_at(), a.order_id).cmp(&(b.schedule.fire_at(), b.order_id))
        });
        taken
    }

    /// Put taken orders back, undoing a partially failed dispatch.
    pub fn restore(&self, orders: Vec<ReminderOrder>) {
        let mut state = self.lock();
        for order in orders {
            state.closed.remove(&order.order_id);
            state
                .by_task
                .entry(order.task_id)
                .or_default()
                .push(order.order_id);
            state.orders.insert(order.order_id, order);
        }
    }

    /// Number of pending orders.
    pub fn pending(&self) -> usize {
        self.lock().orders.len()
    }

    /// Whether an order is pending.
    pub fn has_order(&self, order_id: OrderId) -> bool {
        self.lock().orders.contains_key(&order_id)
    }
}

impl Default for ReminderQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumes the log into a [`ReminderQueue`] and dispatches due orders.
pub struct ReminderService {
    queue: ReminderQueue,
    sink: Arc<dyn EventSink>,
    health: Arc<Health>,
    source_app: String,
}

impl ReminderService {
    /// Create the service.
    pub fn new(sink: Arc<dyn EventSink>, health: Arc<Health>, source_app: impl Into<String>) -> Self {
        Self {
            queue: ReminderQueue::new(),
            sink,
            health,
            source_app: source_app.into(),
        }
    }

    /// The underlying order queue.
    pub fn queue(&self) -> &ReminderQueue {
        &self.queue
    }

    /// Dispatch every order due at `now`; returns how many fired.
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let due = self.queue.take_due(now);
        if due.is_empty() {
            return Ok(0);
        }
        debug!("Dispatching {} due reminder order(s)", due.len());

        let count = due.len();
        for (index, order) in due.iter().enumerate() {
            let envelope = EventEnvelope::new(
                order.task_id.into_uuid(),
                order.tenant_id.clone(),
                order.producer_id.clone(),
                self.source_app.clone(),
                Event::ReminderFired {
                    notification_id: order.task_id,
                    order_id: order.order_id,
                    fired_at: now,
                    deadline: order.deadline,
                    schedule: order.schedule.clone(),
                    channels: order.channels.clone(),
                },
            );
            if let Err(e) = self.sink.publish(envelope).await {
                // Unsent orders go back so the next tick retries them.
                self.queue.restore(due[index..].to_vec());
                return Err(e);
            }
            self.health
                .metrics
                .reminders_dispatched
                .fetch_add(1, Ordering::Relaxed);
        }
        Ok(count)
    }
}

#[async_trait]
impl EventProcessor for ReminderService {
    fn name(&self) -> &str {
        "reminder-scheduler"
    }

    async fn process(&self, envelope: &EventEnvelope) -> AppResult<()> {
        self.queue.apply(envelope);
        Ok(())
    }
}
