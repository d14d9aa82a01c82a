//! Scheduled hard deletes and the grouping cascade.
//!
//! The store mirrors every live aggregate, its auto-delete schedule, and
//! grouping membership. Purging is two steps on the same timer:
//!
//! 1. Dispatch: aggregates whose computed purge time has passed get one
//!    `HardDeleted` event each. A case's event carries its grouping so
//!    downstream views can cascade. The store keeps the row until the
//!    emitted event comes back through the log.
//! 2. Cascade: observed hard deletes of a grouping fan out to one
//!    `HardDeleted` per member notification, with membership resolved at
//!    cascade time, then the store forgets the aggregate.
//!
//! Dispatch re-checks every selected purge time against the cutoff. A row
//! that is not actually due marks the service unhealthy and aborts the
//! batch without emitting anything.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error};
use uuid::Uuid;

use notifyhub_core::event::{DeleteScheduleUpdate, Event, EventEnvelope};
use notifyhub_core::health::{Health, Subsystem};
use notifyhub_core::types::Grouping;
use notifyhub_core::{AppError, AppResult};
use notifyhub_eventlog::{EventProcessor, EventSink};

/// What kind of aggregate a tracked id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Message,
    Task,
    Case,
}

#[derive(Debug, Clone)]
struct AggregateInfo {
    kind: AggregateKind,
    grouping: Option<Grouping>,
    tenant_id: String,
    producer_id: Option<String>,
}

/// One aggregate due for purging.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledPurge {
    /// The aggregate to purge.
    pub aggregate_id: Uuid,
    /// When the aggregate becomes purgeable.
    pub purge_at: DateTime<Utc>,
    /// The aggregate's kind.
    pub kind: AggregateKind,
    /// The aggregate's grouping, if any.
    pub grouping: Option<Grouping>,
    /// Tenant for the emitted event.
    pub tenant_id: String,
    /// Producer for the emitted event.
    pub producer_id: Option<String>,
}

/// A hard delete observed on the log, waiting for its cascade step.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredDelete {
    /// The aggregate that was hard-deleted.
    pub aggregate_id: Uuid,
    /// Grouping to fan out over, if the delete targets one.
    pub grouping: Option<Grouping>,
}

/// A notification belonging to a grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    /// The member aggregate.
    pub aggregate_id: Uuid,
    /// Tenant for the emitted event.
    pub tenant_id: String,
    /// Producer for the emitted event.
    pub producer_id: Option<String>,
}

#[derive(Default)]
struct PurgeState {
    info: HashMap<Uuid, AggregateInfo>,
    scheduled: HashMap<Uuid, DateTime<Utc>>,
    memberships: HashMap<Grouping, BTreeSet<Uuid>>,
    registered: VecDeque<RegisteredDelete>,
    deleted: HashSet<Uuid>,
    deleted_groupings: HashSet<Grouping>,
}

/// Mirror of live aggregates, their purge schedules, and pending cascades.
pub struct PurgeStore {
    state: Mutex<PurgeState>,
}

impl PurgeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PurgeState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PurgeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one event to the store.
    pub fn apply(&self, envelope: &EventEnvelope) {
        let mut state = self.lock();
        let id = envelope.aggregate_id;
        match &envelope.payload {
            Event::MessageCreated {
                created_at,
                auto_delete,
                ..
            } => {
                Self::track(
                    &mut state,
                    envelope,
                    AggregateKind::Message,
                    auto_delete
                        .as_ref()
                        .map(|s| s.computed_at(created_at.with_timezone(&Utc))),
                );
            }
            Event::TaskCreated {
                created_at,
                auto_delete,
                ..
            } => {
                Self::track(
                    &mut state,
                    envelope,
                    AggregateKind::Task,
                    auto_delete
                        .as_ref()
                        .map(|s| s.computed_at(created_at.with_timezone(&Utc))),
                );
            }
            Event::CaseCreated {
                received_at,
                auto_delete,
                ..
            } => {
                Self::track(
                    &mut state,
                    envelope,
                    AggregateKind::Case,
                    auto_delete.as_ref().map(|s| s.computed_at(*received_at)),
                );
            }
            Event::TaskCompleted {
                completed_at,
                auto_delete_update,
                ..
            } => {
                if let Some(update) = auto_delete_update {
                    Self::reschedule(&mut state, id, update, completed_at.with_timezone(&Utc));
                }
            }
            Event::TaskExpired {
                expired_at,
                auto_delete_update,
                ..
            } => {
                if let Some(update) = auto_delete_update {
                    Self::reschedule(&mut state, id, update, expired_at.with_timezone(&Utc));
                }
            }
            Event::CaseStatusChanged {
                received_at,
                auto_delete_update,
                ..
            } => {
                if let Some(update) = auto_delete_update {
                    Self::reschedule(&mut state, id, update, *received_at);
                }
            }
            Event::HardDeleted { .. } => {
                if state.deleted.insert(id) {
                    // A case hard delete cascades even when the event
                    // itself carries no grouping.
                    let cascade_grouping = envelope.grouping().or_else(|| {
                        state.info.get(&id).and_then(|info| {
                            (info.kind == AggregateKind::Case)
                                .then(|| info.grouping.clone())
                                .flatten()
                        })
                    });
                    if let Some(grouping) = &cascade_grouping {
                        state.deleted_groupings.insert(grouping.clone());
                    }
                    state.scheduled.remove(&id);
                    state.registered.push_back(RegisteredDelete {
                        aggregate_id: id,
                        grouping: cascade_grouping,
                    });
                }
            }
            Event::DeadlinePostponed { .. }
            | Event::ReminderFired { .. }
            | Event::NotificationClicked { .. }
            | Event::SoftDeleted { .. }
            | Event::DeliverySucceeded { .. }
            | Event::DeliveryFailed { .. } => {}
        }
    }

    fn track(
        state: &mut PurgeState,
        envelope: &EventEnvelope,
        kind: AggregateKind,
        purge_at: Option<DateTime<Utc>>,
    ) {
        let id = envelope.aggregate_id;
        if state.deleted.contains(&id) {
            return;
        }
        let grouping = envelope.grouping();
        if let Some(grouping) = &grouping {
            if state.deleted_groupings.contains(grouping) {
                return;
            }
            // Only notifications under a case cascade; the case itself
            // is the cascade source.
            if kind != AggregateKind::Case {
                state
                    .memberships
                    .entry(grouping.clone())
                    .or_default()
                    .insert(id);
            }
        }
        state.info.entry(id).or_insert(AggregateInfo {
            kind,
            grouping,
            tenant_id: envelope.tenant_id.clone(),
            producer_id: envelope.producer_id.clone(),
        });
        if let Some(purge_at) = purge_at {
            state.scheduled.entry(id).or_insert(purge_at);
        }
    }

    fn reschedule(
        state: &mut PurgeState,
        id: Uuid,
        update: &DeleteScheduleUpdate,
        base: DateTime<Utc>,
    ) {
        if state.deleted.contains(&id) {
            return;
        }
        let existing = state.scheduled.get(&id).copied();
        let merged = update.strategy.merge(existing, update.schedule.computed_at(base));
        state.scheduled.insert(id, merged);
    }

    /// Aggregates purgeable at `cutoff`, without removing them.
    ///
    /// Rows stay until the emitted `HardDeleted` comes back through the
    /// log, so a crashed dispatch is retried rather than lost.
    pub fn due_before(&self, cutoff: DateTime<Utc>) -> Vec<ScheduledPurge> {
        let state = self.lock();
        let mut due: Vec<ScheduledPurge> = state
            .scheduled
            .iter()
            .filter(|(_, purge_at)| **purge_at <= cutoff)
            .filter_map(|(id, purge_at)| {
                state.info.get(id).map(|info| ScheduledPurge {
                    aggregate_id: *id,
                    purge_at: *purge_at,
                    kind: info.kind,
                    grouping: info.grouping.clone(),
                    tenant_id: info.tenant_id.clone(),
                    producer_id: info.producer_id.clone(),
                })
            })
            .collect();
        due.sort_by(|a, b| (a.purge_at, a.aggregate_id).cmp(&(b.purge_at, b.aggregate_id)));
        due
    }

    /// Remove and return every delete waiting for its cascade step.
    pub fn take_registered(&self) -> Vec<RegisteredDelete> {
        self.lock().registered.drain(..).collect()
    }

    /// Put taken deletes back at the front, preserving order.
    pub fn restore_registered(&self, deletes: Vec<RegisteredDelete>) {
        let mut state = self.lock();
        for delete in deletes.into_iter().rev() {
            state.registered.push_front(delete);
        }
    }

    /// The notifications currently belonging to a grouping.
    pub fn members_of(&self, grouping: &Grouping) -> Vec<GroupMember> {
        let state = self.lock();
        state
            .memberships
            .get(grouping)
            .into_iter()
            .flatten()
            .filter_map(|id| {
                state.info.get(id).map(|info| GroupMember {
                    aggregate_id: *id,
                    tenant_id: info.tenant_id.clone(),
                    producer_id: info.producer_id.clone(),
                })
            })
            .collect()
    }

    /// Forget a hard-deleted aggregate.
    pub fn purge_local(&self, aggregate_id: Uuid) {
        let mut state = self.lock();
        if let Some(info) = state.info.remove(&aggregate_id) {
            if let Some(grouping) = info.grouping {
                if let Some(members) = state.memberships.get_mut(&grouping) {
                    members.remove(&aggregate_id);
                    if members.is_empty() {
                        state.memberships.remove(&grouping);
                    }
                }
            }
        }
        state.scheduled.remove(&aggregate_id);
    }

    /// Number of tracked aggregates.
    pub fn len(&self) -> usize {
        self.lock().info.len()
    }

    /// Whether the store tracks no aggregates.
    pub fn is_empty(&self) -> bool {
        self.lock().info.is_empty()
    }

    /// Number of deletes waiting for their cascade step.
    pub fn registered_count(&self) -> usize {
        self.lock().registered.len()
    }
}

impl Default for PurgeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumes the log into a [`PurgeStore`] and runs both purge steps.
pub struct PurgeService {
    store: PurgeStore,
    sink: Arc<dyn EventSink>,
    health: Arc<Health>,
    source_app: String,
    grace: chrono::Duration,
}

impl PurgeService {
    /// Create the service. `grace` widens the selection window past
    /// `now`, so a purge never lands later than promised.
    pub fn new(
        sink: Arc<dyn EventSink>,
        health: Arc<Health>,
        source_app: impl Into<String>,
        grace: std::time::Duration,
    ) -> Self {
        Self {
            store: PurgeStore::new(),
            sink,
            health,
            source_app: source_app.into(),
            grace: chrono::Duration::from_std(grace)
                .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &PurgeStore {
        &self.store
    }

    /// Run dispatch then cascade; returns how many events were emitted.
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let dispatched = self.dispatch_due(now).await?;
        let cascaded = self.cascade_registered(now).await?;
        Ok(dispatched + cascaded)
    }

    async fn dispatch_due(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let cutoff = now
            .checked_add_signed(self.grace)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let due = self.store.due_before(cutoff);
        self.dispatch_batch(due, cutoff).await
    }

    /// Emit one `HardDeleted` per selected row, after re-checking that
    /// every row is actually due at `cutoff`.
    pub async fn dispatch_batch(
        &self,
        due: Vec<ScheduledPurge>,
        cutoff: DateTime<Utc>,
    ) -> AppResult<usize> {
        if due.is_empty() {
            return Ok(0);
        }
        if let Some(row) = due.iter().find(|row| row.purge_at > cutoff) {
            error!(
                "Refusing purge dispatch: aggregate {} is scheduled for {} which is after {}",
                row.aggregate_id, row.purge_at, cutoff
            );
            self.health.set_unhealthy(Subsystem::PurgeService);
            return Err(AppError::scheduler(format!(
                "purge batch contains aggregate {} not yet due",
                row.aggregate_id
            )));
        }
        debug!("Dispatching {} scheduled purge(s)", due.len());

        let count = due.len();
        for row in due {
            let grouping = match row.kind {
                AggregateKind::Case => row.grouping.clone(),
                AggregateKind::Message | AggregateKind::Task => None,
            };
            let envelope = EventEnvelope::new(
                row.aggregate_id,
                row.tenant_id.clone(),
                row.producer_id.clone(),
                self.source_app.clone(),
                Event::HardDeleted {
                    grouping,
                    deleted_at: cutoff,
                },
            );
            self.sink.publish(envelope).await?;
            self.health
                .metrics
                .purges_dispatched
                .fetch_add(1, Ordering::Relaxed);
        }
        Ok(count)
    }

    async fn cascade_registered(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let registered = self.store.take_registered();
        if registered.is_empty() {
            return Ok(0);
        }
        debug!("Cascading {} registered hard delete(s)", registered.len());

        let mut emitted = 0;
        for (index, entry) in registered.iter().enumerate() {
            if let Some(grouping) = &entry.grouping {
                // Membership is resolved now, not when the delete was
                // observed, so late-arriving members are still caught.
                for member in self.store.members_of(grouping) {
                    let envelope = EventEnvelope::new(
                        member.aggregate_id,
                        member.tenant_id.clone(),
                        member.producer_id.clone(),
                        self.source_app.clone(),
                        Event::HardDeleted {
                            grouping: None,
                            deleted_at: now,
                        },
                    );
                    if let Err(e) = self.sink.publish(envelope).await {
                        self.store.restore_registered(registered[index..].to_vec());
                        return Err(e);
                    }
                    self.health
                        .metrics
                        .purges_dispatched
                        .fetch_add(1, Ordering::Relaxed);
                    emitted += 1;
                }
            }
            self.store.purge_local(entry.aggregate_id);
        }
        Ok(emitted)
    }
}

#[async_trait]
impl EventProcessor for PurgeService {
    fn name(&self) -> &str {
        "purge-scheduler"
    }

    async fn process(&self, envelope: &EventEnvelope) -> AppResult<()> {
        self.store.apply(envelope);
        Ok(())
    }
}
