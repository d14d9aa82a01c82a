//! Case view projection.
//!
//! Applies log events into an in-memory read model of cases and their
//! status timelines. Appliers are idempotent; status retries are folded
//! away by the producer-chosen idempotency key.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use notifyhub_core::AppResult;
use notifyhub_core::event::{Event, EventEnvelope};
use notifyhub_core::types::{CaseId, Grants, Grouping};
use notifyhub_eventlog::EventProcessor;

use crate::model::{CaseView, StatusEntry};

/// In-memory case read model.
pub struct CaseStore {
    /// Case id → view row.
    cases: DashMap<CaseId, CaseView>,
    /// Grouping → owning case. First case wins; later claims are ignored.
    by_grouping: DashMap<Grouping, CaseId>,
    /// Groupings whose case was deleted. The value is true when the delete
    /// was hard; only hard deletes suppress replayed creations, but both
    /// kinds permanently retire the grouping for new cases.
    deleted_groupings: DashMap<Grouping, bool>,
    /// Hard-deleted aggregate ids; all their events are ignored.
    hard_deleted: DashMap<Uuid, ()>,
    /// (case id, idempotency key) pairs already folded into the timeline.
    status_keys: DashMap<(CaseId, String), ()>,
}

impl CaseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            cases: DashMap::new(),
            by_grouping: DashMap::new(),
            deleted_groupings: DashMap::new(),
            hard_deleted: DashMap::new(),
            status_keys: DashMap::new(),
        }
    }

    /// Apply one event to the view.
    pub fn apply(&self, envelope: &EventEnvelope) {
        if self.hard_deleted.contains_key(&envelope.aggregate_id) {
            return;
        }

        match &envelope.payload {
            Event::CaseCreated {
                case_id,
                tag,
                group_id,
                title,
                link,
                recipients,
                reported_at,
                received_at,
                ..
            } => {
                let grouping = Grouping::new(tag.clone(), group_id.clone());
                if self.grouping_hard_deleted(&grouping) {
                    return;
                }
                match self.by_grouping.entry(grouping.clone()) {
                    Entry::Occupied(existing) => {
                        if *existing.get() != *case_id {
                            return;
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(*case_id);
                    }
                }
                let created_at = reported_at
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(*received_at);
                self.cases.entry(*case_id).or_insert_with(|| CaseView {
                    id: *case_id,
                    tenant_id: envelope.tenant_id.clone(),
                    grouping,
                    title: title.clone(),
                    link: link.clone(),
                    recipients: recipients.clone(),
                    created_at,
                    timeline: Vec::new(),
                    deleted: false,
                });
            }
            Event::CaseStatusChanged {
                case_id,
                status,
                status_text,
                new_link,
                reported_at,
                received_at,
                idempotency_key,
                ..
            } => {
                if let Some(mut case) = self.cases.get_mut(case_id) {
                    if let Some(link) = new_link {
                        case.link = Some(link.clone());
                    }
                    let first_delivery = self
                        .status_keys
                        .insert((*case_id, idempotency_key.clone()), ())
                        .is_none();
                    if first_delivery {
                        case.timeline.push(StatusEntry {
                            status: *status,
                            text: status_text.clone(),
                            time: reported_at
                                .unwrap_or_else(|| received_at.fixed_offset()),
                            received_at: *received_at,
                        });
                        // Backdated reports slot in by their reported time.
                        case.timeline.sort_by(|a, b| {
                            (a.time, a.received_at).cmp(&(b.time, b.received_at))
                        });
                    }
                }
            }
            Event::SoftDeleted { grouping, .. } => {
                let id = CaseId::from_uuid(envelope.aggregate_id);
                if let Some(mut case) = self.cases.get_mut(&id) {
                    case.deleted = true;
                }
                if let Some(grouping) = grouping {
                    self.mark_grouping_deleted(grouping.clone(), false);
                }
            }
            Event::HardDeleted { grouping, .. } => {
                self.hard_deleted.insert(envelope.aggregate_id, ());
                let id = CaseId::from_uuid(envelope.aggregate_id);
                if let Some((_, case)) = self.cases.remove(&id) {
                    self.by_grouping.remove(&case.grouping);
                }
                self.status_keys.retain(|(key_case, _), _| *key_case != id);
                if let Some(grouping) = grouping {
                    self.mark_grouping_deleted(grouping.clone(), true);
                }
            }
            // Notification and delivery events do not touch this view.
            Event::MessageCreated { .. }
            | Event::TaskCreated { .. }
            | Event::TaskCompleted { .. }
            | Event::TaskExpired { .. }
            | Event::DeadlinePostponed { .. }
            | Event::ReminderFired { .. }
            | Event::NotificationClicked { .. }
            | Event::DeliverySucceeded { .. }
            | Event::DeliveryFailed { .. } => {}
        }
    }

    fn mark_grouping_deleted(&self, grouping: Grouping, hard: bool) {
        self.deleted_groupings
            .entry(grouping)
            .and_modify(|was_hard| *was_hard |= hard)
            .or_insert(hard);
    }

    fn grouping_hard_deleted(&self, grouping: &Grouping) -> bool {
        self.deleted_groupings
            .get(grouping)
            .is_some_and(|hard| *hard)
    }

    /// Look up a case by id.
    pub fn get(&self, id: CaseId) -> Option<CaseView> {
        self.cases.get(&id).map(|case| case.value().clone())
    }

    /// The case owning a grouping, if any.
    pub fn case_for_grouping(&self, grouping: &Grouping) -> Option<CaseView> {
        let id = *self.by_grouping.get(grouping)?.value();
        self.get(id)
    }

    /// The id claimed for a grouping, if any.
    pub fn lookup_grouping(&self, grouping: &Grouping) -> Option<CaseId> {
        self.by_grouping.get(grouping).map(|entry| *entry.value())
    }

    /// Whether a grouping's case was deleted, softly or hard.
    pub fn grouping_deleted(&self, grouping: &Grouping) -> bool {
        self.deleted_groupings.contains_key(grouping)
    }

    /// All cases visible to a user holding `grants`, most recently
    /// updated first. A case's update time is its latest status time, or
    /// its creation time while no status has been reported.
    pub fn visible_for(&self, grants: &Grants, user_id: &str) -> Vec<CaseView> {
        let mut out: Vec<CaseView> = self
            .cases
            .iter()
            .filter(|case| !case.deleted)
            .filter(|case| {
                case.recipients
                    .iter()
                    .any(|recipient| grants.covers(recipient, user_id))
            })
            .map(|case| case.value().clone())
            .collect();
        out.sort_by(|a, b| {
            let a_time = a
                .current_status()
                .map(|s| s.time.with_timezone(&Utc))
                .unwrap_or(a.created_at);
            let b_time = b
                .current_status()
                .map(|s| s.time.with_timezone(&Utc))
                .unwrap_or(b.created_at);
            b_time.cmp(&a_time).then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Number of cases in the view.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// A deterministic copy of the whole view, for state comparison.
    pub fn snapshot(&self) -> CaseSnapshot {
        let mut cases: Vec<CaseView> =
            self.cases.iter().map(|case| case.value().clone()).collect();
        cases.sort_by_key(|c| c.id);
        CaseSnapshot { cases }
    }
}

impl Default for CaseStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted dump of a [`CaseStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSnapshot {
    /// All rows, ordered by case id.
    pub cases: Vec<CaseView>,
}

#[async_trait]
impl EventProcessor for CaseStore {
    fn name(&self) -> &str {
        "case-view"
    }

    async fn process(&self, envelope: &EventEnvelope) -> AppResult<()> {
        self.apply(envelope);
        Ok(())
    }
}
