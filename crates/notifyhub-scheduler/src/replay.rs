//! Replay validation of the projection appliers.
//!
//! The whole system leans on two properties: every view can be rebuilt
//! from offset zero, and applying an event twice leaves the same state as
//! applying it once. The validator checks both by replaying the full log
//! into two fresh pairs of stores, feeding one pair every event once and
//! the other pair every event twice, then comparing snapshots.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use notifyhub_core::health::{Health, Subsystem};
use notifyhub_core::{AppError, AppResult};
use notifyhub_eventlog::InMemoryEventLog;
use notifyhub_projection::{CaseStore, NotificationStore};

/// Consumer group the validator replays under.
pub const REPLAY_GROUP: &str = "replay-validator";

/// Replays the log from offset zero and checks applier idempotency.
pub struct ReplayValidator {
    log: Arc<InMemoryEventLog>,
    health: Arc<Health>,
    batch_size: usize,
}

impl ReplayValidator {
    /// Create the validator.
    pub fn new(log: Arc<InMemoryEventLog>, health: Arc<Health>, batch_size: usize) -> Self {
        Self {
            log,
            health,
            batch_size: batch_size.max(1),
        }
    }

    /// Replay everything and compare; returns how many events replayed.
    ///
    /// Divergence lowers the validator's liveness and returns an error. A
    /// clean run raises readiness, so the first successful validation is
    /// what makes the subsystem ready.
    pub fn validate(&self) -> AppResult<usize> {
        let started = Utc::now();
        self.log.rewind(REPLAY_GROUP);

        let once = (NotificationStore::new(), CaseStore::new());
        let twice = (NotificationStore::new(), CaseStore::new());
        let mut per_partition = vec![0u64; self.log.partition_count()];
        let mut total = 0usize;

        loop {
            let batch = self.log.poll(REPLAY_GROUP, self.batch_size);
            if batch.is_empty() {
                break;
            }
            for event in &batch {
                once.0.apply(&event.envelope);
                once.1.apply(&event.envelope);
                twice.0.apply(&event.envelope);
                twice.0.apply(&event.envelope);
                twice.1.apply(&event.envelope);
                twice.1.apply(&event.envelope);
                per_partition[event.partition] += 1;
                total += 1;
                self.log.commit(REPLAY_GROUP, event.partition, event.offset);
            }
        }

        for (partition, count) in per_partition.iter().enumerate() {
            self.health.metrics.add_replay_events(partition, *count);
        }

        let notifications_match = once.0.snapshot() == twice.0.snapshot();
        let cases_match = once.1.snapshot() == twice.1.snapshot();
        if !notifications_match || !cases_match {
            error!(
                "Replay validation failed after {} event(s): duplicate application diverged (notifications ok: {}, cases ok: {})",
                total, notifications_match, cases_match
            );
            self.health.set_unhealthy(Subsystem::ReplayValidator);
            return Err(AppError::projection(
                "replayed state diverged under duplicate application",
            ));
        }

        debug!(
            "Replay validation passed: {} event(s) in {}ms",
            total,
            (Utc::now() - started).num_milliseconds()
        );
        self.health.set_ready(Subsystem::ReplayValidator);
        Ok(total)
    }
}
