//! The event log contract and its in-memory implementation.
//!
//! The log is the source of truth. It guarantees ordered delivery per
//! partition and nothing across partitions; events for one aggregate hash
//! to the same partition, so per-aggregate order is total. Delivery to a
//! consumer group is at-least-once: an event stays visible to `poll` until
//! the group commits its offset.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use notifyhub_core::event::EventEnvelope;
use notifyhub_core::result::AppResult;

/// Position assigned to an appended event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Partition the event landed in.
    pub partition: usize,
    /// Offset within the partition.
    pub offset: u64,
    /// When the log recorded the event.
    pub recorded_at: DateTime<Utc>,
}

/// Write side of the event log.
///
/// Publishing is not idempotent: appending the same envelope twice yields
/// two log entries. Producers pre-assign event ids and consumers
/// deduplicate on them, so a retried publish is harmless downstream.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append an event to the log.
    async fn publish(&self, envelope: EventEnvelope) -> AppResult<Acknowledgement>;
}

/// An event handed to a consumer group, with its log position.
#[derive(Debug, Clone)]
pub struct PolledEvent {
    /// Partition the event came from.
    pub partition: usize,
    /// Offset within the partition.
    pub offset: u64,
    /// The event itself.
    pub envelope: EventEnvelope,
}

#[derive(Debug)]
struct StoredEvent {
    envelope: EventEnvelope,
    recorded_at: DateTime<Utc>,
}

/// In-memory partitioned event log.
///
/// Each partition is an append-only vector; the offset of an event is its
/// index. Consumer groups track a committed cursor per partition, and
/// `poll` returns everything past the cursor, so uncommitted events are
/// redelivered on the next poll.
#[derive(Debug)]
pub struct InMemoryEventLog {
    partitions: Vec<Mutex<Vec<StoredEvent>>>,
    // (group, partition) -> next offset to deliver
    cursors: DashMap<(String, usize), u64>,
}

impl InMemoryEventLog {
    /// Create a log with the given number of partitions.
    pub fn new(partitions: usize) -> Self {
        let partitions = partitions.max(1);
        Self {
            partitions: (0..partitions).map(|_| Mutex::new(Vec::new())).collect(),
            cursors: DashMap::new(),
        }
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// The partition events for `aggregate_id` land in.
    pub fn partition_for(&self, aggregate_id: Uuid) -> usize {
        let mut hasher = DefaultHasher::new();
        aggregate_id.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }

    /// Number of events appended to a partition.
    pub fn len(&self, partition: usize) -> u64 {
        self.partitions
            .get(partition)
            .map(|p| lock(p).len() as u64)
            .unwrap_or(0)
    }

    /// Whether the log holds no events at all.
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(|p| lock(p).is_empty())
    }

    /// The next offset a group would be delivered from a partition.
    pub fn committed(&self, group: &str, partition: usize) -> u64 {
        self.cursors
            .get(&(group.to_string(), partition))
            .map(|c| *c)
            .unwrap_or(0)
    }

    /// Events a group has not yet committed, up to `max` in total.
    ///
    /// Within a partition events come back in offset order. Partitions are
    /// visited in index order; fairness across partitions is not a goal.
    pub fn poll(&self, group: &str, max: usize) -> Vec<PolledEvent> {
        let mut polled = Vec::new();
        for (partition, events) in self.partitions.iter().enumerate() {
            if polled.len() >= max {
                break;
            }
            let cursor = self.committed(group, partition);
            let events = lock(events);
            for (index, stored) in events.iter().enumerate().skip(cursor as usize) {
                if polled.len() >= max {
                    break;
                }
                polled.push(PolledEvent {
                    partition,
                    offset: index as u64,
                    envelope: stored.envelope.clone(),
                });
            }
        }
        polled
    }

    /// Commit an offset for a group: the event at `offset` and everything
    /// before it in the partition will not be delivered again.
    ///
    /// Commits never move a cursor backwards.
    pub fn commit(&self, group: &str, partition: usize, offset: u64) {
        let mut cursor = self
            .cursors
            .entry((group.to_string(), partition))
            .or_insert(0);
        if *cursor < offset + 1 {
            *cursor = offset + 1;
        }
    }

    /// Forget a group's cursors so its next poll starts from offset zero
    /// in every partition.
    pub fn rewind(&self, group: &str) {
        self.cursors.retain(|(g, _), _| g != group);
        tracing::debug!("Consumer group '{}' rewound to the log start", group);
    }

    /// Total lag for a group across all partitions.
    pub fn lag(&self, group: &str) -> u64 {
        (0..self.partitions.len())
            .map(|p| self.len(p).saturating_sub(self.committed(group, p)))
            .sum()
    }

    /// When the log recorded an event, if it exists.
    pub fn recorded_at(&self, partition: usize, offset: u64) -> Option<DateTime<Utc>> {
        self.partitions
            .get(partition)
            .and_then(|p| lock(p).get(offset as usize).map(|s| s.recorded_at))
    }
}

#[async_trait]
impl EventSink for InMemoryEventLog {
    async fn publish(&self, envelope: EventEnvelope) -> AppResult<Acknowledgement> {
        let partition = self.partition_for(envelope.aggregate_id);
        let recorded_at = Utc::now();
        let offset = {
            let mut events = lock(&self.partitions[partition]);
            events.push(StoredEvent {
                envelope,
                recorded_at,
            });
            (events.len() - 1) as u64
        };
        tracing::trace!(
            "Appended event at partition={} offset={}",
            partition,
            offset
        );
        Ok(Acknowledgement {
            partition,
            offset,
            recorded_at,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
