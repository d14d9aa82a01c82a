//! Process-wide health and metrics.
//!
//! One [`Health`] value is constructed in `main` and handed to every
//! subsystem by `Arc`. There is no global registry; anything that wants to
//! report or read health holds a reference.
//!
//! Liveness starts `true` and is only ever lowered by a subsystem that has
//! detected a fatal condition; the process keeps running so the violation
//! can be inspected, but orchestration should restart it. Readiness starts
//! `false` and flips once a subsystem has completed its startup work.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// The subsystems that report health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// The event log itself.
    EventLog,
    /// The notification view consumer.
    NotificationView,
    /// The case view consumer.
    CaseView,
    /// The reminder dispatch service.
    ReminderService,
    /// The deadline expiration service.
    ExpiryService,
    /// The hard-delete scheduling service.
    PurgeService,
    /// The startup replay validator.
    ReplayValidator,
}

impl Subsystem {
    /// All subsystems, in reporting order.
    pub const ALL: [Subsystem; 7] = [
        Subsystem::EventLog,
        Subsystem::NotificationView,
        Subsystem::CaseView,
        Subsystem::ReminderService,
        Subsystem::ExpiryService,
        Subsystem::PurgeService,
        Subsystem::ReplayValidator,
    ];

    /// Stable name for logs and the health snapshot.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EventLog => "event_log",
            Self::NotificationView => "notification_view",
            Self::CaseView => "case_view",
            Self::ReminderService => "reminder_service",
            Self::ExpiryService => "expiry_service",
            Self::PurgeService => "purge_service",
            Self::ReplayValidator => "replay_validator",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::EventLog => 0,
            Self::NotificationView => 1,
            Self::CaseView => 2,
            Self::ReminderService => 3,
            Self::ExpiryService => 4,
            Self::PurgeService => 5,
            Self::ReplayValidator => 6,
        }
    }
}

const SUBSYSTEM_COUNT: usize = Subsystem::ALL.len();

/// Shared health state plus operational counters.
#[derive(Debug)]
pub struct Health {
    alive: [AtomicBool; SUBSYSTEM_COUNT],
    ready: [AtomicBool; SUBSYSTEM_COUNT],
    /// Operational counters, incremented by the subsystems.
    pub metrics: Metrics,
}

impl Health {
    /// Create health state for a log with `partitions` partitions.
    pub fn new(partitions: usize) -> Self {
        Self {
            alive: std::array::from_fn(|_| AtomicBool::new(true)),
            ready: std::array::from_fn(|_| AtomicBool::new(false)),
            metrics: Metrics::new(partitions),
        }
    }

    /// Mark a subsystem ready.
    pub fn set_ready(&self, subsystem: Subsystem) {
        self.ready[subsystem.index()].store(true, Ordering::Relaxed);
    }

    /// Lower a subsystem's liveness after a fatal condition.
    pub fn set_unhealthy(&self, subsystem: Subsystem) {
        self.alive[subsystem.index()].store(false, Ordering::Relaxed);
    }

    /// Whether a subsystem is ready.
    pub fn is_ready(&self, subsystem: Subsystem) -> bool {
        self.ready[subsystem.index()].load(Ordering::Relaxed)
    }

    /// Whether a subsystem is alive.
    pub fn is_alive(&self, subsystem: Subsystem) -> bool {
        self.alive[subsystem.index()].load(Ordering::Relaxed)
    }

    /// Whether every subsystem is ready.
    pub fn all_ready(&self) -> bool {
        Subsystem::ALL.iter().all(|s| self.is_ready(*s))
    }

    /// Whether every subsystem is alive.
    pub fn all_alive(&self) -> bool {
        Subsystem::ALL.iter().all(|s| self.is_alive(*s))
    }

    /// Point-in-time view of all health flags and counters.
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            subsystems: Subsystem::ALL
                .iter()
                .map(|s| SubsystemSnapshot {
                    name: s.name(),
                    alive: self.is_alive(*s),
                    ready: self.is_ready(*s),
                })
                .collect(),
            metrics: self.metrics.snapshot(),
        }
    }
}

/// Operational counters shared across the process.
#[derive(Debug)]
pub struct Metrics {
    /// Events appended to the log.
    pub events_published: AtomicU64,
    /// Events applied by projection consumers.
    pub events_consumed: AtomicU64,
    /// Reminder orders dispatched.
    pub reminders_dispatched: AtomicU64,
    /// Tasks expired by the expiry service.
    pub tasks_expired: AtomicU64,
    /// Hard deletes dispatched by the purge service.
    pub purges_dispatched: AtomicU64,
    /// Events replayed by the validator, per log partition.
    pub replay_events: Vec<AtomicU64>,
}

impl Metrics {
    fn new(partitions: usize) -> Self {
        Self {
            events_published: AtomicU64::new(0),
            events_consumed: AtomicU64::new(0),
            reminders_dispatched: AtomicU64::new(0),
            tasks_expired: AtomicU64::new(0),
            purges_dispatched: AtomicU64::new(0),
            replay_events: (0..partitions).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Record replayed events for one partition.
    pub fn add_replay_events(&self, partition: usize, count: u64) {
        if let Some(gauge) = self.replay_events.get(partition) {
            gauge.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Point-in-time view of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            reminders_dispatched: self.reminders_dispatched.load(Ordering::Relaxed),
            tasks_expired: self.tasks_expired.load(Ordering::Relaxed),
            purges_dispatched: self.purges_dispatched.load(Ordering::Relaxed),
            replay_events: self
                .replay_events
                .iter()
                .map(|g| g.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

/// Serializable snapshot of one subsystem's flags.
#[derive(Debug, Clone, Serialize)]
pub struct SubsystemSnapshot {
    /// Subsystem name.
    pub name: &'static str,
    /// Liveness flag.
    pub alive: bool,
    /// Readiness flag.
    pub ready: bool,
}

/// Serializable snapshot of process health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Per-subsystem flags.
    pub subsystems: Vec<SubsystemSnapshot>,
    /// Counter values.
    pub metrics: MetricsSnapshot,
}

/// Serializable snapshot of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Events appended to the log.
    pub events_published: u64,
    /// Events applied by projection consumers.
    pub events_consumed: u64,
    /// Reminder orders dispatched.
    pub reminders_dispatched: u64,
    /// Tasks expired by the expiry service.
    pub tasks_expired: u64,
    /// Hard deletes dispatched by the purge service.
    pub purges_dispatched: u64,
    /// Events replayed by the validator, per log partition.
    pub replay_events: Vec<u64>,
}
