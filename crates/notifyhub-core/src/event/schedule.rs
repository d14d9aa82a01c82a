//! Time schedules carried on events: reminder fire times and auto-delete
//! timestamps.
//!
//! Producers express schedules relative to something (creation, deadline)
//! or as a civil datetime. Each reminder variant also carries the resolved
//! absolute fire time, computed once when the order is placed, so consumers
//! never re-derive it.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time;

/// A reminder requested on a task: when to fire, and which external-channel
/// messages to send when it does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSpec {
    /// When the reminder fires.
    pub schedule: ReminderSchedule,
    /// Channel messages dispatched together with the reminder.
    pub channels: Vec<crate::types::ChannelRequest>,
}

/// When a reminder fires. Every variant keeps the producer's requested form
/// alongside the resolved absolute instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReminderSchedule {
    /// At a concrete civil datetime.
    At {
        /// The requested civil datetime.
        at: NaiveDateTime,
        /// The resolved instant.
        fire_at: DateTime<Utc>,
    },
    /// A fixed duration after the task was created.
    AfterCreation {
        /// The requested delay.
        after: Duration,
        /// The resolved instant.
        fire_at: DateTime<Utc>,
    },
    /// A fixed duration before the task's deadline expires.
    BeforeDeadline {
        /// The requested lead time.
        before: Duration,
        /// The resolved instant.
        fire_at: DateTime<Utc>,
    },
}

impl ReminderSchedule {
    /// Resolve a concrete civil datetime.
    pub fn at(at: NaiveDateTime) -> Self {
        Self::At {
            at,
            fire_at: time::civil_to_utc(at),
        }
    }

    /// Resolve a delay relative to the task's creation time.
    pub fn after_creation(after: Duration, created_at: DateTime<FixedOffset>) -> Self {
        Self::AfterCreation {
            after,
            fire_at: created_at.with_timezone(&Utc) + to_chrono(after),
        }
    }

    /// Resolve a lead time relative to the deadline's expiry moment
    /// (the civil end of the deadline day).
    pub fn before_deadline(before: Duration, deadline: NaiveDate) -> Self {
        Self::BeforeDeadline {
            before,
            fire_at: time::end_of_day(deadline).with_timezone(&Utc) - to_chrono(before),
        }
    }

    /// The resolved absolute fire time.
    pub fn fire_at(&self) -> DateTime<Utc> {
        match self {
            Self::At { fire_at, .. }
            | Self::AfterCreation { fire_at, .. }
            | Self::BeforeDeadline { fire_at, .. } => *fire_at,
        }
    }

    /// Check the schedule against the task it is attached to.
    ///
    /// A reminder must fire after the task is created, and no later than
    /// the deadline's expiry moment when the task has one.
    pub fn validate(
        &self,
        created_at: DateTime<FixedOffset>,
        deadline: Option<NaiveDate>,
    ) -> Result<(), &'static str> {
        let fire_at = self.fire_at();
        if fire_at < created_at.with_timezone(&Utc) {
            return Err("reminder fires before the task is created");
        }
        if let Some(deadline) = deadline {
            if fire_at > time::end_of_day(deadline).with_timezone(&Utc) {
                return Err("reminder fires after the task's deadline");
            }
        }
        Ok(())
    }
}

/// When an aggregate should be hard-deleted, as requested on a creation
/// event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeleteSchedule {
    /// At a concrete civil datetime.
    At {
        /// The requested civil datetime.
        at: NaiveDateTime,
    },
    /// A fixed duration after the event that carried the schedule.
    After {
        /// The requested delay.
        after: Duration,
    },
}

impl DeleteSchedule {
    /// Resolve the schedule against the carrying event's base time.
    pub fn computed_at(&self, base: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::At { at } => time::civil_to_utc(*at),
            Self::After { after } => base + to_chrono(*after),
        }
    }
}

/// An auto-delete schedule change carried on a mutation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteScheduleUpdate {
    /// The new schedule.
    pub schedule: DeleteSchedule,
    /// How the new schedule combines with an existing one.
    pub strategy: UpdateStrategy,
}

/// How a delete-schedule update combines with the existing schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStrategy {
    /// The new schedule replaces the old one unconditionally.
    Overwrite,
    /// The new schedule applies only if it is later than the old one.
    Extend,
}

impl UpdateStrategy {
    /// Combine an existing computed deletion time with a newly computed one.
    pub fn merge(
        &self,
        existing: Option<DateTime<Utc>>,
        updated: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match (self, existing) {
            (Self::Overwrite, _) | (Self::Extend, None) => updated,
            (Self::Extend, Some(existing)) => existing.max(updated),
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::max_value())
}
