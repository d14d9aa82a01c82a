//! Scheduler service configuration.

use serde::{Deserialize, Serialize};

/// Settings for the time-driven scheduler services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval in seconds between reminder queue scans.
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_secs: u64,
    /// Interval in seconds between deadline expiry scans.
    #[serde(default = "default_expiry_interval")]
    pub expiry_interval_secs: u64,
    /// Interval in seconds between hard-delete scans.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
    /// Interval in seconds between replay validation runs.
    #[serde(default = "default_replay_interval")]
    pub replay_interval_secs: u64,
    /// Extra seconds added to "now" when selecting due hard deletes.
    /// Rows computed further into the future than this must never be
    /// selected.
    #[serde(default = "default_purge_grace")]
    pub purge_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reminder_interval_secs: default_reminder_interval(),
            expiry_interval_secs: default_expiry_interval(),
            purge_interval_secs: default_purge_interval(),
            replay_interval_secs: default_replay_interval(),
            purge_grace_secs: default_purge_grace(),
        }
    }
}

fn default_reminder_interval() -> u64 {
    10
}

fn default_expiry_interval() -> u64 {
    60
}

fn default_purge_interval() -> u64 {
    60
}

fn default_replay_interval() -> u64 {
    300
}

fn default_purge_grace() -> u64 {
    0
}
