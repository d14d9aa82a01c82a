//! Consumer loop configuration.

use serde::{Deserialize, Serialize};

/// Settings for the event log consumer loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Interval in milliseconds between polls when the log is idle.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Maximum number of events fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Backoff in milliseconds before retrying a failed apply.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_poll_interval() -> u64 {
    250
}

fn default_batch_size() -> usize {
    64
}

fn default_retry_backoff() -> u64 {
    500
}
