//! Consumer driver feeding log events to a processor, one at a time.
//!
//! Application is strictly serial per consumer: the next event is not
//! touched until the previous one was applied and committed. On an apply
//! error the batch is abandoned without committing, so the failed event is
//! redelivered on the next pass. Processors are idempotent, which makes
//! that redelivery (and any produced by the log itself) invisible.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time;

use notifyhub_core::config::consumer::ConsumerConfig;
use notifyhub_core::event::EventEnvelope;
use notifyhub_core::health::{Health, Subsystem};
use notifyhub_core::result::AppResult;

use crate::log::InMemoryEventLog;

/// Something that applies events for a consumer group.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Apply one event. Must be idempotent.
    async fn process(&self, envelope: &EventEnvelope) -> AppResult<()>;
}

/// Polls a consumer group's feed and applies each event in order.
pub struct Consumer {
    log: Arc<InMemoryEventLog>,
    group: String,
    processor: Arc<dyn EventProcessor>,
    config: ConsumerConfig,
    health: Arc<Health>,
    subsystem: Subsystem,
}

impl Consumer {
    /// Create a consumer for `group`, applying events with `processor`.
    pub fn new(
        log: Arc<InMemoryEventLog>,
        group: impl Into<String>,
        processor: Arc<dyn EventProcessor>,
        config: ConsumerConfig,
        health: Arc<Health>,
        subsystem: Subsystem,
    ) -> Self {
        Self {
            log,
            group: group.into(),
            processor,
            config,
            health,
            subsystem,
        }
    }

    /// The consumer group this consumer commits under.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Run until the cancel signal is received.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            "Consumer '{}' started with processor '{}', poll_interval={}ms",
            self.group,
            self.processor.name(),
            self.config.poll_interval_ms
        );
        self.health.set_ready(self.subsystem);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        tracing::info!("Consumer '{}' received shutdown signal", self.group);
                        break;
                    }
                }
                applied = self.poll_and_apply() => {
                    if applied > 0 {
                        continue;
                    }
                    tokio::select! {
                        _ = cancel.changed() => {
                            if *cancel.borrow() {
                                tracing::info!("Consumer '{}' shutting down", self.group);
                                break;
                            }
                        }
                        _ = time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!("Consumer '{}' shut down complete", self.group);
    }

    /// Apply one polled batch; returns the number of events committed.
    ///
    /// Stops at the first failure so later events in the same partition
    /// are not applied out of order. The failed event stays uncommitted
    /// and leads the next batch.
    async fn poll_and_apply(&self) -> usize {
        let batch = self.log.poll(&self.group, self.config.batch_size);
        let mut applied = 0;

        for polled in batch {
            match self.processor.process(&polled.envelope).await {
                Ok(()) => {
                    self.log.commit(&self.group, polled.partition, polled.offset);
                    self.health
                        .metrics
                        .events_consumed
                        .fetch_add(1, Ordering::Relaxed);
                    applied += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Consumer '{}' failed to apply event {} ({}): {}",
                        self.group,
                        polled.envelope.event_id,
                        polled.envelope.payload.name(),
                        e
                    );
                    time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                    break;
                }
            }
        }

        applied
    }
}
