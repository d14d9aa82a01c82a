//! # notifyhub-eventlog
//!
//! The ordered event log: the write contract used by producers and
//! scheduler services, an in-memory partitioned implementation, and the
//! consumer driver that feeds events to processors with at-least-once
//! delivery.

pub mod consumer;
pub mod log;

pub use consumer::{Consumer, EventProcessor};
pub use log::{Acknowledgement, EventSink, InMemoryEventLog, PolledEvent};
