//! # notifyhub-projection
//!
//! Read models materialized from the event log: the notification view
//! (messages and tasks as users see them) and the case view (cases with
//! their status timelines). Both appliers are idempotent and tolerate the
//! log's at-least-once delivery; either store can be rebuilt from offset
//! zero at any time.

pub mod case_store;
pub mod model;
pub mod notification_store;
pub mod rejections;
pub mod test_support;

pub use case_store::CaseStore;
pub use model::{CaseView, MessageView, Notification, StatusEntry, TaskView, VisibleNotification};
pub use notification_store::NotificationStore;
pub use rejections::RequestValidator;
