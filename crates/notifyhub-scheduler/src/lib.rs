//! # notifyhub-scheduler
//!
//! The time-driven half of the system. Each service here mirrors a slice
//! of the event log into its own table, and a timer periodically turns
//! elapsed time into new events:
//!
//! - [`ReminderService`] fires pending reminder orders,
//! - [`ExpiryService`] expires tasks whose deadline day has passed,
//! - [`PurgeService`] dispatches scheduled hard deletes and cascades them
//!   to grouping members,
//! - [`ReplayValidator`] periodically rebuilds the projections from
//!   offset zero to prove the appliers idempotent.
//!
//! All services consume the same log they publish to, so their actions
//! reach every replica the same way producer events do.

pub mod expiry;
pub mod purge;
pub mod reminder;
pub mod replay;
pub mod runner;

pub use expiry::ExpiryService;
pub use purge::PurgeService;
pub use reminder::ReminderService;
pub use replay::ReplayValidator;
pub use runner::run_timer;
