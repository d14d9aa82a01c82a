//! # notifyhub-core
//!
//! Core crate for NotifyHub. Contains configuration schemas, typed
//! identifiers, the domain event model, health/metrics signals, civil-time
//! helpers, and the unified error system.
//!
//! This crate has **no** internal dependencies on other NotifyHub crates.

pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod rejection;
pub mod result;
pub mod time;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
