//! Core types for the subscription query monitor.
//!
//! This crate holds the entity model, the typed inbound payload, the
//! ranking and coloring rules used for display, configuration and its
//! validation, and the [`store::SubscriptionStore`] trait. It has no HTTP
//! or database dependencies; the storage and client crates depend on it.

pub mod config;
pub mod error;
pub mod format;
pub mod model;
pub mod payload;
pub mod rank;
pub mod store;

pub use error::{Error, Result};

/// Seconds in one acknowledgment day.
pub const SECONDS_PER_DAY: i64 = 24 * 3600;

/// The current Unix time in seconds.
pub fn now() -> i64 { chrono::Utc::now().timestamp() }
