//! Fetching subscription data from the remote API into a store.
//!
//! [`ApiClient`] speaks the API; [`Fetcher`] drives one fetch at a time
//! through its stages and reports progress as [`FetchEvent`]s.

pub mod client;
pub mod error;
pub mod fetch;

pub use client::{ApiClient, ApiVersion};
pub use error::FetchError;
pub use fetch::{FetchEvent, FetchHandle, FetchOptions, FetchOutcome, FetchStage, Fetcher};
