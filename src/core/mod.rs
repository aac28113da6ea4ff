//! Core components of the `dashpoll` crate.
//!
//! This module contains the foundational building blocks of the library, including:
//! - The [`PollClient`] and its builder.
//! - The primary [`PollError`] type.
//! - The [`Transport`] seam and its reqwest implementation.
//! - Request deduplication.

/// The client (`PollClient`), builder, and transport.
pub mod client;
/// Concurrent-request collapsing keyed by normalized URL.
pub mod dedup;
/// The primary error type (`PollError`) for the crate.
pub mod error;
pub(crate) mod net;
pub(crate) mod serde_millis;

// convenient re-exports so most code can just `use crate::core::PollClient`
pub use client::{HttpTransport, PollClient, PollClientBuilder, RawResponse, Transport};
pub use dedup::{RequestDeduplicator, normalize_url};
pub use error::PollError;
pub use net::Fetched;
