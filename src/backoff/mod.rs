//! Per-endpoint exponential backoff after fetch failures.

use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::scheduler::EndpointMeta;

/// Bounds for the failure backoff.
///
/// After `k` consecutive failures the backoff is `min(initial * 2^(k-1), max)`.
/// The first success afterwards resets it to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Backoff applied after the first failure.
    #[serde(rename = "initial_ms", with = "crate::core::serde_millis")]
    pub initial: Duration,
    /// Upper bound for the backoff.
    #[serde(rename = "max_ms", with = "crate::core::serde_millis")]
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// The backoff that follows `current` after one more failure.
    pub fn next(&self, current: Duration) -> Duration {
        let grown = if current.is_zero() {
            self.initial
        } else {
            current.saturating_mul(2)
        };
        grown.min(self.max)
    }

    /// Backoff after `failures` consecutive failures.
    pub fn after(&self, failures: u32) -> Duration {
        (0..failures).fold(Duration::ZERO, |acc, _| self.next(acc))
    }

    /// Record a failed attempt that started at `attempted_at`.
    ///
    /// The attempt still counts as a fetch, so the retry is paced from it
    /// rather than issued immediately. Returns the new backoff.
    pub fn record_failure(&self, meta: &mut EndpointMeta, attempted_at: Instant) -> Duration {
        meta.last_fetch_at = Some(attempted_at);
        meta.backoff = self.next(meta.backoff);
        meta.backoff
    }

    /// Record a successful attempt; clears any backoff.
    pub fn record_success(&self, meta: &mut EndpointMeta, attempted_at: Instant) {
        meta.last_fetch_at = Some(attempted_at);
        meta.backoff = Duration::ZERO;
    }
}
