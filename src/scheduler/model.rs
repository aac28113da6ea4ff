use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::adaptive::Sampler;

/// One polling target: a unique key, a path relative to the client's base URL,
/// and the base cadence.
#[derive(Clone)]
pub struct EndpointSpec {
    key: String,
    path: String,
    interval: Duration,
    sampler: Option<Sampler>,
}

impl fmt::Debug for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointSpec")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("interval", &self.interval)
            .field("sampler", &self.sampler.is_some())
            .finish()
    }
}

impl EndpointSpec {
    pub fn new(key: impl Into<String>, path: impl Into<String>, interval: Duration) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            interval,
            sampler: None,
        }
    }

    /// Compare payloads with `f` instead of the default structural digest.
    pub fn sampler<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.sampler = Some(Arc::new(f));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn sampler_fn(&self) -> Option<&Sampler> {
        self.sampler.as_ref()
    }
}

/// Serializable endpoint definition, e.g. loaded from a JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointDef {
    pub key: String,
    pub path: String,
    pub interval_ms: u64,
}

impl From<EndpointDef> for EndpointSpec {
    fn from(def: EndpointDef) -> Self {
        EndpointSpec::new(def.key, def.path, Duration::from_millis(def.interval_ms))
    }
}

/// Mutable per-key scheduling state, created the first time a pass visits the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMeta {
    /// Start of the most recent attempt; `None` means due immediately.
    pub last_fetch_at: Option<Instant>,
    /// Current failure backoff; zero after a success.
    pub backoff: Duration,
    /// Consecutive successful fetches with an unchanged signature.
    pub stable_count: u32,
    /// Signature of the last successful payload.
    pub last_sample: Option<String>,
    /// One of 1, 2, 4, 8.
    pub interval_multiplier: u32,
}

impl Default for EndpointMeta {
    fn default() -> Self {
        Self {
            last_fetch_at: None,
            backoff: Duration::ZERO,
            stable_count: 0,
            last_sample: None,
            interval_multiplier: 1,
        }
    }
}

impl EndpointMeta {
    pub fn effective_interval(&self, base: Duration) -> Duration {
        base.saturating_mul(self.interval_multiplier)
    }

    /// When the key next becomes eligible, or `None` if it already is (never fetched).
    pub fn next_due_at(&self, base: Duration) -> Option<Instant> {
        self.last_fetch_at
            .map(|at| at + self.effective_interval(base) + self.backoff)
    }

    pub fn is_due(&self, base: Duration, now: Instant) -> bool {
        self.next_due_at(base).is_none_or(|due| now >= due)
    }

    pub(crate) fn snapshot(&self, base: Duration, now: Instant) -> MetaSnapshot {
        let next_due_at = self.next_due_at(base).unwrap_or(now);
        MetaSnapshot {
            last_fetch_at: self.last_fetch_at,
            backoff: self.backoff,
            stable_count: self.stable_count,
            interval_multiplier: self.interval_multiplier,
            effective_interval: self.effective_interval(base),
            next_due_at,
            eta: next_due_at.saturating_duration_since(now),
        }
    }
}

/// Point-in-time view of one key's scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaSnapshot {
    pub last_fetch_at: Option<Instant>,
    pub backoff: Duration,
    pub stable_count: u32,
    pub interval_multiplier: u32,
    /// Base interval × multiplier.
    pub effective_interval: Duration,
    pub next_due_at: Instant,
    /// Time until `next_due_at`, zero if already due.
    pub eta: Duration,
}
