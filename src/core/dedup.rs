//! Collapses concurrent identical GETs into one shared in-flight request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;
use url::Url;

use crate::core::PollError;
use crate::core::client::Transport;
use crate::core::net::{self, Fetched};

type SharedFetch = Shared<BoxFuture<'static, Result<Fetched, PollError>>>;
type InFlightMap = Arc<Mutex<HashMap<String, InFlight>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
    settled_at: Option<Instant>,
}

/// Normalize `url` into a dedup key: drop the fragment and any `volatile`
/// query parameter, then re-serialize the remaining pairs in sorted order.
pub fn normalize_url<S: AsRef<str>>(url: &Url, volatile: &[S]) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !volatile.iter().any(|v| v.as_ref() == k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut out = url.clone();
    out.set_fragment(None);
    if pairs.is_empty() {
        out.set_query(None);
    } else {
        out.query_pairs_mut().clear().extend_pairs(pairs);
    }
    out.into()
}

/// Shares one network call between every caller asking for the same
/// normalized URL while it is pending, and for `linger` after it settles.
/// A settled entry stops being served exactly `linger` after settlement, even
/// if its eviction timer has not fired yet.
///
/// Failures are not retried; every waiting caller observes the same error.
pub struct RequestDeduplicator {
    transport: Arc<dyn Transport>,
    volatile: Vec<String>,
    linger: Duration,
    timeout: Option<Duration>,
    inflight: InFlightMap,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RequestDeduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("volatile", &self.volatile)
            .field("linger", &self.linger)
            .field("timeout", &self.timeout)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl RequestDeduplicator {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        volatile: Vec<String>,
        linger: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            volatile,
            linger,
            timeout,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// The dedup key for `url` under this deduplicator's volatile parameters.
    pub fn normalize(&self, url: &Url) -> String {
        normalize_url(url, &self.volatile)
    }

    /// Number of entries currently pending or lingering.
    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fetch and decode `url`, joining an existing request for the same key if one exists.
    ///
    /// Must be called from within a Tokio runtime (eviction runs on a spawned timer).
    pub async fn fetch_json(&self, url: &Url) -> Result<Fetched, PollError> {
        let key = self.normalize(url);

        let now = Instant::now();
        let fetch = {
            let mut map = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match map.get(&key) {
                Some(existing)
                    if existing
                        .settled_at
                        .is_none_or(|at| now < at + self.linger) =>
                {
                    tracing::debug!(key = %key, "joining in-flight request");
                    existing.fetch.clone()
                }
                _ => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.spawn_fetch(url.clone(), key.clone(), id);
                    map.insert(
                        key,
                        InFlight {
                            id,
                            fetch: fetch.clone(),
                            settled_at: None,
                        },
                    );
                    fetch
                }
            }
        };

        fetch.await
    }

    fn spawn_fetch(&self, url: Url, key: String, id: u64) -> SharedFetch {
        let transport = Arc::clone(&self.transport);
        let inflight = Arc::clone(&self.inflight);
        let linger = self.linger;
        let timeout = self.timeout;

        async move {
            let outcome = match timeout {
                Some(after) => match tokio::time::timeout(after, transport.get(&url)).await {
                    Ok(res) => res,
                    Err(_) => Err(PollError::Timeout {
                        url: url.to_string(),
                        after,
                    }),
                },
                None => transport.get(&url).await,
            };
            let result = outcome.and_then(|raw| net::decode_response(&url, raw));

            if let Some(entry) = inflight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(&key)
                && entry.id == id
            {
                entry.settled_at = Some(Instant::now());
            }

            tokio::spawn(async move {
                tokio::time::sleep(linger).await;
                let mut map = inflight.lock().unwrap_or_else(PoisonError::into_inner);
                if map.get(&key).is_some_and(|e| e.id == id) {
                    map.remove(&key);
                }
            });

            result
        }
        .boxed()
        .shared()
    }
}
