//! Latest outcome per key, plus the optional external cache mirror.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::core::{Fetched, PollError};

/// Suffix under which a key's variant diagnostic is exposed.
pub const VARIANT_SUFFIX: &str = "__variant";

/// Last outcome recorded for one key.
#[derive(Debug, Clone)]
pub struct ResultEntry {
    pub key: String,
    /// Last successfully fetched payload. Kept across later failures.
    pub payload: Option<Value>,
    /// Variant header value from the last successful response.
    pub variant: Option<String>,
    /// Error from the most recent attempt; cleared by the next success.
    pub error: Option<PollError>,
    /// Wall time of the most recent attempt.
    pub updated_at: DateTime<Utc>,
}

/// An externally owned cache that successful payloads are copied into.
///
/// `put` runs on the polling task while the scheduler's state is locked, so it
/// must not call back into the scheduler.
pub trait CacheMirror: Send + Sync {
    fn put(&self, key: &str, payload: &Value);
}

/// A ready-made in-memory [`CacheMirror`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    map: RwLock<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheMirror for MemoryCache {
    fn put(&self, key: &str, payload: &Value) {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), payload.clone());
    }
}

/// Key → latest [`ResultEntry`]. Written only by the scheduler loop.
#[derive(Debug, Default, Clone)]
pub struct ResultStore {
    entries: HashMap<String, ResultEntry>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_success(&mut self, key: &str, fetched: Fetched) {
        let entry = self.entry_mut(key);
        entry.payload = Some(fetched.payload);
        entry.variant = fetched.variant;
        entry.error = None;
        entry.updated_at = Utc::now();
    }

    pub(crate) fn record_failure(&mut self, key: &str, error: PollError) {
        let entry = self.entry_mut(key);
        entry.error = Some(error);
        entry.updated_at = Utc::now();
    }

    fn entry_mut(&mut self, key: &str) -> &mut ResultEntry {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| ResultEntry {
                key: key.to_string(),
                payload: None,
                variant: None,
                error: None,
                updated_at: Utc::now(),
            })
    }

    pub fn get(&self, key: &str) -> Option<&ResultEntry> {
        self.entries.get(key)
    }

    /// Key → last successful payload.
    pub fn data(&self) -> HashMap<String, Value> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.payload.clone().map(|p| (k.clone(), p)))
            .collect()
    }

    /// Key → error from the most recent attempt, for keys whose last attempt failed.
    pub fn errors(&self) -> HashMap<String, PollError> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.error.clone().map(|err| (k.clone(), err)))
            .collect()
    }

    /// `"{key}__variant"` → variant header value.
    pub fn variants(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(k, e)| {
                e.variant
                    .clone()
                    .map(|v| (format!("{k}{VARIANT_SUFFIX}"), v))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
