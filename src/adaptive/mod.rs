//! Stretches the polling interval of feeds whose payload has stopped changing.
//!
//! Every successful fetch yields a signature (an endpoint's own [`Sampler`], or
//! [`structural_digest`] by default). Consecutive identical signatures grow
//! `stable_count`, and the interval multiplier steps up at fixed thresholds:
//!
//! | `stable_count` | multiplier |
//! |---|---|
//! | 0..=2 | ×1 |
//! | 3..=5 | ×2 |
//! | 6..=10 | ×4 |
//! | 11.. | ×8 |
//!
//! So twelve identical polls in a row reach ×8. A changed signature, a failed
//! fetch, or an explicit reset drops the endpoint back to ×1.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::scheduler::EndpointMeta;

/// Caller-supplied signature strategy: maps a payload to a comparable string.
pub type Sampler = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Highest multiplier the controller will apply.
pub const MAX_MULTIPLIER: u32 = 8;

const THRESHOLDS: [(u32, u32); 3] = [(11, MAX_MULTIPLIER), (6, 4), (3, 2)];

/// Array items whose identifier feeds the digest.
const LEADING_ITEMS: usize = 3;

/// Fields probed, in order, for an item identifier.
const ID_FIELDS: [&str; 5] = ["id", "_id", "key", "case_id", "booking_id"];

/// Multiplier for a given stability streak.
pub fn multiplier_for(stable_count: u32) -> u32 {
    THRESHOLDS
        .iter()
        .find(|(at, _)| stable_count >= *at)
        .map_or(1, |(_, m)| *m)
}

/// Fold one successful fetch's signature into `meta`.
///
/// Returns the new multiplier when it escalated.
pub fn record_signature(meta: &mut EndpointMeta, signature: String) -> Option<u32> {
    if meta.last_sample.as_deref() == Some(signature.as_str()) {
        meta.stable_count = meta.stable_count.saturating_add(1);
        let target = multiplier_for(meta.stable_count);
        if target > meta.interval_multiplier {
            meta.interval_multiplier = target;
            return Some(target);
        }
    } else {
        meta.last_sample = Some(signature);
        meta.stable_count = 0;
        meta.interval_multiplier = 1;
    }
    None
}

/// Drop the stability streak (failure or explicit reset).
///
/// The stored signature is cleared too, so the next success starts a fresh
/// streak at zero.
pub fn reset(meta: &mut EndpointMeta) {
    meta.stable_count = 0;
    meta.interval_multiplier = 1;
    meta.last_sample = None;
}

/// Signature of `payload` using `sampler` when given, else [`structural_digest`].
pub fn signature(payload: &Value, sampler: Option<&Sampler>) -> String {
    match sampler {
        Some(f) => f(payload),
        None => structural_digest(payload),
    }
}

/// Cheap structural fingerprint of a JSON payload.
///
/// Arrays contribute their length and the identifiers of their first few
/// items; objects contribute scalar leaves and nested array fingerprints.
/// Objects nested deeper than two levels only contribute their key count.
pub fn structural_digest(payload: &Value) -> String {
    let mut shape = String::new();
    describe(payload, "", 0, &mut shape);
    let hash = Sha256::digest(shape.as_bytes());
    hex::encode(&hash[..12])
}

fn describe(value: &Value, path: &str, depth: usize, out: &mut String) {
    match value {
        Value::Array(items) => {
            let _ = write!(out, "{path}#{}[", items.len());
            for item in items.iter().take(LEADING_ITEMS) {
                out.push_str(&item_id(item));
                out.push(',');
            }
            out.push_str("];");
        }
        Value::Object(map) => {
            if depth > 2 {
                let _ = write!(out, "{path}{{{}}};", map.len());
                return;
            }
            for (k, v) in map {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                describe(v, &child, depth + 1, out);
            }
        }
        scalar => {
            let _ = write!(out, "{path}={scalar};");
        }
    }
}

fn item_id(item: &Value) -> String {
    match item {
        Value::Object(map) => ID_FIELDS
            .iter()
            .find_map(|f| map.get(*f))
            .map_or_else(|| format!("{{{}}}", map.len()), Value::to_string),
        Value::Array(a) => format!("[{}]", a.len()),
        scalar => scalar.to_string(),
    }
}
