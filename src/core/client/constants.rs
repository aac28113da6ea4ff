//! Centralized constants for client defaults.

use std::time::Duration;

/// Default UA sent by the reqwest transport.
pub(crate) const USER_AGENT: &str = concat!("dashpoll/", env!("CARGO_PKG_VERSION"));

/// Base URL used when the builder is not given one.
pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

/// How long a settled request stays resolvable in the dedup cache.
pub(crate) const DEFAULT_DEDUP_LINGER: Duration = Duration::from_secs(1);

/// Query parameters that only exist to defeat caches; stripped before dedup.
pub(crate) const DEFAULT_VOLATILE_PARAMS: &[&str] = &["_cb", "_"];
