use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The primary error type for all fallible operations in this crate.
///
/// Cloneable so that a single failed fetch can be handed to every caller that
/// was waiting on the same deduplicated request.
#[derive(Debug, Clone, Error)]
pub enum PollError {
    /// The HTTP transport failed before a response was received (connect, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    /// The server returned a non-2xx status code.
    #[error("Unexpected response status: {status} at {url}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The URL that returned the error.
        url: String,
        /// The response body, when one could be read.
        body: Option<String>,
    },

    /// The per-fetch timeout elapsed before the transport produced a response.
    #[error("request to {url} timed out after {after:?}")]
    Timeout {
        /// The URL that was being fetched.
        url: String,
        /// The configured timeout.
        after: Duration,
    },

    /// The response body was not valid JSON.
    #[error("response from {url} is not valid JSON: {message}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// The decoder's message.
        message: String,
    },

    /// A path could not be resolved against the configured base URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The API was used outside its required lifecycle or with invalid arguments.
    #[error("misuse: {0}")]
    Misuse(String),
}

impl From<reqwest::Error> for PollError {
    fn from(e: reqwest::Error) -> Self {
        PollError::Http(Arc::new(e))
    }
}

impl PollError {
    pub(crate) fn misuse(msg: impl Into<String>) -> Self {
        PollError::Misuse(msg.into())
    }

    /// Network failure, non-2xx status or timeout.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PollError::Http(_) | PollError::Status { .. } | PollError::Timeout { .. }
        )
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, PollError::Decode { .. })
    }

    pub fn is_misuse(&self) -> bool {
        matches!(self, PollError::Misuse(_))
    }

    /// The HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            PollError::Status { status, .. } => Some(*status),
            PollError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
