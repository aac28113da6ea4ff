use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use url::Url;

use crate::core::PollError;

/// A response as seen by the poller, before any status or JSON handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as `(name, value)` pairs. Non-UTF-8 values are dropped.
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

impl RawResponse {
    /// A 200 response with a JSON body and no headers.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A response with the given status and body.
    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// The network seam used by the deduplicator.
///
/// Implemented by [`HttpTransport`] for real traffic. Tests and embedders can
/// supply their own implementation to drive the scheduler without any I/O.
/// Only transport-level failures should be returned as `Err`; non-2xx statuses
/// are reported through [`RawResponse::status`].
pub trait Transport: Send + Sync {
    /// Issue a GET for `url`.
    fn get<'a>(
        &'a self,
        url: &'a Url,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse, PollError>> + Send + 'a>>;
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl Transport for HttpTransport {
    fn get<'a>(
        &'a self,
        url: &'a Url,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse, PollError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = self
                .http
                .get(url.clone())
                .header("accept", "application/json")
                .send()
                .await?;

            let status = resp.status().as_u16();
            let headers = resp
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = resp.text().await?;

            Ok(RawResponse {
                status,
                headers,
                body,
            })
        })
    }
}
