//! dashpoll: serialized adaptive polling for dashboard REST feeds.
//!
//! A [`PollScheduler`] polls an ordered list of endpoints from one Tokio task,
//! one request at a time. Feeds whose payload stops changing are polled less
//! often, failing feeds back off exponentially, and nothing is fetched while
//! the host reports itself hidden.
//!
//! ```no_run
//! use std::time::Duration;
//! use dashpoll::{EndpointSpec, PollClient, PollScheduler};
//! use url::Url;
//!
//! # async fn demo() -> Result<(), dashpoll::PollError> {
//! let client = PollClient::builder()
//!     .base_url(Url::parse("https://api.example.com/api/")?)
//!     .build()?;
//!
//! let scheduler = PollScheduler::builder(&client)
//!     .endpoint(EndpointSpec::new("kpis", "dashboard/kpis", Duration::from_secs(10)))
//!     .endpoint(EndpointSpec::new("top", "dashboard/top", Duration::from_secs(60)))
//!     .build()?;
//! scheduler.start()?;
//!
//! let kpis = scheduler.data().await.get("kpis").cloned();
//! # let _ = kpis;
//! scheduler.stop();
//! # Ok(())
//! # }
//! ```

pub mod adaptive;
pub mod backoff;
pub mod core;
#[cfg(feature = "tracing-subscriber")]
pub mod logging;
pub mod scheduler;
pub mod store;
pub mod visibility;

pub use crate::core::{
    Fetched, HttpTransport, PollClient, PollClientBuilder, PollError, RawResponse,
    RequestDeduplicator, Transport,
};
pub use adaptive::Sampler;
pub use backoff::BackoffPolicy;
pub use scheduler::{
    EndpointDef, EndpointMeta, EndpointSpec, MetaSnapshot, PollOptions, PollScheduler,
    PollSchedulerBuilder,
};
pub use store::{CacheMirror, MemoryCache, ResultEntry, ResultStore};
pub use visibility::VisibilityGate;
