//! The serialized polling loop and its consumer handle.
//!
//! One scheduler drives one ordered list of endpoints from a single Tokio task.
//! Each pass visits every endpoint in registration order and fetches the due
//! ones one at a time, so at most one request is outstanding per scheduler.
//! Between passes the task sleeps until the earliest endpoint is due (never
//! less than [`PollOptions::min_sleep`]), a command arrives, or the host
//! becomes visible again.

mod model;
mod pass;

pub use model::{EndpointDef, EndpointMeta, EndpointSpec, MetaSnapshot};

use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backoff::BackoffPolicy;
use crate::core::{PollClient, PollError};
use crate::store::{CacheMirror, ResultEntry, ResultStore};
use crate::visibility::VisibilityGate;

/* ---------------- Configuration ---------------- */

/// Loop tuning. Deserializable with `*_ms` integer fields; missing fields take defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollOptions {
    /// Lower bound on the sleep between passes. Default: 500ms.
    #[serde(rename = "min_sleep_ms", with = "crate::core::serde_millis")]
    pub min_sleep: Duration,
    /// Pause after an endpoint fails, before the pass moves to the next endpoint. Default: 250ms.
    #[serde(rename = "backoff_yield_ms", with = "crate::core::serde_millis")]
    pub backoff_yield: Duration,
    /// Failure backoff bounds.
    pub backoff: BackoffPolicy,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            min_sleep: Duration::from_millis(500),
            backoff_yield: Duration::from_millis(250),
            backoff: BackoffPolicy::default(),
        }
    }
}

/* ---------------- Internal state ---------------- */

#[derive(Debug)]
pub(crate) enum Command {
    Refresh,
    ResetAdaptive(Option<Vec<String>>),
    Stop,
}

#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub(crate) metas: HashMap<String, EndpointMeta>,
    pub(crate) store: ResultStore,
}

pub(crate) struct Inner {
    pub(crate) client: PollClient,
    pub(crate) endpoints: Vec<EndpointSpec>,
    pub(crate) options: PollOptions,
    pub(crate) mirror: Option<Arc<dyn CacheMirror>>,
    pub(crate) visibility: VisibilityGate,
    pub(crate) state: RwLock<SharedState>,
    /// Held by `stop` while it flips `stopped` and by the loop while it writes
    /// an outcome, so the two never interleave.
    pub(crate) commit: Mutex<()>,
    started: AtomicBool,
    stopped: AtomicBool,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/* ---------------- Public handle ---------------- */

/// Handle to a polling loop. Clones share the same loop and state.
#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("endpoints", &self.inner.endpoints)
            .field("options", &self.inner.options)
            .field("running", &self.running())
            .finish_non_exhaustive()
    }
}

impl PollScheduler {
    pub fn builder(client: &PollClient) -> PollSchedulerBuilder {
        PollSchedulerBuilder::new(client)
    }

    /// Spawn the polling loop on the current Tokio runtime.
    ///
    /// Calling `start` again on a running scheduler is a no-op, so duplicate
    /// initialization never produces a second loop.
    ///
    /// # Errors
    ///
    /// Returns `Misuse` if the scheduler was stopped or no Tokio runtime is active.
    pub fn start(&self) -> Result<(), PollError> {
        if self.inner.is_stopped() {
            return Err(PollError::misuse("scheduler has been stopped"));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| PollError::misuse("start requires a running Tokio runtime"))?;
        if self.inner.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("scheduler already started; ignoring duplicate start");
            return Ok(());
        }

        let Some(cmds) = self
            .inner
            .cmd_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };
        let visibility = self.inner.visibility.subscribe();
        let join = handle.spawn(pass::run(Arc::clone(&self.inner), cmds, visibility));
        *self.inner.join.lock().unwrap_or_else(PoisonError::into_inner) = Some(join);

        tracing::info!(endpoints = self.inner.endpoints.len(), "scheduler started");
        Ok(())
    }

    /// Make every endpoint due and run a pass as soon as the current one finishes.
    ///
    /// The forced fetches still go through the client's dedup cache, so an
    /// endpoint polled less than the dedup linger ago is served the settled
    /// response without a network call, and that response counts towards its
    /// stability streak like any other poll.
    ///
    /// # Errors
    ///
    /// Returns `Misuse` before `start` or after `stop`.
    pub fn refresh(&self) -> Result<(), PollError> {
        self.send(Command::Refresh, "refresh")
    }

    /// Reset the adaptive state of `keys` and make them due immediately.
    ///
    /// # Errors
    ///
    /// Returns `Misuse` for an unknown key, before `start`, or after `stop`.
    pub fn reset_adaptive<I, S>(&self, keys: I) -> Result<(), PollError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if let Some(unknown) = keys
            .iter()
            .find(|k| !self.inner.endpoints.iter().any(|e| e.key() == k.as_str()))
        {
            return Err(PollError::misuse(format!("unknown endpoint key `{unknown}`")));
        }
        self.send(Command::ResetAdaptive(Some(keys)), "reset_adaptive")
    }

    /// [`reset_adaptive`](Self::reset_adaptive) for every endpoint.
    pub fn reset_adaptive_all(&self) -> Result<(), PollError> {
        self.send(Command::ResetAdaptive(None), "reset_adaptive")
    }

    /// Stop the loop. Idempotent.
    ///
    /// A fetch already on the wire may still complete, but its result is
    /// discarded, and no new fetch is issued. Once `stop` returns, the store,
    /// metas and cache mirror no longer change.
    ///
    /// Must not be called from a [`CacheMirror`] while it is being written.
    pub fn stop(&self) {
        {
            let _commit = self
                .inner
                .commit
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.inner.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        let _ = self.inner.cmd_tx.send(Command::Stop);
        tracing::info!("scheduler stopped");
    }

    /// Wait for the loop task to exit. Returns immediately if it was never started
    /// or has already been joined.
    pub async fn join(&self) {
        let join = self
            .inner
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }

    fn send(&self, cmd: Command, op: &str) -> Result<(), PollError> {
        if !self.inner.started.load(Ordering::Acquire) {
            return Err(PollError::misuse(format!("{op} called before start")));
        }
        if self.inner.is_stopped() {
            return Err(PollError::misuse(format!("{op} called after stop")));
        }
        self.inner
            .cmd_tx
            .send(cmd)
            .map_err(|_| PollError::misuse(format!("{op}: polling loop has exited")))
    }

    /* ---------------- Consumer surface ---------------- */

    /// True between `start` and `stop`.
    pub fn running(&self) -> bool {
        self.inner.started.load(Ordering::Acquire) && !self.inner.is_stopped()
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.inner.endpoints
    }

    pub fn visibility(&self) -> &VisibilityGate {
        &self.inner.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visibility.is_visible()
    }

    pub fn set_visible(&self, visible: bool) {
        self.inner.visibility.set_visible(visible);
    }

    /// Key → last successful payload.
    pub async fn data(&self) -> HashMap<String, Value> {
        self.inner.state.read().await.store.data()
    }

    /// Key → error from that key's most recent attempt.
    pub async fn errors(&self) -> HashMap<String, PollError> {
        self.inner.state.read().await.store.errors()
    }

    /// `"{key}__variant"` → variant header value.
    pub async fn variants(&self) -> HashMap<String, String> {
        self.inner.state.read().await.store.variants()
    }

    pub async fn entry(&self, key: &str) -> Option<ResultEntry> {
        self.inner.state.read().await.store.get(key).cloned()
    }

    /// Scheduling state of every endpoint. Keys not yet visited report defaults.
    pub async fn meta_snapshot(&self) -> HashMap<String, MetaSnapshot> {
        let state = self.inner.state.read().await;
        let now = Instant::now();
        self.inner
            .endpoints
            .iter()
            .map(|spec| {
                let snap = state
                    .metas
                    .get(spec.key())
                    .cloned()
                    .unwrap_or_default()
                    .snapshot(spec.interval(), now);
                (spec.key().to_string(), snap)
            })
            .collect()
    }
}

/* ---------------- Builder ---------------- */

/// Collects endpoints and options for a [`PollScheduler`].
pub struct PollSchedulerBuilder {
    client: PollClient,
    endpoints: Vec<EndpointSpec>,
    options: PollOptions,
    mirror: Option<Arc<dyn CacheMirror>>,
    visibility: Option<VisibilityGate>,
}

impl PollSchedulerBuilder {
    /// Start from an existing client (cloned internally; clones share its dedup cache).
    pub fn new(client: &PollClient) -> Self {
        Self {
            client: client.clone(),
            endpoints: Vec::new(),
            options: PollOptions::default(),
            mirror: None,
            visibility: None,
        }
    }

    /// Append one endpoint. Registration order is pass order.
    pub fn endpoint(mut self, spec: EndpointSpec) -> Self {
        self.endpoints.push(spec);
        self
    }

    /// Append several endpoints.
    pub fn endpoints<I, E>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EndpointSpec>,
    {
        self.endpoints.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn options(mut self, options: PollOptions) -> Self {
        self.options = options;
        self
    }

    pub fn min_sleep(mut self, dur: Duration) -> Self {
        self.options.min_sleep = dur;
        self
    }

    pub fn backoff_yield(mut self, dur: Duration) -> Self {
        self.options.backoff_yield = dur;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.options.backoff = policy;
        self
    }

    /// Copy every successful payload into `mirror` under its key.
    pub fn cache_mirror(mut self, mirror: Arc<dyn CacheMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Share an existing visibility gate. Default: a new gate, initially visible.
    pub fn visibility(mut self, gate: VisibilityGate) -> Self {
        self.visibility = Some(gate);
        self
    }

    /// # Errors
    ///
    /// Returns `Misuse` when no endpoint is registered, a key repeats, an
    /// interval is zero, or `min_sleep` is zero.
    pub fn build(self) -> Result<PollScheduler, PollError> {
        if self.endpoints.is_empty() {
            return Err(PollError::misuse("at least one endpoint required"));
        }
        if self.options.min_sleep.is_zero() {
            return Err(PollError::misuse("min_sleep must be greater than zero"));
        }
        let mut seen = HashSet::new();
        for spec in &self.endpoints {
            if !seen.insert(spec.key()) {
                return Err(PollError::misuse(format!(
                    "duplicate endpoint key `{}`",
                    spec.key()
                )));
            }
            if spec.interval().is_zero() {
                return Err(PollError::misuse(format!(
                    "endpoint `{}` has a zero interval",
                    spec.key()
                )));
            }
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        Ok(PollScheduler {
            inner: Arc::new(Inner {
                client: self.client,
                endpoints: self.endpoints,
                options: self.options,
                mirror: self.mirror,
                visibility: self.visibility.unwrap_or_default(),
                state: RwLock::new(SharedState::default()),
                commit: Mutex::new(()),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                cmd_tx,
                cmd_rx: Mutex::new(Some(cmd_rx)),
                join: Mutex::new(None),
            }),
        })
    }
}
