use std::sync::{Arc, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::{Command, EndpointSpec, Inner, SharedState};
use crate::adaptive;
use crate::core::{Fetched, PollError};

/// The polling task: pass, sleep, repeat until stopped.
pub(super) async fn run(
    inner: Arc<Inner>,
    mut cmds: mpsc::UnboundedReceiver<Command>,
    mut visibility: watch::Receiver<bool>,
) {
    let mut visibility_open = true;
    let mut was_visible = *visibility.borrow_and_update();

    loop {
        let visible = *visibility.borrow_and_update();
        if visible && !was_visible {
            tracing::debug!("visible again; catching up");
            make_all_due(&inner).await;
        }
        was_visible = visible;

        let Some(wake_at) = run_pass(&inner, visible).await else {
            break;
        };

        let sleep = tokio::time::sleep_until(wake_at);
        tokio::pin!(sleep);

        let exit = loop {
            tokio::select! {
                () = &mut sleep => break false,
                cmd = cmds.recv() => match cmd {
                    Some(Command::Refresh) => {
                        make_all_due(&inner).await;
                        break false;
                    }
                    Some(Command::ResetAdaptive(keys)) => {
                        reset_adaptive(&inner, keys.as_deref()).await;
                        break false;
                    }
                    Some(Command::Stop) | None => break true,
                },
                changed = visibility.changed(), if visibility_open => {
                    if changed.is_err() {
                        visibility_open = false;
                    } else if *visibility.borrow() {
                        break false;
                    }
                }
            }
        };

        if exit || inner.is_stopped() {
            break;
        }
    }

    tracing::debug!("polling loop exited");
}

/// One traversal of every endpoint. Returns the next wake time, or `None` once stopped.
async fn run_pass(inner: &Inner, visible: bool) -> Option<Instant> {
    if inner.is_stopped() {
        return None;
    }

    if visible {
        for spec in &inner.endpoints {
            if inner.is_stopped() {
                return None;
            }
            let attempted_at = Instant::now();
            let due = inner
                .state
                .read()
                .await
                .metas
                .get(spec.key())
                .is_none_or(|m| m.is_due(spec.interval(), attempted_at));
            if !due {
                continue;
            }

            let outcome = fetch(inner, spec).await;

            // A fetch that was on the wire when `stop` ran must not touch state.
            if inner.is_stopped() {
                tracing::debug!(key = spec.key(), "discarding result after stop");
                return None;
            }

            match apply_outcome(inner, spec, attempted_at, outcome).await {
                Applied::Discarded => return None,
                Applied::Failure if !inner.options.backoff_yield.is_zero() => {
                    tokio::time::sleep(inner.options.backoff_yield).await;
                }
                Applied::Success | Applied::Failure => {}
            }
        }
    } else {
        tracing::trace!("host hidden; skipping fetches this pass");
    }

    let now = Instant::now();
    let state = inner.state.read().await;
    let earliest = inner
        .endpoints
        .iter()
        .map(|spec| {
            state
                .metas
                .get(spec.key())
                .and_then(|m| m.next_due_at(spec.interval()))
                .unwrap_or(now)
        })
        .min()
        .unwrap_or(now);

    Some(earliest.max(now + inner.options.min_sleep))
}

async fn fetch(inner: &Inner, spec: &EndpointSpec) -> Result<Fetched, PollError> {
    let started = Instant::now();
    tracing::debug!(key = spec.key(), path = spec.path(), "fetching");
    let outcome = inner.client.fetch_json(spec.path()).await;
    tracing::debug!(
        key = spec.key(),
        ok = outcome.is_ok(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fetch finished"
    );
    outcome
}

enum Applied {
    Success,
    Failure,
    Discarded,
}

/// Route one outcome through the adaptive and backoff controllers and the store.
///
/// The stop flag is re-read under the commit lock, which `stop` also takes, so
/// nothing is written once `stop` has returned.
async fn apply_outcome(
    inner: &Inner,
    spec: &EndpointSpec,
    attempted_at: Instant,
    outcome: Result<Fetched, PollError>,
) -> Applied {
    let key = spec.key();
    let outcome = outcome.map(|fetched| {
        let signature = adaptive::signature(&fetched.payload, spec.sampler_fn());
        (fetched, signature)
    });

    let mut state = inner.state.write().await;
    let _commit = inner.commit.lock().unwrap_or_else(PoisonError::into_inner);
    if inner.is_stopped() {
        tracing::debug!(key, "discarding result after stop");
        return Applied::Discarded;
    }

    let SharedState { metas, store } = &mut *state;
    let meta = metas.entry(key.to_string()).or_default();
    let policy = &inner.options.backoff;

    match outcome {
        Ok((fetched, signature)) => {
            policy.record_success(meta, attempted_at);
            if let Some(multiplier) = adaptive::record_signature(meta, signature) {
                tracing::debug!(
                    key,
                    multiplier,
                    stable_count = meta.stable_count,
                    "payload stable; stretching interval"
                );
            }
            if let Some(mirror) = &inner.mirror {
                mirror.put(key, &fetched.payload);
            }
            store.record_success(key, fetched);
            Applied::Success
        }
        Err(err) => {
            let backoff = policy.record_failure(meta, attempted_at);
            adaptive::reset(meta);
            tracing::warn!(
                key,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "endpoint fetch failed"
            );
            store.record_failure(key, err);
            Applied::Failure
        }
    }
}

async fn make_all_due(inner: &Inner) {
    let mut state = inner.state.write().await;
    for meta in state.metas.values_mut() {
        meta.last_fetch_at = None;
    }
}

async fn reset_adaptive(inner: &Inner, keys: Option<&[String]>) {
    let mut state = inner.state.write().await;
    for spec in &inner.endpoints {
        if keys.is_some_and(|ks| !ks.iter().any(|k| k == spec.key())) {
            continue;
        }
        let meta = state.metas.entry(spec.key().to_string()).or_default();
        adaptive::reset(meta);
        meta.last_fetch_at = None;
    }
}
