use std::sync::Arc;

use dashpoll::{EndpointSpec, MemoryCache, PollClient, PollError, PollScheduler, RawResponse};
use serde_json::json;
use url::Url;

use crate::common::{self, BASE, Gate, ScriptedTransport, ms};

#[tokio::test(start_paused = true)]
async fn successful_payloads_are_mirrored_into_the_cache() {
    let transport = ScriptedTransport::new(|path, _| match path {
        "/api/kpis" => Ok(RawResponse::ok(r#"{"open":5}"#)),
        _ => Ok(RawResponse::with_status(500, "")),
    });
    let cache = Arc::new(MemoryCache::new());
    let scheduler = PollScheduler::builder(&common::client(&transport))
        .endpoint(EndpointSpec::new("kpis", "kpis", ms(1000)))
        .endpoint(EndpointSpec::new("top", "top", ms(1000)))
        .cache_mirror(cache.clone())
        .build()
        .unwrap();

    scheduler.start().unwrap();
    tokio::time::sleep(ms(500)).await;
    common::stop(&scheduler).await;

    assert_eq!(cache.get("kpis"), Some(json!({"open": 5})));
    assert_eq!(cache.get("top"), None);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn variant_header_is_exposed_under_suffixed_key() {
    let transport = ScriptedTransport::new(|_, _| {
        Ok(RawResponse::ok(r#"{"open":5}"#).header("X-Dashboard-Variant", "county-split"))
    });
    let scheduler = common::scheduler(
        &transport,
        vec![EndpointSpec::new("kpis", "kpis", ms(1000))],
    );

    scheduler.start().unwrap();
    tokio::time::sleep(ms(100)).await;

    let variants = scheduler.variants().await;
    assert_eq!(variants.get("kpis__variant").map(String::as_str), Some("county-split"));
    assert_eq!(
        scheduler.entry("kpis").await.unwrap().variant.as_deref(),
        Some("county-split")
    );

    common::stop(&scheduler).await;
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_last_payload_and_success_clears_error() {
    let transport = ScriptedTransport::new(|_, n| match n {
        2 => Ok(RawResponse::with_status(503, "busy")),
        _ => Ok(RawResponse::ok(format!(r#"{{"n":{n}}}"#))),
    });
    let scheduler = common::scheduler(
        &transport,
        vec![EndpointSpec::new("kpis", "kpis", ms(1000))],
    );

    scheduler.start().unwrap();
    tokio::time::sleep(ms(1100)).await;

    let entry = scheduler.entry("kpis").await.unwrap();
    assert_eq!(entry.payload, Some(json!({"n": 1})));
    assert_eq!(entry.error.as_ref().and_then(PollError::status), Some(503));
    assert_eq!(scheduler.data().await["kpis"], json!({"n": 1}));

    // Retry at 1000 + 1000 + 2000.
    tokio::time::sleep(ms(3000)).await;
    let entry = scheduler.entry("kpis").await.unwrap();
    assert_eq!(entry.payload, Some(json!({"n": 3})));
    assert!(entry.error.is_none());
    assert!(scheduler.errors().await.is_empty());

    common::stop(&scheduler).await;
}

#[tokio::test(start_paused = true)]
async fn stuck_request_times_out_and_is_recorded() {
    let gate = Gate::new();
    let transport = ScriptedTransport::gated(gate.clone(), |_, _| Ok(RawResponse::ok("{}")));
    let client = PollClient::builder()
        .base_url(Url::parse(BASE).unwrap())
        .transport(transport.clone())
        .timeout(ms(5000))
        .build()
        .unwrap();
    let scheduler = PollScheduler::builder(&client)
        .endpoint(EndpointSpec::new("slow", "slow", ms(1000)))
        .build()
        .unwrap();

    scheduler.start().unwrap();
    tokio::time::sleep(ms(5100)).await;

    match scheduler.errors().await.get("slow") {
        Some(PollError::Timeout { after, .. }) => assert_eq!(*after, ms(5000)),
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert_eq!(scheduler.meta_snapshot().await["slow"].backoff, ms(2000));

    gate.open(100);
    common::stop(&scheduler).await;
}
