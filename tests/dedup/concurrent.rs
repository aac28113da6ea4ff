use dashpoll::{PollClient, RawResponse};
use url::Url;

use crate::common::{BASE, Gate, ScriptedTransport, ms};

fn client_for(transport: &std::sync::Arc<ScriptedTransport>) -> PollClient {
    PollClient::builder()
        .base_url(Url::parse(BASE).unwrap())
        .transport(transport.clone())
        .no_timeout()
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn simultaneous_calls_share_one_request() {
    let gate = Gate::new();
    let transport = ScriptedTransport::gated(gate.clone(), |_, n| {
        Ok(RawResponse::ok(format!(r#"{{"call":{n}}}"#)))
    });
    let client = client_for(&transport);

    let opener = async {
        gate.entered.notified().await;
        gate.open(1);
    };
    let (a, b, ()) = tokio::join!(
        client.fetch_json("kpis?_cb=1"),
        client.fetch_json("kpis?_cb=2"),
        opener
    );

    assert_eq!(transport.total_calls(), 1);
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test(start_paused = true)]
async fn failure_reaches_every_waiting_caller() {
    let gate = Gate::new();
    let transport = ScriptedTransport::gated(gate.clone(), |_, _| {
        Ok(RawResponse::with_status(503, "unavailable"))
    });
    let client = client_for(&transport);

    let opener = async {
        gate.entered.notified().await;
        gate.open(1);
    };
    let (a, b, ()) = tokio::join!(
        client.fetch_json("top"),
        client.fetch_json("top?_=1"),
        opener
    );

    assert_eq!(transport.total_calls(), 1);
    assert_eq!(a.unwrap_err().status(), Some(503));
    assert_eq!(b.unwrap_err().status(), Some(503));
}

#[tokio::test(start_paused = true)]
async fn settled_entry_lingers_then_expires() {
    let transport = ScriptedTransport::changing();
    let client = PollClient::builder()
        .base_url(Url::parse(BASE).unwrap())
        .transport(transport.clone())
        .dedup_linger(ms(1000))
        .build()
        .unwrap();

    let first = client.fetch_json("recent").await.unwrap();
    assert_eq!(client.dedup().in_flight(), 1);

    tokio::time::sleep(ms(400)).await;
    let again = client.fetch_json("recent?_cb=42").await.unwrap();
    assert_eq!(first, again);
    assert_eq!(transport.total_calls(), 1);

    tokio::time::sleep(ms(700)).await;
    assert_eq!(client.dedup().in_flight(), 0);

    let fresh = client.fetch_json("recent").await.unwrap();
    assert_ne!(first, fresh);
    assert_eq!(transport.total_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn distinct_urls_are_not_merged() {
    let transport = ScriptedTransport::changing();
    let client = client_for(&transport);

    client.fetch_json("snapshot?county=harris").await.unwrap();
    client.fetch_json("snapshot?county=fortbend").await.unwrap();

    assert_eq!(transport.total_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn clones_share_the_dedup_cache() {
    let transport = ScriptedTransport::changing();
    let client = client_for(&transport);
    let other = client.clone();

    let a = client.fetch_json("kpis").await.unwrap();
    let b = other.fetch_json("kpis").await.unwrap();

    assert_eq!(a, b);
    assert_eq!(transport.total_calls(), 1);
}
