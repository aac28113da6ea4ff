use dashpoll::{EndpointSpec, RawResponse};

use crate::common::{self, ScriptedTransport, ms};

#[tokio::test(start_paused = true)]
async fn unchanged_payload_stretches_interval_up_to_eight_times() {
    let transport = ScriptedTransport::constant(r#"{"open_cases":41,"bonds":[{"id":1},{"id":2}]}"#);
    let scheduler = common::scheduler(
        &transport,
        vec![EndpointSpec::new("kpis", "kpis", ms(1000))],
    );

    scheduler.start().unwrap();
    tokio::time::sleep(ms(29_500)).await;

    // x1 for three polls, x2 for three, x4 for five, then x8.
    assert_eq!(
        transport.offsets("/api/kpis"),
        vec![0, 1000, 2000, 3000, 5000, 7000, 9000, 13_000, 17_000, 21_000, 25_000, 29_000]
    );
    let snap = scheduler.meta_snapshot().await["kpis"];
    assert_eq!(snap.interval_multiplier, 8);
    assert_eq!(snap.stable_count, 11);
    assert_eq!(snap.effective_interval, ms(8000));

    // Holds at x8.
    tokio::time::sleep(ms(16_000)).await;
    assert_eq!(transport.offsets("/api/kpis").len(), 14);
    assert_eq!(scheduler.meta_snapshot().await["kpis"].interval_multiplier, 8);

    common::stop(&scheduler).await;
}

#[tokio::test(start_paused = true)]
async fn changed_payload_drops_back_to_base_interval() {
    // Identical for 12 attempts, then a new value.
    let transport = ScriptedTransport::new(|_, n| {
        let total = if n <= 12 { 100 } else { 101 };
        Ok(RawResponse::ok(format!(r#"{{"total":{total}}}"#)))
    });
    let scheduler = common::scheduler(
        &transport,
        vec![EndpointSpec::new("kpis", "kpis", ms(1000))],
    );

    scheduler.start().unwrap();
    tokio::time::sleep(ms(29_500)).await;
    assert_eq!(scheduler.meta_snapshot().await["kpis"].interval_multiplier, 8);

    // Attempt 13 lands at 37s and sees the new payload.
    tokio::time::sleep(ms(8000)).await;
    let snap = scheduler.meta_snapshot().await["kpis"];
    assert_eq!(transport.offsets("/api/kpis").len(), 13);
    assert_eq!(snap.interval_multiplier, 1);
    assert_eq!(snap.stable_count, 0);

    common::stop(&scheduler).await;
}

#[tokio::test(start_paused = true)]
async fn sampler_decides_what_counts_as_a_change() {
    // Only `total` matters; `generated_at` changes every time.
    let transport = ScriptedTransport::new(|_, n| {
        Ok(RawResponse::ok(format!(
            r#"{{"total":7,"generated_at":"2024-01-01T00:00:{n:02}Z"}}"#
        )))
    });
    let scheduler = common::scheduler(
        &transport,
        vec![
            EndpointSpec::new("kpis", "kpis", ms(1000))
                .sampler(|payload| payload["total"].to_string()),
        ],
    );

    scheduler.start().unwrap();
    tokio::time::sleep(ms(3500)).await;

    let snap = scheduler.meta_snapshot().await["kpis"];
    assert_eq!(snap.stable_count, 3);
    assert_eq!(snap.interval_multiplier, 2);

    common::stop(&scheduler).await;
}

#[tokio::test(start_paused = true)]
async fn reset_adaptive_twice_equals_once() {
    let transport = ScriptedTransport::constant(r#"{"total":3}"#);
    let scheduler = common::scheduler(
        &transport,
        vec![
            EndpointSpec::new("kpis", "kpis", ms(1000)),
            EndpointSpec::new("top", "top", ms(1000)),
        ],
    );

    scheduler.start().unwrap();
    tokio::time::sleep(ms(9500)).await;
    let before = scheduler.meta_snapshot().await;
    assert_eq!(before["kpis"].interval_multiplier, 4);
    assert_eq!(before["top"].interval_multiplier, 4);

    scheduler.reset_adaptive(["kpis"]).unwrap();
    scheduler.reset_adaptive(["kpis"]).unwrap();
    tokio::time::sleep(ms(10)).await;

    let after = scheduler.meta_snapshot().await;
    assert_eq!(after["kpis"].interval_multiplier, 1);
    assert_eq!(after["kpis"].stable_count, 0);
    // Reset also made `kpis` due at once.
    assert_eq!(transport.offsets("/api/kpis").last(), Some(&9500));
    // Untargeted keys keep their state.
    assert_eq!(after["top"].interval_multiplier, 4);

    common::stop(&scheduler).await;
}

#[tokio::test(start_paused = true)]
async fn reset_adaptive_all_targets_every_key() {
    let transport = ScriptedTransport::constant(r#"[{"id":"a"},{"id":"b"}]"#);
    let scheduler = common::scheduler(
        &transport,
        vec![
            EndpointSpec::new("recent", "recent", ms(1000)),
            EndpointSpec::new("top", "top", ms(1000)),
        ],
    );

    scheduler.start().unwrap();
    tokio::time::sleep(ms(4500)).await;
    scheduler.reset_adaptive_all().unwrap();
    tokio::time::sleep(ms(10)).await;

    for snap in scheduler.meta_snapshot().await.values() {
        assert_eq!(snap.interval_multiplier, 1);
        assert_eq!(snap.stable_count, 0);
    }

    common::stop(&scheduler).await;
}
