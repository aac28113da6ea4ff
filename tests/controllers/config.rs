use std::time::Duration;

use dashpoll::{BackoffPolicy, EndpointDef, EndpointSpec, PollOptions};

#[test]
fn options_deserialize_with_defaults() {
    let opts: PollOptions =
        serde_json::from_str(r#"{"min_sleep_ms": 1000, "backoff": {"initial_ms": 500}}"#).unwrap();

    assert_eq!(opts.min_sleep, Duration::from_millis(1000));
    assert_eq!(opts.backoff_yield, PollOptions::default().backoff_yield);
    assert_eq!(
        opts.backoff,
        BackoffPolicy {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
        }
    );
}

#[test]
fn empty_options_are_the_defaults() {
    let opts: PollOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(opts, PollOptions::default());
    assert_eq!(opts.min_sleep, Duration::from_millis(500));
}

#[test]
fn endpoint_list_loads_from_json() {
    let defs: Vec<EndpointDef> = serde_json::from_str(
        r#"[
            {"key": "kpis", "path": "dashboard/kpis", "interval_ms": 15000},
            {"key": "top", "path": "dashboard/top?limit=10", "interval_ms": 60000}
        ]"#,
    )
    .unwrap();

    let specs: Vec<EndpointSpec> = defs.into_iter().map(Into::into).collect();
    assert_eq!(specs[0].key(), "kpis");
    assert_eq!(specs[1].path(), "dashboard/top?limit=10");
    assert_eq!(specs[1].interval(), Duration::from_secs(60));
}
