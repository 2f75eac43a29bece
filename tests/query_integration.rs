//! End-to-end tests for the query boundary and reconciliation flow.

use std::sync::Arc;
use std::time::Duration;

use timeshard_core::{
    CacheCoordinator, CacheStore, CalendarDate, Database, DatasetId, FreshnessStatus,
    HttpTransport, QueryEngine, QueryError, ReconcileConfig, ReconcileScheduler, RetryPolicy,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manifest_body(generated_at: &str) -> String {
    format!(
        r#"{{
            "dataset": "casualties",
            "start": "2023-10-07",
            "end": "2024-04-01",
            "generatedAt": "{generated_at}",
            "partitions": [
                {{
                    "id": "2023-q4",
                    "dataset": "casualties",
                    "start": "2023-10-07",
                    "end": "2023-12-31",
                    "recordCount": 2,
                    "file": "2023-q4.json",
                    "lastModified": "2024-01-01T06:00:00Z"
                }},
                {{
                    "id": "current",
                    "dataset": "casualties",
                    "start": "2023-12-31",
                    "end": "2024-04-01",
                    "recordCount": 2,
                    "file": "current.json",
                    "lastModified": "{generated_at}"
                }}
            ]
        }}"#
    )
}

async fn mount_dataset(server: &MockServer, generated_at: &str, current_body: &[u8]) {
    Mock::given(method("GET"))
        .and(path("/casualties/manifest.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(manifest_body(generated_at).into_bytes()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casualties/2023-q4.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"[{"date":"2023-12-30","killed":2},{"date":"2023-12-29","killed":4}]"#.to_vec()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casualties/current.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(current_body.to_vec()))
        .mount(server)
        .await;
}

async fn engine() -> Arc<QueryEngine> {
    let db = Database::new_in_memory().await.expect("in-memory db");
    let coordinator = Arc::new(CacheCoordinator::new(
        Arc::new(HttpTransport::new()),
        CacheStore::new(db, "test-v1"),
        RetryPolicy::none(),
    ));
    Arc::new(QueryEngine::new(coordinator))
}

fn dataset() -> DatasetId {
    DatasetId::new("casualties").expect("dataset id")
}

fn date(s: &str) -> CalendarDate {
    CalendarDate::parse(s).expect("test date")
}

#[tokio::test]
async fn query_spanning_partitions_returns_sorted_trimmed_records() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        "2024-04-01T12:00:00Z",
        br#"[{"date":"2024-01-02","killed":5},{"date":"2023-12-31","killed":1}]"#,
    )
    .await;

    let engine = engine().await;
    let manifest_url =
        Url::parse(&format!("{}/casualties/manifest.json", server.uri())).expect("url");
    engine
        .register_dataset(dataset(), manifest_url)
        .await
        .expect("registration");

    let result = engine
        .query_range(&dataset(), date("2023-12-30"), date("2024-01-15"))
        .await
        .expect("query");

    let days: Vec<String> = result.records.iter().map(|r| r.date.to_string()).collect();
    assert_eq!(
        days,
        vec!["2023-12-30", "2023-12-31", "2024-01-02"],
        "records must be chronological and trimmed to the request"
    );
    assert_eq!(result.freshness, FreshnessStatus::Fresh);
    assert!(!result.offline);
    assert!(!result.partial_coverage);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn query_beyond_coverage_is_clipped_not_failed() {
    let server = MockServer::start().await;
    mount_dataset(&server, "2024-04-01T12:00:00Z", b"[]").await;

    let engine = engine().await;
    let manifest_url =
        Url::parse(&format!("{}/casualties/manifest.json", server.uri())).expect("url");
    engine
        .register_dataset(dataset(), manifest_url)
        .await
        .expect("registration");

    let result = engine
        .query_range(&dataset(), date("2024-06-01"), date("2024-07-01"))
        .await
        .expect("clipping must not be an error");

    assert!(result.records.is_empty());
    assert!(result.partial_coverage, "clipped-away request is partial");
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn manifest_gap_fails_the_query_with_the_missing_interval() {
    let server = MockServer::start().await;
    // p2 starts ten days after p1 ends: a manifest invariant violation.
    let gap_manifest = r#"{
        "dataset": "casualties",
        "start": "2023-10-07",
        "end": "2024-04-01",
        "generatedAt": "2024-04-01T12:00:00Z",
        "partitions": [
            {
                "id": "2023-q4",
                "dataset": "casualties",
                "start": "2023-10-07",
                "end": "2023-12-31",
                "recordCount": 2,
                "file": "2023-q4.json",
                "lastModified": "2024-01-01T06:00:00Z"
            },
            {
                "id": "current",
                "dataset": "casualties",
                "start": "2024-01-10",
                "end": "2024-04-01",
                "recordCount": 2,
                "file": "current.json",
                "lastModified": "2024-04-01T06:00:00Z"
            }
        ]
    }"#;
    Mock::given(method("GET"))
        .and(path("/casualties/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gap_manifest.as_bytes()))
        .mount(&server)
        .await;

    let engine = engine().await;
    let manifest_url =
        Url::parse(&format!("{}/casualties/manifest.json", server.uri())).expect("url");
    engine
        .register_dataset(dataset(), manifest_url)
        .await
        .expect("registration");

    let err = engine
        .query_range(&dataset(), date("2023-12-01"), date("2024-02-01"))
        .await
        .expect_err("a gap inside the range must fail the query");

    match err {
        QueryError::Gap(gap) => {
            assert_eq!(gap.missing_start, date("2023-12-31"));
            assert_eq!(gap.missing_end, date("2024-01-10"));
        }
        QueryError::DatasetNotFound(_) => panic!("expected gap error"),
    }
}

#[tokio::test]
async fn offline_upstream_degrades_to_cached_result() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        "2024-04-01T12:00:00Z",
        br#"[{"date":"2024-01-02","killed":5}]"#,
    )
    .await;

    let engine = engine().await;
    let manifest_url =
        Url::parse(&format!("{}/casualties/manifest.json", server.uri())).expect("url");
    engine
        .register_dataset(dataset(), manifest_url)
        .await
        .expect("registration");

    // Populate the cache while healthy.
    engine
        .query_range(&dataset(), date("2023-12-01"), date("2024-01-15"))
        .await
        .expect("warm query");

    // Everything upstream goes dark.
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = engine
        .query_range(&dataset(), date("2023-12-01"), date("2024-01-15"))
        .await
        .expect("cached data must keep the query answering");

    assert!(result.offline, "the result must be flagged offline");
    assert!(result.offline_since.is_some());
    assert!(
        result.records.iter().any(|r| r.date == date("2024-01-02")),
        "cached records must still be served"
    );
    assert!(result.errors.is_empty(), "cache fallback is not an error");
}

#[tokio::test]
async fn poked_reconcile_redelivers_to_subscribers() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        "2024-04-01T12:00:00Z",
        br#"[{"date":"2024-01-02","killed":5}]"#,
    )
    .await;

    let engine = engine().await;
    let manifest_url =
        Url::parse(&format!("{}/casualties/manifest.json", server.uri())).expect("url");
    engine
        .register_dataset(dataset(), manifest_url)
        .await
        .expect("registration");

    let mut subscription = engine.subscribe(dataset(), date("2023-12-01"), date("2024-04-01"));

    let handle = ReconcileScheduler::spawn(
        Arc::clone(&engine),
        ReconcileConfig {
            // Long interval: only the poke should trigger a run.
            interval: Duration::from_secs(3600),
            // Wide window so the 2023-24 test partitions count as recent.
            recent_window_days: 3650,
        },
    );

    // Upstream publishes a newer generation with more data.
    server.reset().await;
    mount_dataset(
        &server,
        "2024-04-02T12:00:00Z",
        br#"[{"date":"2024-01-02","killed":5},{"date":"2024-02-10","killed":3}]"#,
    )
    .await;

    handle.poke();

    let update = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("subscriber should be notified after the poked reconcile")
        .expect("subscription channel should stay open");

    assert_eq!(update.dataset.as_str(), "casualties");
    assert!(
        update.records.iter().any(|r| r.date == date("2024-02-10")),
        "the redelivered result must contain the newly published record"
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn unchanged_generation_does_not_notify_subscribers() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        "2024-04-01T12:00:00Z",
        br#"[{"date":"2024-01-02","killed":5}]"#,
    )
    .await;

    let engine = engine().await;
    let manifest_url =
        Url::parse(&format!("{}/casualties/manifest.json", server.uri())).expect("url");
    engine
        .register_dataset(dataset(), manifest_url)
        .await
        .expect("registration");

    let mut subscription = engine.subscribe(dataset(), date("2023-12-01"), date("2024-04-01"));

    let handle = ReconcileScheduler::spawn(
        Arc::clone(&engine),
        ReconcileConfig {
            interval: Duration::from_secs(3600),
            recent_window_days: 3650,
        },
    );

    // Same generation upstream: the reconcile must be a no-op.
    handle.poke();

    let outcome = tokio::time::timeout(Duration::from_millis(750), subscription.recv()).await;
    assert!(
        outcome.is_err(),
        "no update should be delivered when the manifest did not advance"
    );

    handle.shutdown().await;
}
