//! Integration tests for coalesced partition fetching.
//!
//! These tests verify the deduplication and partial-failure contracts with
//! a mock HTTP server counting real network calls.

use std::sync::Arc;
use std::time::Duration;

use timeshard_core::{
    CacheCoordinator, CacheStore, CalendarDate, Database, DatasetId, HttpTransport,
    PartitionFetcher, QueryEngine, RetryPolicy,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MANIFEST_TEMPLATE: &str = r#"{
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
            "start": "2023-12-31",
            "end": "2024-04-01",
            "recordCount": 2,
            "file": "current.json",
            "lastModified": "2024-04-01T06:00:00Z"
        }
    ]
}"#;

async fn engine_for(server: &MockServer) -> Arc<QueryEngine> {
    let db = Database::new_in_memory().await.expect("in-memory db");
    let coordinator = Arc::new(CacheCoordinator::new(
        Arc::new(HttpTransport::new()),
        CacheStore::new(db, "test-v1"),
        RetryPolicy::none(),
    ));
    let engine = Arc::new(QueryEngine::new(coordinator));
    let manifest_url = Url::parse(&format!("{}/casualties/manifest.json", server.uri()))
        .expect("manifest url");
    engine
        .register_dataset(DatasetId::new("casualties").expect("dataset id"), manifest_url)
        .await
        .expect("registration should fetch the manifest");
    engine
}

fn date(s: &str) -> CalendarDate {
    CalendarDate::parse(s).expect("test date")
}

#[tokio::test]
async fn concurrent_overlapping_queries_issue_one_call_per_partition() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/casualties/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MANIFEST_TEMPLATE.as_bytes()))
        .mount(&server)
        .await;
    // expect(1): the call-count assertion from the dedup contract. The delay
    // keeps the fetch in flight long enough for all callers to attach.
    Mock::given(method("GET"))
        .and(path("/casualties/2023-q4.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"[{"date":"2023-12-30","killed":2}]"#.to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casualties/current.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"[{"date":"2024-01-02","killed":5}]"#.to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server).await;
    let dataset = DatasetId::new("casualties").expect("dataset id");

    // Three consumers ask for overlapping ranges at the same time.
    let (a, b, c) = tokio::join!(
        engine.query_range(&dataset, date("2023-12-01"), date("2024-01-15")),
        engine.query_range(&dataset, date("2023-12-15"), date("2024-02-01")),
        engine.query_range(&dataset, date("2023-12-29"), date("2024-01-03")),
    );

    for result in [a, b, c] {
        let result = result.expect("query should succeed");
        assert!(result.errors.is_empty(), "no partition failures expected");
    }

    // Mock expectations (exactly one call per partition) are verified on drop.
}

#[tokio::test]
async fn one_failing_partition_does_not_abort_the_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/casualties/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MANIFEST_TEMPLATE.as_bytes()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casualties/2023-q4.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casualties/current.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"[{"date":"2024-01-02","killed":5}]"#.to_vec()),
        )
        .mount(&server)
        .await;

    let engine = engine_for(&server).await;
    let dataset = DatasetId::new("casualties").expect("dataset id");

    let result = engine
        .query_range(&dataset, date("2023-12-01"), date("2024-01-15"))
        .await
        .expect("partial failure must not abort the query");

    assert_eq!(result.errors.len(), 1, "the failed partition is reported");
    assert_eq!(result.errors[0].partition.as_str(), "2023-q4");
    assert!(result.errors[0].retryable, "a 500 is retryable");
    assert!(result.partial_coverage);
    assert_eq!(result.records.len(), 1, "the healthy partition still serves");
    assert_eq!(result.records[0].date, date("2024-01-02"));
}

#[tokio::test]
async fn cached_closed_partition_is_not_refetched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/casualties/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MANIFEST_TEMPLATE.as_bytes()))
        .mount(&server)
        .await;
    // The closed partition may be hit at most once across two queries.
    Mock::given(method("GET"))
        .and(path("/casualties/2023-q4.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"[{"date":"2023-12-30","killed":2}]"#.to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casualties/current.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"[{"date":"2024-01-02","killed":5}]"#.to_vec()),
        )
        .mount(&server)
        .await;

    let engine = engine_for(&server).await;
    let dataset = DatasetId::new("casualties").expect("dataset id");

    for _ in 0..2 {
        let result = engine
            .query_range(&dataset, date("2023-12-01"), date("2024-01-15"))
            .await
            .expect("query should succeed");
        assert!(result.errors.is_empty());
    }
}

#[tokio::test]
async fn warm_fetch_through_shared_cache_serves_later_queries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/casualties/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MANIFEST_TEMPLATE.as_bytes()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casualties/2023-q4.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"[{"date":"2023-12-30","killed":2}]"#.to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casualties/current.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"[{"date":"2024-01-02","killed":5}]"#.to_vec()),
        )
        .mount(&server)
        .await;

    let engine = engine_for(&server).await;
    let dataset = DatasetId::new("casualties").expect("dataset id");
    let manifest_url = Url::parse(&format!("{}/casualties/manifest.json", server.uri()))
        .expect("manifest url");

    // Warm the closed partition through a standalone fetcher sharing the
    // engine's cache, the way the refresh command does.
    let fetcher = PartitionFetcher::new(engine.cache());
    let manifest = engine.manifest(&dataset).expect("manifest snapshot");
    let closed = manifest.partitions[0].clone();
    fetcher
        .fetch(&closed, &manifest_url, timeshard_core::CachePolicy::NetworkFirst)
        .await
        .expect("warm fetch should succeed");

    // The query must now serve the closed partition from cache.
    let result = engine
        .query_range(&dataset, date("2023-12-01"), date("2024-01-15"))
        .await
        .expect("query should succeed");
    assert!(result.errors.is_empty());
    assert_eq!(result.records.len(), 2);
}
