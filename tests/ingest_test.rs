//! End-to-end ingestion tests
//!
//! Drives the full stack (authenticated client, METRICA facade,
//! ingester, SQLite store) against a `wiremock` server and a temporary
//! database. Verifies the idempotent delete-then-insert contract and the
//! catch-up range walk.

mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client_with_cache, seeded_secrets};
use mosmon::client::metrica::{DomainMetricaClient, MetricaApi};
use mosmon::client::session::{InMemorySessionCache, SessionCache};
use mosmon::ingest::store::ThreatMatchStore;
use mosmon::ingest::Ingester;
use mosmon::mailer::LogMailer;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn stack(
    server_uri: &str,
    tld: &str,
    today: &str,
) -> (Ingester, Arc<ThreatMatchStore>, tempfile::TempDir) {
    let cache = Arc::new(InMemorySessionCache::new());
    cache.put(tld, &format!("id={}", tld)).unwrap();
    let client = client_with_cache(server_uri, seeded_secrets(&[tld]), cache);
    let metrica: Arc<dyn MetricaApi> = Arc::new(DomainMetricaClient::new(client));

    let dir = tempdir().unwrap();
    let store = Arc::new(ThreatMatchStore::new_with_path(dir.path().join("threats.db")).unwrap());
    let ingester = Ingester::new(metrica, Arc::clone(&store), Arc::new(LogMailer), None)
        .with_today(date(today));
    (ingester, store, dir)
}

const MALWARE_REPORT: &str = r#"{
    "version": 1,
    "tld": "test",
    "domainListDate": "2025-01-02",
    "uniqueAbuseDomains": 2,
    "threats": [
        {"threatType": "malware", "count": 2, "domains": ["a.test", "b.test"]},
        {"threatType": "phishing", "count": -1, "domains": []}
    ]
}"#;

/// Idempotent ingest: the first run inserts two rows, the second run
/// (same day) leaves an identical row set.
#[tokio::test]
async fn test_ingest_same_day_twice_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ry/test/v2/metrica/domainList/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MALWARE_REPORT))
        .mount(&server)
        .await;

    let (ingester, store, _dir) = stack(&server.uri(), "test", "2025-01-02");

    let processed = ingester.run_tld("test").await.expect("first run");
    assert_eq!(processed, 1);
    let first = store.rows_for_day("test", date("2025-01-02")).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].domain_name, "a.test");
    assert_eq!(first[0].threat_type, "malware");
    assert_eq!(first[1].domain_name, "b.test");

    // Second run: max date equals today, so the catch-up range is empty
    // and the stored rows are untouched.
    let processed = ingester.run_tld("test").await.expect("second run");
    assert_eq!(processed, 0);
    let second = store.rows_for_day("test", date("2025-01-02")).unwrap();
    assert_eq!(first, second);
}

/// Re-ingesting one day replaces the rows instead of accumulating them.
#[tokio::test]
async fn test_run_date_replaces_existing_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ry/test/v2/metrica/domainList/2025-01-02"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MALWARE_REPORT))
        .mount(&server)
        .await;

    let (ingester, store, _dir) = stack(&server.uri(), "test", "2025-01-02");
    store
        .replace_day(
            "test",
            date("2025-01-02"),
            &[("stale.test".to_string(), "spam".to_string())],
        )
        .unwrap();

    let rows = ingester
        .run_date("test", date("2025-01-02"))
        .await
        .expect("re-ingest");
    assert_eq!(rows, 2);

    let stored = store.rows_for_day("test", date("2025-01-02")).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r.domain_name != "stale.test"));
}

/// Catch-up walk: with a stored maximum of 2025-01-02 and two newer
/// reports advertised, both days are fetched and persisted.
#[tokio::test]
async fn test_catch_up_fetches_missing_days() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ry/test/v2/metrica/domainLists"))
        .and(query_param("startDate", "2025-01-03"))
        .and(query_param("endDate", "2025-01-04"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"domainLists": [
                {"domainListDate": "2025-01-04"},
                {"domainListDate": "2025-01-03"}
            ]}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    for day in ["2025-01-03", "2025-01-04"] {
        let body = format!(
            r#"{{"version":1,"tld":"test","domainListDate":"{day}","uniqueAbuseDomains":1,
               "threats":[{{"threatType":"phishing","count":1,"domains":["x{day}.test"]}}]}}"#,
            day = day
        );
        Mock::given(method("GET"))
            .and(path(format!("/ry/test/v2/metrica/domainList/{}", day)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let (ingester, store, _dir) = stack(&server.uri(), "test", "2025-01-04");
    store
        .replace_day(
            "test",
            date("2025-01-02"),
            &[("a.test".to_string(), "malware".to_string())],
        )
        .unwrap();

    let processed = ingester.run_tld("test").await.expect("catch-up");
    assert_eq!(processed, 2);
    assert_eq!(
        store.max_check_date("test").unwrap(),
        Some(date("2025-01-04"))
    );
    assert_eq!(
        store
            .rows_for_day("test", date("2025-01-03"))
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        store
            .rows_for_day("test", date("2025-01-04"))
            .unwrap()
            .len(),
        1
    );
}

/// A TLD with no published report at all is an ordinary cold-start
/// outcome, not an error.
#[tokio::test]
async fn test_cold_start_with_no_report_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ry/test/v2/metrica/domainList/latest"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (ingester, store, _dir) = stack(&server.uri(), "test", "2025-01-02");
    let processed = ingester.run_tld("test").await.expect("cold start");
    assert_eq!(processed, 0);
    assert!(store.max_check_date("test").unwrap().is_none());
}

/// A mid-run fetch failure aborts the TLD's remaining dates and leaves
/// the already-persisted days in place.
#[tokio::test]
async fn test_fetch_failure_aborts_remaining_dates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ry/test/v2/metrica/domainLists"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"domainLists": [
                {"domainListDate": "2025-01-03"},
                {"domainListDate": "2025-01-04"}
            ]}"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ry/test/v2/metrica/domainList/2025-01-03"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"version":1,"tld":"test","domainListDate":"2025-01-03","uniqueAbuseDomains":1,
               "threats":[{"threatType":"spam","count":1,"domains":["s.test"]}]}"#,
        ))
        .mount(&server)
        .await;

    // 2025-01-04 is advertised but the fetch fails.
    Mock::given(method("GET"))
        .and(path("/ry/test/v2/metrica/domainList/2025-01-04"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (ingester, store, _dir) = stack(&server.uri(), "test", "2025-01-04");
    store
        .replace_day(
            "test",
            date("2025-01-02"),
            &[("a.test".to_string(), "malware".to_string())],
        )
        .unwrap();

    let err = ingester.run_tld("test").await.unwrap_err();
    assert!(err.to_string().contains("2025-01-04") || format!("{:#}", err).contains("500"));

    // The day fetched before the failure is persisted; the high-water
    // mark reflects it.
    assert_eq!(
        store
            .rows_for_day("test", date("2025-01-03"))
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        store.max_check_date("test").unwrap(),
        Some(date("2025-01-03"))
    );
}
