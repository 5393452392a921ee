//! Integration tests for the report route.
//!
//! These drive the axum router directly with in-memory stores, so they need
//! neither a network socket nor a MySQL server.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serverinfo_service::config::Config;
use serverinfo_service::report::Report;
use serverinfo_service::server::{router, AppState};
use serverinfo_service::storage::{ReportStore, SqliteStore, StorageError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const VALID_BODY: &str = r#"{"email":"a@b.com","version":"1.2.3"}"#;

/// Store that counts insert attempts and fails them all.
#[derive(Default)]
struct BrokenStore {
    inserts: AtomicUsize,
}

#[async_trait]
impl ReportStore for BrokenStore {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_report(&self, _report: &Report) -> Result<(), StorageError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Sqlite(rusqlite::Error::ExecuteReturnedResults))
    }
}

fn report_request(agent: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/");
    if let Some(agent) = agent {
        builder = builder.header(header::USER_AGENT, agent);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Send one request and return the status and body.
async fn send(store: Arc<dyn ReportStore>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let app = router(AppState::new(Config::default(), store));
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn sqlite_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

fn expected_report() -> Report {
    Report {
        email: "a@b.com".to_string(),
        version: "1.2.3".to_string(),
    }
}

#[tokio::test]
async fn test_new_report_is_stored() {
    let store = sqlite_store();

    let (status, body) = send(store.clone(), report_request(Some("irmaserver"), VALID_BODY)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty(), "success carries no body");
    assert!(store.contains(&expected_report()).await.unwrap());
    assert_eq!(store.report_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_repeated_report_is_idempotent() {
    let store = sqlite_store();

    for _ in 0..2 {
        let (status, body) =
            send(store.clone(), report_request(Some("irmaserver"), VALID_BODY)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    assert_eq!(store.report_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_duplicates_store_one_record() {
    let store = sqlite_store();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store: Arc<dyn ReportStore> = store.clone();
        handles.push(tokio::spawn(async move {
            send(store, report_request(Some("irmaserver"), VALID_BODY)).await.0
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(store.report_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_new_version_is_a_new_record() {
    let store = sqlite_store();

    send(store.clone(), report_request(Some("irmaserver"), VALID_BODY)).await;
    let (status, _) = send(
        store.clone(),
        report_request(
            Some("irmaserver"),
            r#"{"email":"a@b.com","version":"1.2.4"}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.report_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_wrong_client_is_rejected() {
    let store = sqlite_store();
    send(store.clone(), report_request(Some("irmaserver"), VALID_BODY)).await;

    let (status, body) = send(store.clone(), report_request(Some("other-client"), VALID_BODY)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.is_empty());
    assert_eq!(store.report_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_wrong_client_never_reaches_storage() {
    let store = Arc::new(BrokenStore::default());

    for agent in [None, Some("other-client"), Some("irmaserver-fork")] {
        let (status, _) = send(store.clone(), report_request(agent, "garbage")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let store = sqlite_store();

    let bodies = [
        "",
        "not json",
        r#"{"email":"a@b.com""#,
        r#"{"email":"a@b.com"}"#,
        r#"{"version":"1.2.3"}"#,
        r#"{"email":"a@b.com","version":123}"#,
        r#"{"email":"","version":"1.2.3"}"#,
        r#"["a@b.com","1.2.3"]"#,
    ];

    for body in bodies {
        let (status, response_body) =
            send(store.clone(), report_request(Some("irmaserver"), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert!(response_body.is_empty());
    }

    assert_eq!(store.report_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let store = sqlite_store();
    let body = format!(
        r#"{{"email":"a@b.com","version":"{}"}}"#,
        "9".repeat(128 * 1024)
    );

    let (status, _) = send(store.clone(), report_request(Some("irmaserver"), &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.report_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_storage_failure_is_server_error() {
    let store = Arc::new(BrokenStore::default());

    let (status, body) = send(store.clone(), report_request(Some("irmaserver"), VALID_BODY)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty(), "storage details must not leak");
    assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_only_post_is_routed() {
    let store = sqlite_store();

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .header(header::USER_AGENT, "irmaserver")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(store.clone(), request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let request = Request::builder()
        .method("POST")
        .uri("/serverinfo")
        .header(header::USER_AGENT, "irmaserver")
        .body(Body::from(VALID_BODY))
        .unwrap();
    let (status, _) = send(store.clone(), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(store.report_count().await.unwrap(), 0);
}
