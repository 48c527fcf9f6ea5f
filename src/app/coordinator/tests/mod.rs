//! Unit tests for the ingestion coordinator
//!
//! A small axum server stands in for the CMS service. End-to-end scenarios
//! over JSON and XML envelopes live in the top-level tests directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use super::*;
use crate::app::client::ClientConfig;
use crate::app::naming;

const TURBINE: &str = "DEN-TOL-N-89608";

#[derive(Default, Clone, Copy)]
enum LoginReply {
    #[default]
    Token,
    NoToken,
    Html,
}

#[derive(Default)]
struct MockService {
    login: LoginReply,
    systems_status: Option<StatusCode>,
    devices: Vec<Value>,
    files: HashMap<String, Vec<Value>>,
    bodies: HashMap<String, String>,
    downloads: AtomicUsize,
}

async fn login(State(service): State<Arc<MockService>>) -> Response {
    match service.login {
        LoginReply::Token => Json(json!({ "accessToken": { "token": "session-1" } })).into_response(),
        LoginReply::NoToken => Json(json!({ "accessToken": { "expires": 3600 } })).into_response(),
        LoginReply::Html => (
            [(axum::http::header::CONTENT_TYPE, "text/html")],
            "<html><body>Sign in</body></html>",
        )
            .into_response(),
    }
}

async fn systems(State(service): State<Arc<MockService>>) -> Response {
    if let Some(status) = service.systems_status {
        return status.into_response();
    }
    Json(json!({ "systemItems": { "systemItem": service.devices } })).into_response()
}

async fn rawfiles(
    State(service): State<Arc<MockService>>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    let items = service.files.get(&id).cloned().unwrap_or_default();
    Json(json!({ "rawFileItems": { "rawFileItem": items } })).into_response()
}

async fn rawfile(
    State(service): State<Arc<MockService>>,
    UrlPath((_id, file)): UrlPath<(String, String)>,
) -> Response {
    service.downloads.fetch_add(1, Ordering::SeqCst);
    match service.bodies.get(&file) {
        Some(body) => body.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve(service: Arc<MockService>) -> Arc<CmsClient> {
    let app = Router::new()
        .route("/auth/login", get(login))
        .route("/systems", get(systems))
        .route("/systems/{id}/rawfiles", get(rawfiles))
        .route("/systems/{id}/rawfiles/{file}", get(rawfile))
        .with_state(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ClientConfig {
        base_url: format!("http://{}", addr),
        rate_limit_rps: 1000,
        ..Default::default()
    };
    Arc::new(CmsClient::new(&config).unwrap())
}

fn device(id: &str, identity: &str) -> Value {
    json!({ "id": id, "identity": identity, "name": format!("NX-WF-01-{}", identity) })
}

fn descriptor(unix_time: i64, channel: &str) -> Value {
    json!({
        "unixTime": unix_time,
        "channel": channel,
        "method": "Velocity",
        "filter": -1,
        "metadata": { "component": "MainBearing" }
    })
}

fn capture(start: i64) -> String {
    format!(
        "[ADUChannel:0]\nMeasUnit=g\nstarttime={start}\niSampleRate=1\niSampleCnt=3\n\
         [ADUData:0]\n0.1\n0.2\n0.3\n"
    )
}

fn file_name(item: &Value) -> String {
    let descriptor: RawFileDescriptor = serde_json::from_value(item.clone()).unwrap();
    naming::file_part(&descriptor, "txt").unwrap()
}

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.timestamp_opt(50, 0).unwrap(),
        Utc.timestamp_opt(250, 0).unwrap(),
    )
    .unwrap()
}

fn credential() -> Credential {
    Credential::from_api_key("dXNlcjpwYXNz")
}

/// Two devices, each with two captures that are all downloadable
fn two_device_service() -> MockService {
    let mut service = MockService {
        devices: vec![device("7592", TURBINE), device("3985", "DEN-TOL-N-89609")],
        ..Default::default()
    };
    for id in ["7592", "3985"] {
        let items = vec![descriptor(100, "AI1"), descriptor(200, "AI1")];
        for (item, start) in items.iter().zip([100, 200]) {
            service.bodies.insert(file_name(item), capture(start));
        }
        service.files.insert(id.to_string(), items);
    }
    service
}

#[tokio::test]
async fn test_failed_download_is_skipped() {
    let mut service = MockService {
        devices: vec![device("7592", TURBINE)],
        ..Default::default()
    };
    let good = descriptor(100, "AI1");
    let missing = descriptor(200, "AI1");
    service.bodies.insert(file_name(&good), capture(100));
    service.files.insert("7592".to_string(), vec![good, missing]);

    let service = Arc::new(service);
    let client = serve(service.clone()).await;
    let coordinator = Coordinator::new(CoordinatorConfig::default(), client, credential());

    let result = coordinator.run(&window()).await.unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(service.downloads.load(Ordering::SeqCst), 2);

    let stats = coordinator.stats().await;
    assert_eq!(stats.files_listed, 2);
    assert_eq!(stats.files_fetched, 1);
    assert_eq!(stats.files_failed, 1);
    assert_eq!(stats.records, 3);
}

#[tokio::test]
async fn test_allow_list_restricts_devices() {
    let service = Arc::new(two_device_service());
    let client = serve(service.clone()).await;
    let config = CoordinatorConfig::default().with_allowed_devices(["3985"]);
    let coordinator = Coordinator::new(config, client, credential());

    let result = coordinator.run(&window()).await.unwrap();
    assert_eq!(result.len(), 6);
    assert!(result
        .records()
        .iter()
        .all(|r| r.turbine == "DEN-TOL-N-89609"));
    assert_eq!(service.downloads.load(Ordering::SeqCst), 2);

    let stats = coordinator.stats().await;
    assert_eq!(stats.devices_listed, 2);
    assert_eq!(stats.devices_selected, 1);
}

#[tokio::test]
async fn test_concurrent_run_matches_sequential_run() {
    let service = Arc::new(two_device_service());
    let client = serve(service).await;

    let sequential = Coordinator::new(CoordinatorConfig::default(), client.clone(), credential())
        .run(&window())
        .await
        .unwrap();
    let concurrent = Coordinator::new(
        CoordinatorConfig::default().with_concurrency(4),
        client,
        credential(),
    )
    .run(&window())
    .await
    .unwrap();

    assert_eq!(sequential.len(), 12);
    assert_eq!(sequential, concurrent);
}

#[tokio::test]
async fn test_records_carry_context_tags() {
    let service = Arc::new(two_device_service());
    let client = serve(service).await;
    let config = CoordinatorConfig::default().with_allowed_devices(["7592"]);

    let result = Coordinator::new(config, client, credential())
        .run(&window())
        .await
        .unwrap();

    let first = &result.records()[0];
    assert_eq!(first.turbine, TURBINE);
    assert_eq!(first.component, "MainBearing");
    assert_eq!(first.sensor, "AI1");
    assert_eq!(first.group.as_deref(), Some(TURBINE));
    assert_eq!(first.frequency, Some(1.0));
    assert_eq!(first.timestamp, Utc.timestamp_opt(100, 0).unwrap());
}

#[tokio::test]
async fn test_raw_files_are_archived() {
    let service = Arc::new(two_device_service());
    let client = serve(service).await;
    let raw = TempDir::new().unwrap();
    let config = CoordinatorConfig::default()
        .with_allowed_devices(["7592"])
        .with_raw_dir(raw.path());

    Coordinator::new(config, client, credential())
        .run(&window())
        .await
        .unwrap();

    let dir = raw.path().join(TURBINE).join("MainBearing");
    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.starts_with(TURBINE) && n.ends_with(".txt")));
    let content = std::fs::read_to_string(dir.join(&names[0])).unwrap();
    assert_eq!(content, capture(100));
}

#[tokio::test]
async fn test_progress_events_are_emitted() {
    let service = Arc::new(two_device_service());
    let client = serve(service).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = CoordinatorConfig::default().with_allowed_devices(["7592"]);

    Coordinator::new(config, client, credential())
        .with_progress(tx)
        .run(&window())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events[0], ProgressEvent::DevicesSelected { count: 1 });
    assert_eq!(
        events[1],
        ProgressEvent::FilesListed {
            device: TURBINE.to_string(),
            count: 2
        }
    );
    let processed = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::FileProcessed { records: 3, .. }))
        .count();
    assert_eq!(processed, 2);
}

#[tokio::test]
async fn test_cancelled_run_returns_error() {
    let service = Arc::new(two_device_service());
    let client = serve(service.clone()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let coordinator =
        Coordinator::new(CoordinatorConfig::default(), client, credential()).with_cancellation(cancel);

    let err = coordinator.run(&window()).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(service.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_network() {
    let client = Arc::new(CmsClient::new(&ClientConfig::default()).unwrap());
    let config = CoordinatorConfig::default().with_concurrency(0);

    let result = Coordinator::new(config, client, credential())
        .run(&window())
        .await;
    assert!(result.is_err());
}

async fn assert_fatal(service: MockService, category: &str) {
    let service = Arc::new(service);
    let client = serve(service.clone()).await;
    let coordinator = Coordinator::new(CoordinatorConfig::default(), client, credential());

    let err = coordinator.run(&window()).await.unwrap_err();
    assert_eq!(err.category(), category);
    assert_eq!(service.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_login_without_token_is_fatal() {
    let service = MockService {
        login: LoginReply::NoToken,
        ..two_device_service()
    };
    assert_fatal(service, "authentication").await;
}

#[tokio::test]
async fn test_html_login_is_fatal() {
    let service = MockService {
        login: LoginReply::Html,
        ..two_device_service()
    };
    assert_fatal(service, "authentication").await;
}

#[tokio::test]
async fn test_catalog_server_error_is_fatal() {
    let service = MockService {
        systems_status: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..two_device_service()
    };
    assert_fatal(service, "catalog").await;
}

#[tokio::test]
async fn test_hostile_component_stays_inside_raw_dir() {
    let mut service = MockService {
        devices: vec![device("7592", TURBINE)],
        ..Default::default()
    };
    let item = json!({
        "unixTime": 100,
        "channel": "AI1",
        "method": "Velocity",
        "filter": -1,
        "metadata": { "component": "../../escape" }
    });
    service.bodies.insert(file_name(&item), capture(100));
    service.files.insert("7592".to_string(), vec![item]);

    let root = TempDir::new().unwrap();
    let raw = root.path().join("raw");
    let client = serve(Arc::new(service)).await;
    let config = CoordinatorConfig::default().with_raw_dir(&raw);

    let result = Coordinator::new(config, client, credential())
        .run(&window())
        .await
        .unwrap();
    assert_eq!(result.len(), 3);

    let dir = raw.join(TURBINE).join(".._.._escape");
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
    assert!(!root.path().join("escape").exists());
    assert!(!raw.join("escape").exists());
}

#[tokio::test]
async fn test_out_of_range_capture_time_is_skipped() {
    let mut service = MockService {
        devices: vec![device("7592", TURBINE)],
        ..Default::default()
    };
    let good = descriptor(100, "AI1");
    service.bodies.insert(file_name(&good), capture(100));
    service
        .files
        .insert("7592".to_string(), vec![descriptor(9_000_000_000_000_000_000, "AI1"), good]);

    let service = Arc::new(service);
    let client = serve(service.clone()).await;
    let coordinator = Coordinator::new(CoordinatorConfig::default(), client, credential());

    let result = coordinator.run(&window()).await.unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(service.downloads.load(Ordering::SeqCst), 1);

    let stats = coordinator.stats().await;
    assert_eq!(stats.files_listed, 2);
    assert_eq!(stats.files_fetched, 1);
    assert_eq!(stats.files_failed, 1);
}
