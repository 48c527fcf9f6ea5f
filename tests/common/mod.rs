//! Shared mock CMS service for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::json;

use cms_fetcher::app::{naming, ClientConfig, CmsClient, RawFileDescriptor, TimeWindow};
use cms_fetcher::auth::Credential;

/// Envelope flavour the mock answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Json,
    Xml,
}

/// One catalogued raw file
#[derive(Debug, Clone)]
pub struct MockFile {
    pub unix_time: i64,
    pub channel: String,
    pub component: String,
}

impl MockFile {
    pub fn new(unix_time: i64, channel: &str, component: &str) -> Self {
        Self {
            unix_time,
            channel: channel.to_string(),
            component: component.to_string(),
        }
    }

    /// Remote file name the client will request
    pub fn file_part(&self) -> String {
        let descriptor: RawFileDescriptor = serde_json::from_value(json!({
            "unixTime": self.unix_time,
            "channel": self.channel,
            "method": "Velocity",
        }))
        .unwrap();
        naming::file_part(&descriptor, "txt").unwrap()
    }
}

/// In-memory stand-in for the CMS data service
pub struct MockCms {
    pub envelope: Envelope,
    /// (id, identity) pairs
    pub devices: Vec<(String, String)>,
    pub files: HashMap<String, Vec<MockFile>>,
    pub bodies: HashMap<String, String>,
    /// Answer the first catalog request with 429
    pub throttle_catalog_once: bool,
    throttled: AtomicBool,
    pub catalog_requests: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl MockCms {
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            devices: Vec::new(),
            files: HashMap::new(),
            bodies: HashMap::new(),
            throttle_catalog_once: false,
            throttled: AtomicBool::new(false),
            catalog_requests: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn with_device(mut self, id: &str, identity: &str) -> Self {
        self.devices.push((id.to_string(), identity.to_string()));
        self
    }

    /// Catalogue a file for `device_id` and serve `body` for it
    pub fn with_file(mut self, device_id: &str, file: MockFile, body: String) -> Self {
        self.bodies.insert(file.file_part(), body);
        self.files.entry(device_id.to_string()).or_default().push(file);
        self
    }

    fn reply(&self, json_body: serde_json::Value, xml_body: String) -> Response {
        match self.envelope {
            Envelope::Json => axum::Json(json_body).into_response(),
            Envelope::Xml => (
                [(header::CONTENT_TYPE, "application/xml;charset=UTF-8")],
                xml_body,
            )
                .into_response(),
        }
    }
}

async fn login(State(cms): State<Arc<MockCms>>) -> Response {
    cms.reply(
        json!({ "accessToken": { "token": "session-1" } }),
        "<?xml version=\"1.0\"?><loginResult><accessToken><token>session-1</token>\
         </accessToken></loginResult>"
            .to_string(),
    )
}

async fn systems(State(cms): State<Arc<MockCms>>) -> Response {
    cms.catalog_requests.fetch_add(1, Ordering::SeqCst);
    if cms.throttle_catalog_once && !cms.throttled.swap(true, Ordering::SeqCst) {
        return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "0")]).into_response();
    }

    let items: Vec<_> = cms
        .devices
        .iter()
        .map(|(id, identity)| {
            json!({ "id": id, "identity": identity, "name": format!("NX-WF-01-{}", identity) })
        })
        .collect();
    let xml: String = cms
        .devices
        .iter()
        .map(|(id, identity)| {
            format!(
                "<systemItem><id>{id}</id><identity>{identity}</identity>\
                 <name>NX-WF-01-{identity}</name></systemItem>"
            )
        })
        .collect();

    let json_body = if items.is_empty() {
        json!({ "systemItems": null })
    } else {
        json!({ "systemItems": { "systemItem": items } })
    };
    cms.reply(json_body, format!("<systemItems>{xml}</systemItems>"))
}

async fn rawfiles(State(cms): State<Arc<MockCms>>, UrlPath(id): UrlPath<String>) -> Response {
    let files = cms.files.get(&id).cloned().unwrap_or_default();
    if files.is_empty() {
        return cms.reply(
            json!({ "rawFileItems": null }),
            "<result></result>".to_string(),
        );
    }

    let items: Vec<_> = files
        .iter()
        .map(|f| {
            json!({
                "unixTime": f.unix_time,
                "channel": f.channel,
                "method": "Velocity",
                "filter": -1,
                "metadata": { "component": f.component }
            })
        })
        .collect();
    let xml: String = files
        .iter()
        .map(|f| {
            format!(
                "<rawFileItem><unixTime>{}</unixTime><channel>{}</channel>\
                 <method>Velocity</method><filter>-1</filter>\
                 <metadata><component>{}</component></metadata></rawFileItem>",
                f.unix_time, f.channel, f.component
            )
        })
        .collect();

    cms.reply(
        json!({ "rawFileItems": { "rawFileItem": items } }),
        format!("<rawFileItems>{xml}</rawFileItems>"),
    )
}

async fn rawfile(
    State(cms): State<Arc<MockCms>>,
    UrlPath((_id, file)): UrlPath<(String, String)>,
) -> Response {
    cms.downloads.fetch_add(1, Ordering::SeqCst);
    match cms.bodies.get(&file) {
        Some(body) => body.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve `cms` on an ephemeral port and return a client pointed at it
pub async fn serve(cms: Arc<MockCms>) -> Arc<CmsClient> {
    let app = Router::new()
        .route("/auth/login", get(login))
        .route("/systems", get(systems))
        .route("/systems/{id}/rawfiles", get(rawfiles))
        .route("/systems/{id}/rawfiles/{file}", get(rawfile))
        .with_state(cms);

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

/// Three 1 Hz samples starting at `start`
pub fn capture(start: i64) -> String {
    format!(
        "[ADUChannel:0]\nMeasUnit=g\nstarttime={start}\niSampleRate=1\niSampleCnt=3\n\
         [ADUData:0]\n0.1\n0.2\n0.3\n"
    )
}

pub fn window(start: i64, end: i64) -> TimeWindow {
    TimeWindow::new(
        Utc.timestamp_opt(start, 0).unwrap(),
        Utc.timestamp_opt(end, 0).unwrap(),
    )
    .unwrap()
}

pub fn credential() -> Credential {
    Credential::from_api_key("dXNlcjpwYXNz")
}
