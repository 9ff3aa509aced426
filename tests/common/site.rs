//! wiremock helpers standing in for a source site.
//!
//! Sites in tests follow `ReplicationConfig::for_testing`: the source is
//! `site-a`, the destination `site-b`, both on the same mock server.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use site_replication::coordinator::ProgressSink;
use site_replication::ReplicationConfig;
use std::path::Path;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SOURCE_SITE: &str = "site-a";
pub const DEST_SITE: &str = "site-b";

/// Log entry `{seq, data_b64}` for an object.
pub fn entry(seq: u64, object: Value) -> Value {
    json!({ "seq": seq, "data_b64": STANDARD.encode(object.to_string()) })
}

pub fn log_path(site: &str, domain: &str) -> String {
    format!("/rdm_log/v1/site/{}/domain/{}/events", site, domain)
}

/// Serve `entries` as a single page after cursor `after`.
pub async fn mount_page(server: &MockServer, domain: &str, after: u64, entries: Vec<Value>, next: Option<u64>) {
    let mut body = json!({ "events": entries });
    if let Some(next) = next {
        body["next"] = json!(next);
    }
    Mock::given(method("GET"))
        .and(path(log_path(SOURCE_SITE, domain)))
        .and(query_param("after", after.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Every log request not matched by an earlier mock is "exhausted".
///
/// Mount after the pages.
pub async fn mount_log_end(server: &MockServer, domain: &str) {
    Mock::given(method("GET"))
        .and(path(log_path(SOURCE_SITE, domain)))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

/// Source log for `domain` consisting of one page holding `objects`
/// with seqs 1..=n.
pub async fn mount_log(server: &MockServer, domain: &str, objects: Vec<Value>) {
    let entries: Vec<Value> = objects
        .into_iter()
        .enumerate()
        .map(|(i, o)| entry(i as u64 + 1, o))
        .collect();
    if !entries.is_empty() {
        mount_page(server, domain, 0, entries, None).await;
    }
    mount_log_end(server, domain).await;
}

/// A `fs::file` whose bytes are served by the source's file service.
pub async fn mount_source_file(server: &MockServer, uuid: &str, bytes: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/filesystem/v1/site/{}/files/{}/url", SOURCE_SITE, uuid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/blob/{}", server.uri(), uuid)
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/blob/{}", uuid)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
        .mount(server)
        .await;
}

pub fn file_upload_path(uuid: &str) -> String {
    format!("/filesystem/v1/site/{}/files/{}/upload", DEST_SITE, uuid)
}

pub fn design_upload_path(uuid: &str) -> String {
    format!("/designfiles/v1/site/{}/designfiles/{}/upload", DEST_SITE, uuid)
}

/// Destination upload endpoint answering every part with `status`.
pub async fn mount_upload(server: &MockServer, upload_path: String, status: u16) {
    Mock::given(method("POST"))
        .and(path(upload_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Config for a run against `server` staging into `staging`.
pub fn test_config(server: &MockServer, staging: &Path) -> ReplicationConfig {
    let mut config = ReplicationConfig::for_testing(&server.uri());
    config.settings.staging_dir = staging.to_path_buf();
    config
}

/// Progress sink collecting lines for assertions.
pub fn capture_progress() -> (ProgressSink, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&lines);
    let sink: ProgressSink = Arc::new(move |line: &str| captured.lock().unwrap().push(line.to_string()));
    (sink, lines)
}
