// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One-shot verbs: a single request (or a short fixed sequence) against one
//! site, with the result rendered as JSON.

use crate::client::RemoteStoreClient;
use crate::error::{ReplicationError, Result};
use crate::object::{Bookkeeping, DomainObject};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// View listing every region by name.
pub const REGION_VIEW: &str = "v_sl_region_by_name";
pub const TYPE_REGION: &str = "sl::region";
const HISTORY_LIMIT: usize = 10;

/// Render `value` as 4-space-indented JSON, or as one compact line per
/// array element with `jsonl`. Object keys come out sorted.
pub fn render(value: &Value, jsonl: bool) -> Result<String> {
    if jsonl {
        let lines = match value {
            Value::Array(items) => items
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?,
            other => vec![serde_json::to_string(other)?],
        };
        return Ok(lines.join("\n"));
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| ReplicationError::Internal(e.to_string()))
}

pub async fn get(client: &RemoteStoreClient, id: &str) -> Result<Value> {
    Ok(client
        .fetch_object(id)
        .await?
        .map(DomainObject::into_value)
        .unwrap_or(Value::Null))
}

pub async fn stats(client: &RemoteStoreClient) -> Result<Value> {
    client.get_stats().await
}

pub async fn view(client: &RemoteStoreClient, name: &str) -> Result<Value> {
    let items = client.fetch_view_all(name).await?;
    Ok(serde_json::to_value(items)?)
}

/// Revision history of `id`, newest first.
pub async fn hist(client: &RemoteStoreClient, id: &str) -> Result<Value> {
    Ok(Value::Array(client.fetch_history(id, HISTORY_LIMIT).await?))
}

/// Post one object with missing bookkeeping filled in and return the
/// stored head.
pub async fn post_and_fetch(client: &RemoteStoreClient, value: Value) -> Result<Value> {
    let mut object = DomainObject::from_value(value)
        .ok_or_else(|| ReplicationError::Config("expected a JSON object".into()))?;
    object.complete_bookkeeping(Bookkeeping::FillMissing);
    let id = object.display_id().to_string();
    client.post_object(object).await?;
    get(client, &id).await
}

/// Post a JSON object or array of objects read from `path`.
pub async fn load(client: &RemoteStoreClient, path: &Path) -> Result<Vec<Value>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let objects = match parsed {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut stored = Vec::with_capacity(objects.len());
    for object in objects {
        stored.push(post_and_fetch(client, object).await?);
    }
    Ok(stored)
}

/// Post one JSON object per non-blank line of `path`.
pub async fn lines(client: &RemoteStoreClient, path: &Path) -> Result<Vec<Value>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let mut stored = Vec::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        stored.push(post_and_fetch(client, serde_json::from_str(line)?).await?);
    }
    Ok(stored)
}

/// `[{"point": p, "action": ""}, ...]` for a region's vertices.
fn region_points(value: &Value) -> Option<(String, Value)> {
    let name = value.get("name")?.as_str()?.replace('/', "");
    let points = value
        .get("vertices")?
        .get("data")?
        .as_array()?
        .iter()
        .map(|p| json!({ "point": p, "action": "" }))
        .collect();
    Some((format!("{}.json", name), Value::Array(points)))
}

/// Write every region of the site to `<dir>/<name>.json`.
///
/// Entries that are not well-formed regions are logged and skipped.
/// Returns the files written.
pub async fn export_regions(client: &RemoteStoreClient, dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let items = client.fetch_view_all(REGION_VIEW).await?;

    let mut written = Vec::new();
    for item in items {
        let Some(value) = item.value else {
            warn!(key = %item.key, "Region entry without value");
            continue;
        };
        if value.get("_type").and_then(Value::as_str) != Some(TYPE_REGION) {
            continue;
        }
        let Some((file_name, points)) = region_points(&value) else {
            warn!(key = %item.key, "Malformed region, skipping");
            continue;
        };
        let path = dir.join(file_name);
        tokio::fs::write(&path, serde_json::to_string(&points)?).await?;
        debug!(path = %path.display(), "Exported region");
        written.push(path);
    }
    Ok(written)
}
