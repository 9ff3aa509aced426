//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Log paging (events read, page latency)
//! - Replication outcomes per object type
//! - Store availability retries
//! - Attachment transfers
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Histograms track durations in `_seconds`
//!
//! Nothing is exported unless the embedding process installs a recorder;
//! the calls are cheap no-ops otherwise.

use crate::status::Outcome;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record events read from a domain's log.
pub fn record_events_read(domain: &str, count: usize) {
    counter!("replication_events_read_total", "domain" => domain.to_string()).increment(count as u64);
}

/// Record log page fetch latency.
pub fn record_page_latency(domain: &str, duration: Duration) {
    histogram!("replication_page_fetch_duration_seconds", "domain" => domain.to_string())
        .record(duration.as_secs_f64());
}

/// Record the current cursor position.
pub fn record_cursor(domain: &str, position: u64) {
    gauge!("replication_cursor_position", "domain" => domain.to_string()).set(position as f64);
}

/// Record the outcome for one object.
pub fn record_outcome(domain: &str, type_tag: &str, outcome: Outcome) {
    counter!(
        "replication_objects_total",
        "domain" => domain.to_string(),
        "type" => type_tag.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a retry caused by a "temporarily unavailable" response.
pub fn record_unavailable_retry(operation: &str) {
    counter!("replication_unavailable_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a successful attachment part upload.
pub fn record_part_uploaded(encoding: &str, bytes: usize) {
    counter!("replication_attachment_parts_total", "encoding" => encoding.to_string()).increment(1);
    counter!("replication_attachment_bytes_total", "encoding" => encoding.to_string()).increment(bytes as u64);
}

/// Record an attachment transfer result.
pub fn record_transfer(kind: &str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("replication_transfers_total", "kind" => kind.to_string(), "status" => status).increment(1);
    histogram!("replication_transfer_duration_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Record a destination write.
pub fn record_write(domain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replication_writes_total", "domain" => domain.to_string(), "status" => status).increment(1);
}
