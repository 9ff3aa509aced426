// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Raw event-log entries and their decoding.
//!
//! The log endpoint returns pages of `{ "seq": n, "data_b64": "..." }`
//! entries. Each payload is the base64 of one JSON object. Decoding is
//! strict: an entry that does not decode to an object is an error, never a
//! silent skip, because the driver would otherwise advance its cursor past
//! data it never looked at.
//!
//! # Page Shape
//!
//! ```json
//! { "events": [ { "seq": 7, "data_b64": "eyJfaWQiOiJBIn0=" } ], "next": 7 }
//! ```
//!
//! `next` is optional; when absent the highest `seq` in the page is used.

use crate::error::{ReplicationError, Result};
use crate::object::DomainObject;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One undecoded entry of a domain's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogEntry {
    /// Position in the log (strictly increasing).
    pub seq: u64,
    /// Base64 JSON payload.
    pub data_b64: String,
}

impl RawLogEntry {
    /// Decode the payload into a [`LogEvent`].
    pub fn decode(&self) -> Result<LogEvent> {
        let payload = self.data_b64.trim();
        let bytes = STANDARD
            .decode(payload)
            .or_else(|_| URL_SAFE.decode(payload))
            .map_err(|e| ReplicationError::decode(self.seq, format!("invalid base64: {e}")))?;

        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| ReplicationError::decode(self.seq, format!("invalid JSON: {e}")))?;

        let object = DomainObject::from_value(value)
            .ok_or_else(|| ReplicationError::decode(self.seq, "payload is not a JSON object"))?;

        trace!(seq = self.seq, id = %object.display_id(), "Decoded log entry");

        Ok(LogEvent {
            seq: self.seq,
            object,
        })
    }
}

/// A decoded log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub seq: u64,
    pub object: DomainObject,
}

/// One page of the event log as returned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogPage {
    #[serde(default)]
    pub events: Vec<RawLogEntry>,
    /// Cursor to request the following page after.
    #[serde(default)]
    pub next: Option<u64>,
}

impl LogPage {
    /// Highest `seq` in the page.
    pub fn max_seq(&self) -> Option<u64> {
        self.events.iter().map(|e| e.seq).max()
    }

    /// Cursor for the next request: `next` if reported, else the page's
    /// highest `seq`.
    ///
    /// Not clamped: a store reporting a cursor below the request is
    /// surfaced to the cursor as a regression.
    pub fn next_cursor(&self) -> Option<u64> {
        self.next.or_else(|| self.max_seq())
    }

    /// Entries sorted by ascending `seq`, dropping any at or below `after`.
    ///
    /// Stores are expected to return exactly that already; this keeps the
    /// processing order guarantee if one doesn't.
    pub fn ordered_after(mut self, after: u64) -> Vec<RawLogEntry> {
        self.events.retain(|e| e.seq > after);
        self.events.sort_by_key(|e| e.seq);
        self.events
    }
}

/// Result of asking the store for a log page.
#[derive(Debug, Clone)]
pub enum PageFetch {
    /// A page of events (non-empty).
    Page(LogPage),
    /// The store has nothing after the requested cursor.
    Exhausted,
}

/// Build a raw entry from an object (tests, fuzzing, and `load`-style tools).
pub fn encode_entry(seq: u64, object: &DomainObject) -> Result<RawLogEntry> {
    Ok(RawLogEntry {
        seq,
        data_b64: object.to_b64()?,
    })
}
