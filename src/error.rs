// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for site replication.
//!
//! Errors are categorized by their source (remote store, local staging,
//! payload decoding, etc.) and carry enough context to explain a failed
//! replication step in a log line.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Remote` | 503 only | Non-success HTTP status from a store or file service |
//! | `Http` | Yes | Transport failure (connect, TLS, timeout) |
//! | `RetryExhausted` | Yes | Store stayed unavailable for the whole retry budget |
//! | `Json` | No | Response or payload is not the expected JSON |
//! | `Decode` | No | Log entry payload cannot be decoded |
//! | `Io` | No | Local staging file errors |
//! | `Config` | No | Configuration invalid |
//! | `CursorRegression` | No | Attempt to move the log cursor backwards |
//! | `TransferFailed` | No | An attachment part was rejected |
//! | `InvalidObject` | No | Object lacks a field its type requires |
//! | `Internal` | No | Unexpected internal error |
//!
//! Inside a replication pass most of these are caught per object and counted
//! in [`RunStatus::errors`](crate::status::RunStatus). `Decode` and
//! `CursorRegression` are never caught: they abort the pass.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// HTTP status the remote store uses for "temporarily unavailable".
pub const STATUS_UNAVAILABLE: u16 = 503;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// A remote endpoint answered with a non-success status.
    ///
    /// `body` holds the (possibly truncated) response body for diagnostics.
    #[error("Remote error {status} from {url}: {body}")]
    Remote { status: u16, url: String, body: String },

    /// Transport-level HTTP failure (no status was received).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A log entry payload failed to decode.
    ///
    /// Not retryable - the event is malformed at the source and skipping it
    /// would break the cursor guarantee.
    #[error("Decode error at seq {seq}: {message}")]
    Decode { seq: u64, message: String },

    /// Local filesystem error (staging directory, export files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store kept answering "unavailable" for the whole retry budget.
    #[error("{operation}: still unavailable after {attempts} attempts")]
    RetryExhausted { operation: String, attempts: usize },

    /// The log cursor was asked to move backwards.
    #[error("Cursor regression: current {current}, requested {requested}")]
    CursorRegression { current: u64, requested: u64 },

    /// An attachment part upload was rejected.
    #[error("Transfer of {upload_id} failed at part {part} with status {status}")]
    TransferFailed {
        upload_id: String,
        part: usize,
        status: u16,
    },

    /// An object cannot be replicated as it stands (e.g. a design object
    /// without a design file reference).
    #[error("Object {id}: {reason}")]
    InvalidObject { id: String, reason: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a remote error from a status, URL and response body.
    pub fn remote(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > 512 {
            let mut cut = 512;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Remote {
            status,
            url: url.into(),
            body,
        }
    }

    /// Create a decode error for the event at `seq`.
    pub fn decode(seq: u64, message: impl Into<String>) -> Self {
        Self::Decode {
            seq,
            message: message.into(),
        }
    }

    pub fn invalid_object(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidObject {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::TransferFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { status, .. } => *status == STATUS_UNAVAILABLE,
            Self::Http(_) => true,
            Self::RetryExhausted { .. } => true,
            Self::Json(_) => false,
            Self::Decode { .. } => false,
            Self::Io(_) => false,
            Self::Config(_) => false,
            Self::CursorRegression { .. } => false,
            Self::TransferFailed { .. } => false,
            Self::InvalidObject { .. } => false,
            Self::Internal(_) => false,
        }
    }

    /// Errors that must stop a replication pass instead of being counted
    /// against a single object.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::CursorRegression { .. } | Self::Config(_) | Self::Internal(_)
        )
    }
}

impl From<reqwest::Error> for ReplicationError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_unavailable_is_retryable() {
        let err = ReplicationError::remote(503, "http://store/x", "busy");
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_remote_client_error_not_retryable() {
        let err = ReplicationError::remote(409, "http://store/x", "conflict");
        assert!(!err.is_retryable());
        assert!(!err.is_fatal_for_run());
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("conflict"));
    }

    #[test]
    fn test_remote_body_truncated() {
        let err = ReplicationError::remote(500, "u", "é".repeat(400));
        match err {
            ReplicationError::Remote { body, .. } => assert!(body.len() <= 512),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_is_fatal() {
        let err = ReplicationError::decode(42, "bad base64");
        assert!(err.is_fatal_for_run());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("seq 42"));
    }

    #[test]
    fn test_cursor_regression_formatting() {
        let err = ReplicationError::CursorRegression {
            current: 10,
            requested: 3,
        };
        assert!(err.is_fatal_for_run());
        assert!(err.to_string().contains("current 10"));
    }

    #[test]
    fn test_transfer_failed_status() {
        let err = ReplicationError::TransferFailed {
            upload_id: "U1".into(),
            part: 2,
            status: 413,
        };
        assert_eq!(err.status(), Some(413));
        assert!(err.to_string().contains("U1"));
    }

    #[test]
    fn test_retry_exhausted_retryable() {
        let err = ReplicationError::RetryExhausted {
            operation: "fetch_log_page".into(),
            attempts: 3,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("fetch_log_page"));
    }

    #[test]
    fn test_invalid_object_counted_not_fatal() {
        let err = ReplicationError::invalid_object("D1", "design object without doFileUUID");
        assert!(!err.is_fatal_for_run());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Object D1: design object without doFileUUID");
    }
}
