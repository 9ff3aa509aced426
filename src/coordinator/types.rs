// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run and pass state types.
//!
//! # State Transitions
//!
//! ```text
//!            run()
//! Created ──────────→ Running ──────→ Done
//!                        │
//!                        │ (fetch failure, decode failure,
//!                        │  cursor regression)
//!                        ↓
//!                      Failed
//! ```
//!
//! A run is made of one pass per domain. Each pass ends in
//! [`PassState::Done`] or [`PassState::Failed`]; the first failed pass
//! fails the run.

use std::fmt;
use std::sync::Arc;

/// State of a [`Replicator`](super::Replicator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Constructed, [`run()`](super::Replicator::run) not called yet.
    Created,
    /// A pass is in progress.
    Running,
    /// Every pass reached the end of its source.
    Done,
    /// A pass stopped early. Check logs for the cause.
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Created => write!(f, "Created"),
            RunState::Running => write!(f, "Running"),
            RunState::Done => write!(f, "Done"),
            RunState::Failed => write!(f, "Failed"),
        }
    }
}

/// How a single domain pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Done,
    Failed,
}

/// Summary of one domain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub domain: String,
    pub state: PassState,
    /// Cursor after the last fully processed page (log replay), or the
    /// number of heads examined (head reconciliation). A failed log replay
    /// pass resumes from here.
    pub position: u64,
    /// Pages (log replay) fetched.
    pub pages: u64,
    /// Events or heads handed to the policy.
    pub processed: u64,
}

impl PassReport {
    /// Report for a pass over `domain` starting at `position`.
    ///
    /// Stays [`PassState::Failed`] until the pass reaches the end.
    pub fn starting(domain: impl Into<String>, position: u64) -> Self {
        Self {
            domain: domain.into(),
            state: PassState::Failed,
            position,
            pages: 0,
            processed: 0,
        }
    }
}

/// Receives one progress line per object and the final tally.
pub type ProgressSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Sink that prints to stdout.
pub fn stdout_progress() -> ProgressSink {
    Arc::new(|line: &str| println!("{}", line))
}
