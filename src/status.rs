// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run totals for one replication invocation.

use serde::Serialize;
use std::fmt;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Copied,
    Ignored,
    /// Destination already holds this revision (head reconciliation only).
    Skipped,
    Errored,
    /// Dropped without touching any counter, `count` included.
    Silent,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Copied => "copied",
            Outcome::Ignored => "ignored",
            Outcome::Skipped => "skipped",
            Outcome::Errored => "errored",
            Outcome::Silent => "silent",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters shared by every pass of one run.
///
/// `count` is the number of events decided. Each of them bumps exactly one
/// of the outcome counters; [`Outcome::Silent`] events are not recorded at
/// all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub count: u64,
    pub ignored: u64,
    pub copied: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Copied => &mut self.copied,
            Outcome::Ignored => &mut self.ignored,
            Outcome::Skipped => &mut self.skipped,
            Outcome::Errored => &mut self.errors,
            Outcome::Silent => return,
        };
        *counter += 1;
        self.count += 1;
    }

    /// Sum of the outcome counters.
    pub fn decided(&self) -> u64 {
        self.ignored + self.copied + self.skipped + self.errors
    }

    /// Final line of a head reconciliation run.
    pub fn head_tally(&self) -> String {
        format!(
            "{} entries: {} head(s) copied, {} ignored, {} skipped, {} errors",
            self.count, self.copied, self.ignored, self.skipped, self.errors
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries: {} copied, {} ignored, {} skipped, {} errors",
            self.count, self.copied, self.ignored, self.skipped, self.errors
        )
    }
}
