// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Log cursor for one replication pass.
//!
//! The cursor is the exclusive lower bound of the next page request. It
//! lives only as long as the run: there is no durable checkpoint, a
//! restarted run begins at whatever start cursor the caller supplies.
//!
//! ## Cursor Semantics
//!
//! ```text
//! request after=c ─→ page [c+1 .. n] ─→ process all ─→ advance to n
//!                                       (crash here = replay from c, which
//!                                        only appends new revisions)
//! ```
//!
//! Advancing backwards is rejected with
//! [`ReplicationError::CursorRegression`]; advancing to the same value is a
//! no-op.

use crate::error::{ReplicationError, Result};
use tracing::debug;

/// Monotonic position in one domain's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationCursor {
    domain: String,
    position: u64,
    pages: u64,
}

impl ReplicationCursor {
    /// Start a cursor for `domain` at `start` (exclusive).
    pub fn new(domain: impl Into<String>, start: u64) -> Self {
        Self {
            domain: domain.into(),
            position: start,
            pages: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Number of pages the cursor has been advanced over.
    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// Move the cursor to `next` after a page has been processed.
    pub fn advance(&mut self, next: u64) -> Result<()> {
        if next < self.position {
            return Err(ReplicationError::CursorRegression {
                current: self.position,
                requested: next,
            });
        }
        debug!(domain = %self.domain, from = self.position, to = next, "Advancing cursor");
        self.position = next;
        self.pages += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_given_position() {
        let cursor = ReplicationCursor::new("sitelink", 42);
        assert_eq!(cursor.position(), 42);
        assert_eq!(cursor.domain(), "sitelink");
        assert_eq!(cursor.pages(), 0);
    }

    #[test]
    fn test_advance_forward() {
        let mut cursor = ReplicationCursor::new("fs", 0);
        cursor.advance(10).unwrap();
        cursor.advance(25).unwrap();
        assert_eq!(cursor.position(), 25);
        assert_eq!(cursor.pages(), 2);
    }

    #[test]
    fn test_advance_same_value_allowed() {
        let mut cursor = ReplicationCursor::new("fs", 7);
        cursor.advance(7).unwrap();
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn test_advance_backwards_rejected() {
        let mut cursor = ReplicationCursor::new("fs", 7);
        let err = cursor.advance(3).unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::CursorRegression {
                current: 7,
                requested: 3
            }
        ));
        assert_eq!(cursor.position(), 7);
    }
}
