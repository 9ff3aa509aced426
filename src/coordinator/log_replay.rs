// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Log replay: page through a domain's event log from a cursor.
//!
//! Each iteration:
//! 1. Fetches the page after the cursor (exhausted ends the pass)
//! 2. Decodes every entry in ascending `seq` order
//! 3. Hands each object to the policy and records the outcome
//! 4. Advances the cursor to the page's next cursor
//!
//! A decode failure or a cursor that would move backwards stops the pass.
//! Per-object replication failures are only counted. The report always
//! holds the cursor after the last fully processed page, so a failed pass
//! can be resumed from `report.position`.

use super::types::{PassReport, ProgressSink};
use crate::client::ObjectStore;
use crate::cursor::ReplicationCursor;
use crate::error::Result;
use crate::event::PageFetch;
use crate::metrics;
use crate::policy::ReplicationPolicy;
use crate::status::RunStatus;
use tracing::{debug, info, info_span, warn, Instrument};

/// Replay the whole log of the policy's domain, starting after
/// `report.position`.
pub async fn run_pass<D: ObjectStore>(
    policy: &ReplicationPolicy<D>,
    page_size: usize,
    status: &mut RunStatus,
    progress: &ProgressSink,
    report: &mut PassReport,
) -> Result<()> {
    let domain = policy.source().site().domain.clone();
    let span = info_span!("log_replay", domain = %domain);

    async move {
        info!(start = report.position, page_size, "Starting log replay");
        let mut cursor = ReplicationCursor::new(domain.clone(), report.position);

        loop {
            let page = match policy.source().fetch_log_page(cursor.position(), page_size).await {
                Ok(PageFetch::Page(page)) => page,
                Ok(PageFetch::Exhausted) => {
                    debug!(position = cursor.position(), "Log exhausted");
                    break;
                }
                Err(e) => {
                    warn!(position = cursor.position(), error = %e, "Log page fetch failed");
                    return Err(e);
                }
            };

            let next = page.next_cursor().unwrap_or(cursor.position());
            let entries = page.ordered_after(cursor.position());
            metrics::record_events_read(&domain, entries.len());

            for entry in &entries {
                let event = entry.decode()?;
                let decision = policy.apply_log_event(event.object).await?;
                status.record(decision.outcome);
                report.processed += 1;
                progress(&format!("{}: {}", event.seq, decision));
            }

            if next == cursor.position() {
                // Nothing newer than the cursor came back; treat as the end
                // rather than asking for the same page forever.
                warn!(position = next, "Log page did not advance the cursor");
                break;
            }
            cursor.advance(next)?;
            report.position = cursor.position();
            report.pages = cursor.pages();
            metrics::record_cursor(&domain, cursor.position());
        }

        info!(
            position = report.position,
            pages = report.pages,
            processed = report.processed,
            "Log replay complete"
        );
        Ok(())
    }
    .instrument(span)
    .await
}
