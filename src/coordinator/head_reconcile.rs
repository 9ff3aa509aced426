// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Head reconciliation: copy source heads the destination lacks.
//!
//! Both sides' `_head` views are read in full. Source heads are then
//! visited in view order; a head whose revision the destination already
//! holds is skipped, everything else the policy allows is posted with its
//! source revision preserved. Running it twice copies nothing the second
//! time.

use super::types::{PassReport, ProgressSink};
use crate::client::ObjectStore;
use crate::error::Result;
use crate::policy::ReplicationPolicy;
use crate::status::RunStatus;
use std::collections::HashMap;
use tracing::{info, info_span, Instrument};

pub async fn run_pass<D: ObjectStore>(
    policy: &ReplicationPolicy<D>,
    status: &mut RunStatus,
    progress: &ProgressSink,
    report: &mut PassReport,
) -> Result<()> {
    let domain = policy.source().site().domain.clone();
    let span = info_span!("head_reconcile", domain = %domain);

    async move {
        let sources = ObjectStore::fetch_heads(policy.source()).await?;
        let destination_revs: HashMap<String, String> = policy
            .destination()
            .fetch_heads()
            .await?
            .into_iter()
            .filter_map(|head| Some((head.id()?.to_string(), head.rev()?.to_string())))
            .collect();

        info!(
            source_heads = sources.len(),
            destination_heads = destination_revs.len(),
            "Starting head reconciliation"
        );

        let total = sources.len();
        for (i, head) in sources.into_iter().enumerate() {
            let destination_rev = head.id().and_then(|id| destination_revs.get(id)).cloned();
            let decision = policy.apply_head(head, destination_rev.as_deref()).await?;
            status.record(decision.outcome);
            report.position = i as u64 + 1;
            report.processed += 1;
            progress(&format!("{} of {}: {}", i + 1, total, decision));
        }

        info!(processed = total, "Head reconciliation complete");
        Ok(())
    }
    .instrument(span)
    .await
}
