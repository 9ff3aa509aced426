// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication run coordinator.
//!
//! Ties together:
//! - The source site's [`RemoteStoreClient`]
//! - A destination [`ObjectStore`] (the destination site's client in
//!   production, a recording store in tests)
//! - The [`ReplicationPolicy`] and its [`AttachmentTransfer`]
//!
//! # Run Shape
//!
//! With [`Strategy::LogReplay`] a run is two independent passes sharing one
//! [`RunStatus`]:
//! 1. The filesystem domain (files and folders, attachments first)
//! 2. The primary domain
//!
//! With [`Strategy::HeadReconciliation`] a run is one pass over the primary
//! domain's heads. Either way the tally is emitted on the progress sink at
//! the end. The first failed pass stops the run.

mod head_reconcile;
mod log_replay;
mod types;

pub use types::{stdout_progress, PassReport, PassState, ProgressSink, RunState};

use crate::client::{ObjectStore, RemoteStoreClient};
use crate::config::{ReplicationConfig, Strategy};
use crate::error::Result;
use crate::policy::ReplicationPolicy;
use crate::resilience::RateLimiter;
use crate::status::RunStatus;
use crate::transfer::AttachmentTransfer;
use std::sync::Arc;
use tracing::{error, info};

/// Drives a replication run from one site to another.
pub struct Replicator<D: ObjectStore = RemoteStoreClient> {
    config: ReplicationConfig,
    policy: ReplicationPolicy<D>,
    status: RunStatus,
    state: RunState,
    reports: Vec<PassReport>,
    progress: ProgressSink,
}

impl Replicator<RemoteStoreClient> {
    /// Replicator writing to the destination site over HTTP.
    pub fn new(config: ReplicationConfig) -> Result<Self> {
        let retry = config.settings.retry.to_retry_config();
        let destination = RemoteStoreClient::new(config.destination.clone(), retry)?;
        Self::with_destination(config, destination)
    }
}

impl<D: ObjectStore> Replicator<D> {
    /// Replicator writing objects to `destination`.
    ///
    /// Attachments are still uploaded to the file services of
    /// `config.destination`.
    pub fn with_destination(config: ReplicationConfig, destination: D) -> Result<Self> {
        config.validate()?;
        let settings = &config.settings;
        let retry = settings.retry.to_retry_config();

        let source = RemoteStoreClient::new(config.source.clone(), retry.clone())?;
        let upload_target = RemoteStoreClient::new(config.destination.clone(), retry)?;
        let transfer = AttachmentTransfer::new(
            source.http().clone(),
            settings.staging_dir_for(&config.source.site),
            settings.part_size,
        );

        let mut policy = ReplicationPolicy::new(
            source,
            destination,
            upload_target,
            transfer,
            settings.default_design_set_id.clone(),
        );
        if let Some(cfg) = settings.rate_limit_config() {
            info!(
                rate_per_sec = cfg.refill_rate,
                burst = cfg.burst_size,
                "Rate limiting enabled for destination writes"
            );
            policy = policy.with_rate_limiter(Arc::new(RateLimiter::new(cfg)));
        }

        Ok(Self {
            config,
            policy,
            status: RunStatus::new(),
            state: RunState::Created,
            reports: Vec::new(),
            progress: stdout_progress(),
        })
    }

    /// Send progress lines somewhere other than stdout.
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Totals so far.
    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Reports of the passes finished so far.
    pub fn reports(&self) -> &[PassReport] {
        &self.reports
    }

    /// Domains visited by a run, in order.
    pub fn domains(&self) -> Vec<String> {
        let settings = &self.config.settings;
        match settings.strategy {
            Strategy::LogReplay => vec![settings.fs_domain.clone(), self.config.source.domain.clone()],
            Strategy::HeadReconciliation => vec![self.config.source.domain.clone()],
        }
    }

    /// Run every pass and return the totals.
    pub async fn run(&mut self) -> Result<RunStatus> {
        self.state = RunState::Running;
        info!(
            source = %self.config.source.site,
            destination = %self.config.destination.site,
            strategy = ?self.config.settings.strategy,
            "Starting replication run"
        );

        for domain in self.domains() {
            let start = match self.config.settings.strategy {
                Strategy::LogReplay => self.config.settings.start_cursor,
                Strategy::HeadReconciliation => 0,
            };
            let mut report = PassReport::starting(domain.as_str(), start);
            let result = self.run_domain(&domain, &mut report).await;
            match result {
                Ok(()) => {
                    report.state = PassState::Done;
                    self.reports.push(report);
                }
                Err(e) => {
                    error!(
                        domain = %domain,
                        position = report.position,
                        error = %e,
                        status = %self.status,
                        "Replication pass failed"
                    );
                    self.reports.push(report);
                    self.state = RunState::Failed;
                    return Err(e);
                }
            }
        }

        self.state = RunState::Done;
        let tally = match self.config.settings.strategy {
            Strategy::LogReplay => self.status.to_string(),
            Strategy::HeadReconciliation => self.status.head_tally(),
        };
        (self.progress)(&tally);
        info!(
            count = self.status.count,
            copied = self.status.copied,
            ignored = self.status.ignored,
            skipped = self.status.skipped,
            errors = self.status.errors,
            "Replication run complete"
        );
        Ok(self.status.clone())
    }

    async fn run_domain(&mut self, domain: &str, report: &mut PassReport) -> Result<()> {
        let policy = self.policy.for_domain(domain);
        let settings = &self.config.settings;
        match settings.strategy {
            Strategy::LogReplay => {
                log_replay::run_pass(&policy, settings.page_size, &mut self.status, &self.progress, report).await
            }
            Strategy::HeadReconciliation => {
                head_reconcile::run_pass(&policy, &mut self.status, &self.progress, report).await
            }
        }
    }
}
