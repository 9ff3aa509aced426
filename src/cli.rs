// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Command-line interface of `site-tool`.

use crate::config::{ReplicationConfig, ReplicationSettings, SiteConfig, Strategy, DEFAULT_DOMAIN};
use crate::error::{ReplicationError, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "site-tool", about = "Simple access to RDM and cross-site replication", version)]
pub struct Cli {
    /// RDM base URL
    #[arg(long, env = "RDM_URL", default_value = "http://localhost:8080")]
    pub url: String,

    /// RDM domain
    #[arg(long, env = "RDM_DOMAIN", default_value = DEFAULT_DOMAIN)]
    pub domain: String,

    /// Auth token for the site
    #[arg(long, env = "RDM_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub unverified: bool,

    /// Output results in JSON-lines format
    #[arg(long)]
    pub jsonl: bool,

    /// Log level or filter directive (RUST_LOG overrides)
    #[arg(long = "log-lvl", default_value = "info")]
    pub log_lvl: String,

    /// Log line format
    #[arg(long = "log-fmt", value_enum, default_value_t = LogFormat::Full)]
    pub log_fmt: LogFormat,

    /// JSON file with replication settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Site identifier
    pub site: String,

    #[command(subcommand)]
    pub verb: Verb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Full,
    Compact,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// Replay this site's event logs (filesystem, then primary domain) into
    /// another site. A blank url means the same server.
    Replicate {
        dest_url: String,
        dest_site: String,
        dest_token: String,
        /// Cursor the first log page is requested after
        #[arg(long)]
        start_cursor: Option<u64>,
    },
    /// Copy this site's heads into another site. A blank url means the same
    /// server.
    Copyto {
        dest_url: String,
        dest_site: String,
        dest_token: String,
    },
    /// Get an object with the given ID
    Get { id: String },
    /// Get domain stats
    Stats,
    /// Fetch the entries in the given view
    View { name: String },
    /// Load a file that contains a JSON object or an array of JSON objects
    Load { file: PathBuf },
    /// Load a file that contains JSON objects, one per line
    Lines { file: PathBuf },
    /// Get the history of an object
    Hist { id: String },
    /// Export every region as a vertex JSON file under regions/
    Regions,
}

impl Cli {
    /// Connection settings of the site named on the command line.
    pub fn site_config(&self) -> Result<SiteConfig> {
        if self.token.is_empty() {
            return Err(ReplicationError::Config("you must supply a token".into()));
        }
        let mut site = SiteConfig::new(&self.url, &self.site, Some(&self.domain), &self.token);
        site.verify_tls = !self.unverified;
        Ok(site)
    }

    /// Replication config for `replicate` / `copyto`.
    ///
    /// Settings come from `--config` when given; both sites come from the
    /// command line.
    pub fn replication_config(
        &self,
        dest_url: &str,
        dest_site: &str,
        dest_token: &str,
        strategy: Strategy,
    ) -> Result<ReplicationConfig> {
        let settings = match &self.config {
            Some(path) => ReplicationConfig::from_json_file(path).map(|c| c.settings)?,
            None => ReplicationSettings::default(),
        };
        let source = self.site_config()?;
        let dest_url = if dest_url.is_empty() { &self.url } else { dest_url };
        let mut destination = SiteConfig::new(dest_url, dest_site, Some(&self.domain), dest_token);
        destination.verify_tls = !self.unverified;

        let config = ReplicationConfig {
            source,
            destination,
            settings: ReplicationSettings { strategy, ..settings },
        };
        config.validate()?;
        Ok(config)
    }
}
