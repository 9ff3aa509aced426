// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for site replication.
//!
//! Configuration can be constructed programmatically, deserialized from a
//! JSON file, or assembled by the `site-tool` binary from its flags.
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── source: SiteConfig            # Where objects are read from
//! ├── destination: SiteConfig       # Where objects are written to
//! └── settings: ReplicationSettings
//!     ├── page_size / start_cursor  # Log paging
//!     ├── fs_domain                 # Attachment domain, migrated first
//!     ├── staging_dir / part_size   # Attachment transfer
//!     ├── retry: UnavailableRetryConfig
//!     └── strategy: Strategy        # log replay or head reconciliation
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "source":      { "api_url": "https://rdm.a.example", "site": "s1", "token": "..." },
//!   "destination": { "api_url": "https://rdm.b.example", "site": "s2", "token": "..." },
//!   "settings":    { "page_size": 200, "retry": { "max_attempts": 120, "delay": "2s" } }
//! }
//! ```

use crate::error::{ReplicationError, Result};
use crate::resilience::{RateLimitConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Domain used when none is given.
pub const DEFAULT_DOMAIN: &str = "sitelink";

/// Domain holding filesystem metadata (files and folders).
pub const DEFAULT_FS_DOMAIN: &str = "filesystem";

/// Attachment part size: 10 MiB.
pub const DEFAULT_PART_SIZE: usize = 10 * 1024 * 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a replication run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Site objects are read from.
    pub source: SiteConfig,

    /// Site objects are written to.
    pub destination: SiteConfig,

    #[serde(default)]
    pub settings: ReplicationSettings,
}

impl ReplicationConfig {
    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly run.
    pub fn validate(&self) -> Result<()> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;
        if self.settings.page_size == 0 {
            return Err(ReplicationError::Config("page_size must be > 0".into()));
        }
        if self.settings.part_size == 0 {
            return Err(ReplicationError::Config("part_size must be > 0".into()));
        }
        Ok(())
    }

    /// Create a config pointing both sites at `api_url` (for testing).
    pub fn for_testing(api_url: &str) -> Self {
        Self {
            source: SiteConfig::for_testing(api_url, "site-a"),
            destination: SiteConfig::for_testing(api_url, "site-b"),
            settings: ReplicationSettings::for_testing(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SiteConfig: one remote store endpoint
// ═══════════════════════════════════════════════════════════════════════════════

/// Connection settings for one site of a remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Base API URL, e.g. `"https://rdm.example.com"` (no trailing slash).
    pub api_url: String,

    /// Site identifier.
    pub site: String,

    /// Primary object domain.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Auth token sent with every request.
    pub token: String,

    /// Verify TLS certificates.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_true() -> bool {
    true
}

impl SiteConfig {
    pub fn new(api_url: &str, site: &str, domain: Option<&str>, token: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            site: site.to_string(),
            domain: domain.unwrap_or(DEFAULT_DOMAIN).to_string(),
            token: token.to_string(),
            verify_tls: true,
        }
    }

    /// Same site settings, different domain.
    pub fn with_domain(&self, domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ..self.clone()
        }
    }

    fn validate(&self, role: &str) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(ReplicationError::Config(format!("{role}: api_url is empty")));
        }
        if self.site.is_empty() {
            return Err(ReplicationError::Config(format!("{role}: site is empty")));
        }
        if self.token.is_empty() {
            return Err(ReplicationError::Config(format!(
                "{role}: you must supply a token"
            )));
        }
        Ok(())
    }

    pub fn for_testing(api_url: &str, site: &str) -> Self {
        Self::new(api_url, site, None, "test-token")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationSettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Which replication policy drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Page through the event log and append every copyable object.
    #[default]
    LogReplay,
    /// Compare heads and copy only objects whose revision differs.
    HeadReconciliation,
}

/// Tunables for a replication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Maximum events per log page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Exclusive cursor the first page is requested after.
    #[serde(default)]
    pub start_cursor: u64,

    /// Domain migrated before the primary one (attachments).
    #[serde(default = "default_fs_domain")]
    pub fs_domain: String,

    /// Local directory downloaded attachments are staged in.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Identifier of the auto-created default design set.
    #[serde(default = "default_design_set_id")]
    pub default_design_set_id: String,

    /// Attachment upload part size in bytes.
    #[serde(default = "default_part_size")]
    pub part_size: usize,

    #[serde(default)]
    pub retry: UnavailableRetryConfig,

    /// Optional cap on destination writes per second.
    #[serde(default)]
    pub write_rate_limit_per_sec: Option<u32>,

    #[serde(default)]
    pub strategy: Strategy,
}

fn default_page_size() -> usize {
    500
}

fn default_fs_domain() -> String {
    DEFAULT_FS_DOMAIN.to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("staging")
}

fn default_design_set_id() -> String {
    crate::policy::DEFAULT_DESIGN_SET_ID.to_string()
}

fn default_part_size() -> usize {
    DEFAULT_PART_SIZE
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            start_cursor: 0,
            fs_domain: default_fs_domain(),
            staging_dir: default_staging_dir(),
            default_design_set_id: default_design_set_id(),
            part_size: DEFAULT_PART_SIZE,
            retry: UnavailableRetryConfig::default(),
            write_rate_limit_per_sec: None,
            strategy: Strategy::LogReplay,
        }
    }
}

impl ReplicationSettings {
    /// Small pages, fast retries, temp-friendly staging.
    pub fn for_testing() -> Self {
        Self {
            page_size: 10,
            staging_dir: std::env::temp_dir().join("site-replication-test"),
            retry: UnavailableRetryConfig {
                max_attempts: 3,
                delay: "10ms".to_string(),
                backoff_factor: 1.0,
                max_delay: "100ms".to_string(),
            },
            ..Default::default()
        }
    }

    /// Rate limit for destination writes, if enabled.
    pub fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        self.write_rate_limit_per_sec.map(|rate| RateLimitConfig {
            burst_size: rate,
            refill_rate: rate,
        })
    }

    /// Staging directory for one site.
    pub fn staging_dir_for(&self, site: &str) -> PathBuf {
        self.staging_dir.join(site)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UnavailableRetryConfig: "503 Service Unavailable" handling
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry budget for reads that hit a temporarily unavailable store.
///
/// `max_attempts = 0` retries forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableRetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay between attempts as a duration string (e.g. `"1s"`).
    #[serde(default = "default_delay")]
    pub delay: String,

    /// `1.0` keeps the delay fixed.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay: String,
}

fn default_max_attempts() -> usize {
    600
}

fn default_delay() -> String {
    "1s".to_string()
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_max_delay() -> String {
    "30s".to_string()
}

impl Default for UnavailableRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_delay(),
            backoff_factor: default_backoff_factor(),
            max_delay: default_max_delay(),
        }
    }
}

impl UnavailableRetryConfig {
    pub fn delay_duration(&self) -> Duration {
        humantime::parse_duration(&self.delay).unwrap_or(Duration::from_secs(1))
    }

    pub fn max_delay_duration(&self) -> Duration {
        humantime::parse_duration(&self.max_delay).unwrap_or(Duration::from_secs(30))
    }

    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: if self.max_attempts == 0 {
                usize::MAX
            } else {
                self.max_attempts
            },
            initial_delay: self.delay_duration(),
            max_delay: self.max_delay_duration(),
            backoff_factor: self.backoff_factor,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
