//! # Site Replication
//!
//! Replicates event-sourced domain objects, and the binary attachments they
//! reference, from one site of a remote object store to another.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            site-replication                              │
//! │                                                                          │
//! │  ┌──────────────┐   ┌────────────────┐   ┌───────────────────────────┐   │
//! │  │ Replicator   │──►│ log replay /   │──►│ ReplicationPolicy         │   │
//! │  │ (per domain) │   │ head reconcile │   │ (classify → act)          │   │
//! │  └──────────────┘   └────────────────┘   └───────────────────────────┘   │
//! │         │                   │                  │              │          │
//! │         ▼                   ▼                  ▼              ▼          │
//! │  ┌──────────────┐   ┌────────────────┐   ┌────────────┐ ┌────────────┐   │
//! │  │ RunStatus    │   │ source client  │   │ Attachment │ │ destination│   │
//! │  │ (tally)      │   │ (log pages)    │   │ Transfer   │ │ ObjectStore│   │
//! │  └──────────────┘   └────────────────┘   └────────────┘ └────────────┘   │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Strategies
//!
//! 1. **Log replay**: page through each domain's event log from a cursor and
//!    append every copyable object at the destination with a fresh revision.
//!    Files and design files are relocated before their object is written.
//! 2. **Head reconciliation**: compare current heads on both sides and copy
//!    only heads whose revision the destination lacks.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use site_replication::{ReplicationConfig, Replicator};
//!
//! #[tokio::main]
//! async fn main() -> site_replication::Result<()> {
//!     let config = ReplicationConfig::from_json_file("replication.json")?;
//!     let status = Replicator::new(config)?.run().await?;
//!     println!("{status}");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod cursor;
pub mod design;
pub mod error;
pub mod event;
pub mod metrics;
pub mod object;
pub mod policy;
pub mod resilience;
pub mod status;
pub mod transfer;

// Re-exports for convenience
pub use client::{ObjectStore, RemoteStoreClient};
pub use config::{ReplicationConfig, ReplicationSettings, SiteConfig, Strategy};
pub use coordinator::{PassReport, PassState, ProgressSink, Replicator, RunState};
pub use cursor::ReplicationCursor;
pub use design::DesignType;
pub use error::{ReplicationError, Result};
pub use event::{LogEvent, LogPage, PageFetch, RawLogEntry};
pub use object::DomainObject;
pub use policy::{Action, Decision, ObjectKind, ReplicationPolicy};
pub use status::{Outcome, RunStatus};
pub use transfer::{AttachmentManifest, AttachmentTransfer};
