// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication policy: what to do with each object, and doing it.
//!
//! # Classification
//!
//! Every object is mapped from its type tag to an [`ObjectKind`], and the
//! kind (plus a few per-object facts) selects an [`Action`]:
//!
//! ```text
//! _*                        -> SkipInternal     ignored
//! sl::list / site / workingSet -> SkipByRule    ignored
//! sl::designObjectSet       -> SilentSkip       (default set only)
//!                           -> CopyVerbatim
//! sl::designObject          -> RelocateDesign   copied | errors
//! sl::deviceDesignObject    -> RelocateDesign   copied | errors
//! fs::file                  -> RelocateFile     copied | errors
//! everything else           -> CopyVerbatim     copied | errors
//! ```
//!
//! Head reconciliation uses a stricter table (archived heads, files, tasks
//! and all design kinds are ignored) and skips heads whose revision the
//! destination already has.
//!
//! # Failure Handling
//!
//! Remote and transfer failures are caught per object and reported as
//! [`Outcome::Errored`]. Errors for which
//! [`is_fatal_for_run`](ReplicationError::is_fatal_for_run) holds are
//! propagated and stop the pass.

use crate::client::{ObjectStore, RemoteStoreClient};
use crate::design::{DesignType, UnknownDesignType, FIELD_DESIGN_FILE_UUID, FIELD_DESIGN_TYPE};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::object::{Bookkeeping, DomainObject};
use crate::resilience::RateLimiter;
use crate::status::Outcome;
use crate::transfer::{is_plain_file_name, AttachmentTransfer};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Identifier of the design set every site creates for itself.
pub const DEFAULT_DESIGN_SET_ID: &str = "defaultDesignObjectSet";

pub const TYPE_LIST: &str = "sl::list";
pub const TYPE_SITE: &str = "sl::site";
pub const TYPE_WORKING_SET: &str = "sl::workingSet";
pub const TYPE_TASK: &str = "sl::task";
pub const TYPE_SL_FILE: &str = "sl::file";
pub const TYPE_DESIGN_OBJECT_SET: &str = "sl::designObjectSet";
pub const TYPE_DESIGN_OBJECT: &str = "sl::designObject";
pub const TYPE_DEVICE_DESIGN_OBJECT: &str = "sl::deviceDesignObject";
pub const TYPE_FS_FILE: &str = "fs::file";
pub const TYPE_FS_FOLDER: &str = "fs::folder";

/// Field of an `fs::file` holding the stored file's UUID.
pub const FIELD_FILE_UUID: &str = "fileUUID";
/// Human-readable name of an `fs::file`.
pub const FIELD_FILE_NAME: &str = "name";
/// Media type of an `fs::file`.
pub const FIELD_MIME_TYPE: &str = "mimeType";

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Object kinds the policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Type tag starts with `_` (type definitions, views, ...).
    Internal,
    List,
    Site,
    WorkingSet,
    Task,
    SiteFile,
    DesignObjectSet,
    DesignObject,
    DeviceDesignObject,
    File,
    Folder,
    Other,
}

impl ObjectKind {
    pub fn from_type_tag(tag: &str) -> Self {
        if tag.starts_with('_') {
            return ObjectKind::Internal;
        }
        match tag {
            TYPE_LIST => ObjectKind::List,
            TYPE_SITE => ObjectKind::Site,
            TYPE_WORKING_SET => ObjectKind::WorkingSet,
            TYPE_TASK => ObjectKind::Task,
            TYPE_SL_FILE => ObjectKind::SiteFile,
            TYPE_DESIGN_OBJECT_SET => ObjectKind::DesignObjectSet,
            TYPE_DESIGN_OBJECT => ObjectKind::DesignObject,
            TYPE_DEVICE_DESIGN_OBJECT => ObjectKind::DeviceDesignObject,
            TYPE_FS_FILE => ObjectKind::File,
            TYPE_FS_FOLDER => ObjectKind::Folder,
            _ => ObjectKind::Other,
        }
    }

    pub fn of(object: &DomainObject) -> Self {
        Self::from_type_tag(object.type_tag())
    }
}

/// What to do with one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SkipInternal,
    SkipByRule,
    /// Archived head (head reconciliation only).
    SkipArchived,
    /// Destination already has this revision (head reconciliation only).
    SkipUnchanged,
    /// Dropped without counting.
    SilentSkip,
    RelocateFile,
    RelocateDesign,
    CopyVerbatim,
}

impl Action {
    /// Action for an object read from the event log.
    pub fn for_log_event(object: &DomainObject, default_design_set_id: &str) -> Self {
        match ObjectKind::of(object) {
            ObjectKind::Internal => Action::SkipInternal,
            ObjectKind::List | ObjectKind::Site | ObjectKind::WorkingSet => Action::SkipByRule,
            ObjectKind::DesignObjectSet if object.id() == Some(default_design_set_id) => Action::SilentSkip,
            ObjectKind::DesignObject | ObjectKind::DeviceDesignObject => Action::RelocateDesign,
            ObjectKind::File => Action::RelocateFile,
            _ => Action::CopyVerbatim,
        }
    }

    /// Action for a source head, given the destination's revision of the
    /// same identifier.
    pub fn for_head(object: &DomainObject, destination_rev: Option<&str>) -> Self {
        if object.is_archived() {
            return Action::SkipArchived;
        }
        match ObjectKind::of(object) {
            ObjectKind::Internal => return Action::SkipInternal,
            ObjectKind::List
            | ObjectKind::SiteFile
            | ObjectKind::Task
            | ObjectKind::DesignObjectSet
            | ObjectKind::DesignObject => return Action::SkipByRule,
            _ => {}
        }
        match (object.rev(), destination_rev) {
            (Some(src), Some(dst)) if src == dst => Action::SkipUnchanged,
            _ => Action::CopyVerbatim,
        }
    }

    /// Outcome for actions that never touch the destination.
    fn skip_outcome(&self) -> Option<Outcome> {
        match self {
            Action::SkipInternal | Action::SkipByRule | Action::SkipArchived => Some(Outcome::Ignored),
            Action::SkipUnchanged => Some(Outcome::Skipped),
            Action::SilentSkip => Some(Outcome::Silent),
            _ => None,
        }
    }
}

/// Result of applying the policy to one object, printable as a progress
/// line body (`Copied fs::folder object F1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: Outcome,
    pub action: Action,
    pub type_tag: String,
    pub id: String,
    /// Error text for [`Outcome::Errored`].
    pub error: Option<String>,
}

impl Decision {
    fn new(object: &DomainObject, action: Action, outcome: Outcome) -> Self {
        Self {
            outcome,
            action,
            type_tag: object.type_tag().to_string(),
            id: object.display_id().to_string(),
            error: None,
        }
    }

    fn verb(&self) -> &'static str {
        match (self.outcome, self.action) {
            (Outcome::Copied, _) => "Copied",
            (Outcome::Ignored, Action::SkipArchived) => "Ignored archived",
            (Outcome::Ignored, Action::SkipInternal) => "Ignored internal",
            (Outcome::Ignored, _) => "Ignored",
            (Outcome::Skipped, _) => "skip",
            (Outcome::Errored, _) => "Failed",
            (Outcome::Silent, _) => "Dropped",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} object {}", self.verb(), self.type_tag, self.id)?;
        if let Some(error) = &self.error {
            write!(f, ": error: {}", error)?;
        }
        Ok(())
    }
}

/// Executes [`Action`]s against a source site and a destination store.
///
/// Object writes go through `D`; attachment uploads go to the file services
/// of `upload_target`, which is the destination site's client.
pub struct ReplicationPolicy<D: ObjectStore> {
    source: RemoteStoreClient,
    destination: D,
    upload_target: RemoteStoreClient,
    transfer: AttachmentTransfer,
    default_design_set_id: String,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl<D: ObjectStore> ReplicationPolicy<D> {
    pub fn new(
        source: RemoteStoreClient,
        destination: D,
        upload_target: RemoteStoreClient,
        transfer: AttachmentTransfer,
        default_design_set_id: impl Into<String>,
    ) -> Self {
        Self {
            source,
            destination,
            upload_target,
            transfer,
            default_design_set_id: default_design_set_id.into(),
            rate_limiter: None,
        }
    }

    /// Throttle destination writes.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// The same policy reading and writing `domain` on both sides.
    pub fn for_domain(&self, domain: &str) -> Self {
        Self {
            source: self.source.for_domain(domain),
            destination: self.destination.for_domain(domain),
            upload_target: self.upload_target.clone(),
            transfer: self.transfer.clone(),
            default_design_set_id: self.default_design_set_id.clone(),
            rate_limiter: self.rate_limiter.clone(),
        }
    }

    pub fn source(&self) -> &RemoteStoreClient {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Replicate one object read from the event log.
    pub async fn apply_log_event(&self, object: DomainObject) -> Result<Decision> {
        let action = Action::for_log_event(&object, &self.default_design_set_id);
        self.execute(object, action, Bookkeeping::FreshRevision).await
    }

    /// Reconcile one source head against the destination's revision.
    pub async fn apply_head(&self, object: DomainObject, destination_rev: Option<&str>) -> Result<Decision> {
        let action = Action::for_head(&object, destination_rev);
        self.execute(object, action, Bookkeeping::FillMissing).await
    }

    async fn execute(&self, object: DomainObject, action: Action, mode: Bookkeeping) -> Result<Decision> {
        if let Some(outcome) = action.skip_outcome() {
            let decision = Decision::new(&object, action, outcome);
            self.record(&decision);
            return Ok(decision);
        }

        let mut decision = Decision::new(&object, action, Outcome::Copied);
        let result = match action {
            Action::RelocateFile => self.relocate_file(object, mode).await,
            Action::RelocateDesign => self.relocate_design(object, mode).await,
            _ => self.write(object, mode).await,
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                warn!(
                    id = %decision.id,
                    type_tag = %decision.type_tag,
                    error = %e,
                    "Object not replicated"
                );
                decision.outcome = Outcome::Errored;
                decision.error = Some(e.to_string());
            }
        }
        self.record(&decision);
        Ok(decision)
    }

    fn record(&self, decision: &Decision) {
        metrics::record_outcome(self.destination.domain(), &decision.type_tag, decision.outcome);
        debug!(
            domain = %self.destination.domain(),
            id = %decision.id,
            type_tag = %decision.type_tag,
            outcome = %decision.outcome,
            "Applied policy"
        );
    }

    async fn write(&self, mut object: DomainObject, mode: Bookkeeping) -> Result<()> {
        object.complete_bookkeeping(mode);
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }
        let result = self.destination.post_object(object).await;
        metrics::record_write(self.destination.domain(), result.is_ok());
        result
    }

    async fn relocate_file(&self, object: DomainObject, mode: Bookkeeping) -> Result<()> {
        let id = object.display_id().to_string();
        let uuid = attachment_uuid(&object, FIELD_FILE_UUID, &id)?;
        let file_name = object.get_str(FIELD_FILE_NAME).unwrap_or(&uuid).to_string();
        let media_type = object.get_str(FIELD_MIME_TYPE).unwrap_or(DEFAULT_MEDIA_TYPE).to_string();

        let started = Instant::now();
        let result = self
            .transfer
            .relocate_file(&self.source, &self.upload_target, &uuid, &file_name, &media_type)
            .await;
        metrics::record_transfer("file", result.is_ok(), started.elapsed());
        result?;

        self.write(object, mode).await
    }

    async fn relocate_design(&self, mut object: DomainObject, mode: Bookkeeping) -> Result<()> {
        let id = object.display_id().to_string();
        let uuid = attachment_uuid(&object, FIELD_DESIGN_FILE_UUID, &id)?;
        let design_type: DesignType = object
            .get_str(FIELD_DESIGN_TYPE)
            .ok_or_else(|| ReplicationError::invalid_object(&id, "design object without designType"))?
            .parse()
            .map_err(|e: UnknownDesignType| ReplicationError::invalid_object(&id, e.to_string()))?;

        let started = Instant::now();
        let result = self
            .transfer
            .relocate_design_file(&self.source, &self.upload_target, &uuid, design_type)
            .await;
        metrics::record_transfer("design", result.is_ok(), started.elapsed());
        result?;

        // Must happen before bookkeeping replaces `_at`.
        object.backfill_created_at();
        self.write(object, mode).await
    }
}

/// Attachment id stored under `field`; it names both a staged file and a
/// URL path segment, so it must be a plain file name.
fn attachment_uuid(object: &DomainObject, field: &str, id: &str) -> Result<String> {
    let uuid = object.get_str(field).ok_or_else(|| {
        ReplicationError::invalid_object(id, format!("{} object without {}", object.type_tag(), field))
    })?;
    if !is_plain_file_name(uuid) {
        return Err(ReplicationError::invalid_object(
            id,
            format!("{} {:?} is not a plain file name", field, uuid),
        ));
    }
    Ok(uuid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: serde_json::Value) -> DomainObject {
        DomainObject::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(ObjectKind::from_type_tag("_type"), ObjectKind::Internal);
        assert_eq!(ObjectKind::from_type_tag("_"), ObjectKind::Internal);
        assert_eq!(ObjectKind::from_type_tag("sl::list"), ObjectKind::List);
        assert_eq!(ObjectKind::from_type_tag("fs::file"), ObjectKind::File);
        assert_eq!(ObjectKind::from_type_tag("sl::point"), ObjectKind::Other);
    }

    #[test]
    fn test_log_event_actions() {
        let cases = [
            (json!({"_id": "I", "_type": "_internal"}), Action::SkipInternal),
            (json!({"_id": "L", "_type": "sl::list"}), Action::SkipByRule),
            (json!({"_id": "S", "_type": "sl::site"}), Action::SkipByRule),
            (json!({"_id": "W", "_type": "sl::workingSet"}), Action::SkipByRule),
            (json!({"_id": DEFAULT_DESIGN_SET_ID, "_type": "sl::designObjectSet"}), Action::SilentSkip),
            (json!({"_id": "DS", "_type": "sl::designObjectSet"}), Action::CopyVerbatim),
            (json!({"_id": "D", "_type": "sl::designObject"}), Action::RelocateDesign),
            (json!({"_id": "DD", "_type": "sl::deviceDesignObject"}), Action::RelocateDesign),
            (json!({"_id": "F", "_type": "fs::file"}), Action::RelocateFile),
            (json!({"_id": "F1", "_type": "fs::folder"}), Action::CopyVerbatim),
            (json!({"_id": "T", "_type": "sl::task"}), Action::CopyVerbatim),
        ];
        for (value, expected) in cases {
            let o = obj(value);
            assert_eq!(Action::for_log_event(&o, DEFAULT_DESIGN_SET_ID), expected, "{:?}", o);
        }
    }

    #[test]
    fn test_missing_type_is_internal() {
        // An object without `_type` reports "_", which is internal.
        let o = obj(json!({"_id": "X"}));
        assert_eq!(Action::for_log_event(&o, DEFAULT_DESIGN_SET_ID), Action::SkipInternal);
    }

    #[test]
    fn test_custom_default_set_id() {
        let o = obj(json!({"_id": "mySet", "_type": "sl::designObjectSet"}));
        assert_eq!(Action::for_log_event(&o, "mySet"), Action::SilentSkip);
        assert_eq!(Action::for_log_event(&o, DEFAULT_DESIGN_SET_ID), Action::CopyVerbatim);
    }

    #[test]
    fn test_head_actions() {
        let archived = obj(json!({"_id": "A", "_type": "sl::point", "_archived": true, "_rev": "r"}));
        assert_eq!(Action::for_head(&archived, None), Action::SkipArchived);

        let task = obj(json!({"_id": "T", "_type": "sl::task", "_rev": "r"}));
        assert_eq!(Action::for_head(&task, None), Action::SkipByRule);

        let design = obj(json!({"_id": "D", "_type": "sl::designObject", "_rev": "r"}));
        assert_eq!(Action::for_head(&design, None), Action::SkipByRule);

        let point = obj(json!({"_id": "P", "_type": "sl::point", "_rev": "r1"}));
        assert_eq!(Action::for_head(&point, Some("r1")), Action::SkipUnchanged);
        assert_eq!(Action::for_head(&point, Some("r0")), Action::CopyVerbatim);
        assert_eq!(Action::for_head(&point, None), Action::CopyVerbatim);
    }

    #[test]
    fn test_decision_display() {
        let o = obj(json!({"_id": "F1", "_type": "fs::folder"}));
        let mut d = Decision::new(&o, Action::CopyVerbatim, Outcome::Copied);
        assert_eq!(d.to_string(), "Copied fs::folder object F1");

        d.outcome = Outcome::Errored;
        d.error = Some("boom".to_string());
        assert_eq!(d.to_string(), "Failed fs::folder object F1: error: boom");

        let s = Decision::new(&o, Action::SkipUnchanged, Outcome::Skipped);
        assert_eq!(s.to_string(), "skip fs::folder object F1");
    }

    #[test]
    fn test_skip_outcomes() {
        assert_eq!(Action::SkipInternal.skip_outcome(), Some(Outcome::Ignored));
        assert_eq!(Action::SilentSkip.skip_outcome(), Some(Outcome::Silent));
        assert_eq!(Action::SkipUnchanged.skip_outcome(), Some(Outcome::Skipped));
        assert_eq!(Action::CopyVerbatim.skip_outcome(), None);
        assert_eq!(Action::RelocateFile.skip_outcome(), None);
    }
}
