// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Domain objects as stored in the remote object store.
//!
//! A [`DomainObject`] is a JSON object with a handful of bookkeeping fields
//! (`_id`, `_type`, `_rev`, `_at`, `_v`) next to arbitrary type-specific
//! content. Replication never interprets the content beyond what the policy
//! needs (attachment UUIDs, design type), so the object stays a JSON map.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

pub const FIELD_ID: &str = "_id";
pub const FIELD_TYPE: &str = "_type";
pub const FIELD_REV: &str = "_rev";
pub const FIELD_AT: &str = "_at";
pub const FIELD_SCHEMA_VERSION: &str = "_v";
pub const FIELD_ARCHIVED: &str = "_archived";
pub const FIELD_CREATED_AT: &str = "createdAt";

/// How bookkeeping fields are completed before an object is posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bookkeeping {
    /// Fill `_id`, `_rev` and `_at` only where absent.
    FillMissing,
    /// Keep (or create) `_id`; always assign a new `_rev` and `_at`.
    FreshRevision,
}

/// A JSON object decoded from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DomainObject(Map<String, Value>);

impl DomainObject {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; anything but an object is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str(FIELD_ID)
    }

    /// Type tag, `"_"` when missing.
    pub fn type_tag(&self) -> &str {
        self.get_str(FIELD_TYPE).unwrap_or("_")
    }

    pub fn rev(&self) -> Option<&str> {
        self.get_str(FIELD_REV)
    }

    /// Event timestamp in milliseconds.
    pub fn at(&self) -> Option<i64> {
        self.0.get(FIELD_AT).and_then(Value::as_i64)
    }

    pub fn is_archived(&self) -> bool {
        self.0.get(FIELD_ARCHIVED).and_then(Value::as_bool) == Some(true)
    }

    /// Identifier for progress output.
    pub fn display_id(&self) -> &str {
        self.id().unwrap_or("<no id>")
    }

    /// Complete `_id`, `_rev` and `_at` according to `mode`.
    pub fn complete_bookkeeping(&mut self, mode: Bookkeeping) {
        if !self.contains(FIELD_ID) {
            self.insert(FIELD_ID, new_object_id());
        }
        match mode {
            Bookkeeping::FillMissing => {
                if !self.contains(FIELD_REV) {
                    self.insert(FIELD_REV, new_revision());
                }
                if !self.contains(FIELD_AT) {
                    self.insert(FIELD_AT, now_millis());
                }
            }
            Bookkeeping::FreshRevision => {
                self.insert(FIELD_REV, new_revision());
                self.insert(FIELD_AT, now_millis());
            }
        }
    }

    /// Set `createdAt` from the event timestamp if the object has none.
    ///
    /// Returns `true` if the field was added.
    pub fn backfill_created_at(&mut self) -> bool {
        if self.contains(FIELD_CREATED_AT) {
            return false;
        }
        match self.0.get(FIELD_AT).cloned() {
            Some(at) => {
                self.insert(FIELD_CREATED_AT, at);
                true
            }
            None => false,
        }
    }

    /// Standard base64 of the JSON encoding, as the event endpoint expects.
    pub fn to_b64(&self) -> crate::Result<String> {
        let json = serde_json::to_vec(&self.0)?;
        Ok(STANDARD.encode(json))
    }
}

impl From<Map<String, Value>> for DomainObject {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// URL-safe, unpadded base64 of a JSON value, used for view range keys.
///
/// Strings are encoded as-is; everything else is JSON-encoded first.
pub fn safe_b64(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s.is_empty() => String::new(),
        Value::String(s) => URL_SAFE_NO_PAD.encode(s.as_bytes()),
        other => URL_SAFE_NO_PAD.encode(other.to_string().as_bytes()),
    }
}

/// Time-based identifier for objects that arrive without one.
pub fn new_object_id() -> String {
    let node = uuid::Uuid::new_v4();
    let mut node_id = [0u8; 6];
    node_id.copy_from_slice(&node.as_bytes()[..6]);
    uuid::Uuid::now_v1(&node_id).to_string()
}

/// Random revision token.
pub fn new_revision() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> DomainObject {
        DomainObject::from_value(value).unwrap()
    }

    #[test]
    fn test_accessors() {
        let o = obj(json!({"_id": "A", "_type": "sl::point", "_rev": "r1", "_at": 1700}));
        assert_eq!(o.id(), Some("A"));
        assert_eq!(o.type_tag(), "sl::point");
        assert_eq!(o.rev(), Some("r1"));
        assert_eq!(o.at(), Some(1700));
        assert!(!o.is_archived());
    }

    #[test]
    fn test_missing_type_is_internal_marker() {
        let o = obj(json!({"_id": "A"}));
        assert_eq!(o.type_tag(), "_");
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        assert!(DomainObject::from_value(json!([1, 2])).is_none());
        assert!(DomainObject::from_value(json!("x")).is_none());
    }

    #[test]
    fn test_fill_missing_keeps_existing() {
        let mut o = obj(json!({"_id": "A", "_rev": "r1", "_at": 5}));
        o.complete_bookkeeping(Bookkeeping::FillMissing);
        assert_eq!(o.id(), Some("A"));
        assert_eq!(o.rev(), Some("r1"));
        assert_eq!(o.at(), Some(5));
    }

    #[test]
    fn test_fill_missing_adds_fields() {
        let mut o = obj(json!({"_type": "sl::point"}));
        o.complete_bookkeeping(Bookkeeping::FillMissing);
        assert!(o.id().is_some());
        assert!(o.rev().is_some());
        assert!(o.at().unwrap() > 0);
    }

    #[test]
    fn test_fresh_revision_replaces_rev_and_at() {
        let mut o = obj(json!({"_id": "A", "_rev": "r1", "_at": 5}));
        o.complete_bookkeeping(Bookkeeping::FreshRevision);
        assert_eq!(o.id(), Some("A"));
        assert_ne!(o.rev(), Some("r1"));
        assert_ne!(o.at(), Some(5));
    }

    #[test]
    fn test_backfill_created_at() {
        let mut o = obj(json!({"_id": "D", "_at": 1234}));
        assert!(o.backfill_created_at());
        assert_eq!(o.get(FIELD_CREATED_AT), Some(&json!(1234)));

        let mut kept = obj(json!({"_id": "D", "_at": 1234, "createdAt": 99}));
        assert!(!kept.backfill_created_at());
        assert_eq!(kept.get(FIELD_CREATED_AT), Some(&json!(99)));
    }

    #[test]
    fn test_safe_b64_range_keys() {
        assert_eq!(safe_b64(&Value::Null), "");
        assert_eq!(safe_b64(&json!("")), "");
        // ["A"] -> WyJBIl0
        assert_eq!(safe_b64(&json!(["A"])), "WyJBIl0");
        // ["A",null] -> WyJBIixudWxsXQ
        assert_eq!(safe_b64(&json!(["A", null])), "WyJBIixudWxsXQ");
        assert!(!safe_b64(&json!(["A", null])).contains('='));
    }

    #[test]
    fn test_to_b64_decodes_back() {
        let o = obj(json!({"_id": "A", "n": 1}));
        let b64 = o.to_b64().unwrap();
        let raw = STANDARD.decode(b64).unwrap();
        let back: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(back, json!({"_id": "A", "n": 1}));
    }

    #[test]
    fn test_new_object_ids_are_unique() {
        assert_ne!(new_object_id(), new_object_id());
        assert_ne!(new_revision(), new_revision());
    }
}
