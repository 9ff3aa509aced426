//! Mock ObjectStore for testing.
//!
//! Records every post_object() call per domain. Heads can be seeded for head
//! reconciliation tests, and individual ids can be made to fail on write.

use site_replication::client::{BoxFuture, ObjectStore};
use site_replication::{DomainObject, ReplicationError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A recorded post_object() call.
#[derive(Debug, Clone)]
pub struct WriteCall {
    pub domain: String,
    pub object: DomainObject,
}

#[derive(Default)]
struct Shared {
    writes: RwLock<Vec<WriteCall>>,
    /// domain -> id -> head
    heads: RwLock<HashMap<String, HashMap<String, DomainObject>>>,
    failing_ids: RwLock<HashSet<String>>,
}

/// Recording destination store.
///
/// Clones (and [`ObjectStore::for_domain`] views) share the same records.
#[derive(Clone)]
pub struct MockObjectStore {
    domain: String,
    shared: Arc<Shared>,
}

impl MockObjectStore {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Seed a destination head in `domain`.
    pub async fn seed_head(&self, domain: &str, head: serde_json::Value) {
        let head = DomainObject::from_value(head).expect("head must be an object");
        let id = head.id().expect("head needs an _id").to_string();
        self.shared
            .heads
            .write()
            .await
            .entry(domain.to_string())
            .or_default()
            .insert(id, head);
    }

    /// Make every write of `id` fail with a 500.
    pub async fn fail_writes_for(&self, id: &str) {
        self.shared.failing_ids.write().await.insert(id.to_string());
    }

    pub async fn writes(&self) -> Vec<WriteCall> {
        self.shared.writes.read().await.clone()
    }

    pub async fn written_ids(&self) -> Vec<String> {
        self.writes()
            .await
            .iter()
            .map(|w| w.object.display_id().to_string())
            .collect()
    }

    pub async fn write_count(&self) -> usize {
        self.shared.writes.read().await.len()
    }
}

impl ObjectStore for MockObjectStore {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn for_domain(&self, domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            shared: Arc::clone(&self.shared),
        }
    }

    fn post_object(&self, object: DomainObject) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let id = object.display_id().to_string();
            if self.shared.failing_ids.read().await.contains(&id) {
                return Err(ReplicationError::remote(500, "mock://events", "write rejected"));
            }
            self.shared
                .heads
                .write()
                .await
                .entry(self.domain.clone())
                .or_default()
                .insert(id, object.clone());
            self.shared.writes.write().await.push(WriteCall {
                domain: self.domain.clone(),
                object,
            });
            Ok(())
        })
    }

    fn fetch_heads(&self) -> BoxFuture<'_, Vec<DomainObject>> {
        Box::pin(async move {
            let heads = self.shared.heads.read().await;
            Ok(heads
                .get(&self.domain)
                .map(|d| d.values().cloned().collect())
                .unwrap_or_default())
        })
    }
}
