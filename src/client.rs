// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote object store client.
//!
//! [`RemoteStoreClient`] talks to one site+domain of the store over HTTP:
//! head lookups through the `_head` view, paged view scans, event appends,
//! raw log pages and domain statistics. It also knows the URLs of the file
//! and design-file services of the same site.
//!
//! # Availability Retry
//!
//! Read calls that receive `503 Service Unavailable` sleep and re-issue the
//! request according to the configured [`RetryConfig`]. That is the only
//! automatic retry; every other non-success status is returned immediately
//! as [`ReplicationError::Remote`]. Appends are never retried.
//!
//! # Destination Seam
//!
//! The replication policy writes through the [`ObjectStore`] trait so tests
//! can substitute a recording store for the destination.

use crate::config::SiteConfig;
use crate::error::{ReplicationError, Result, STATUS_UNAVAILABLE};
use crate::event::{LogPage, PageFetch};
use crate::metrics;
use crate::object::{safe_b64, DomainObject, FIELD_ID, FIELD_SCHEMA_VERSION, FIELD_TYPE};
use crate::resilience::RetryConfig;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Header carrying the caller's token.
pub const AUTH_HEADER: &str = "X-Topcon-Auth";

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What the replication policy needs from a destination store.
pub trait ObjectStore: Send + Sync {
    /// Domain writes land in.
    fn domain(&self) -> &str;

    /// The same store bound to another domain.
    fn for_domain(&self, domain: &str) -> Self
    where
        Self: Sized;

    /// Append `object` as a new event.
    fn post_object(&self, object: DomainObject) -> BoxFuture<'_, ()>;

    /// All current heads of the domain.
    fn fetch_heads(&self) -> BoxFuture<'_, Vec<DomainObject>>;
}

/// One entry of a view scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Option<Value>,
}

/// One page of a view scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewPage {
    #[serde(default)]
    pub items: Vec<ViewItem>,
    /// Exclusive key to continue from; `null` when the scan is complete.
    #[serde(default)]
    pub last_excl: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LocatorResponse {
    url: String,
}

/// HTTP client bound to one site and domain.
#[derive(Debug, Clone)]
pub struct RemoteStoreClient {
    site: SiteConfig,
    http: reqwest::Client,
    retry: RetryConfig,
}

impl RemoteStoreClient {
    pub fn new(site: SiteConfig, retry: RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!site.verify_tls)
            .build()?;
        Ok(Self { site, http, retry })
    }

    /// Same connection pool and retry budget, different domain.
    pub fn for_domain(&self, domain: &str) -> Self {
        Self {
            site: self.site.with_domain(domain),
            http: self.http.clone(),
            retry: self.retry.clone(),
        }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn token(&self) -> &str {
        &self.site.token
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(AUTH_HEADER, &self.site.token)
    }

    fn domain_url(&self, service: &str) -> String {
        format!(
            "{}/{}/v1/site/{}/domain/{}",
            self.site.api_url, service, self.site.site, self.site.domain
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Endpoints of the file and design-file services
    // ─────────────────────────────────────────────────────────────────────────

    /// Endpoint that resolves a stored file's download URL.
    pub fn file_locator_url(&self, uuid: &str) -> Result<String> {
        self.service_url(&["filesystem", "v1", "site", &self.site.site, "files", uuid, "url"])
            .map(String::from)
    }

    /// Chunked upload endpoint for a file.
    pub fn file_upload_url(&self, uuid: &str) -> Result<String> {
        self.service_url(&["filesystem", "v1", "site", &self.site.site, "files", uuid, "upload"])
            .map(String::from)
    }

    /// Download URL of a design file in the given particular format.
    pub fn design_file_url(&self, uuid: &str, particular: &str) -> Result<String> {
        let mut url = self.service_url(&["designfiles", "v1", "site", &self.site.site, "designfiles", uuid])?;
        url.query_pairs_mut().append_pair("particular", particular);
        Ok(url.into())
    }

    /// Chunked upload endpoint for a design file.
    pub fn design_upload_url(&self, uuid: &str) -> Result<String> {
        self.service_url(&["designfiles", "v1", "site", &self.site.site, "designfiles", uuid, "upload"])
            .map(String::from)
    }

    /// `api_url` extended by `segments`, each percent-encoded as a single
    /// path segment.
    fn service_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.site.api_url)
            .map_err(|e| ReplicationError::Config(format!("invalid api_url {}: {}", self.site.api_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ReplicationError::Config(format!("api_url {} cannot take a path", self.site.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a read request, retrying while the store answers 503.
    ///
    /// The returned response may still carry any other status.
    async fn send_read<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            let resp = self.authed(build()).send().await?;
            if resp.status().as_u16() != STATUS_UNAVAILABLE {
                if attempts > 1 {
                    debug!(operation, attempts, "Store available again");
                }
                return Ok(resp);
            }
            if !self.retry.allows_another(attempts) {
                warn!(operation, attempts, "Store still unavailable, giving up");
                return Err(ReplicationError::RetryExhausted {
                    operation: operation.to_string(),
                    attempts,
                });
            }
            let delay = self.retry.delay_for_attempt(attempts);
            trace!(operation, attempts, delay_ms = delay.as_millis() as u64, "Store unavailable, retrying");
            metrics::record_unavailable_retry(operation);
            tokio::time::sleep(delay).await;
        }
    }

    /// Turn a non-success response into a [`ReplicationError::Remote`].
    pub(crate) async fn require_success(resp: Response) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let body = resp.text().await.unwrap_or_default();
        Err(ReplicationError::remote(status, url, body))
    }

    async fn get_json(&self, operation: &str, url: &str) -> Result<Value> {
        let resp = self.send_read(operation, || self.http.get(url)).await?;
        let resp = Self::require_success(resp).await?;
        Ok(resp.json().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Store operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Scan `view` between `start` and `end` (both already safe-b64 encoded,
    /// empty for open bounds).
    pub async fn fetch_view_subset(
        &self,
        view: &str,
        start: &str,
        end: &str,
        limit: usize,
    ) -> Result<ViewPage> {
        let url = format!("{}/view/{}", self.domain_url("rdm"), view);
        let limit = limit.to_string();
        let resp = self
            .send_read("fetch_view_subset", || {
                self.http
                    .get(&url)
                    .query(&[("limit", limit.as_str()), ("start", start), ("end", end)])
            })
            .await?;
        let resp = Self::require_success(resp).await?;
        Ok(resp.json().await?)
    }

    /// Every entry of `view`, following `last_excl` until the store reports
    /// nothing left.
    pub async fn fetch_view_all(&self, view: &str) -> Result<Vec<ViewItem>> {
        let mut page = self.fetch_view_subset(view, "", "", 500).await?;
        let mut items = std::mem::take(&mut page.items);
        let mut last_excl = page.last_excl.take();

        while let Some(key) = last_excl.filter(|k| !k.is_null()) {
            let start = safe_b64(&Value::String(key.to_string()));
            let mut next = self.fetch_view_subset(view, &start, "", 500).await?;
            items.append(&mut next.items);
            last_excl = next.last_excl.take();
        }

        debug!(view, count = items.len(), "Fetched full view");
        Ok(items)
    }

    /// Current head revision of `id`.
    ///
    /// Absent when the range query returns anything but exactly one entry,
    /// or when that entry belongs to a different identifier.
    pub async fn fetch_object(&self, id: &str) -> Result<Option<DomainObject>> {
        let start = safe_b64(&json!([id]));
        let end = safe_b64(&json!([id, null]));
        let page = self.fetch_view_subset("_head", &start, &end, 1).await?;

        if page.items.len() != 1 {
            return Ok(None);
        }
        let Some(value) = page.items.into_iter().next().and_then(|item| item.value) else {
            return Ok(None);
        };
        if value.get(FIELD_ID).and_then(Value::as_str) != Some(id) {
            return Ok(None);
        }
        Ok(DomainObject::from_value(value))
    }

    /// Revision history of `id`, newest first, at most `limit` entries.
    pub async fn fetch_history(&self, id: &str, limit: usize) -> Result<Vec<Value>> {
        let start = safe_b64(&json!([id]));
        let end = safe_b64(&json!([id, null]));
        let page = self.fetch_view_subset("_hist", &start, &end, limit).await?;

        Ok(page
            .items
            .into_iter()
            .take_while(|item| item.id.as_deref() == Some(id))
            .filter_map(|item| item.value)
            .collect())
    }

    /// Schema version of the type definition `type_id`, 0 if unknown.
    async fn resolve_schema_version(&self, type_id: &str) -> Result<Value> {
        let version = self
            .fetch_object(type_id)
            .await?
            .and_then(|t| t.get(FIELD_SCHEMA_VERSION).cloned())
            .unwrap_or_else(|| json!(0));
        Ok(version)
    }

    /// Append `object` as a single event.
    ///
    /// Objects with a type but no schema version get the version of their
    /// type definition first.
    pub async fn post_object(&self, mut object: DomainObject) -> Result<()> {
        if object.contains(FIELD_TYPE) && !object.contains(FIELD_SCHEMA_VERSION) {
            let type_id = object.type_tag().to_string();
            let version = self.resolve_schema_version(&type_id).await?;
            object.insert(FIELD_SCHEMA_VERSION, version);
        }

        let url = format!("{}/events", self.domain_url("rdm_log"));
        let body = json!({ "data_b64": object.to_b64()? });
        let resp = self.authed(self.http.post(&url)).json(&body).send().await?;
        Self::require_success(resp).await?;

        trace!(id = %object.display_id(), domain = %self.site.domain, "Posted object");
        Ok(())
    }

    /// Up to `limit` raw events strictly after `after`.
    ///
    /// `204 No Content` (or an empty page) means the log is exhausted.
    pub async fn fetch_log_page(&self, after: u64, limit: usize) -> Result<PageFetch> {
        let url = format!("{}/events", self.domain_url("rdm_log"));
        let after_s = after.to_string();
        let limit_s = limit.to_string();
        let started = Instant::now();
        let resp = self
            .send_read("fetch_log_page", || {
                self.http
                    .get(&url)
                    .query(&[("after", after_s.as_str()), ("limit", limit_s.as_str())])
            })
            .await?;
        metrics::record_page_latency(&self.site.domain, started.elapsed());

        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(PageFetch::Exhausted);
        }
        let resp = Self::require_success(resp).await?;
        let page: LogPage = resp.json().await?;
        if page.events.is_empty() {
            return Ok(PageFetch::Exhausted);
        }
        Ok(PageFetch::Page(page))
    }

    /// Domain statistics as reported by the store.
    pub async fn get_stats(&self) -> Result<Value> {
        let url = format!("{}/stats", self.domain_url("rdm"));
        self.get_json("get_stats", &url).await
    }

    /// Resolve the download URL of a stored file.
    pub async fn resolve_file_url(&self, uuid: &str) -> Result<String> {
        let url = self.file_locator_url(uuid)?;
        let resp = self.send_read("resolve_file_url", || self.http.get(&url)).await?;
        let resp = Self::require_success(resp).await?;
        let locator: LocatorResponse = resp.json().await?;
        Ok(locator.url)
    }
}

impl ObjectStore for RemoteStoreClient {
    fn domain(&self) -> &str {
        &self.site.domain
    }

    fn for_domain(&self, domain: &str) -> Self {
        RemoteStoreClient::for_domain(self, domain)
    }

    fn post_object(&self, object: DomainObject) -> BoxFuture<'_, ()> {
        Box::pin(async move { RemoteStoreClient::post_object(self, object).await })
    }

    fn fetch_heads(&self) -> BoxFuture<'_, Vec<DomainObject>> {
        Box::pin(async move {
            let items = self.fetch_view_all("_head").await?;
            Ok(items
                .into_iter()
                .filter_map(|item| item.value.and_then(DomainObject::from_value))
                .collect())
        })
    }
}
