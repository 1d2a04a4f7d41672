//! Cache-aside accessor for one remote resource.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::api::{ApiRequest, ResourceApi};
use super::inflight::{InFlight, SharedFetch};
use super::keys::{ListParams, Resource};
use crate::cache::SharedCache;
use crate::error::{Error, Result};

// == Resource Accessor ==
/// Reads through the cache and invalidates it after writes.
///
/// Reads check the cache first, then either join a request already in flight
/// for the same key or issue a new one. Writes always go to the network and,
/// once they succeed, drop every cached key under the resource root.
///
/// Clones share the cache, the API client and the in-flight registry.
#[derive(Clone)]
pub struct ResourceAccessor {
    resource: Resource,
    cache: SharedCache,
    api: Arc<dyn ResourceApi>,
    inflight: Arc<InFlight>,
    /// Bumped by every successful write; a miss fetch started under an older
    /// generation does not populate the cache.
    generation: Arc<AtomicU64>,
}

impl fmt::Debug for ResourceAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceAccessor")
            .field("resource", &self.resource)
            .field("in_flight", &self.inflight.len())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}

impl ResourceAccessor {
    /// Creates an accessor. `cache` should be dedicated to this resource (its
    /// own storage key).
    pub fn new(resource: Resource, cache: SharedCache, api: Arc<dyn ResourceApi>) -> Self {
        Self {
            resource,
            cache,
            api,
            inflight: Arc::new(InFlight::default()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Number of miss requests currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Request path under the resource root. Each segment is percent-encoded,
    /// so `/`, `?` or `#` in an id or category stay inside their segment.
    fn path(&self, segments: &[&str]) -> String {
        segments.iter().fold(self.resource.name().to_string(), |mut path, segment| {
            path.push('/');
            path.push_str(&urlencoding::encode(segment));
            path
        })
    }

    // == Keys ==

    pub fn list_key(&self, params: &ListParams) -> String {
        params.append_to(self.resource.key("all")).build()
    }

    pub fn item_key(&self, id: impl fmt::Display) -> String {
        self.resource.key("id").segment(id).build()
    }

    pub fn search_key(&self, query: &str, params: &ListParams) -> String {
        params
            .append_to(self.resource.key("search").segment(query))
            .build()
    }

    pub fn category_key(&self, category: &str, params: &ListParams) -> String {
        params
            .append_to(self.resource.key("category").segment(category))
            .build()
    }

    pub fn stats_key(&self) -> String {
        self.resource.key("stats").build()
    }

    pub fn related_key(&self, id: impl fmt::Display, limit: Option<u32>) -> String {
        self.resource
            .key("related")
            .segment(id)
            .optional(limit)
            .build()
    }

    // == Reads ==

    /// Paginated, filtered listing.
    pub async fn get_all(&self, params: &ListParams) -> Result<Value> {
        let request =
            ApiRequest::get(self.resource.name()).with_query(params.query_pairs());
        self.read_through(self.list_key(params), request).await
    }

    pub async fn get_by_id(&self, id: impl fmt::Display) -> Result<Value> {
        let request = ApiRequest::get(self.path(&[id.to_string().as_str()]));
        self.read_through(self.item_key(id), request).await
    }

    pub async fn search(&self, query: &str, params: &ListParams) -> Result<Value> {
        let mut pairs = vec![("q".to_string(), query.to_string())];
        pairs.extend(params.query_pairs());
        let request = ApiRequest::get(self.path(&["search"])).with_query(pairs);
        self.read_through(self.search_key(query, params), request).await
    }

    pub async fn get_by_category(&self, category: &str, params: &ListParams) -> Result<Value> {
        let request = ApiRequest::get(self.path(&["category", category]))
            .with_query(params.query_pairs());
        self.read_through(self.category_key(category, params), request)
            .await
    }

    /// Aggregate figures for the resource (counts, totals).
    pub async fn get_stats(&self) -> Result<Value> {
        let request = ApiRequest::get(self.path(&["stats"]));
        self.read_through(self.stats_key(), request).await
    }

    pub async fn get_related(&self, id: impl fmt::Display, limit: Option<u32>) -> Result<Value> {
        let query = limit
            .map(|limit| vec![("limit".to_string(), limit.to_string())])
            .unwrap_or_default();
        let request =
            ApiRequest::get(self.path(&[id.to_string().as_str(), "related"])).with_query(query);
        self.read_through(self.related_key(id, limit), request).await
    }

    // == Writes ==

    pub async fn create(&self, data: Value) -> Result<Value> {
        let request = ApiRequest::post(self.resource.name(), data);
        self.write("create", request).await
    }

    pub async fn update(&self, id: impl fmt::Display, data: Value) -> Result<Value> {
        let request = ApiRequest::put(self.path(&[id.to_string().as_str()]), data);
        self.write("update", request).await
    }

    pub async fn delete(&self, id: impl fmt::Display) -> Result<Value> {
        let request = ApiRequest::delete(self.path(&[id.to_string().as_str()]));
        self.write("delete", request).await
    }

    pub async fn bulk_delete<I: Serialize>(&self, ids: &[I]) -> Result<Value> {
        let body = json!({ "ids": serde_json::to_value(ids)? });
        let request = ApiRequest::post(self.path(&["bulk-delete"]), body);
        self.write("bulk delete", request).await
    }

    pub async fn bulk_update_status<I: Serialize>(&self, ids: &[I], status: &str) -> Result<Value> {
        let body = json!({ "ids": serde_json::to_value(ids)?, "status": status });
        let request = ApiRequest::patch(self.path(&["bulk-status"]), body);
        self.write("bulk status update", request).await
    }

    // == Invalidation ==

    /// Drops every cached listing variant (`all`, `search`, `category`),
    /// leaving per-item entries alone.
    pub async fn invalidate_lists(&self) -> usize {
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        ["all", "search", "category"]
            .iter()
            .map(|variant| {
                let prefix = self.resource.variant_prefix(variant);
                self.inflight.forget_prefix(&prefix);
                cache.invalidate(&prefix)
            })
            .sum()
    }

    /// Drops the cached copy of a single item.
    pub async fn invalidate_item(&self, id: impl fmt::Display) {
        let key = self.item_key(id);
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inflight.forget(&key);
        cache.delete(&key);
    }

    /// Drops everything cached for the resource.
    pub async fn invalidate_all(&self) -> usize {
        let prefix = self.resource.root_prefix();
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inflight.forget_prefix(&prefix);
        cache.invalidate(&prefix)
    }

    // == Internals ==

    async fn read_through(&self, key: String, request: ApiRequest) -> Result<Value> {
        let fetch = {
            let mut cache = self.cache.write().await;
            if let Some(value) = cache.get(&key) {
                return Ok(value);
            }

            match self.inflight.join(&key) {
                Some(fetch) => {
                    debug!("Joining in-flight request for {}", key);
                    fetch
                }
                None => {
                    let ticket = self.inflight.ticket();
                    let fetch = self.fetch(key.clone(), ticket, request);
                    self.inflight.register(key, ticket, fetch.clone());
                    fetch
                }
            }
        };

        Ok(fetch.await?)
    }

    /// Builds the shared miss fetch. It stores a successful response unless a
    /// write landed while it was outstanding, and always unregisters itself.
    fn fetch(&self, key: String, ticket: u64, request: ApiRequest) -> SharedFetch {
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let inflight = Arc::clone(&self.inflight);
        let generation = Arc::clone(&self.generation);
        let started = generation.load(Ordering::SeqCst);

        async move {
            let outcome = api.send(request).await;

            let mut guard = cache.write().await;
            match &outcome {
                Ok(value) if generation.load(Ordering::SeqCst) == started => {
                    guard.set(key.clone(), value.clone());
                }
                Ok(_) => debug!("Not caching {}: resource changed while fetching", key),
                Err(err) => warn!("Fetch for {} failed: {}", key, err),
            }
            inflight.finish(&key, ticket);

            outcome
        }
        .boxed()
        .shared()
    }

    async fn write(&self, operation: &'static str, request: ApiRequest) -> Result<Value> {
        let response = match self.api.send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("{} on {} failed: {}", operation, self.resource, err);
                return Err(Error::Api(err));
            }
        };

        let prefix = self.resource.root_prefix();
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inflight.forget_prefix(&prefix);
        let removed = cache.invalidate(&prefix);
        info!(
            "{} on {} succeeded, invalidated {} cached entries",
            operation, self.resource, removed
        );

        Ok(response)
    }
}
