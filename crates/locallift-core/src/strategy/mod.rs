//! Caching strategies.
//!
//! Each strategy resolves a request to a response and never fails: when
//! network and cache are both unavailable it builds a synthetic response.
//! Lookups search every namespace (oldest first); writes go to the
//! strategy's own namespace and only for HTTP 200 responses.

mod cache_first;
pub mod fallback;
mod image;
mod network_first;

use crate::cache::CacheStorage;
use crate::config::{CacheNames, WorkerConfig};
use crate::dynamic::{DynamicCache, DynamicUpdate};
use crate::error::Result;
use crate::events::{EventBus, WorkerEvent};
use crate::http::{cache_key, Request, Response};
use crate::network::DynFetcher;
use crate::router::{RequestClass, Router};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

pub struct StrategyEngine {
    storage: Arc<dyn CacheStorage>,
    fetcher: DynFetcher,
    names: CacheNames,
    router: Router,
    dynamic: DynamicCache,
    origin: Url,
    offline_page: String,
    placeholder_image: String,
    events: Arc<EventBus<WorkerEvent>>,
}

impl StrategyEngine {
    pub fn new(
        config: &WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: DynFetcher,
        events: Arc<EventBus<WorkerEvent>>,
    ) -> Result<Self> {
        let names = config.cache_names();
        let dynamic = DynamicCache::new(
            Arc::clone(&storage),
            names.dynamic.clone(),
            config.dynamic_cache_size,
        );

        Ok(Self {
            storage,
            fetcher,
            names,
            router: Router::new(config),
            dynamic,
            origin: config.origin_url()?,
            offline_page: config.offline_page.clone(),
            placeholder_image: config.placeholder_image.clone(),
            events,
        })
    }

    /// Run the strategy matching `class`.
    pub async fn dispatch(&self, class: RequestClass, request: &Request) -> Response {
        match class {
            RequestClass::StaticAsset => {
                self.cache_first(request, &self.names.static_assets).await
            }
            RequestClass::Api => self.network_first(request, &self.names.api).await,
            RequestClass::Image => self.image(request).await,
            RequestClass::Other => self.network_with_cache_fallback(request).await,
        }
    }

    pub fn dynamic(&self) -> &DynamicCache {
        &self.dynamic
    }

    /// Cached response for `key` in any namespace. Storage errors count as a miss.
    fn lookup(&self, key: &str) -> Option<Response> {
        match self.storage.match_any(key) {
            Ok(hit) => hit.map(Response::from_cached),
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", key, e);
                None
            }
        }
    }

    /// Store a clone of an HTTP 200 response. Storage errors are logged and dropped.
    fn store(&self, namespace: &str, request: &Request, response: &Response) {
        if !response.is_cacheable() {
            debug!(
                "Not caching {} ({}), status {}",
                request.url, namespace, response.status
            );
            return;
        }
        if let Err(e) = self
            .storage
            .put(namespace, &request.cache_key(), &response.to_cached())
        {
            warn!("Failed to cache {} in {}: {}", request.url, namespace, e);
        }
    }

    fn store_dynamic(&self, request: &Request, response: &Response) {
        match self.dynamic.update(request, response) {
            Ok(DynamicUpdate::Inserted { evicted: Some(key) }) => {
                self.events.emit(&WorkerEvent::DynamicEvicted { key });
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to update dynamic cache for {}: {}", request.url, e),
        }
    }

    /// Cached response for a root-relative path on the worker's own origin,
    /// whatever host the failed request targeted.
    fn lookup_path(&self, path: &str) -> Option<Response> {
        let url = self.origin.join(path).ok()?;
        self.lookup(&cache_key(&Method::GET, &url))
    }

    /// The designated offline page, or a built-in one if it was never cached.
    fn offline_page(&self) -> Response {
        self.lookup_path(&self.offline_page)
            .unwrap_or_else(fallback::builtin_offline_page)
    }
}
