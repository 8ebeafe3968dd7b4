use super::{fallback, StrategyEngine};
use crate::http::{Request, Response};
use tracing::{debug, info};

impl StrategyEngine {
    /// Fetch first, refresh `namespace` on success, fall back to cache.
    ///
    /// With no cached copy: navigations get the offline page, API requests
    /// get a JSON 503, everything else a plain 503.
    pub async fn network_first(&self, request: &Request, namespace: &str) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(namespace, request, &response);
                response
            }
            Err(e) => {
                info!("Network error for {}, falling back to cache: {}", request.url, e);
                if let Some(cached) = self.lookup(&request.cache_key()) {
                    return cached;
                }
                if request.is_navigation() {
                    self.offline_page()
                } else if self.router.is_api_request(request.url.path()) {
                    fallback::offline_api_error()
                } else {
                    fallback::service_unavailable()
                }
            }
        }
    }

    /// Network first for unclassified requests, feeding the bounded
    /// dynamic namespace.
    pub async fn network_with_cache_fallback(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_dynamic(request, &response);
                response
            }
            Err(e) => {
                debug!("Network error for {}, falling back to cache: {}", request.url, e);
                if let Some(cached) = self.lookup(&request.cache_key()) {
                    return cached;
                }
                if request.is_navigation() {
                    self.offline_page()
                } else {
                    fallback::service_unavailable()
                }
            }
        }
    }
}
