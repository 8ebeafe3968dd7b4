use super::{fallback, StrategyEngine};
use crate::http::{Request, Response};
use tracing::{debug, error};

impl StrategyEngine {
    /// Serve from cache; on a miss fetch, store in `namespace`, and return.
    ///
    /// Network failure yields the offline page for navigations and an empty
    /// 408 otherwise.
    pub async fn cache_first(&self, request: &Request, namespace: &str) -> Response {
        if let Some(cached) = self.lookup(&request.cache_key()) {
            debug!("Cache hit: {}", request.url);
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(namespace, request, &response);
                response
            }
            Err(e) => {
                error!("Cache-first fetch of {} failed: {}", request.url, e);
                if request.is_navigation() {
                    self.offline_page()
                } else {
                    fallback::request_timed_out()
                }
            }
        }
    }
}
