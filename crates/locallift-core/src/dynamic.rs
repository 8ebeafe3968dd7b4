//! Size-bounded general-purpose cache.
//!
//! FIFO by insertion order; reads do not refresh an entry. The
//! evict-then-insert sequence is not atomic, so overlapping fetches can
//! leave the namespace slightly over capacity for a moment.

use crate::cache::CacheStorage;
use crate::error::Result;
use crate::http::{Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Outcome of [`DynamicCache::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicUpdate {
    /// Response was not HTTP 200.
    Skipped,
    Inserted { evicted: Option<String> },
}

pub struct DynamicCache {
    storage: Arc<dyn CacheStorage>,
    namespace: String,
    capacity: usize,
}

impl DynamicCache {
    pub fn new(storage: Arc<dyn CacheStorage>, namespace: impl Into<String>, capacity: usize) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
            capacity: capacity.max(1),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `response` for `request`, evicting the oldest entry first when
    /// the namespace is full and the key is new.
    pub fn update(&self, request: &Request, response: &Response) -> Result<DynamicUpdate> {
        if !response.is_cacheable() {
            return Ok(DynamicUpdate::Skipped);
        }

        let key = request.cache_key();
        let keys = self.storage.keys(&self.namespace)?;

        let mut evicted = None;
        if keys.len() >= self.capacity && !keys.contains(&key) {
            if let Some(oldest) = keys.first() {
                debug!("Dynamic cache full ({}), evicting {}", keys.len(), oldest);
                self.storage.delete(&self.namespace, oldest)?;
                evicted = Some(oldest.clone());
            }
        }

        self.storage.put(&self.namespace, &key, &response.to_cached())?;

        Ok(DynamicUpdate::Inserted { evicted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use reqwest::StatusCode;

    fn request(n: usize) -> Request {
        Request::get(&format!("https://app.locallift.test/page/{}", n)).unwrap()
    }

    fn ok() -> Response {
        Response::new(StatusCode::OK, "page")
    }

    #[test]
    fn test_non_ok_responses_are_skipped() {
        let storage = Arc::new(MemoryCache::new());
        let dynamic = DynamicCache::new(storage.clone(), "dyn", 3);

        let result = dynamic
            .update(&request(1), &Response::new(StatusCode::NOT_FOUND, ""))
            .unwrap();
        assert_eq!(result, DynamicUpdate::Skipped);
        assert_eq!(storage.len("dyn").unwrap(), 0);
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let storage = Arc::new(MemoryCache::new());
        let dynamic = DynamicCache::new(storage.clone(), "dyn", 3);

        for n in 0..3 {
            assert_eq!(
                dynamic.update(&request(n), &ok()).unwrap(),
                DynamicUpdate::Inserted { evicted: None }
            );
        }

        let result = dynamic.update(&request(3), &ok()).unwrap();
        assert_eq!(
            result,
            DynamicUpdate::Inserted {
                evicted: Some(request(0).cache_key())
            }
        );
        assert_eq!(storage.len("dyn").unwrap(), 3);
        assert_eq!(storage.keys("dyn").unwrap()[0], request(1).cache_key());
    }

    #[test]
    fn test_refreshing_existing_key_does_not_evict() {
        let storage = Arc::new(MemoryCache::new());
        let dynamic = DynamicCache::new(storage.clone(), "dyn", 2);

        dynamic.update(&request(0), &ok()).unwrap();
        dynamic.update(&request(1), &ok()).unwrap();
        let result = dynamic.update(&request(0), &ok()).unwrap();

        assert_eq!(result, DynamicUpdate::Inserted { evicted: None });
        assert_eq!(storage.len("dyn").unwrap(), 2);
    }
}
