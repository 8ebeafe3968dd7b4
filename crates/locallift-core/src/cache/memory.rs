//! In-memory cache storage.

use super::traits::{CacheStorage, CachedResponse, NamespaceStats, StorageStats};
use crate::error::{LiftError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Namespace {
    /// key → (insertion sequence, response)
    entries: HashMap<String, (u64, CachedResponse)>,
}

impl Namespace {
    fn ordered_keys(&self) -> Vec<String> {
        let mut keyed: Vec<(&u64, &String)> =
            self.entries.iter().map(|(k, (seq, _))| (seq, k)).collect();
        keyed.sort_unstable_by_key(|(seq, _)| **seq);
        keyed.into_iter().map(|(_, k)| k.clone()).collect()
    }
}

#[derive(Default)]
struct Inner {
    /// Namespace names in creation order.
    order: Vec<String>,
    namespaces: HashMap<String, Namespace>,
    next_seq: u64,
}

impl Inner {
    fn open(&mut self, namespace: &str) -> &mut Namespace {
        if !self.namespaces.contains_key(namespace) {
            self.order.push(namespace.to_string());
        }
        self.namespaces.entry(namespace.to_string()).or_default()
    }
}

/// Process-local storage; contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(LiftError::lock)
    }
}

impl CacheStorage for MemoryCache {
    fn open(&self, namespace: &str) -> Result<()> {
        self.lock()?.open(namespace);
        Ok(())
    }

    fn has(&self, namespace: &str) -> Result<bool> {
        Ok(self.lock()?.namespaces.contains_key(namespace))
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.order.clone())
    }

    fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        inner.order.retain(|n| n != namespace);
        Ok(inner.namespaces.remove(namespace).is_some())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>> {
        let inner = self.lock()?;
        Ok(inner
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.entries.get(key))
            .map(|(_, response)| response.clone()))
    }

    fn put(&self, namespace: &str, key: &str, response: &CachedResponse) -> Result<()> {
        let mut inner = self.lock()?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .open(namespace)
            .entries
            .insert(key.to_string(), (seq, response.clone()));
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        Ok(inner
            .namespaces
            .get_mut(namespace)
            .map(|ns| ns.entries.remove(key).is_some())
            .unwrap_or(false))
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let inner = self.lock()?;
        Ok(inner
            .namespaces
            .get(namespace)
            .map(Namespace::ordered_keys)
            .unwrap_or_default())
    }

    fn len(&self, namespace: &str) -> Result<usize> {
        let inner = self.lock()?;
        Ok(inner
            .namespaces
            .get(namespace)
            .map(|ns| ns.entries.len())
            .unwrap_or(0))
    }

    fn stats(&self) -> Result<StorageStats> {
        let inner = self.lock()?;
        let namespaces: Vec<NamespaceStats> = inner
            .order
            .iter()
            .filter_map(|name| {
                inner.namespaces.get(name).map(|ns| NamespaceStats {
                    namespace: name.clone(),
                    entry_count: ns.entries.len(),
                    total_size_bytes: ns.entries.values().map(|(_, r)| r.size_bytes()).sum(),
                })
            })
            .collect();

        Ok(StorageStats {
            total_entries: namespaces.iter().map(|n| n.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|n| n.total_size_bytes).sum(),
            namespaces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> CachedResponse {
        CachedResponse::new(200, vec![], body.as_bytes().to_vec())
    }

    #[test]
    fn test_put_and_get() {
        let cache = MemoryCache::new();
        cache.put("ns", "GET /a", &response("a")).unwrap();

        let hit = cache.get("ns", "GET /a").unwrap().unwrap();
        assert_eq!(hit.body, b"a");
        assert!(cache.get("ns", "GET /b").unwrap().is_none());
        assert!(cache.get("other", "GET /a").unwrap().is_none());
    }

    #[test]
    fn test_keys_follow_insertion_order() {
        let cache = MemoryCache::new();
        cache.put("ns", "k1", &response("1")).unwrap();
        cache.put("ns", "k2", &response("2")).unwrap();
        cache.put("ns", "k3", &response("3")).unwrap();
        assert_eq!(cache.keys("ns").unwrap(), vec!["k1", "k2", "k3"]);

        // Replacing moves the entry to the newest position
        cache.put("ns", "k1", &response("1b")).unwrap();
        assert_eq!(cache.keys("ns").unwrap(), vec!["k2", "k3", "k1"]);
        assert_eq!(cache.len("ns").unwrap(), 3);
    }

    #[test]
    fn test_namespace_creation_order_and_match_any() {
        let cache = MemoryCache::new();
        cache.open("first").unwrap();
        cache.put("second", "k", &response("second")).unwrap();
        cache.put("first", "k", &response("first")).unwrap();

        assert_eq!(cache.namespaces().unwrap(), vec!["first", "second"]);
        assert_eq!(cache.match_any("k").unwrap().unwrap().body, b"first");
    }

    #[test]
    fn test_delete_namespace() {
        let cache = MemoryCache::new();
        cache.put("old", "k", &response("x")).unwrap();
        cache.open("new").unwrap();

        assert!(cache.delete_namespace("old").unwrap());
        assert!(!cache.delete_namespace("old").unwrap());
        assert_eq!(cache.namespaces().unwrap(), vec!["new"]);
        assert!(cache.match_any("k").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let cache = MemoryCache::new();
        cache.put("ns1", "a", &response("12345")).unwrap();
        cache.put("ns1", "b", &response("67890")).unwrap();
        cache.put("ns2", "a", &response("abc")).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_size_bytes, 13);
        assert_eq!(stats.namespaces.len(), 2);
        assert_eq!(stats.namespaces[0].namespace, "ns1");
    }
}
