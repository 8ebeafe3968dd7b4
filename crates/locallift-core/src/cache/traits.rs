//! Cache storage trait and types.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in received order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
    /// When the entry was stored.
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            cached_at: Utc::now(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Metadata about one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
}

/// Statistics across all namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    /// Per-namespace statistics, in namespace creation order.
    pub namespaces: Vec<NamespaceStats>,
}

/// Namespaced request→response store.
///
/// Namespaces remember creation order and entries remember insertion
/// order. Replacing an entry moves it to the newest position.
/// All operations are synchronous to match rusqlite's API.
pub trait CacheStorage: Send + Sync {
    /// Create the namespace if it does not exist.
    fn open(&self, namespace: &str) -> Result<()>;

    /// Whether the namespace exists.
    fn has(&self, namespace: &str) -> Result<bool>;

    /// All namespace names, oldest first.
    fn namespaces(&self) -> Result<Vec<String>>;

    /// Delete a namespace and everything in it.
    ///
    /// Returns `false` if it did not exist.
    fn delete_namespace(&self, namespace: &str) -> Result<bool>;

    /// Look up an entry in one namespace.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>>;

    /// Store an entry, creating the namespace if needed.
    fn put(&self, namespace: &str, key: &str, response: &CachedResponse) -> Result<()>;

    /// Delete an entry. Returns `false` if it did not exist.
    fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Keys of a namespace, oldest insertion first.
    fn keys(&self, namespace: &str) -> Result<Vec<String>>;

    /// Number of entries in a namespace (0 if it does not exist).
    fn len(&self, namespace: &str) -> Result<usize> {
        Ok(self.keys(namespace)?.len())
    }

    /// Look up a key in every namespace, oldest namespace first.
    fn match_any(&self, key: &str) -> Result<Option<CachedResponse>> {
        for namespace in self.namespaces()? {
            if let Some(hit) = self.get(&namespace, key)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Storage statistics.
    fn stats(&self) -> Result<StorageStats>;
}
