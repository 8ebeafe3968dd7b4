//! Namespaced response storage used by the caching strategies.
//!
//! Two backends share the [`CacheStorage`] trait:
//! - [`MemoryCache`]: process-local, the default and what tests use
//! - [`SqliteCache`]: persisted in a single SQLite database

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::{CacheStorage, CachedResponse, NamespaceStats, StorageStats};
