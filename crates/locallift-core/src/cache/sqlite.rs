//! SQLite-backed cache storage.

use super::traits::{CacheStorage, CachedResponse, NamespaceStats, StorageStats};
use crate::error::{LiftError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite-based cache storage.
///
/// All namespaces share one database. Insertion order comes from the
/// entries table's autoincrement sequence, namespace creation order from
/// the namespaces table's rowid.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open (or create) a cache database at the given path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LiftError::Io {
                message: format!("Cannot create directory for cache database: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| LiftError::Storage {
            message: format!("Cannot open offline cache: {}", e),
            source: Some(e),
        })?;

        // WAL lets concurrent readers proceed while a fetch writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| LiftError::Storage {
                message: format!("Cannot configure offline cache connection: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        cache.create_tables()?;
        Ok(cache)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(LiftError::lock)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_namespaces (
                namespace TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                cached_at TEXT NOT NULL,
                UNIQUE (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_ns_seq
                ON cache_entries(namespace, seq);
            "#,
        )
        .map_err(|e| LiftError::Storage {
            message: format!("Cannot create offline cache tables: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn ensure_namespace(conn: &Connection, namespace: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO cache_namespaces (namespace, created_at) VALUES (?1, ?2)",
            params![namespace, Utc::now().to_rfc3339()],
        )
        .map_err(|e| LiftError::Storage {
            message: format!("Failed to create namespace {}: {}", namespace, e),
            source: Some(e),
        })?;
        Ok(())
    }
}

impl CacheStorage for SqliteCache {
    fn open(&self, namespace: &str) -> Result<()> {
        let conn = self.lock()?;
        Self::ensure_namespace(&conn, namespace)
    }

    fn has(&self, namespace: &str) -> Result<bool> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM cache_namespaces WHERE namespace = ?1",
                params![namespace],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT namespace FROM cache_namespaces ORDER BY rowid")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        let conn = self.lock()?;

        let entries = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![namespace],
            )
            .map_err(|e| LiftError::Storage {
                message: format!("Failed to delete entries of {}: {}", namespace, e),
                source: Some(e),
            })?;

        let removed = conn.execute(
            "DELETE FROM cache_namespaces WHERE namespace = ?1",
            params![namespace],
        )?;

        debug!("Deleted namespace '{}' ({} entries)", namespace, entries);

        Ok(removed > 0)
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>> {
        let conn = self.lock()?;

        let row: Option<(u16, String, Vec<u8>, String)> = conn
            .query_row(
                r#"
                SELECT status, headers, body, cached_at
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2
                "#,
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| LiftError::Storage {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let (status, headers_json, body, cached_at_str) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;
        let cached_at = DateTime::parse_from_rfc3339(&cached_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(CachedResponse {
            status,
            headers,
            body,
            cached_at,
        }))
    }

    fn put(&self, namespace: &str, key: &str, response: &CachedResponse) -> Result<()> {
        let mut conn = self.lock()?;
        let headers_json = serde_json::to_string(&response.headers)?;

        let tx = conn.transaction()?;
        Self::ensure_namespace(&tx, namespace)?;

        // Delete then insert so a replaced entry takes a fresh sequence number
        tx.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        tx.execute(
            r#"
            INSERT INTO cache_entries (namespace, key, status, headers, body, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                namespace,
                key,
                response.status,
                headers_json,
                response.body,
                response.cached_at.to_rfc3339()
            ],
        )
        .map_err(|e| LiftError::Storage {
            message: format!("Failed to store cache entry: {}", e),
            source: Some(e),
        })?;
        tx.commit()?;

        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(|e| LiftError::Storage {
                message: format!("Failed to delete cache entry: {}", e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key FROM cache_entries WHERE namespace = ?1 ORDER BY seq")?;
        let keys = stmt
            .query_map(params![namespace], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn len(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn stats(&self) -> Result<StorageStats> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT n.namespace, COUNT(e.seq), COALESCE(SUM(LENGTH(e.body)), 0)
            FROM cache_namespaces n
            LEFT JOIN cache_entries e ON e.namespace = n.namespace
            GROUP BY n.namespace
            ORDER BY n.rowid
            "#,
        )?;

        let namespaces = stmt
            .query_map([], |row| {
                let entry_count: i64 = row.get(1)?;
                let total_size_bytes: i64 = row.get(2)?;
                Ok(NamespaceStats {
                    namespace: row.get(0)?,
                    entry_count: entry_count as usize,
                    total_size_bytes: total_size_bytes as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(StorageStats {
            total_entries: namespaces.iter().map(|n| n.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|n| n.total_size_bytes).sum(),
            namespaces,
        })
    }
}
