use std::{
    path::PathBuf,
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Serialize, de::DeserializeOwned};

use crate::RegistryError;

/// A small key-value cache for API responses, keyed by namespace and key
/// and aged out by TTL. One SQLite file instead of a tree of tiny JSON
/// files keeps the cache directory tidy and the reads cheap.
pub struct ApiCache {
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for ApiCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCache").finish()
    }
}

impl ApiCache {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let connection = Connection::open(&path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute(
            "CREATE TABLE IF NOT EXISTS api_cache (
                namespace TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, cache_key)
            )",
            [],
        )?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// A cached value younger than `ttl`, deserialized. Stale and malformed
    /// entries read as misses.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str, ttl: Duration) -> Option<T> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let row: Option<(String, i64)> = connection
            .query_row(
                "SELECT value, stored_at FROM api_cache
                 WHERE namespace = ?1 AND cache_key = ?2",
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .ok()
            .flatten();

        let (value, stored_at) = row?;
        if Self::now() - stored_at > ttl.as_secs() as i64 {
            return None;
        }
        serde_json::from_str(&value).ok()
    }

    pub fn put<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<(), RegistryError> {
        let serialized = serde_json::to_string(value)?;
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        connection.execute(
            "INSERT OR REPLACE INTO api_cache (namespace, cache_key, value, stored_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![namespace, key, serialized, Self::now()],
        )?;
        Ok(())
    }

    /// Drop entries older than `ttl` across all namespaces.
    pub fn evict_older_than(&self, ttl: Duration) -> Result<usize, RegistryError> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = Self::now() - ttl.as_secs() as i64;
        let removed = connection.execute("DELETE FROM api_cache WHERE stored_at < ?1", [cutoff])?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ApiCache::new(dir.path().join("api.db")).unwrap();

        cache.put("github", "owner/repo", &vec![1, 2, 3]).unwrap();
        let value: Option<Vec<i32>> =
            cache.get("github", "owner/repo", Duration::from_secs(60));
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[test]
    fn zero_ttl_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ApiCache::new(dir.path().join("api.db")).unwrap();
        cache.put("registry", "node", &"data").unwrap();

        std::thread::sleep(Duration::from_millis(1100));
        let value: Option<String> = cache.get("registry", "node", Duration::ZERO);
        assert_eq!(value, None);
    }

    #[test]
    fn namespaces_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ApiCache::new(dir.path().join("api.db")).unwrap();
        cache.put("a", "k", &1).unwrap();

        let missing: Option<i32> = cache.get("b", "k", Duration::from_secs(60));
        assert_eq!(missing, None);
    }
}
