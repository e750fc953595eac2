//! Hot-data store abstraction.
//!
//! The hot store holds short-lived, TTL-governed state: cached block
//! payloads and upload session bookkeeping. It is advisory for the cache
//! path and authoritative only for ephemeral session state; nothing durable
//! lives here. Values are opaque bytes; string-field hashes mirror the
//! shape used for chunk tracking (`upload:<id>:chunks` → `chunk:<index>`).

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// TTL-governed key-value store for hot data.
#[async_trait]
pub trait HotStore: Send + Sync + 'static {
    /// Set a value, with an optional time-to-live.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StorageResult<()>;

    /// Get a value, if present and unexpired.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Delete a key (value or hash); absent keys are fine.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check for a present, unexpired key.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Set one field of a string-valued hash, refreshing the key's TTL.
    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<()>;

    /// Get all fields of a hash; an absent key yields an empty map.
    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>>;
}

// ===== In-memory implementation =====

#[derive(Default)]
struct MemoryHotInner {
    values: HashMap<String, (Option<Instant>, Bytes)>,
    hashes: HashMap<String, (Option<Instant>, HashMap<String, String>)>,
}

impl MemoryHotInner {
    fn purge(&mut self) {
        let now = Instant::now();
        self.values
            .retain(|_, (deadline, _)| deadline.map(|d| d > now).unwrap_or(true));
        self.hashes
            .retain(|_, (deadline, _)| deadline.map(|d| d > now).unwrap_or(true));
    }
}

/// In-memory hot store with expiry checked on access.
#[derive(Default)]
pub struct MemoryHotStore {
    inner: Mutex<MemoryHotInner>,
}

impl MemoryHotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a key immediately, as if its TTL had elapsed. Test seam for
    /// exercising session-expiry behavior without waiting out a TTL.
    pub fn force_expire(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.values.remove(key);
        inner.hashes.remove(key);
    }

    /// Drop every key with the given prefix.
    pub fn force_expire_prefix(&self, prefix: &str) {
        let mut inner = self.inner.lock();
        inner.values.retain(|k, _| !k.starts_with(prefix));
        inner.hashes.retain(|k, _| !k.starts_with(prefix));
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|t| Instant::now() + t)
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.purge();
        inner.values.insert(key.to_string(), (deadline(ttl), value));
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let mut inner = self.inner.lock();
        inner.purge();
        Ok(inner.values.get(key).map(|(_, v)| v.clone()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.values.remove(key);
        inner.hashes.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let mut inner = self.inner.lock();
        inner.purge();
        Ok(inner.values.contains_key(key) || inner.hashes.contains_key(key))
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.purge();
        let entry = inner
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| (None, HashMap::new()));
        entry.0 = deadline(ttl);
        entry.1.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        let mut inner = self.inner.lock();
        inner.purge();
        Ok(inner
            .hashes
            .get(key)
            .map(|(_, fields)| fields.clone())
            .unwrap_or_default())
    }
}

// ===== Redis implementation =====

/// Redis-backed hot store using a multiplexed connection manager.
pub struct RedisHotStore {
    conn: ConnectionManager,
}

impl RedisHotStore {
    /// Connect to the hot-data store at `address` (e.g., "redis://host:6379").
    pub async fn connect(address: &str) -> StorageResult<Self> {
        let client = redis::Client::open(address)
            .map_err(|e| StorageError::Config(format!("invalid hot store address: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::Hot(format!("failed to connect: {e}")))?;
        Ok(Self { conn })
    }

    fn hot_err(e: redis::RedisError) -> StorageError {
        StorageError::Hot(e.to_string())
    }
}

#[async_trait]
impl HotStore for RedisHotStore {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(&value[..]);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query_async::<()>(&mut conn).await.map_err(Self::hot_err)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Self::hot_err)?;
        Ok(value.map(Bytes::from))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::hot_err)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.conn.clone();
        let exists: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Self::hot_err)?;
        Ok(exists > 0)
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::hot_err)?;
        if let Some(ttl) = ttl {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl.as_secs().max(1))
                .query_async::<()>(&mut conn)
                .await
                .map_err(Self::hot_err)?;
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Self::hot_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_set_get_delete() {
        let store = MemoryHotStore::new();
        store
            .set("k", Bytes::from("v"), None)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("v")));
        assert!(store.exists("k").await.unwrap());

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_ttl_expiry() {
        let store = MemoryHotStore::new();
        store
            .set("short", Bytes::from("v"), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_hash_fields() {
        let store = MemoryHotStore::new();
        store
            .hash_set("h", "chunk:0", "received", None)
            .await
            .unwrap();
        store
            .hash_set("h", "chunk:2", "received", None)
            .await
            .unwrap();

        let fields = store.hash_get_all("h").await.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("chunk:0").map(String::as_str), Some("received"));
        assert!(store.hash_get_all("absent").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_force_expire() {
        let store = MemoryHotStore::new();
        store.set("a:1", Bytes::from("x"), None).await.unwrap();
        store.hash_set("a:1:h", "f", "v", None).await.unwrap();
        store.force_expire_prefix("a:1");
        assert_eq!(store.get("a:1").await.unwrap(), None);
        assert!(store.hash_get_all("a:1:h").await.unwrap().is_empty());
    }
}
