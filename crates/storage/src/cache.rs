//! Write-through hot-block cache decorating any block store.

use crate::error::StorageResult;
use crate::hot::HotStore;
use crate::traits::BlockStore;
use async_trait::async_trait;
use bytes::Bytes;
use sealock_core::BlockHash;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A block store wrapped with a hot-block cache.
///
/// The inner store is always authoritative: cache writes happen after the
/// inner store acknowledges, cache failures are logged and swallowed, and a
/// cache miss or an unreachable cache degrades to the inner store. Cached
/// payloads live under `block:<hex>` with a configurable TTL.
pub struct CachedStore {
    inner: Arc<dyn BlockStore>,
    hot: Arc<dyn HotStore>,
    ttl: Option<Duration>,
}

impl CachedStore {
    /// Wrap `inner` with a cache on `hot`. `ttl_secs` of 0 disables expiry.
    pub fn new(inner: Arc<dyn BlockStore>, hot: Arc<dyn HotStore>, ttl_secs: u64) -> Self {
        let ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
        Self { inner, hot, ttl }
    }

    fn cache_key(hash: &BlockHash) -> String {
        format!("block:{}", hash.to_hex())
    }
}

#[async_trait]
impl BlockStore for CachedStore {
    async fn put(&self, data: Bytes) -> StorageResult<BlockHash> {
        let hash = self.inner.put(data.clone()).await?;

        // Write-through off the request path; the inner store already holds
        // the authoritative bytes.
        let hot = self.hot.clone();
        let ttl = self.ttl;
        let key = Self::cache_key(&hash);
        tokio::spawn(async move {
            if let Err(e) = hot.set(&key, data, ttl).await {
                warn!(key = %key, error = %e, "failed to cache block");
            }
        });

        Ok(hash)
    }

    async fn get(&self, hash: &BlockHash) -> StorageResult<Bytes> {
        let key = Self::cache_key(hash);
        match self.hot.get(&key).await {
            Ok(Some(data)) => return Ok(data),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "cache probe failed"),
        }

        let data = self.inner.get(hash).await?;
        if let Err(e) = self.hot.set(&key, data.clone(), self.ttl).await {
            warn!(key = %key, error = %e, "failed to cache block");
        }
        Ok(data)
    }

    async fn exists(&self, hash: &BlockHash) -> StorageResult<bool> {
        let key = Self::cache_key(hash);
        match self.hot.exists(&key).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => warn!(key = %key, error = %e, "cache probe failed"),
        }
        // Cache entries expire while the block stays authoritative, so
        // absence always falls through.
        self.inner.exists(hash).await
    }

    async fn delete(&self, hash: &BlockHash) -> StorageResult<()> {
        self.inner.delete(hash).await?;
        let key = Self::cache_key(hash);
        if let Err(e) = self.hot.delete(&key).await {
            warn!(key = %key, error = %e, "failed to evict cached block");
        }
        Ok(())
    }

    async fn size(&self, hash: &BlockHash) -> StorageResult<u64> {
        self.inner.size(hash).await
    }

    fn backend_name(&self) -> &'static str {
        "cached"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::error::StorageError;
    use crate::hot::MemoryHotStore;
    use std::collections::HashMap;

    fn cached(ttl_secs: u64) -> (Arc<MemoryStore>, Arc<MemoryHotStore>, CachedStore) {
        let inner = Arc::new(MemoryStore::new());
        let hot = Arc::new(MemoryHotStore::new());
        let store = CachedStore::new(inner.clone(), hot.clone(), ttl_secs);
        (inner, hot, store)
    }

    #[tokio::test]
    async fn test_put_writes_through_to_cache() {
        let (inner, hot, store) = cached(0);
        let data = Bytes::from("cached bytes");
        let hash = store.put(data.clone()).await.unwrap();

        // The inner store is authoritative immediately.
        assert_eq!(inner.get(&hash).await.unwrap(), data);

        // The write-through is async; wait for it to land.
        let key = format!("block:{}", hash.to_hex());
        for _ in 0..50 {
            if hot.get(&key).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hot.get(&key).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_get_miss_populates_cache() {
        let (inner, hot, store) = cached(0);
        let data = Bytes::from("populate me");
        let hash = inner.put(data.clone()).await.unwrap();

        let key = format!("block:{}", hash.to_hex());
        assert_eq!(hot.get(&key).await.unwrap(), None);

        assert_eq!(store.get(&hash).await.unwrap(), data);
        assert_eq!(hot.get(&key).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_get_served_from_cache_after_inner_delete() {
        let (inner, hot, store) = cached(0);
        let data = Bytes::from("hot copy");
        let hash = inner.put(data.clone()).await.unwrap();
        hot.set(&format!("block:{}", hash.to_hex()), data.clone(), None)
            .await
            .unwrap();

        // The cache answers even though the inner copy is gone; the cache
        // is advisory and may be stale relative to authoritative state.
        inner.delete(&hash).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_exists_cache_positive_and_fallthrough() {
        let (inner, hot, store) = cached(0);
        let data = Bytes::from("present");
        let hash = inner.put(data.clone()).await.unwrap();

        // Not cached yet: falls through to the inner store.
        assert!(store.exists(&hash).await.unwrap());

        // Cached-only key is also a positive.
        let other = BlockHash::compute(b"cache only");
        hot.set(&format!("block:{}", other.to_hex()), Bytes::from("x"), None)
            .await
            .unwrap();
        assert!(store.exists(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_propagates_inner_failure() {
        let (_inner, _hot, store) = cached(0);
        let hash = BlockHash::compute(b"never stored");
        assert!(matches!(
            store.delete(&hash).await,
            Err(StorageError::NotFound(_))
        ));
    }

    /// A hot store that fails every operation, for verifying swallowing.
    struct BrokenHotStore;

    #[async_trait]
    impl HotStore for BrokenHotStore {
        async fn set(&self, _: &str, _: Bytes, _: Option<Duration>) -> StorageResult<()> {
            Err(StorageError::Hot("down".to_string()))
        }
        async fn get(&self, _: &str) -> StorageResult<Option<Bytes>> {
            Err(StorageError::Hot("down".to_string()))
        }
        async fn delete(&self, _: &str) -> StorageResult<()> {
            Err(StorageError::Hot("down".to_string()))
        }
        async fn exists(&self, _: &str) -> StorageResult<bool> {
            Err(StorageError::Hot("down".to_string()))
        }
        async fn hash_set(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Option<Duration>,
        ) -> StorageResult<()> {
            Err(StorageError::Hot("down".to_string()))
        }
        async fn hash_get_all(&self, _: &str) -> StorageResult<HashMap<String, String>> {
            Err(StorageError::Hot("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_unreachable_cache_never_affects_correctness() {
        let inner = Arc::new(MemoryStore::new());
        let store = CachedStore::new(inner.clone(), Arc::new(BrokenHotStore), 60);

        let data = Bytes::from("survives cache outage");
        let hash = store.put(data.clone()).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), data);
        assert!(store.exists(&hash).await.unwrap());
        assert_eq!(store.size(&hash).await.unwrap(), data.len() as u64);
        store.delete(&hash).await.unwrap();
        assert!(!store.exists(&hash).await.unwrap());
    }
}
