//! Block storage abstraction and backends for Sealock.
//!
//! This crate provides:
//! - Content-addressed block storage with atomic writes
//! - Backends: local filesystem and in-memory
//! - A hot-data store abstraction (Redis or in-memory) with TTL semantics
//! - A write-through cache decorator over any block store

pub mod backends;
pub mod cache;
pub mod error;
pub mod hot;
pub mod traits;

pub use backends::{FilesystemStore, MemoryStore};
pub use cache::CachedStore;
pub use error::{StorageError, StorageResult};
pub use hot::{HotStore, MemoryHotStore, RedisHotStore};
pub use traits::BlockStore;

use sealock_core::config::StorageConfig;
use std::sync::Arc;

/// Create a block store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlockStore>> {
    match config {
        StorageConfig::Local { path } => {
            let backend = FilesystemStore::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::LocalCached { path, cache } => {
            let backend: Arc<dyn BlockStore> = Arc::new(FilesystemStore::new(path).await?);
            let hot: Arc<dyn HotStore> = Arc::new(RedisHotStore::connect(&cache.address).await?);
            Ok(Arc::new(CachedStore::new(backend, hot, cache.ttl_secs)))
        }
    }
}

/// Create a hot store from configuration, when the storage type carries one.
pub async fn hot_store_from_config(
    config: &StorageConfig,
) -> StorageResult<Option<Arc<dyn HotStore>>> {
    match config {
        StorageConfig::Local { .. } => Ok(None),
        StorageConfig::LocalCached { cache, .. } => {
            let hot = RedisHotStore::connect(&cache.address).await?;
            Ok(Some(Arc::new(hot)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_local_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Local {
            path: temp.path().join("blocks"),
        };

        let store = from_config(&config).await.unwrap();
        let hash = store.put(Bytes::from_static(b"hi")).await.unwrap();
        assert!(store.exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn hot_store_absent_for_plain_local() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Local {
            path: temp.path().to_path_buf(),
        };
        assert!(hot_store_from_config(&config).await.unwrap().is_none());
    }
}
