//! In-memory block store, for tests and development rigs.

use crate::error::{StorageError, StorageResult};
use crate::traits::BlockStore;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sealock_core::BlockHash;
use std::collections::HashMap;

/// In-memory block store backed by a hash map.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<BlockHash, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Total stored bytes.
    pub fn total_size(&self) -> u64 {
        self.blocks.read().values().map(|d| d.len() as u64).sum()
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn put(&self, data: Bytes) -> StorageResult<BlockHash> {
        if data.is_empty() {
            return Err(StorageError::InvalidInput("empty payload".to_string()));
        }
        let hash = BlockHash::compute(&data);
        self.blocks.write().entry(hash).or_insert(data);
        Ok(hash)
    }

    async fn get(&self, hash: &BlockHash) -> StorageResult<Bytes> {
        self.blocks
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(hash.to_hex()))
    }

    async fn exists(&self, hash: &BlockHash) -> StorageResult<bool> {
        Ok(self.blocks.read().contains_key(hash))
    }

    async fn delete(&self, hash: &BlockHash) -> StorageResult<()> {
        self.blocks
            .write()
            .remove(hash)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(hash.to_hex()))
    }

    async fn size(&self, hash: &BlockHash) -> StorageResult<u64> {
        self.blocks
            .read()
            .get(hash)
            .map(|d| d.len() as u64)
            .ok_or_else(|| StorageError::NotFound(hash.to_hex()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
