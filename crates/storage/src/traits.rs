//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use sealock_core::BlockHash;

/// Content-addressed block store.
///
/// Blocks are opaque byte payloads addressed by the SHA-256 of their
/// contents. `put` is idempotent by construction: concurrent writers of the
/// same payload produce identical bytes under the same key, so duplicate
/// writes are harmless. Reference counting is not this trait's concern.
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    /// Store a payload and return its hash. Empty payloads are rejected.
    async fn put(&self, data: Bytes) -> StorageResult<BlockHash>;

    /// Fetch a block's payload. The caller receives a private copy.
    async fn get(&self, hash: &BlockHash) -> StorageResult<Bytes>;

    /// Check whether a block exists.
    async fn exists(&self, hash: &BlockHash) -> StorageResult<bool>;

    /// Remove a block unconditionally.
    async fn delete(&self, hash: &BlockHash) -> StorageResult<()>;

    /// Get a block's size without fetching its payload.
    async fn size(&self, hash: &BlockHash) -> StorageResult<u64>;

    /// Static identifier for the backend type, for logging.
    fn backend_name(&self) -> &'static str;
}
