//! Block repository.

use crate::error::MetadataResult;
use crate::models::BlockRow;
use async_trait::async_trait;

/// Repository for block metadata and reference counts.
#[async_trait]
pub trait BlockRepo: Send + Sync {
    /// Create or update a block record. Writing a digest that already
    /// exists adds the row's refcount to the stored count rather than
    /// erroring.
    async fn upsert_block(&self, block: &BlockRow) -> MetadataResult<()>;

    /// Get a block by hash.
    async fn get_block(&self, block_hash: &str) -> MetadataResult<Option<BlockRow>>;

    /// Check if a block record exists.
    async fn block_exists(&self, block_hash: &str) -> MetadataResult<bool>;

    /// Increment a block's reference count (single atomic UPDATE).
    async fn increment_refcount(&self, block_hash: &str) -> MetadataResult<()>;

    /// Decrement a block's reference count, clamping at zero.
    async fn decrement_refcount(&self, block_hash: &str) -> MetadataResult<()>;

    /// Get blocks with zero refcount, oldest first.
    async fn list_orphan_blocks(&self, limit: u32) -> MetadataResult<Vec<BlockRow>>;

    /// Delete a block row only while its refcount is still zero; the check
    /// and the delete are one statement. Returns whether the row was
    /// removed, so a racing refcount increment loses nothing.
    async fn delete_orphan_block(&self, block_hash: &str) -> MetadataResult<bool>;

    /// Get aggregate block statistics.
    async fn block_stats(&self) -> MetadataResult<BlockStats>;
}

/// Aggregate block statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Total number of block rows.
    pub count: u64,
    /// Total size in bytes.
    pub total_size: u64,
    /// Sum of all reference counts.
    pub total_refcount: u64,
    /// Number of rows with refcount zero.
    pub orphan_count: u64,
}
