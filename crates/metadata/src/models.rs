//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use sealock_core::{BlockHash, FileHash, FileRecord};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Block record with its reference count.
#[derive(Debug, Clone, FromRow)]
pub struct BlockRow {
    pub block_hash: String,
    pub size_bytes: i64,
    pub refcount: i64,
    pub created_at: OffsetDateTime,
}

impl BlockRow {
    /// A fresh row for one occurrence of a block in a file: refcount 1,
    /// added to any existing count on upsert.
    pub fn occurrence(hash: &BlockHash, size: u64, now: OffsetDateTime) -> Self {
        Self {
            block_hash: hash.to_hex(),
            size_bytes: size as i64,
            refcount: 1,
            created_at: now,
        }
    }
}

/// File record. `block_hashes` holds the ordered digest list as JSON.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub block_hashes: String,
    pub library_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FileRow {
    /// Decode the ordered block-hash list.
    pub fn block_hash_list(&self) -> MetadataResult<Vec<String>> {
        serde_json::from_str(&self.block_hashes)
            .map_err(|e| MetadataError::Invalid(format!("block_hashes: {e}")))
    }

    /// Convert into the core domain record.
    pub fn to_record(&self) -> MetadataResult<FileRecord> {
        let block_hashes = self
            .block_hash_list()?
            .iter()
            .map(|h| BlockHash::from_hex(h))
            .collect::<sealock_core::Result<Vec<_>>>()
            .map_err(|e| MetadataError::Invalid(e.to_string()))?;
        let content_hash = FileHash::from_hex(&self.content_hash)
            .map_err(|e| MetadataError::Invalid(e.to_string()))?;
        Ok(FileRecord {
            id: self.id,
            uuid: self.uuid,
            name: self.name.clone(),
            size: self.size_bytes as u64,
            content_hash,
            block_hashes,
            library_id: self.library_id,
            created_at: self.created_at,
        })
    }
}

/// Library record: the top-level container with its version head and stats.
#[derive(Debug, Clone, FromRow)]
pub struct LibraryRow {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub current_commit: Option<String>,
    pub total_size: i64,
    pub file_count: i64,
    pub version_count: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Version (commit) record. `parents` holds the ordered parent-commit
/// digest list as JSON: empty for the first commit, one entry for a
/// fast-forward, two or more for merges.
#[derive(Debug, Clone, FromRow)]
pub struct VersionRow {
    pub commit_hash: String,
    pub library_id: i64,
    pub root_tree_hash: String,
    pub message: String,
    pub author: String,
    pub parents: String,
    pub created_at: OffsetDateTime,
}

impl VersionRow {
    /// Decode the parent-commit digest list.
    pub fn parent_list(&self) -> MetadataResult<Vec<String>> {
        serde_json::from_str(&self.parents)
            .map_err(|e| MetadataError::Invalid(format!("parents: {e}")))
    }
}

/// Snapshot record: a materialized name→digest view with its Merkle root.
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub parent_id: Option<i64>,
    pub root_hash: String,
    pub file_count: i64,
    pub size_bytes: i64,
    pub created_at: OffsetDateTime,
}

/// One file within a snapshot manifest.
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotFileRow {
    pub snapshot_id: i64,
    pub file_id: i64,
    pub file_name: String,
    pub file_hash: String,
    pub status: String,
}
