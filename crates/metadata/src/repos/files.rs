//! File repository.

use crate::error::MetadataResult;
use crate::models::{BlockRow, FileRow};
use async_trait::async_trait;

/// Repository for file rows.
///
/// A file row and the reference counts of its blocks move together:
/// `commit_file` and `delete_file` are each one transaction, so a crash
/// never leaves a visible file row without its refcounts or refcounts
/// without their row.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Atomically upsert the given block rows (adding each row's refcount)
    /// and insert the file row. `blocks` carries one entry per occurrence
    /// in the file's digest list, so repeats count with multiplicity.
    /// Returns the assigned file id.
    async fn commit_file(&self, file: &FileRow, blocks: &[BlockRow]) -> MetadataResult<i64>;

    /// Get the most recently created file with the given content hash.
    /// The digest is a lookup index, not unique: identical content may be
    /// stored under several names.
    async fn get_file_by_hash(&self, content_hash: &str) -> MetadataResult<Option<FileRow>>;

    /// Get a file by its UUID.
    async fn get_file_by_uuid(&self, uuid: uuid::Uuid) -> MetadataResult<Option<FileRow>>;

    /// Atomically decrement the refcount of every block in the file's
    /// digest list (with multiplicity, clamped at zero) and remove the row.
    async fn delete_file(&self, file: &FileRow) -> MetadataResult<()>;

    /// List all files, oldest first.
    async fn list_files(&self) -> MetadataResult<Vec<FileRow>>;

    /// Count file rows.
    async fn count_files(&self) -> MetadataResult<u64>;
}
