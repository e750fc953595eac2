//! Library repository.

use crate::error::MetadataResult;
use crate::models::LibraryRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for libraries.
#[async_trait]
pub trait LibraryRepo: Send + Sync {
    /// Create a library; returns the assigned id.
    async fn create_library(&self, library: &LibraryRow) -> MetadataResult<i64>;

    /// Get a library by id.
    async fn get_library(&self, id: i64) -> MetadataResult<Option<LibraryRow>>;

    /// Get a library by UUID.
    async fn get_library_by_uuid(&self, uuid: uuid::Uuid) -> MetadataResult<Option<LibraryRow>>;

    /// List all libraries.
    async fn list_libraries(&self) -> MetadataResult<Vec<LibraryRow>>;

    /// Advance the library head to a new commit and bump its version count.
    async fn set_library_head(
        &self,
        id: i64,
        commit_hash: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Refresh a library's aggregate file statistics.
    async fn update_library_stats(
        &self,
        id: i64,
        total_size: u64,
        file_count: u64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a library.
    async fn delete_library(&self, id: i64) -> MetadataResult<()>;
}
