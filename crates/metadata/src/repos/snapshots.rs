//! Snapshot repository.

use crate::error::MetadataResult;
use crate::models::{SnapshotFileRow, SnapshotRow};
use async_trait::async_trait;

/// Repository for snapshot manifests.
#[async_trait]
pub trait SnapshotRepo: Send + Sync {
    /// Atomically create a snapshot row and its file manifest.
    /// Returns the assigned snapshot id.
    async fn create_snapshot(
        &self,
        snapshot: &SnapshotRow,
        files: &[SnapshotFileRow],
    ) -> MetadataResult<i64>;

    /// Get a snapshot by id.
    async fn get_snapshot(&self, id: i64) -> MetadataResult<Option<SnapshotRow>>;

    /// Get a snapshot by UUID.
    async fn get_snapshot_by_uuid(&self, uuid: uuid::Uuid) -> MetadataResult<Option<SnapshotRow>>;

    /// List snapshots, newest first.
    async fn list_snapshots(&self, limit: u32, offset: u32) -> MetadataResult<Vec<SnapshotRow>>;

    /// List the files captured in a snapshot, ordered by name.
    async fn list_snapshot_files(&self, snapshot_id: i64) -> MetadataResult<Vec<SnapshotFileRow>>;
}
