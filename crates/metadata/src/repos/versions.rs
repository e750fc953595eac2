//! Version (commit) repository.

use crate::error::MetadataResult;
use crate::models::VersionRow;
use async_trait::async_trait;

/// Repository for version commits. Commits form a DAG linked by digest
/// reference only; rows never embed their parents.
#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Create a version commit.
    async fn create_version(&self, version: &VersionRow) -> MetadataResult<()>;

    /// Get a version by commit hash.
    async fn get_version(&self, commit_hash: &str) -> MetadataResult<Option<VersionRow>>;

    /// List a library's versions, newest first.
    async fn list_versions(&self, library_id: i64) -> MetadataResult<Vec<VersionRow>>;

    /// Get a library's most recent version.
    async fn latest_version(&self, library_id: i64) -> MetadataResult<Option<VersionRow>>;
}
