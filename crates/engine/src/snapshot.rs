//! Snapshots and version commits.
//!
//! A snapshot is an immutable manifest of (name → file digest) with the
//! Merkle root of the flat directory view. A version is a commit-DAG node
//! over such a root, linked to its parents by digest reference only.

use crate::error::{EngineError, EngineResult};
use sealock_core::hash::ContentHash;
use sealock_core::merkle::{self, DirectoryEntry, TreeDiff};
use sealock_metadata::models::{FileRow, SnapshotFileRow, SnapshotRow, VersionRow};
use sealock_metadata::{FileRepo, LibraryRepo, MetadataStore, SnapshotRepo, VersionRepo};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// Compute a commit digest from its defining fields.
///
/// The digest is a pure function of (root tree digest, message, author,
/// ordered parents, creation time); two commits agreeing on all five are
/// the same commit.
pub fn commit_hash(
    root_tree_hash: &str,
    message: &str,
    author: &str,
    parents: &[String],
    created_at: OffsetDateTime,
) -> EngineResult<String> {
    let timestamp = created_at
        .format(&Rfc3339)
        .map_err(|e| EngineError::Fatal(format!("timestamp format: {e}")))?;
    let mut hasher = ContentHash::hasher();
    hasher.update(root_tree_hash.as_bytes());
    hasher.update(message.as_bytes());
    hasher.update(author.as_bytes());
    for parent in parents {
        hasher.update(parent.as_bytes());
    }
    hasher.update(timestamp.as_bytes());
    Ok(hasher.finalize().to_hex())
}

/// Snapshot and version-control operations.
pub struct SnapshotService {
    metadata: Arc<dyn MetadataStore>,
}

impl SnapshotService {
    /// Create the service.
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    fn entries_from_files(files: &[FileRow]) -> EngineResult<Vec<DirectoryEntry>> {
        files
            .iter()
            .map(|file| {
                let hash = ContentHash::from_hex(&file.content_hash)
                    .map_err(|e| EngineError::Fatal(format!("file row digest: {e}")))?;
                Ok(DirectoryEntry::file(
                    file.name.clone(),
                    hash,
                    file.size_bytes as u64,
                ))
            })
            .collect()
    }

    fn entries_from_manifest(manifest: &[SnapshotFileRow]) -> EngineResult<Vec<DirectoryEntry>> {
        manifest
            .iter()
            .map(|file| {
                let hash = ContentHash::from_hex(&file.file_hash)
                    .map_err(|e| EngineError::Fatal(format!("manifest digest: {e}")))?;
                Ok(DirectoryEntry::file(file.file_name.clone(), hash, 0))
            })
            .collect()
    }

    /// Materialize the current library state as a snapshot.
    #[instrument(skip(self))]
    pub async fn create_snapshot(
        &self,
        name: &str,
        description: &str,
    ) -> EngineResult<SnapshotRow> {
        let files = self.metadata.list_files().await?;
        let entries = Self::entries_from_files(&files)?;
        let root = merkle::tree_root(&entries);

        let parent_id = self
            .metadata
            .list_snapshots(1, 0)
            .await?
            .first()
            .map(|s| s.id);

        let now = OffsetDateTime::now_utc();
        let snapshot = SnapshotRow {
            id: 0,
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            parent_id,
            root_hash: root.to_hex(),
            file_count: files.len() as i64,
            size_bytes: files.iter().map(|f| f.size_bytes).sum(),
            created_at: now,
        };
        let manifest: Vec<SnapshotFileRow> = files
            .iter()
            .map(|file| SnapshotFileRow {
                snapshot_id: 0,
                file_id: file.id,
                file_name: file.name.clone(),
                file_hash: file.content_hash.clone(),
                status: "active".to_string(),
            })
            .collect();

        let id = self.metadata.create_snapshot(&snapshot, &manifest).await?;
        info!(snapshot_id = id, root = %snapshot.root_hash, files = files.len(), "snapshot created");
        Ok(SnapshotRow { id, ..snapshot })
    }

    /// Get a snapshot by id.
    pub async fn get_snapshot(&self, id: i64) -> EngineResult<SnapshotRow> {
        self.metadata
            .get_snapshot(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("snapshot {id}")))
    }

    /// List snapshots, newest first.
    pub async fn list_snapshots(&self, limit: u32, offset: u32) -> EngineResult<Vec<SnapshotRow>> {
        Ok(self.metadata.list_snapshots(limit, offset).await?)
    }

    /// Diff two snapshots via their Merkle roots and manifests.
    #[instrument(skip(self))]
    pub async fn compare_snapshots(&self, old_id: i64, new_id: i64) -> EngineResult<TreeDiff> {
        let old = self.get_snapshot(old_id).await?;
        let new = self.get_snapshot(new_id).await?;

        let old_root = ContentHash::from_hex(&old.root_hash)
            .map_err(|e| EngineError::Fatal(format!("snapshot root: {e}")))?;
        let new_root = ContentHash::from_hex(&new.root_hash)
            .map_err(|e| EngineError::Fatal(format!("snapshot root: {e}")))?;
        if old_root == new_root {
            return Ok(TreeDiff::default());
        }

        let old_entries =
            Self::entries_from_manifest(&self.metadata.list_snapshot_files(old_id).await?)?;
        let new_entries =
            Self::entries_from_manifest(&self.metadata.list_snapshot_files(new_id).await?)?;
        Ok(merkle::diff(old_root, new_root, &old_entries, &new_entries))
    }

    /// Commit the current library state as a new version.
    ///
    /// Recomputes the Merkle root over the library's files; when it equals
    /// the head commit's root nothing changed and the commit is refused.
    /// The new commit's parent list is the previous head (empty for the
    /// first commit).
    #[instrument(skip(self, message))]
    pub async fn commit_version(
        &self,
        library_id: i64,
        message: &str,
        author: &str,
    ) -> EngineResult<VersionRow> {
        let library = self
            .metadata
            .get_library(library_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("library {library_id}")))?;

        let files = self.metadata.list_files().await?;
        let entries = Self::entries_from_files(&files)?;
        let root = merkle::tree_root(&entries).to_hex();

        let latest = self.metadata.latest_version(library_id).await?;
        if let Some(ref head) = latest {
            if head.root_tree_hash == root {
                return Err(EngineError::Conflict(
                    "no changes since the last commit".to_string(),
                ));
            }
        }
        let parents: Vec<String> = latest.iter().map(|v| v.commit_hash.clone()).collect();

        let now = OffsetDateTime::now_utc();
        let version = VersionRow {
            commit_hash: commit_hash(&root, message, author, &parents, now)?,
            library_id,
            root_tree_hash: root,
            message: message.to_string(),
            author: author.to_string(),
            parents: serde_json::to_string(&parents)
                .map_err(|e| EngineError::Fatal(format!("parents encode: {e}")))?,
            created_at: now,
        };

        self.metadata.create_version(&version).await?;
        self.metadata
            .set_library_head(library_id, &version.commit_hash, now)
            .await?;
        self.metadata
            .update_library_stats(
                library_id,
                files.iter().map(|f| f.size_bytes as u64).sum(),
                files.len() as u64,
                now,
            )
            .await?;

        info!(
            library = library.id,
            commit = %version.commit_hash,
            parents = parents.len(),
            "version committed"
        );
        Ok(version)
    }

    /// A library's commit history, newest first.
    pub async fn history(&self, library_id: i64) -> EngineResult<Vec<VersionRow>> {
        if self.metadata.get_library(library_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("library {library_id}")));
        }
        Ok(self.metadata.list_versions(library_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_hash_is_pure() {
        let now = OffsetDateTime::now_utc();
        let parents = vec!["p".repeat(64)];
        let a = commit_hash("root", "msg", "me", &parents, now).unwrap();
        let b = commit_hash("root", "msg", "me", &parents, now).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_commit_hash_sensitive_to_fields() {
        let now = OffsetDateTime::now_utc();
        let base = commit_hash("root", "msg", "me", &[], now).unwrap();
        assert_ne!(commit_hash("root2", "msg", "me", &[], now).unwrap(), base);
        assert_ne!(commit_hash("root", "msg2", "me", &[], now).unwrap(), base);
        assert_ne!(commit_hash("root", "msg", "you", &[], now).unwrap(), base);
        assert_ne!(
            commit_hash("root", "msg", "me", &["p".to_string()], now).unwrap(),
            base
        );
        assert_ne!(
            commit_hash("root", "msg", "me", &[], now + time::Duration::seconds(1)).unwrap(),
            base
        );
    }
}
