//! File service facade.
//!
//! Single-shot upload, download, integrity probing, deletion, and change
//! detection, composed over the chunker, the block store, and the metadata
//! store. Blocks are shared between files by refcount; deleting a file only
//! decrements, collection is the garbage collector's job.

use crate::commit::file_commit_rows;
use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;
use crate::snapshot::SnapshotService;
use bytes::{Bytes, BytesMut};
use futures::future;
use sealock_core::{BlockHash, Chunker, FileHash, FileRecord};
use sealock_metadata::{FileRepo, MetadataStore};
use sealock_storage::BlockStore;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

/// Changes between two digest-keyed file sets.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    /// Files present only in the new set.
    pub added: Vec<FileRecord>,
    /// Files present only in the old set.
    pub removed: Vec<FileRecord>,
}

/// High-level file operations.
pub struct FileService {
    chunker: Chunker,
    storage: Arc<dyn BlockStore>,
    metadata: Arc<dyn MetadataStore>,
    snapshots: Arc<SnapshotService>,
    auto_snapshot: bool,
    retry: RetryPolicy,
}

impl FileService {
    /// Create the facade. With `auto_snapshot` set, successful uploads and
    /// deletions fire a background snapshot whose failure never affects the
    /// triggering operation.
    pub fn new(
        chunker: Chunker,
        storage: Arc<dyn BlockStore>,
        metadata: Arc<dyn MetadataStore>,
        snapshots: Arc<SnapshotService>,
        auto_snapshot: bool,
    ) -> Self {
        Self {
            chunker,
            storage,
            metadata,
            snapshots,
            auto_snapshot,
            retry: RetryPolicy::default(),
        }
    }

    /// Bound each block-store operation by a timeout.
    pub fn with_block_io_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.retry = self.retry.with_timeout(timeout);
        self
    }

    fn fire_auto_snapshot(&self, trigger: &'static str) {
        if !self.auto_snapshot {
            return;
        }
        let snapshots = self.snapshots.clone();
        tokio::spawn(async move {
            if let Err(e) = snapshots.create_snapshot("auto", trigger).await {
                warn!(trigger, error = %e, "auto snapshot failed");
            }
        });
    }

    /// Upload a file in one shot: chunk, store each block, commit the
    /// refcounts and the file row together.
    ///
    /// A zero-length file chunks to no blocks and commits a file row with
    /// an empty digest list.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload(&self, name: &str, data: Bytes) -> EngineResult<FileRecord> {
        let infos = self.chunker.chunk(&data);
        let puts = infos.iter().map(|info| {
            let start = info.offset as usize;
            let payload = data.slice(start..start + info.size as usize);
            let size = info.size;
            async move {
                let hash = self
                    .retry
                    .run("block put", || {
                        let storage = self.storage.clone();
                        let payload = payload.clone();
                        async move { storage.put(payload).await.map_err(EngineError::from) }
                    })
                    .await?;
                Ok::<_, EngineError>((hash, size))
            }
        });
        let blocks: Vec<(BlockHash, u64)> = future::try_join_all(puts).await?;

        let now = OffsetDateTime::now_utc();
        let (file_row, block_rows, content_hash) = file_commit_rows(name, &blocks, None, now);
        let file_id = self.metadata.commit_file(&file_row, &block_rows).await?;

        info!(file_id, hash = %content_hash, blocks = blocks.len(), "file uploaded");
        self.fire_auto_snapshot("upload");

        Ok(FileRecord {
            id: file_id,
            uuid: file_row.uuid,
            name: file_row.name,
            size: data.len() as u64,
            content_hash,
            block_hashes: blocks.into_iter().map(|(h, _)| h).collect(),
            library_id: None,
            created_at: now,
        })
    }

    /// Look up a file by content hash.
    pub async fn get_file(&self, file_hash: &FileHash) -> EngineResult<FileRecord> {
        let row = self
            .metadata
            .get_file_by_hash(&file_hash.to_hex())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("file {file_hash}")))?;
        Ok(row.to_record().map_err(EngineError::from)?)
    }

    /// List all files.
    pub async fn list_files(&self) -> EngineResult<Vec<FileRecord>> {
        let rows = self.metadata.list_files().await?;
        rows.iter()
            .map(|row| row.to_record().map_err(EngineError::from))
            .collect()
    }

    /// Reconstruct a file's bytes by reading its blocks in order.
    ///
    /// Every block is verified against its digest on the way out; a
    /// mismatch is corruption and is reported without deleting the block,
    /// leaving it in place for operator inspection.
    #[instrument(skip(self))]
    pub async fn download(&self, file_hash: &FileHash) -> EngineResult<Bytes> {
        let file = self.get_file(file_hash).await?;

        let mut out = BytesMut::with_capacity(file.size as usize);
        for hash in &file.block_hashes {
            let data = self
                .retry
                .run("block get", || {
                    let storage = self.storage.clone();
                    let hash = *hash;
                    async move { storage.get(&hash).await.map_err(EngineError::from) }
                })
                .await?;

            let actual = BlockHash::compute(&data);
            if actual != *hash {
                error!(
                    expected = %hash,
                    actual = %actual,
                    file = %file_hash,
                    "stored block corrupt, quarantined for inspection"
                );
                return Err(EngineError::Fatal(format!(
                    "block {hash} of file {file_hash} is corrupt"
                )));
            }
            out.extend_from_slice(&data);
        }

        Ok(out.freeze())
    }

    /// True iff every block referenced by the file exists in the store.
    pub async fn integrity(&self, file_hash: &FileHash) -> EngineResult<bool> {
        let file = self.get_file(file_hash).await?;
        for hash in &file.block_hashes {
            if !self.storage.exists(hash).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete a file: decrement every referenced block (with multiplicity)
    /// and remove the row, all in one transaction. Blocks themselves stay
    /// until GC collects them.
    #[instrument(skip(self))]
    pub async fn delete(&self, file_hash: &FileHash) -> EngineResult<()> {
        let row = self
            .metadata
            .get_file_by_hash(&file_hash.to_hex())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("file {file_hash}")))?;

        self.metadata.delete_file(&row).await?;
        info!(file = %file_hash, "file deleted");
        self.fire_auto_snapshot("delete");
        Ok(())
    }

    /// Pure set difference over digest-keyed file maps. Content addressing
    /// makes equality a hash lookup: an identical digest is an identical
    /// file.
    pub fn detect_changes(
        old: &HashMap<String, FileRecord>,
        new: &HashMap<String, FileRecord>,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for (hash, file) in new {
            if !old.contains_key(hash) {
                changes.added.push(file.clone());
            }
        }
        for (hash, file) in old {
            if !new.contains_key(hash) {
                changes.removed.push(file.clone());
            }
        }
        changes
    }
}
