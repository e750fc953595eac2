//! Local filesystem block store.

use crate::error::{StorageError, StorageResult};
use crate::traits::BlockStore;
use async_trait::async_trait;
use bytes::Bytes;
use sealock_core::BlockHash;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem block store.
///
/// Blocks live under `<root>/blocks/aa/bb/<hex>` where `aa`/`bb` are the
/// first two hex byte pairs, keeping directory fan-out bounded. Keys are
/// derived from validated digests, never from caller-supplied strings.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Create a new filesystem store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn block_path(&self, hash: &BlockHash) -> PathBuf {
        self.root.join(hash.to_object_key())
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlockStore for FilesystemStore {
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, data: Bytes) -> StorageResult<BlockHash> {
        if data.is_empty() {
            return Err(StorageError::InvalidInput("empty payload".to_string()));
        }

        let hash = BlockHash::compute(&data);
        let path = self.block_path(&hash);

        // Content-addressed: an existing file already holds these bytes.
        if fs::try_exists(&path).await.map_err(StorageError::Io)? {
            return Ok(hash);
        }

        self.ensure_parent(&path).await?;

        // Write to a uniquely named temp file, fsync, then rename so that
        // concurrent duplicate writers never expose a partial block.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        Ok(hash)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, hash: &BlockHash) -> StorageResult<Bytes> {
        let path = self.block_path(hash);
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(hash.to_hex())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, hash: &BlockHash) -> StorageResult<bool> {
        let path = self.block_path(hash);
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, hash: &BlockHash) -> StorageResult<()> {
        let path = self.block_path(hash);
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(hash.to_hex())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn size(&self, hash: &BlockHash) -> StorageResult<u64> {
        let path = self.block_path(hash);
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(hash.to_hex())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(metadata.len())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
