//! File records and the digest-list combiner.

use crate::chunk::BlockHash;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// A file content hash: SHA-256 over the concatenated lowercase hex strings
/// of the file's ordered block hashes. An empty block list hashes to the
/// digest of the empty string, so the combiner is total.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHash(ContentHash);

impl FileHash {
    /// Compute the file hash from ordered block hashes.
    pub fn compute(block_hashes: &[BlockHash]) -> Self {
        let mut hasher = Sha256::new();
        for hash in block_hashes {
            hasher.update(hash.to_hex().as_bytes());
        }
        Self(ContentHash::from_bytes(hasher.finalize().into()))
    }

    /// Compute the file hash from hex-encoded block hashes.
    ///
    /// Used on the upload path where the client submits hex digests; the
    /// strings are validated and combined without re-encoding.
    pub fn compute_from_hex(block_hashes: &[String]) -> crate::Result<Self> {
        let mut hasher = Sha256::new();
        for hex in block_hashes {
            // Validates format; the digest input is the hex string itself.
            ContentHash::from_hex(hex)?;
            hasher.update(hex.as_bytes());
        }
        Ok(Self(ContentHash::from_bytes(hasher.finalize().into())))
    }

    /// Get the underlying content hash.
    pub fn content_hash(&self) -> &ContentHash {
        &self.0
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(ContentHash::from_hex(s)?))
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Debug for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A stored file: a named, ordered list of blocks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    /// Database identity.
    pub id: i64,
    /// Stable unique identifier.
    pub uuid: Uuid,
    /// File name.
    pub name: String,
    /// Total size in bytes (sum of block sizes).
    pub size: u64,
    /// Content hash over the ordered block-hash list.
    pub content_hash: FileHash,
    /// Ordered block hashes, possibly with repeats.
    pub block_hashes: Vec<BlockHash>,
    /// Owning library, if any.
    pub library_id: Option<i64>,
    /// When the file row was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FileRecord {
    /// Number of blocks (counted with multiplicity).
    pub fn block_count(&self) -> usize {
        self.block_hashes.len()
    }

    /// Verify the stored content hash against the block list.
    pub fn verify_content_hash(&self) -> crate::Result<()> {
        let computed = FileHash::compute(&self.block_hashes);
        if computed != self.content_hash {
            return Err(crate::Error::HashMismatch {
                expected: self.content_hash.to_hex(),
                actual: computed.to_hex(),
            });
        }
        Ok(())
    }
}
