//! Core domain types and shared logic for the Sealock storage engine.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes and the digest-list combiner
//! - Block types and chunkers (fixed-size and content-defined)
//! - File records and their Merkle content digests
//! - Directory-tree hashing and diffing
//! - Upload session lifecycle
//! - Configuration types

pub mod chunk;
pub mod config;
pub mod error;
pub mod file;
pub mod hash;
pub mod merkle;
pub mod upload;

pub use chunk::{Block, BlockHash, BlockInfo, CdcChunker, Chunker, FixedChunker};
pub use error::{Error, Result};
pub use file::{FileHash, FileRecord};
pub use hash::{ContentHash, ContentHasher};
pub use merkle::{DirectoryEntry, TreeDiff};
pub use upload::{SessionId, SessionRecord, SessionState};

/// Default fixed block size: 8 KiB
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;

/// Default CDC minimum block size: 2 KiB
pub const DEFAULT_CDC_MIN: usize = 2 * 1024;

/// Default CDC average block size: 8 KiB
pub const DEFAULT_CDC_AVG: usize = 8 * 1024;

/// Default CDC maximum block size: 64 KiB
pub const DEFAULT_CDC_MAX: usize = 64 * 1024;

/// Default upload session TTL: 24 hours
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

/// Default hot-block cache TTL: 24 hours
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;
