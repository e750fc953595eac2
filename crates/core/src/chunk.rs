//! Block types and chunkers.
//!
//! A chunker splits a byte stream into an ordered sequence of blocks whose
//! concatenation reproduces the input exactly. Two strategies are provided:
//! fixed-size splitting and content-defined chunking with a gear rolling
//! hash, where boundaries depend on the bytes themselves so that an edit in
//! the middle of a file only disturbs neighbouring blocks.

use crate::config::ChunkerConfig;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A block hash (SHA-256 of block contents).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHash(ContentHash);

impl BlockHash {
    /// Create from a ContentHash.
    pub fn from_content_hash(hash: ContentHash) -> Self {
        Self(hash)
    }

    /// Compute the hash of block data.
    pub fn compute(data: &[u8]) -> Self {
        Self(ContentHash::compute(data))
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

    /// Get the sharded object key for this block.
    pub fn to_object_key(&self) -> String {
        let hex = self.to_hex();
        format!("blocks/{}/{}/{}", &hex[..2], &hex[2..4], hex)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Metadata about a block within a chunked stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// The block hash.
    pub hash: BlockHash,
    /// Byte offset of the block in the source stream.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

impl BlockInfo {
    /// Create new block info.
    pub fn new(hash: BlockHash, offset: u64, size: u64) -> Self {
        Self { hash, offset, size }
    }
}

/// A block with its data.
#[derive(Clone)]
pub struct Block {
    /// The block hash (computed from data).
    pub hash: BlockHash,
    /// The block data.
    pub data: bytes::Bytes,
}

impl Block {
    /// Create a new block from data, computing the hash.
    pub fn new(data: bytes::Bytes) -> Self {
        let hash = BlockHash::compute(&data);
        Self { hash, data }
    }

    /// Verify that the data matches the expected hash.
    pub fn verify(&self, expected: &BlockHash) -> crate::Result<()> {
        if &self.hash != expected {
            return Err(crate::Error::HashMismatch {
                expected: expected.to_hex(),
                actual: self.hash.to_hex(),
            });
        }
        Ok(())
    }

    /// Get the block size.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("hash", &self.hash)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Fixed-size chunker.
///
/// Emits blocks of exactly `block_size` bytes except the last, which may be
/// shorter. Simple and fast, but sensitive to insertions: an edit shifts
/// every subsequent boundary.
#[derive(Clone, Debug)]
pub struct FixedChunker {
    block_size: usize,
}

impl FixedChunker {
    /// Create a fixed-size chunker. `block_size` must be non-zero.
    pub fn new(block_size: usize) -> crate::Result<Self> {
        if block_size == 0 {
            return Err(crate::Error::InvalidChunker(
                "block size must be non-zero".to_string(),
            ));
        }
        Ok(Self { block_size })
    }

    /// The configured block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Split data into fixed-size blocks.
    pub fn chunk(&self, data: &[u8]) -> Vec<BlockInfo> {
        let mut blocks = Vec::with_capacity(data.len().div_ceil(self.block_size.max(1)));
        let mut offset = 0usize;
        for piece in data.chunks(self.block_size) {
            blocks.push(BlockInfo::new(
                BlockHash::compute(piece),
                offset as u64,
                piece.len() as u64,
            ));
            offset += piece.len();
        }
        blocks
    }
}

impl Default for FixedChunker {
    fn default() -> Self {
        Self {
            block_size: crate::DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Gear table for the CDC rolling hash, derived deterministically with
/// splitmix64 so that boundaries are stable across runs and builds.
fn gear_table() -> &'static [u64; 256] {
    static TABLE: OnceLock<[u64; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut table = [0u64; 256];
        for slot in table.iter_mut() {
            state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            *slot = z ^ (z >> 31);
        }
        table
    })
}

/// Content-defined chunker using a gear rolling hash.
///
/// The rolling state is `state = (state << 1) + GEAR[byte]`. A boundary is
/// declared once at least `min` bytes have accumulated and the low
/// `log2(avg)` bits of the state are zero; a cut is forced at `max`. Every
/// emitted block length lies in `[min, max]` except possibly the final
/// remainder, which may be shorter than `min`.
#[derive(Clone, Debug)]
pub struct CdcChunker {
    min: usize,
    avg: usize,
    max: usize,
    mask: u64,
}

impl CdcChunker {
    /// Create a CDC chunker. Requires `0 < min < avg < max`.
    pub fn new(min: usize, avg: usize, max: usize) -> crate::Result<Self> {
        if min == 0 || min >= avg || avg >= max {
            return Err(crate::Error::InvalidChunker(format!(
                "require 0 < min < avg < max, got min={min} avg={avg} max={max}"
            )));
        }
        let mask = (avg.next_power_of_two() as u64) - 1;
        Ok(Self {
            min,
            avg,
            max,
            mask,
        })
    }

    /// The expected (average) block size.
    pub fn avg(&self) -> usize {
        self.avg
    }

    /// Find the end of the block starting at `data[0]`.
    fn cut_point(&self, data: &[u8]) -> usize {
        if data.len() <= self.min {
            return data.len();
        }
        let limit = data.len().min(self.max);
        let table = gear_table();

        let mut state: u64 = 0;
        // Warm the rolling state over the minimum window so the boundary
        // test always sees `min` bytes of context.
        for &byte in &data[..self.min] {
            state = (state << 1).wrapping_add(table[byte as usize]);
        }
        for (pos, &byte) in data[self.min..limit].iter().enumerate() {
            state = (state << 1).wrapping_add(table[byte as usize]);
            if state & self.mask == 0 {
                return self.min + pos + 1;
            }
        }
        limit
    }

    /// Split data into content-defined blocks.
    pub fn chunk(&self, data: &[u8]) -> Vec<BlockInfo> {
        let mut blocks = Vec::new();
        let mut offset = 0usize;
        while offset < data.len() {
            let len = self.cut_point(&data[offset..]);
            blocks.push(BlockInfo::new(
                BlockHash::compute(&data[offset..offset + len]),
                offset as u64,
                len as u64,
            ));
            offset += len;
        }
        blocks
    }
}

impl Default for CdcChunker {
    fn default() -> Self {
        Self {
            min: crate::DEFAULT_CDC_MIN,
            avg: crate::DEFAULT_CDC_AVG,
            max: crate::DEFAULT_CDC_MAX,
            mask: (crate::DEFAULT_CDC_AVG.next_power_of_two() as u64) - 1,
        }
    }
}

/// A chunking strategy selected by configuration.
#[derive(Clone, Debug)]
pub enum Chunker {
    /// Fixed-size blocks.
    Fixed(FixedChunker),
    /// Content-defined blocks.
    Cdc(CdcChunker),
}

impl Chunker {
    /// Build a chunker from configuration.
    pub fn from_config(config: &ChunkerConfig) -> crate::Result<Self> {
        match config {
            ChunkerConfig::Fixed { size } => Ok(Self::Fixed(FixedChunker::new(*size)?)),
            ChunkerConfig::Cdc { min, avg, max } => Ok(Self::Cdc(CdcChunker::new(*min, *avg, *max)?)),
        }
    }

    /// Split data into blocks.
    pub fn chunk(&self, data: &[u8]) -> Vec<BlockInfo> {
        match self {
            Self::Fixed(c) => c.chunk(data),
            Self::Cdc(c) => c.chunk(data),
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::Fixed(FixedChunker::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        let mut state = seed;
        for byte in data.iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            *byte = (state >> 33) as u8;
        }
        data
    }

    fn reassemble(data: &[u8], blocks: &[BlockInfo]) -> Vec<u8> {
        let mut out = Vec::new();
        for b in blocks {
            let start = b.offset as usize;
            out.extend_from_slice(&data[start..start + b.size as usize]);
        }
        out
    }

    #[test]
    fn test_block_hash_object_key() {
        let hash = BlockHash::compute(b"test");
        let key = hash.to_object_key();
        let parts: Vec<_> = key.split('/').collect();
        assert_eq!(parts[0], "blocks");
        assert_eq!(parts[1].len(), 2);
        assert_eq!(parts[2].len(), 2);
        assert_eq!(parts[3].len(), 64);
    }

    #[test]
    fn test_fixed_chunker_splitting() {
        let data = vec![0u8; 100];
        let chunker = FixedChunker::new(30).unwrap();
        let blocks = chunker.chunk(&data);
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].size, 30);
        assert_eq!(blocks[3].size, 10); // Last block is smaller
        assert_eq!(blocks[3].offset, 90);
    }

    #[test]
    fn test_fixed_chunker_empty_input() {
        let chunker = FixedChunker::default();
        assert!(chunker.chunk(&[]).is_empty());
    }

    #[test]
    fn test_fixed_chunker_rejects_zero_size() {
        assert!(FixedChunker::new(0).is_err());
    }

    #[test]
    fn test_fixed_chunker_exactness() {
        let data = seeded(7, 100_000);
        let chunker = FixedChunker::new(crate::DEFAULT_BLOCK_SIZE).unwrap();
        let blocks = chunker.chunk(&data);
        assert_eq!(reassemble(&data, &blocks), data);
    }

    #[test]
    fn test_cdc_rejects_bad_parameters() {
        assert!(CdcChunker::new(0, 8, 16).is_err());
        assert!(CdcChunker::new(8, 8, 16).is_err());
        assert!(CdcChunker::new(4, 16, 16).is_err());
    }

    #[test]
    fn test_cdc_block_sizes_within_bounds() {
        let data = seeded(42, 300_000);
        let chunker = CdcChunker::new(2048, 8192, 65536).unwrap();
        let blocks = chunker.chunk(&data);
        assert!(blocks.len() > 1);
        for (i, block) in blocks.iter().enumerate() {
            assert!(block.size <= 65536);
            if i + 1 < blocks.len() {
                assert!(block.size >= 2048, "block {i} too small: {}", block.size);
            }
        }
        assert_eq!(reassemble(&data, &blocks), data);
    }

    #[test]
    fn test_cdc_deterministic() {
        let data = seeded(9, 150_000);
        let chunker = CdcChunker::default();
        assert_eq!(chunker.chunk(&data), chunker.chunk(&data));
    }

    #[test]
    fn test_cdc_boundaries_are_content_defined() {
        // Prepending a prefix must not disturb boundaries deep inside the
        // stream: the tail of both chunkings shares block hashes.
        let tail = seeded(11, 200_000);
        let mut shifted = seeded(13, 777);
        shifted.extend_from_slice(&tail);

        let chunker = CdcChunker::new(2048, 8192, 65536).unwrap();
        let plain: Vec<_> = chunker.chunk(&tail).into_iter().map(|b| b.hash).collect();
        let moved: Vec<_> = chunker
            .chunk(&shifted)
            .into_iter()
            .map(|b| b.hash)
            .collect();

        let shared = plain.iter().filter(|h| moved.contains(h)).count();
        assert!(
            shared * 2 > plain.len(),
            "expected most blocks to realign, shared {shared} of {}",
            plain.len()
        );
    }

    #[test]
    fn test_chunker_from_config() {
        let fixed = Chunker::from_config(&ChunkerConfig::Fixed { size: 4096 }).unwrap();
        assert!(matches!(fixed, Chunker::Fixed(_)));

        let cdc = Chunker::from_config(&ChunkerConfig::Cdc {
            min: 1024,
            avg: 4096,
            max: 16384,
        })
        .unwrap();
        assert!(matches!(cdc, Chunker::Cdc(_)));

        assert!(Chunker::from_config(&ChunkerConfig::Fixed { size: 0 }).is_err());
    }
}
