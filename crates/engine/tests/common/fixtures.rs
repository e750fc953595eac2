//! Test fixtures for generating deterministic data.

use bytes::Bytes;
use sealock_core::{BlockHash, FileHash, FixedChunker};

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Chunk data client-side with a fixed block size, returning the hex chunk
/// hashes and the combined file hash, mirroring what an uploader computes.
#[allow(dead_code)]
pub fn client_chunk(data: &[u8], block_size: usize) -> (Vec<String>, String) {
    let chunker = FixedChunker::new(block_size).unwrap();
    let hashes: Vec<BlockHash> = chunker.chunk(data).into_iter().map(|b| b.hash).collect();
    let hex: Vec<String> = hashes.iter().map(|h| h.to_hex()).collect();
    let file_hash = FileHash::compute(&hashes).to_hex();
    (hex, file_hash)
}

/// Slice data into fixed-size pieces, matching `client_chunk` boundaries.
#[allow(dead_code)]
pub fn client_pieces(data: &Bytes, block_size: usize) -> Vec<Bytes> {
    let mut pieces = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + block_size).min(data.len());
        pieces.push(data.slice(offset..end));
        offset = end;
    }
    pieces
}
