//! Shared row construction for making a file visible.

use sealock_core::{BlockHash, FileHash};
use sealock_metadata::models::{BlockRow, FileRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the file row and per-occurrence block rows for one file commit.
///
/// `blocks` is the ordered digest list with sizes, one entry per occurrence;
/// repeats stay repeated so refcounts pick up multiplicity.
pub fn file_commit_rows(
    name: &str,
    blocks: &[(BlockHash, u64)],
    library_id: Option<i64>,
    now: OffsetDateTime,
) -> (FileRow, Vec<BlockRow>, FileHash) {
    let hashes: Vec<BlockHash> = blocks.iter().map(|(h, _)| *h).collect();
    let content_hash = FileHash::compute(&hashes);
    let hex_list: Vec<String> = hashes.iter().map(|h| h.to_hex()).collect();
    let size: u64 = blocks.iter().map(|(_, s)| *s).sum();

    let block_rows: Vec<BlockRow> = blocks
        .iter()
        .map(|(hash, size)| BlockRow::occurrence(hash, *size, now))
        .collect();

    let file_row = FileRow {
        id: 0,
        uuid: Uuid::new_v4(),
        name: name.to_string(),
        size_bytes: size as i64,
        content_hash: content_hash.to_hex(),
        block_hashes: serde_json::to_string(&hex_list).unwrap_or_else(|_| "[]".to_string()),
        library_id,
        created_at: now,
        updated_at: now,
    };

    (file_row, block_rows, content_hash)
}
