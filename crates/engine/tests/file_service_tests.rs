//! File service and garbage collection behavior: round-trips, dedup,
//! ref-count conservation, and sweep safety.

mod common;

use bytes::Bytes;
use common::*;
use sealock_core::config::ChunkerConfig;
use sealock_core::upload::FinishRequest;
use sealock_core::FileHash;
use sealock_engine::{EngineError, FileService};
use sealock_metadata::{BlockRepo, FileRepo};
use sealock_storage::BlockStore;
use std::collections::HashMap;

#[tokio::test]
async fn test_upload_download_roundtrip_fixed() {
    let rig = fixed_rig(8 * 1024).await;
    for (seed, len) in [(1u64, 1usize), (2, 8 * 1024), (3, 8 * 1024 + 1), (4, 100_000)] {
        let data = seeded_bytes(seed, len);
        let file = rig.service.upload("f.bin", data.clone()).await.unwrap();
        let back = rig.service.download(&file.content_hash).await.unwrap();
        assert_eq!(back, data, "round-trip failed for len {len}");
    }
}

#[tokio::test]
async fn test_upload_download_roundtrip_cdc() {
    let rig = rig(ChunkerConfig::Cdc {
        min: 2048,
        avg: 8192,
        max: 65536,
    })
    .await;
    let data = seeded_bytes(42, 300_000);
    let file = rig.service.upload("big.bin", data.clone()).await.unwrap();
    assert!(file.block_hashes.len() > 1);
    let back = rig.service.download(&file.content_hash).await.unwrap();
    assert_eq!(back, data);
}

#[tokio::test]
async fn test_empty_file_round_trips_with_zero_blocks() {
    let rig = fixed_rig(8).await;

    let file = rig.service.upload("empty", Bytes::new()).await.unwrap();
    assert_eq!(file.size, 0);
    assert!(file.block_hashes.is_empty());
    assert_eq!(file.content_hash, FileHash::compute(&[]));
    assert_eq!(rig.storage.block_count(), 0);

    let back = rig.service.download(&file.content_hash).await.unwrap();
    assert!(back.is_empty());
    assert!(rig.service.integrity(&file.content_hash).await.unwrap());

    // Deleting it touches no refcounts; there are none.
    rig.service.delete(&file.content_hash).await.unwrap();
    assert_eq!(rig.metadata.block_stats().await.unwrap().count, 0);
}

#[tokio::test]
async fn test_dedup_across_files() {
    let rig = fixed_rig(8 * 1024).await;

    // 16 KiB where the halves differ, so the file is two distinct blocks.
    let mut content = vec![0xAAu8; 8 * 1024];
    content.extend(vec![0xBBu8; 8 * 1024]);
    let data = Bytes::from(content);

    let a = rig.service.upload("a.bin", data.clone()).await.unwrap();
    let b = rig.service.upload("b.bin", data.clone()).await.unwrap();

    // Identical content: same digest list, one physical copy per block.
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(a.block_hashes, b.block_hashes);
    assert_eq!(rig.storage.block_count(), 2);

    // Each block is referenced once per file.
    for hash in &a.block_hashes {
        let row = rig.metadata.get_block(&hash.to_hex()).await.unwrap().unwrap();
        assert_eq!(row.refcount, 2);
    }
}

#[tokio::test]
async fn test_repeated_blocks_within_one_file() {
    let rig = fixed_rig(8 * 1024).await;

    // 16 KiB of one byte: both chunks are identical, stored once,
    // referenced twice by the same file.
    let data = Bytes::from(vec![0u8; 16 * 1024]);
    let file = rig.service.upload("zeros.bin", data.clone()).await.unwrap();

    assert_eq!(file.block_hashes.len(), 2);
    assert_eq!(file.block_hashes[0], file.block_hashes[1]);
    assert_eq!(rig.storage.block_count(), 1);

    let row = rig
        .metadata
        .get_block(&file.block_hashes[0].to_hex())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.refcount, 2);

    assert_eq!(rig.service.download(&file.content_hash).await.unwrap(), data);
}

/// Conservation: total refcount always equals the summed length of every
/// file's digest list.
async fn assert_refcount_conservation(rig: &common::TestRig) {
    let files = rig.metadata.list_files().await.unwrap();
    let expected: u64 = files
        .iter()
        .map(|f| f.block_hash_list().unwrap().len() as u64)
        .sum();
    let stats = rig.metadata.block_stats().await.unwrap();
    assert_eq!(stats.total_refcount, expected);
}

#[tokio::test]
async fn test_refcount_conservation_over_mixed_operations() {
    let rig = fixed_rig(1024).await;

    let a = rig
        .service
        .upload("a", seeded_bytes(1, 5000))
        .await
        .unwrap();
    let b = rig
        .service
        .upload("b", seeded_bytes(2, 3000))
        .await
        .unwrap();
    rig.service.upload("c", seeded_bytes(1, 5000)).await.unwrap();
    assert_refcount_conservation(&rig).await;

    rig.service.delete(&a.content_hash).await.unwrap();
    assert_refcount_conservation(&rig).await;

    rig.service.delete(&b.content_hash).await.unwrap();
    assert_refcount_conservation(&rig).await;
}

#[tokio::test]
async fn test_integrity_detects_missing_block() {
    let rig = fixed_rig(1024).await;
    let data = seeded_bytes(11, 4000);
    let file = rig.service.upload("f", data).await.unwrap();
    assert!(rig.service.integrity(&file.content_hash).await.unwrap());

    // Losing a block breaks integrity but not metadata.
    rig.storage.delete(&file.block_hashes[1]).await.unwrap();
    assert!(!rig.service.integrity(&file.content_hash).await.unwrap());

    // The unknown-file probe is NotFound, not false.
    let absent = FileHash::compute(&[]);
    assert!(matches!(
        rig.service.integrity(&absent).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_then_gc_then_reupload() {
    let rig = fixed_rig(1024).await;
    let data = seeded_bytes(12, 4096);
    let file = rig.service.upload("f", data.clone()).await.unwrap();
    let block_count = file.block_hashes.len() as u64;

    rig.service.delete(&file.content_hash).await.unwrap();
    let stats = rig.metadata.block_stats().await.unwrap();
    assert_eq!(stats.orphan_count, block_count);

    let swept = rig.gc.run_sweep().await.unwrap();
    assert_eq!(swept.deleted, block_count);
    assert_eq!(rig.storage.block_count(), 0);
    assert_eq!(rig.metadata.block_stats().await.unwrap().count, 0);

    // Identical bytes re-upload from scratch.
    let again = rig.service.upload("f", data.clone()).await.unwrap();
    assert_eq!(again.content_hash, file.content_hash);
    assert_eq!(rig.service.download(&again.content_hash).await.unwrap(), data);
}

#[tokio::test]
async fn test_gc_never_deletes_live_blocks() {
    let rig = fixed_rig(1024).await;
    let shared = seeded_bytes(13, 4096);

    let a = rig.service.upload("a", shared.clone()).await.unwrap();
    rig.service.upload("b", shared.clone()).await.unwrap();

    // Deleting one reference leaves refcounts positive; GC removes nothing.
    rig.service.delete(&a.content_hash).await.unwrap();
    let stats = rig.gc.run_sweep().await.unwrap();
    assert_eq!(stats.deleted, 0);

    let b_hash = a.content_hash; // identical content
    assert_eq!(rig.service.download(&b_hash).await.unwrap(), shared);
}

#[tokio::test]
async fn test_gc_skips_blocks_claimed_by_open_sessions() {
    let rig = fixed_rig(1024).await;
    let data = seeded_bytes(14, 1024);
    let (chunk_hashes, file_hash) = client_chunk(&data, 1024);

    // A deleted file leaves an orphan row for the digest.
    let file = rig.service.upload("f", data.clone()).await.unwrap();
    rig.service.delete(&file.content_hash).await.unwrap();
    assert_eq!(rig.metadata.block_stats().await.unwrap().orphan_count, 1);

    // An open session claims the same digest mid-upload.
    let upload_id = rig
        .coordinator
        .check(&file_hash)
        .await
        .unwrap()
        .upload_id
        .unwrap();
    rig.coordinator
        .put_chunk(&upload_id, 0, 1, &chunk_hashes[0], data.clone())
        .await
        .unwrap();

    let stats = rig.gc.run_sweep().await.unwrap();
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.skipped_claimed, 1);

    // After finalize the claim is gone and the row is live again.
    let request = FinishRequest {
        upload_id,
        file_name: "f2".to_string(),
        file_size: data.len() as u64,
        file_hash,
        chunk_hashes,
    };
    rig.coordinator.finalize(&request).await.unwrap();
    let stats = rig.gc.run_sweep().await.unwrap();
    assert_eq!(stats.deleted, 0);
    assert_eq!(rig.metadata.block_stats().await.unwrap().total_refcount, 1);
}

#[tokio::test]
async fn test_detect_changes_is_pure_set_difference() {
    let rig = fixed_rig(1024).await;
    let a = rig.service.upload("a", seeded_bytes(1, 100)).await.unwrap();
    let b = rig.service.upload("b", seeded_bytes(2, 100)).await.unwrap();
    let c = rig.service.upload("c", seeded_bytes(3, 100)).await.unwrap();

    let old: HashMap<_, _> = [&a, &b]
        .into_iter()
        .map(|f| (f.content_hash.to_hex(), f.clone()))
        .collect();
    let new: HashMap<_, _> = [&b, &c]
        .into_iter()
        .map(|f| (f.content_hash.to_hex(), f.clone()))
        .collect();

    let changes = FileService::detect_changes(&old, &new);
    assert_eq!(changes.added.len(), 1);
    assert_eq!(changes.added[0].name, "c");
    assert_eq!(changes.removed.len(), 1);
    assert_eq!(changes.removed[0].name, "a");
}

#[tokio::test]
async fn test_download_unknown_file_is_not_found() {
    let rig = fixed_rig(1024).await;
    let absent = FileHash::compute(&[]);
    assert!(matches!(
        rig.service.download(&absent).await,
        Err(EngineError::NotFound(_))
    ));
}
