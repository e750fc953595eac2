//! Upload coordinator scenarios: instant upload, resume, mismatches,
//! expiry, and finalize races.

mod common;

use bytes::Bytes;
use common::*;
use sealock_core::upload::FinishRequest;
use sealock_engine::EngineError;

fn finish_request(
    upload_id: &str,
    name: &str,
    data: &Bytes,
    chunk_hashes: Vec<String>,
    file_hash: &str,
) -> FinishRequest {
    FinishRequest {
        upload_id: upload_id.to_string(),
        file_name: name.to_string(),
        file_size: data.len() as u64,
        file_hash: file_hash.to_string(),
        chunk_hashes,
    }
}

#[tokio::test]
async fn test_instant_upload_roundtrip() {
    let rig = fixed_rig(8).await;
    let data = Bytes::from_static(b"Hello, Sealock!");
    let (chunk_hashes, file_hash) = client_chunk(&data, 8);
    assert_eq!(chunk_hashes.len(), 2);

    // Unknown file: a session is minted.
    let check = rig.coordinator.check(&file_hash).await.unwrap();
    assert!(!check.exists);
    let upload_id = check.upload_id.unwrap();

    // Send both chunks and finalize.
    for (index, piece) in client_pieces(&data, 8).into_iter().enumerate() {
        rig.coordinator
            .put_chunk(&upload_id, index as u32, 2, &chunk_hashes[index], piece)
            .await
            .unwrap();
    }
    let file = rig
        .coordinator
        .finalize(&finish_request(
            &upload_id,
            "hello.txt",
            &data,
            chunk_hashes.clone(),
            &file_hash,
        ))
        .await
        .unwrap();
    assert_eq!(file.size, 15);
    assert_eq!(file.content_hash.to_hex(), file_hash);

    let blocks_after_upload = rig.storage.block_count();
    assert_eq!(blocks_after_upload, 2);

    // Second probe: the file exists, nothing new is stored.
    let check = rig.coordinator.check(&file_hash).await.unwrap();
    assert!(check.exists);
    let summary = check.file.unwrap();
    assert_eq!(summary.size, 15);
    assert!(check.upload_id.is_none());
    assert_eq!(rig.storage.block_count(), blocks_after_upload);
}

#[tokio::test]
async fn test_finalize_empty_file_with_zero_chunks() {
    let rig = fixed_rig(8).await;
    let file_hash = sealock_core::FileHash::compute(&[]).to_hex();

    let check = rig.coordinator.check(&file_hash).await.unwrap();
    assert!(!check.exists);
    let upload_id = check.upload_id.unwrap();

    // No chunks to send; finalize commits a zero-length file directly.
    let request = FinishRequest {
        upload_id,
        file_name: "empty".to_string(),
        file_size: 0,
        file_hash: file_hash.clone(),
        chunk_hashes: Vec::new(),
    };
    let file = rig.coordinator.finalize(&request).await.unwrap();
    assert_eq!(file.size, 0);
    assert!(file.block_hashes.is_empty());
    assert_eq!(rig.storage.block_count(), 0);

    // The empty file now hits the instant-upload path.
    let check = rig.coordinator.check(&file_hash).await.unwrap();
    assert!(check.exists);
    assert_eq!(check.file.unwrap().size, 0);

    let back = rig.service.download(&file.content_hash).await.unwrap();
    assert!(back.is_empty());
}

#[tokio::test]
async fn test_check_rejects_malformed_digest() {
    let rig = fixed_rig(8).await;
    assert!(matches!(
        rig.coordinator.check("not-a-digest").await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_resumable_upload_reports_missing() {
    let rig = fixed_rig(4).await;
    let data = seeded_bytes(3, 12); // 3 chunks of 4 bytes
    let (chunk_hashes, file_hash) = client_chunk(&data, 4);
    let pieces = client_pieces(&data, 4);
    assert_eq!(pieces.len(), 3);

    let check = rig.coordinator.check(&file_hash).await.unwrap();
    let upload_id = check.upload_id.unwrap();

    // Send chunks 0 and 2, out of order.
    rig.coordinator
        .put_chunk(&upload_id, 2, 3, &chunk_hashes[2], pieces[2].clone())
        .await
        .unwrap();
    rig.coordinator
        .put_chunk(&upload_id, 0, 3, &chunk_hashes[0], pieces[0].clone())
        .await
        .unwrap();

    assert_eq!(rig.coordinator.missing(&upload_id).await.unwrap(), vec![1]);

    // Finalize refuses with the missing list.
    let request = finish_request(&upload_id, "f.bin", &data, chunk_hashes.clone(), &file_hash);
    match rig.coordinator.finalize(&request).await {
        Err(EngineError::Incomplete { missing }) => assert_eq!(missing, vec![1]),
        other => panic!("expected Incomplete, got {other:?}"),
    }

    // Backfill chunk 1; now it goes through.
    rig.coordinator
        .put_chunk(&upload_id, 1, 3, &chunk_hashes[1], pieces[1].clone())
        .await
        .unwrap();
    assert!(rig.coordinator.missing(&upload_id).await.unwrap().is_empty());
    let file = rig.coordinator.finalize(&request).await.unwrap();
    assert_eq!(file.size, 12);

    // The committed file reconstructs byte-for-byte.
    let downloaded = rig.service.download(&file.content_hash).await.unwrap();
    assert_eq!(downloaded, data);
}

#[tokio::test]
async fn test_chunk_digest_mismatch_leaves_received_unchanged() {
    let rig = fixed_rig(4).await;
    let data = seeded_bytes(5, 8);
    let (chunk_hashes, file_hash) = client_chunk(&data, 4);
    let pieces = client_pieces(&data, 4);

    let upload_id = rig
        .coordinator
        .check(&file_hash)
        .await
        .unwrap()
        .upload_id
        .unwrap();

    // A wrong digest is rejected outright.
    let wrong = sealock_core::BlockHash::compute(b"not this chunk").to_hex();
    assert!(matches!(
        rig.coordinator
            .put_chunk(&upload_id, 0, 2, &wrong, pieces[0].clone())
            .await,
        Err(EngineError::InvalidInput(_))
    ));

    // Nothing was recorded: after a valid chunk 1, only index 0 is missing.
    rig.coordinator
        .put_chunk(&upload_id, 1, 2, &chunk_hashes[1], pieces[1].clone())
        .await
        .unwrap();
    assert_eq!(rig.coordinator.missing(&upload_id).await.unwrap(), vec![0]);
}

#[tokio::test]
async fn test_chunk_index_out_of_range() {
    let rig = fixed_rig(4).await;
    let data = seeded_bytes(6, 8);
    let (chunk_hashes, file_hash) = client_chunk(&data, 4);
    let upload_id = rig
        .coordinator
        .check(&file_hash)
        .await
        .unwrap()
        .upload_id
        .unwrap();

    assert!(matches!(
        rig.coordinator
            .put_chunk(&upload_id, 2, 2, &chunk_hashes[0], seeded_bytes(6, 4))
            .await,
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        rig.coordinator
            .put_chunk(&upload_id, 0, 0, &chunk_hashes[0], seeded_bytes(6, 4))
            .await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_finalize_rejects_wrong_file_hash() {
    let rig = fixed_rig(4).await;
    let data = seeded_bytes(7, 8);
    let (chunk_hashes, file_hash) = client_chunk(&data, 4);
    let pieces = client_pieces(&data, 4);

    let upload_id = rig
        .coordinator
        .check(&file_hash)
        .await
        .unwrap()
        .upload_id
        .unwrap();
    for (i, piece) in pieces.into_iter().enumerate() {
        rig.coordinator
            .put_chunk(&upload_id, i as u32, 2, &chunk_hashes[i], piece)
            .await
            .unwrap();
    }

    let wrong_hash = sealock_core::FileHash::compute(&[]).to_hex();
    let request = finish_request(&upload_id, "f", &data, chunk_hashes, &wrong_hash);
    assert!(matches!(
        rig.coordinator.finalize(&request).await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_second_finalize_conflicts() {
    let rig = fixed_rig(8).await;
    let data = seeded_bytes(8, 16);
    let (chunk_hashes, file_hash) = client_chunk(&data, 8);
    let pieces = client_pieces(&data, 8);

    let upload_id = rig
        .coordinator
        .check(&file_hash)
        .await
        .unwrap()
        .upload_id
        .unwrap();
    for (i, piece) in pieces.into_iter().enumerate() {
        rig.coordinator
            .put_chunk(&upload_id, i as u32, 2, &chunk_hashes[i], piece)
            .await
            .unwrap();
    }

    let request = finish_request(&upload_id, "f", &data, chunk_hashes, &file_hash);
    rig.coordinator.finalize(&request).await.unwrap();

    // The loser of a finalize race observes a non-open session.
    assert!(matches!(
        rig.coordinator.finalize(&request).await,
        Err(EngineError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_cancel_is_idempotent_and_clears_state() {
    let rig = fixed_rig(4).await;
    let data = seeded_bytes(9, 8);
    let (chunk_hashes, file_hash) = client_chunk(&data, 4);
    let pieces = client_pieces(&data, 4);

    let upload_id = rig
        .coordinator
        .check(&file_hash)
        .await
        .unwrap()
        .upload_id
        .unwrap();
    rig.coordinator
        .put_chunk(&upload_id, 0, 2, &chunk_hashes[0], pieces[0].clone())
        .await
        .unwrap();

    rig.coordinator.cancel(&upload_id).await.unwrap();
    rig.coordinator.cancel(&upload_id).await.unwrap();

    // The session is gone; further chunks are refused.
    assert!(matches!(
        rig.coordinator
            .put_chunk(&upload_id, 1, 2, &chunk_hashes[1], pieces[1].clone())
            .await,
        Err(EngineError::NotFound(_))
    ));
    // Nothing durable was written.
    assert_eq!(rig.storage.block_count(), 0);
}

#[tokio::test]
async fn test_expired_session_rejects_chunks() {
    let rig = fixed_rig(4).await;
    let data = seeded_bytes(10, 8);
    let (chunk_hashes, file_hash) = client_chunk(&data, 4);
    let pieces = client_pieces(&data, 4);

    let upload_id = rig
        .coordinator
        .check(&file_hash)
        .await
        .unwrap()
        .upload_id
        .unwrap();
    rig.coordinator
        .put_chunk(&upload_id, 0, 2, &chunk_hashes[0], pieces[0].clone())
        .await
        .unwrap();

    // TTL elapses: every session key vanishes from the hot store.
    rig.hot.force_expire_prefix(&format!("upload:{upload_id}"));

    assert!(matches!(
        rig.coordinator
            .put_chunk(&upload_id, 1, 2, &chunk_hashes[1], pieces[1].clone())
            .await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        rig.coordinator.missing(&upload_id).await,
        Err(EngineError::NotFound(_))
    ));

    // The reaper releases the expired session's claims.
    rig.coordinator.reap_expired().await;
    assert!(!rig.coordinator.claims().contains(&chunk_hashes[0]));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let rig = fixed_rig(4).await;
    let id = uuid::Uuid::new_v4().to_string();
    assert!(matches!(
        rig.coordinator.missing(&id).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        rig.coordinator
            .put_chunk(&id, 0, 1, &sealock_core::BlockHash::compute(b"x").to_hex(), Bytes::from("x"))
            .await,
        Err(EngineError::NotFound(_))
    ));
}
