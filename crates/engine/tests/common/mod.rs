//! Common test utilities and fixtures.

pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::*;

use sealock_core::config::ChunkerConfig;
use sealock_core::Chunker;
use sealock_engine::{FileService, GarbageCollector, SnapshotService, UploadCoordinator};
use sealock_metadata::{MetadataStore, SqliteStore};
use sealock_storage::{BlockStore, MemoryHotStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

/// A full in-process engine over in-memory storage and a temp database.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestRig {
    _dir: tempfile::TempDir,
    pub storage: Arc<MemoryStore>,
    pub hot: Arc<MemoryHotStore>,
    pub metadata: Arc<SqliteStore>,
    pub coordinator: Arc<UploadCoordinator>,
    pub service: Arc<FileService>,
    pub snapshots: Arc<SnapshotService>,
    pub gc: Arc<GarbageCollector>,
}

/// Build a rig with the given chunker; auto-snapshot stays off so tests
/// control snapshot creation explicitly.
#[allow(dead_code)]
pub async fn rig(chunker_config: ChunkerConfig) -> TestRig {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::new());
    let hot = Arc::new(MemoryHotStore::new());
    let metadata = Arc::new(
        SqliteStore::new(dir.path().join("metadata.db"), None)
            .await
            .unwrap(),
    );

    let storage_dyn: Arc<dyn BlockStore> = storage.clone();
    let metadata_dyn: Arc<dyn MetadataStore> = metadata.clone();

    let coordinator = Arc::new(UploadCoordinator::new(
        hot.clone(),
        storage_dyn.clone(),
        metadata_dyn.clone(),
        Duration::from_secs(86_400),
    ));
    let snapshots = Arc::new(SnapshotService::new(metadata_dyn.clone()));
    let chunker = Chunker::from_config(&chunker_config).unwrap();
    let service = Arc::new(FileService::new(
        chunker,
        storage_dyn.clone(),
        metadata_dyn.clone(),
        snapshots.clone(),
        false,
    ));
    let gc = Arc::new(GarbageCollector::new(
        storage_dyn,
        metadata_dyn,
        coordinator.claims(),
        100,
    ));

    TestRig {
        _dir: dir,
        storage,
        hot,
        metadata,
        coordinator,
        service,
        snapshots,
        gc,
    }
}

/// Rig with the default 8 KiB fixed chunker.
#[allow(dead_code)]
pub async fn fixed_rig(block_size: usize) -> TestRig {
    rig(ChunkerConfig::Fixed { size: block_size }).await
}
