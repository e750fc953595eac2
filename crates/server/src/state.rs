//! Application state shared across handlers.

use sealock_core::config::AppConfig;
use sealock_engine::{FileService, SnapshotService, UploadCoordinator};
use sealock_metadata::MetadataStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Upload session coordinator.
    pub coordinator: Arc<UploadCoordinator>,
    /// File service facade.
    pub files: Arc<FileService>,
    /// Snapshot and version service.
    pub snapshots: Arc<SnapshotService>,
    /// Metadata store, for health checks and library management.
    pub metadata: Arc<dyn MetadataStore>,
}
