//! The Sealock storage engine.
//!
//! Composes the chunker, block store, cache, hot store, and metadata store
//! into the operations the HTTP layer exposes:
//! - `UploadCoordinator`: resumable chunked uploads with instant-upload
//! - `FileService`: single-shot upload, download, integrity, delete
//! - `SnapshotService`: snapshots, diffs, version commits
//! - `GarbageCollector`: orphan-block sweeps guarded by session claims

pub mod commit;
pub mod error;
pub mod gc;
pub mod retry;
pub mod service;
pub mod session;
pub mod snapshot;

pub use error::{EngineError, EngineResult};
pub use gc::{GarbageCollector, GcStats};
pub use retry::RetryPolicy;
pub use service::{ChangeSet, FileService};
pub use session::{SessionClaims, UploadCoordinator};
pub use snapshot::SnapshotService;
