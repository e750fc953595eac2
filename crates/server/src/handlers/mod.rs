//! HTTP handlers.

pub mod files;
pub mod health;
pub mod libraries;
pub mod snapshots;
pub mod upload;

pub use files::{delete_file, download_file, file_integrity, list_files};
pub use health::health_check;
pub use libraries::{commit_version, create_library, list_commits, list_libraries};
pub use snapshots::{compare_snapshots, create_snapshot, list_snapshots};
pub use upload::{cancel_upload, check_file, finish_upload, upload_chunk};
