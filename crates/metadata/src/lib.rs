//! Metadata store abstraction and SQLite implementation for Sealock.
//!
//! This crate provides the control-plane data model:
//! - Block rows with atomic reference counting
//! - File rows with ordered block-digest lists
//! - Libraries, version commits, and snapshot manifests
//! - Transactional file commit/delete and orphan queries for GC

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{BlockRepo, BlockStats, FileRepo, LibraryRepo, SnapshotRepo, VersionRepo};
pub use store::{MetadataStore, SqliteStore};

use sealock_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let timeout = std::time::Duration::from_secs(config.query_timeout_secs);
    let store = SqliteStore::new(&config.path, Some(timeout)).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
