//! Garbage collection of orphan blocks.
//!
//! A block is collectable once its refcount is zero and no open upload
//! session claims its digest. The metadata row is removed first, with the
//! refcount re-checked inside the DELETE so a concurrent commit keeps the
//! row; only a won delete touches the block store. The engine is correct
//! without GC ever running, storage just grows.

use crate::error::EngineResult;
use crate::session::SessionClaims;
use sealock_core::BlockHash;
use sealock_metadata::{BlockRepo, MetadataStore};
use sealock_storage::{BlockStore, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Statistics from one GC sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GcStats {
    /// Orphan rows examined.
    pub scanned: u64,
    /// Blocks removed from metadata and storage.
    pub deleted: u64,
    /// Candidates skipped because an open session claims them.
    pub skipped_claimed: u64,
    /// Candidates skipped because their refcount rose before the delete.
    pub skipped_raced: u64,
    /// Deleted rows whose payload was already absent from storage.
    pub missing_payloads: u64,
}

/// Periodic orphan-block collector.
pub struct GarbageCollector {
    storage: Arc<dyn BlockStore>,
    metadata: Arc<dyn MetadataStore>,
    claims: SessionClaims,
    batch_size: u32,
}

impl GarbageCollector {
    /// Create a collector.
    pub fn new(
        storage: Arc<dyn BlockStore>,
        metadata: Arc<dyn MetadataStore>,
        claims: SessionClaims,
        batch_size: u32,
    ) -> Self {
        Self {
            storage,
            metadata,
            claims,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one full sweep over the orphan set.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> EngineResult<GcStats> {
        let mut stats = GcStats::default();

        loop {
            let orphans = self.metadata.list_orphan_blocks(self.batch_size).await?;
            if orphans.is_empty() {
                break;
            }

            let mut progressed = false;
            for row in &orphans {
                stats.scanned += 1;

                if self.claims.contains(&row.block_hash) {
                    stats.skipped_claimed += 1;
                    continue;
                }

                // The delete re-checks refcount = 0; losing the race to a
                // concurrent commit keeps both the row and the payload.
                if !self.metadata.delete_orphan_block(&row.block_hash).await? {
                    stats.skipped_raced += 1;
                    continue;
                }
                progressed = true;

                let hash = match BlockHash::from_hex(&row.block_hash) {
                    Ok(hash) => hash,
                    Err(e) => {
                        warn!(block = %row.block_hash, error = %e, "orphan row with malformed digest");
                        continue;
                    }
                };
                match self.storage.delete(&hash).await {
                    Ok(()) => stats.deleted += 1,
                    Err(StorageError::NotFound(_)) => {
                        stats.deleted += 1;
                        stats.missing_payloads += 1;
                    }
                    Err(e) => {
                        // The metadata row is gone; a later sweep of the
                        // backend can reclaim the stray payload.
                        warn!(block = %row.block_hash, error = %e, "failed to delete block payload");
                    }
                }
            }

            // Everything left is claimed or racing; stop rather than spin.
            if !progressed || orphans.len() < self.batch_size as usize {
                break;
            }
        }

        info!(
            scanned = stats.scanned,
            deleted = stats.deleted,
            skipped_claimed = stats.skipped_claimed,
            skipped_raced = stats.skipped_raced,
            "gc sweep finished"
        );
        Ok(stats)
    }

    /// Spawn the periodic sweep driver. Returns `None` when `interval` is
    /// zero (periodic GC disabled).
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh server
            // does not sweep before traffic arrives.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_sweep().await {
                    warn!(error = %e, "gc sweep failed");
                }
            }
        }))
    }
}
