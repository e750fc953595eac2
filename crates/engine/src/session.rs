//! Resumable upload session coordinator.
//!
//! Ephemeral session state lives in the hot-data store under the session's
//! TTL: the session record, a received-chunk hash with one field per chunk
//! index, and the staged chunk payloads. Nothing durable is written until
//! finalize, which stores every block (idempotent by digest), then commits
//! block refcounts and the file row in one metadata transaction, then tears
//! the ephemeral state down. Operations on one session are serialized with
//! an in-process lock map; different sessions never coordinate.

use crate::commit::file_commit_rows;
use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;
use bytes::Bytes;
use dashmap::DashMap;
use sealock_core::hash::is_hex_digest;
use sealock_core::upload::{CheckResponse, FileSummary, FinishRequest};
use sealock_core::{BlockHash, FileRecord, SessionId, SessionRecord, SessionState};
use sealock_metadata::{FileRepo, MetadataStore};
use sealock_storage::{BlockStore, HotStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How long a committed session record lingers so that a racing finalize
/// observes a terminal state instead of an unknown session.
const COMMITTED_RECORD_TTL: Duration = Duration::from_secs(300);

/// Registry of block digests claimed by open upload sessions.
///
/// The garbage collector consults this set before deleting an orphan row:
/// a claimed digest belongs to a not-yet-finalized session and must not be
/// collected even while its refcount is still zero.
#[derive(Clone, Default)]
pub struct SessionClaims {
    inner: Arc<DashMap<String, usize>>,
}

impl SessionClaims {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, hash: &str) {
        *self.inner.entry(hash.to_string()).or_insert(0) += 1;
    }

    fn release(&self, hash: &str) {
        if let Some(mut entry) = self.inner.get_mut(hash) {
            *entry -= 1;
            let drained = *entry == 0;
            drop(entry);
            if drained {
                self.inner.remove_if(hash, |_, count| *count == 0);
            }
        }
    }

    /// Whether any open session claims the digest.
    pub fn contains(&self, hash: &str) -> bool {
        self.inner.get(hash).map(|c| *c > 0).unwrap_or(false)
    }
}

/// Coordinates resumable multi-chunk uploads with skip-on-existing.
pub struct UploadCoordinator {
    hot: Arc<dyn HotStore>,
    storage: Arc<dyn BlockStore>,
    metadata: Arc<dyn MetadataStore>,
    ttl: Duration,
    retry: RetryPolicy,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    claims: SessionClaims,
    session_chunks: DashMap<Uuid, HashMap<u32, String>>,
}

impl UploadCoordinator {
    /// Create a coordinator with the given session TTL.
    pub fn new(
        hot: Arc<dyn HotStore>,
        storage: Arc<dyn BlockStore>,
        metadata: Arc<dyn MetadataStore>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            hot,
            storage,
            metadata,
            ttl: session_ttl,
            retry: RetryPolicy::default(),
            locks: DashMap::new(),
            claims: SessionClaims::new(),
            session_chunks: DashMap::new(),
        }
    }

    /// Bound each block-store operation by a timeout.
    pub fn with_block_io_timeout(mut self, timeout: Duration) -> Self {
        self.retry = self.retry.with_timeout(timeout);
        self
    }

    /// The claims registry, for wiring into the garbage collector.
    pub fn claims(&self) -> SessionClaims {
        self.claims.clone()
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn save_record(&self, record: &SessionRecord, ttl: Duration) -> EngineResult<()> {
        let json = serde_json::to_vec(record)
            .map_err(|e| EngineError::Fatal(format!("session record encode: {e}")))?;
        self.hot
            .set(&SessionRecord::record_key(&record.id), Bytes::from(json), Some(ttl))
            .await?;
        Ok(())
    }

    async fn load_record(&self, id: &SessionId) -> EngineResult<SessionRecord> {
        let raw = self
            .hot
            .get(&SessionRecord::record_key(id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("upload session {id}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| EngineError::Fatal(format!("session record decode: {e}")))
    }

    async fn received_indices(&self, id: &SessionId) -> EngineResult<HashMap<u32, String>> {
        let fields = self.hot.hash_get_all(&SessionRecord::chunks_key(id)).await?;
        let mut received = HashMap::with_capacity(fields.len());
        for (field, digest) in fields {
            if let Some(index) = field.strip_prefix("chunk:").and_then(|s| s.parse().ok()) {
                received.insert(index, digest);
            }
        }
        Ok(received)
    }

    /// Probe for an existing file with the given content hash.
    ///
    /// An existing file means the client can skip the byte transfer
    /// entirely (instant upload); otherwise a fresh session is opened.
    #[instrument(skip(self))]
    pub async fn check(&self, file_hash: &str) -> EngineResult<CheckResponse> {
        if !is_hex_digest(file_hash) {
            return Err(EngineError::InvalidInput(format!(
                "fileHash must be 64 lowercase hex chars, got {:?}",
                file_hash
            )));
        }

        if let Some(row) = self.metadata.get_file_by_hash(file_hash).await? {
            let record = row.to_record().map_err(EngineError::from)?;
            return Ok(CheckResponse {
                exists: true,
                file: Some(FileSummary::from(&record)),
                upload_id: None,
            });
        }

        let record = SessionRecord::new(file_hash.to_string());
        self.save_record(&record, self.ttl).await?;
        info!(session_id = %record.id, "opened upload session");
        Ok(CheckResponse {
            exists: false,
            file: None,
            upload_id: Some(record.id.to_string()),
        })
    }

    /// Accept one chunk of an open session.
    ///
    /// The chunk digest is verified before anything is recorded; a mismatch
    /// leaves the received set unchanged. Receiving a chunk refreshes the
    /// session TTL.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn put_chunk(
        &self,
        session_id: &str,
        index: u32,
        total: u32,
        chunk_hash: &str,
        data: Bytes,
    ) -> EngineResult<()> {
        let id = SessionId::parse(session_id).map_err(EngineError::from)?;
        if total == 0 || index >= total {
            return Err(EngineError::InvalidInput(format!(
                "chunk index {index} out of range for {total} chunks"
            )));
        }
        if !is_hex_digest(chunk_hash) {
            return Err(EngineError::InvalidInput(
                "chunkHash must be 64 lowercase hex chars".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(EngineError::InvalidInput("empty chunk payload".to_string()));
        }

        let computed = BlockHash::compute(&data);
        if computed.to_hex() != chunk_hash {
            return Err(EngineError::InvalidInput(format!(
                "chunk hash mismatch: expected {chunk_hash}, got {computed}"
            )));
        }

        let lock = self.lock_for(*id.as_uuid());
        let _guard = lock.lock().await;

        let mut record = self.load_record(&id).await?;
        if record.state != SessionState::Open {
            return Err(EngineError::Conflict(format!(
                "session {id} is not open"
            )));
        }
        match record.total_chunks {
            Some(t) if t != total => {
                return Err(EngineError::InvalidInput(format!(
                    "totalChunks changed from {t} to {total}"
                )));
            }
            Some(_) => {}
            None => record.total_chunks = Some(total),
        }

        self.hot
            .set(
                &SessionRecord::payload_key(&id, index),
                data,
                Some(self.ttl),
            )
            .await?;
        self.hot
            .hash_set(
                &SessionRecord::chunks_key(&id),
                &SessionRecord::chunk_field(index),
                chunk_hash,
                Some(self.ttl),
            )
            .await?;
        self.save_record(&record, self.ttl).await?;

        // Claim the digest so GC leaves it alone while the session is open.
        let mut chunks = self.session_chunks.entry(*id.as_uuid()).or_default();
        match chunks.insert(index, chunk_hash.to_string()) {
            Some(previous) if previous == chunk_hash => {}
            Some(previous) => {
                self.claims.release(&previous);
                self.claims.claim(chunk_hash);
            }
            None => self.claims.claim(chunk_hash),
        }

        Ok(())
    }

    /// List the chunk indices not yet received.
    pub async fn missing(&self, session_id: &str) -> EngineResult<Vec<u32>> {
        let id = SessionId::parse(session_id).map_err(EngineError::from)?;
        let record = self.load_record(&id).await?;
        let Some(total) = record.total_chunks else {
            // No chunk has announced the total yet; nothing is known missing.
            return Ok(Vec::new());
        };
        let received = self.received_indices(&id).await?;
        Ok((0..total).filter(|i| !received.contains_key(i)).collect())
    }

    /// Finalize a complete session into a visible file.
    ///
    /// An empty chunk list finalizes a zero-length file: nothing was staged
    /// and the file row carries an empty digest list. Two finalize calls
    /// for the same session race safely: the loser finds the record in a
    /// terminal state and gets a conflict.
    #[instrument(skip(self, req), fields(session_id = %req.upload_id, file = %req.file_name))]
    pub async fn finalize(&self, req: &FinishRequest) -> EngineResult<FileRecord> {
        let id = SessionId::parse(&req.upload_id).map_err(EngineError::from)?;
        if !is_hex_digest(&req.file_hash) {
            return Err(EngineError::InvalidInput(
                "fileHash must be 64 lowercase hex chars".to_string(),
            ));
        }

        let lock = self.lock_for(*id.as_uuid());
        let _guard = lock.lock().await;

        let mut record = self.load_record(&id).await?;
        if record.state != SessionState::Open {
            return Err(EngineError::Conflict(format!(
                "session {id} already finalized or aborted"
            )));
        }

        let total = req.chunk_hashes.len() as u32;
        if let Some(t) = record.total_chunks {
            if t != total {
                return Err(EngineError::InvalidInput(format!(
                    "chunkHashes length {total} does not match session total {t}"
                )));
            }
        }

        // Completeness first, so the caller learns exactly what to resend.
        let received = self.received_indices(&id).await?;
        let missing: Vec<u32> = (0..total).filter(|i| !received.contains_key(i)).collect();
        if !missing.is_empty() {
            return Err(EngineError::Incomplete { missing });
        }
        for (index, expected) in req.chunk_hashes.iter().enumerate() {
            match received.get(&(index as u32)) {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(EngineError::InvalidInput(format!(
                        "chunk {index} digest {actual} does not match declared {expected}"
                    )));
                }
                // Absent indices were already rejected above.
                None => {
                    return Err(EngineError::Incomplete {
                        missing: vec![index as u32],
                    });
                }
            }
        }

        // The reconstructed file digest must match before anything durable
        // happens.
        let reconstructed =
            sealock_core::FileHash::compute_from_hex(&req.chunk_hashes).map_err(EngineError::from)?;
        if reconstructed.to_hex() != req.file_hash {
            return Err(EngineError::InvalidInput(format!(
                "file hash mismatch: expected {}, reconstructed {reconstructed}",
                req.file_hash
            )));
        }

        // Pull every staged payload; a vanished payload means the staging
        // TTL lapsed and that chunk must be resent.
        let mut payloads = Vec::with_capacity(total as usize);
        let mut staged_size: u64 = 0;
        for index in 0..total {
            let payload = self
                .hot
                .get(&SessionRecord::payload_key(&id, index))
                .await?
                .ok_or(EngineError::Incomplete {
                    missing: vec![index],
                })?;
            let actual = BlockHash::compute(&payload);
            if actual.to_hex() != req.chunk_hashes[index as usize] {
                return Err(EngineError::Fatal(format!(
                    "staged chunk {index} corrupt: expected {}, got {actual}",
                    req.chunk_hashes[index as usize]
                )));
            }
            staged_size += payload.len() as u64;
            payloads.push(payload);
        }
        if staged_size != req.file_size {
            return Err(EngineError::InvalidInput(format!(
                "fileSize {} does not match staged bytes {staged_size}",
                req.file_size
            )));
        }

        // Durability order: every block exists in the block store before the
        // file row becomes visible. Put is idempotent by digest.
        let mut blocks: Vec<(BlockHash, u64)> = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            let size = payload.len() as u64;
            let payload = payload.clone();
            let hash = self
                .retry
                .run("block put", || {
                    let storage = self.storage.clone();
                    let payload = payload.clone();
                    async move { storage.put(payload).await.map_err(EngineError::from) }
                })
                .await?;
            blocks.push((hash, size));
        }

        let now = OffsetDateTime::now_utc();
        let (file_row, block_rows, content_hash) =
            file_commit_rows(&req.file_name, &blocks, None, now);
        let file_id = self.metadata.commit_file(&file_row, &block_rows).await?;

        // Terminal state outlives the ephemeral keys so a racing finalize
        // sees Conflict rather than an unknown session.
        record.state = SessionState::Committed;
        record.total_chunks = Some(total);
        self.save_record(&record, COMMITTED_RECORD_TTL.min(self.ttl))
            .await?;
        self.teardown_ephemeral(&id, total).await;
        self.release_session(*id.as_uuid());

        info!(session_id = %id, file_id, hash = %content_hash, "upload committed");

        Ok(FileRecord {
            id: file_id,
            uuid: file_row.uuid,
            name: file_row.name,
            size: staged_size,
            content_hash,
            block_hashes: blocks.into_iter().map(|(h, _)| h).collect(),
            library_id: None,
            created_at: now,
        })
    }

    /// Cancel a session, deleting its ephemeral state. Idempotent.
    #[instrument(skip(self))]
    pub async fn cancel(&self, session_id: &str) -> EngineResult<()> {
        let id = SessionId::parse(session_id).map_err(EngineError::from)?;
        let lock = self.lock_for(*id.as_uuid());
        let _guard = lock.lock().await;

        let total = match self.load_record(&id).await {
            Ok(record) => record.total_chunks.unwrap_or(0),
            Err(EngineError::NotFound(_)) => 0,
            Err(e) => return Err(e),
        };

        self.teardown_ephemeral(&id, total).await;
        if let Err(e) = self.hot.delete(&SessionRecord::record_key(&id)).await {
            warn!(session_id = %id, error = %e, "failed to delete session record");
        }
        self.release_session(*id.as_uuid());
        Ok(())
    }

    async fn teardown_ephemeral(&self, id: &SessionId, total: u32) {
        for index in 0..total {
            if let Err(e) = self.hot.delete(&SessionRecord::payload_key(id, index)).await {
                warn!(session_id = %id, index, error = %e, "failed to delete staged chunk");
            }
        }
        if let Err(e) = self.hot.delete(&SessionRecord::chunks_key(id)).await {
            warn!(session_id = %id, error = %e, "failed to delete chunk tracking");
        }
    }

    fn release_session(&self, id: Uuid) {
        if let Some((_, chunks)) = self.session_chunks.remove(&id) {
            for digest in chunks.values() {
                self.claims.release(digest);
            }
        }
        self.locks.remove(&id);
    }

    /// Spawn the reaper that drops claims and locks for sessions whose
    /// record has expired out of the hot store. Runs until aborted.
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.reap_expired().await;
            }
        })
    }

    /// One reaper pass; exposed for tests.
    pub async fn reap_expired(&self) {
        let ids: Vec<Uuid> = self.session_chunks.iter().map(|e| *e.key()).collect();
        for uuid in ids {
            let id = SessionId::from_uuid(uuid);
            match self.hot.exists(&SessionRecord::record_key(&id)).await {
                Ok(false) => {
                    info!(session_id = %id, "reaping expired session");
                    self.release_session(uuid);
                }
                Ok(true) => {}
                Err(e) => warn!(session_id = %id, error = %e, "reaper probe failed"),
            }
        }
    }
}
