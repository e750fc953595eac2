//! Upload session types and lifecycle.

use crate::file::FileRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::UploadSession(format!("invalid session ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Session is open and accepting chunks.
    Open,
    /// Session was successfully committed.
    Committed,
    /// Session was explicitly aborted.
    Aborted,
}

impl SessionState {
    /// Check if the session is still active (can receive chunks).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// The session record kept in the hot-data store for the duration of an
/// upload. Expiry is handled by the store's TTL; a vanished record means
/// the session expired.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier.
    pub id: SessionId,
    /// Expected file content hash (hex), from the check request.
    pub file_hash: String,
    /// Total chunk count, learned from the first chunk upload.
    pub total_chunks: Option<u32>,
    /// Current session state.
    pub state: SessionState,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SessionRecord {
    /// Create a new open session for the given expected file hash.
    pub fn new(file_hash: String) -> Self {
        Self {
            id: SessionId::new(),
            file_hash,
            total_chunks: None,
            state: SessionState::Open,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Hot-store key for the session record.
    pub fn record_key(id: &SessionId) -> String {
        format!("upload:{id}")
    }

    /// Hot-store key for the received-chunk hash.
    pub fn chunks_key(id: &SessionId) -> String {
        format!("upload:{id}:chunks")
    }

    /// Hot-store field name for one chunk within the received-chunk hash.
    pub fn chunk_field(index: u32) -> String {
        format!("chunk:{index}")
    }

    /// Hot-store key for one staged chunk payload.
    pub fn payload_key(id: &SessionId, index: u32) -> String {
        format!("upload:{id}:chunk:{index}")
    }
}

/// A compact file view returned by the upload surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSummary {
    /// Database identity.
    pub id: i64,
    /// Stable unique identifier.
    pub uuid: Uuid,
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Content hash (hex).
    pub hash: String,
}

impl From<&FileRecord> for FileSummary {
    fn from(file: &FileRecord) -> Self {
        Self {
            id: file.id,
            uuid: file.uuid,
            name: file.name.clone(),
            size: file.size,
            hash: file.content_hash.to_hex(),
        }
    }
}

/// Response to a file-existence probe.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    /// Whether a file with the requested hash already exists.
    pub exists: bool,
    /// The existing file, when `exists` is true (the instant-upload path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSummary>,
    /// A freshly minted session ID, when `exists` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
}

/// Metadata accompanying one chunk upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUpload {
    /// The upload session.
    pub upload_id: String,
    /// Zero-based chunk index.
    pub chunk_index: u32,
    /// Total number of chunks in the file.
    pub total_chunks: u32,
    /// Expected SHA-256 of the chunk body (hex).
    pub chunk_hash: String,
    /// Content hash of the whole file; informational, carried by clients
    /// that computed it up front.
    #[serde(default)]
    pub file_hash: Option<String>,
}

/// Response to a chunk upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    /// The acknowledged chunk index.
    pub chunk_index: u32,
    /// Status string, `"uploaded"` on success.
    pub status: String,
}

/// Request to finalize an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRequest {
    /// The upload session.
    pub upload_id: String,
    /// File name for the new file row.
    pub file_name: String,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Expected file content hash (hex).
    pub file_hash: String,
    /// Ordered chunk hashes forming the file.
    pub chunk_hashes: Vec<String>,
}

/// Response to a successful finalize.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinishResponse {
    /// The newly visible file.
    pub file: FileSummary,
}
