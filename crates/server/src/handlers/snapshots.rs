//! Snapshot handlers.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use sealock_core::merkle::TreeDiff;
use sealock_metadata::models::SnapshotRow;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Snapshot view returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub parent_id: Option<i64>,
    pub root_hash: String,
    pub file_count: i64,
    pub size: i64,
    pub created_at: String,
}

impl From<&SnapshotRow> for SnapshotView {
    fn from(row: &SnapshotRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            name: row.name.clone(),
            description: row.description.clone(),
            parent_id: row.parent_id,
            root_hash: row.root_hash.clone(),
            file_count: row.file_count,
            size: row.size_bytes,
            created_at: row
                .created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| row.created_at.to_string()),
        }
    }
}

/// One changed entry in a snapshot diff.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntryView {
    pub path: String,
    pub is_dir: bool,
    pub hash: String,
    pub size: u64,
}

/// Diff view with hex digests.
#[derive(Debug, Serialize)]
pub struct DiffView {
    pub added: Vec<DiffEntryView>,
    pub removed: Vec<DiffEntryView>,
    pub modified: Vec<DiffEntryView>,
}

impl From<TreeDiff> for DiffView {
    fn from(diff: TreeDiff) -> Self {
        let convert = |entries: Vec<sealock_core::merkle::DiffEntry>| {
            entries
                .into_iter()
                .map(|e| DiffEntryView {
                    path: e.path,
                    is_dir: e.is_dir,
                    hash: e.hash.to_hex(),
                    size: e.size,
                })
                .collect()
        };
        Self {
            added: convert(diff.added),
            removed: convert(diff.removed),
            modified: convert(diff.modified),
        }
    }
}

/// Request body for creating a snapshot.
#[derive(Debug, Deserialize)]
pub struct CreateSnapshotRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// POST /snapshots - materialize the current state.
#[tracing::instrument(skip(state, request), fields(name = %request.name))]
pub async fn create_snapshot(
    State(state): State<AppState>,
    Json(request): Json<CreateSnapshotRequest>,
) -> ApiResult<Json<SnapshotView>> {
    let snapshot = state
        .snapshots
        .create_snapshot(&request.name, &request.description)
        .await?;
    Ok(Json(SnapshotView::from(&snapshot)))
}

/// Pagination parameters.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /snapshots - list snapshots, newest first.
pub async fn list_snapshots(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<SnapshotView>>> {
    let snapshots = state
        .snapshots
        .list_snapshots(params.limit, params.offset)
        .await?;
    Ok(Json(snapshots.iter().map(SnapshotView::from).collect()))
}

/// GET /snapshots/{old_id}/diff/{new_id} - diff two snapshots.
#[tracing::instrument(skip(state))]
pub async fn compare_snapshots(
    State(state): State<AppState>,
    Path((old_id, new_id)): Path<(i64, i64)>,
) -> ApiResult<Json<DiffView>> {
    let diff = state.snapshots.compare_snapshots(old_id, new_id).await?;
    Ok(Json(DiffView::from(diff)))
}
