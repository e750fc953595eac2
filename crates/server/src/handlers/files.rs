//! File read/delete handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use sealock_core::upload::FileSummary;
use sealock_core::FileHash;
use sealock_engine::EngineError;
use serde::Serialize;

fn parse_file_hash(hex: &str) -> ApiResult<FileHash> {
    FileHash::from_hex(hex)
        .map_err(|e| ApiError::Engine(EngineError::InvalidInput(e.to_string())))
}

/// GET /files - list all files.
pub async fn list_files(State(state): State<AppState>) -> ApiResult<Json<Vec<FileSummary>>> {
    let files = state.files.list_files().await?;
    Ok(Json(files.iter().map(FileSummary::from).collect()))
}

/// GET /files/{file_hash} - reconstruct and return the file bytes.
#[tracing::instrument(skip(state))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_hash): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let hash = parse_file_hash(&file_hash)?;
    let data = state.files.download(&hash).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    ))
}

/// Integrity probe response.
#[derive(Debug, Serialize)]
pub struct IntegrityResponse {
    /// True iff every referenced block exists in the block store.
    pub intact: bool,
}

/// GET /files/{file_hash}/integrity - verify all blocks exist.
#[tracing::instrument(skip(state))]
pub async fn file_integrity(
    State(state): State<AppState>,
    Path(file_hash): Path<String>,
) -> ApiResult<Json<IntegrityResponse>> {
    let hash = parse_file_hash(&file_hash)?;
    let intact = state.files.integrity(&hash).await?;
    Ok(Json(IntegrityResponse { intact }))
}

/// DELETE /files/{file_hash} - drop the file row and its block references.
#[tracing::instrument(skip(state))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_hash): Path<String>,
) -> ApiResult<StatusCode> {
    let hash = parse_file_hash(&file_hash)?;
    state.files.delete(&hash).await?;
    Ok(StatusCode::NO_CONTENT)
}
