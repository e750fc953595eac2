//! Chunked-upload handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use sealock_core::upload::{
    CheckResponse, ChunkResponse, ChunkUpload, FileSummary, FinishRequest, FinishResponse,
};
use serde::Deserialize;

/// Query parameters for the file-existence probe.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckParams {
    /// Content hash of the file the client wants to upload.
    pub file_hash: Option<String>,
}

/// GET /upload/check - probe for an existing file, or mint a session.
#[tracing::instrument(skip(state, params))]
pub async fn check_file(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> ApiResult<Json<CheckResponse>> {
    let file_hash = params
        .file_hash
        .ok_or_else(|| ApiError::BadRequest("fileHash parameter is required".to_string()))?;
    let response = state.coordinator.check(&file_hash).await?;
    Ok(Json(response))
}

/// POST /upload/chunk - accept one chunk of an open session.
///
/// Chunk metadata rides in the query string; the chunk bytes are the raw
/// request body.
#[tracing::instrument(skip(state, meta, body), fields(upload_id = %meta.upload_id, index = meta.chunk_index))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Query(meta): Query<ChunkUpload>,
    body: Bytes,
) -> ApiResult<Json<ChunkResponse>> {
    state
        .coordinator
        .put_chunk(
            &meta.upload_id,
            meta.chunk_index,
            meta.total_chunks,
            &meta.chunk_hash,
            body,
        )
        .await?;
    Ok(Json(ChunkResponse {
        chunk_index: meta.chunk_index,
        status: "uploaded".to_string(),
    }))
}

/// DELETE /upload/{upload_id} - cancel a session. Idempotent.
#[tracing::instrument(skip(state))]
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.coordinator.cancel(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /upload/finish - finalize a complete session into a visible file.
#[tracing::instrument(skip(state, request), fields(upload_id = %request.upload_id))]
pub async fn finish_upload(
    State(state): State<AppState>,
    Json(request): Json<FinishRequest>,
) -> ApiResult<Json<FinishResponse>> {
    let file = state.coordinator.finalize(&request).await?;
    Ok(Json(FinishResponse {
        file: FileSummary::from(&file),
    }))
}
