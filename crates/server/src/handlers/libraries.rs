//! Library and version-history handlers.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sealock_metadata::models::{LibraryRow, VersionRow};
use sealock_metadata::LibraryRepo;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Library view returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryView {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub current_commit: Option<String>,
    pub total_size: i64,
    pub file_count: i64,
    pub version_count: i64,
}

impl From<&LibraryRow> for LibraryView {
    fn from(row: &LibraryRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            name: row.name.clone(),
            description: row.description.clone(),
            owner: row.owner.clone(),
            current_commit: row.current_commit.clone(),
            total_size: row.total_size,
            file_count: row.file_count,
            version_count: row.version_count,
        }
    }
}

/// Version view returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionView {
    pub commit_hash: String,
    pub library_id: i64,
    pub root_tree_hash: String,
    pub message: String,
    pub author: String,
    pub parents: Vec<String>,
    pub created_at: String,
}

impl VersionView {
    fn from_row(row: &VersionRow) -> ApiResult<Self> {
        Ok(Self {
            commit_hash: row.commit_hash.clone(),
            library_id: row.library_id,
            root_tree_hash: row.root_tree_hash.clone(),
            message: row.message.clone(),
            author: row.author.clone(),
            parents: row.parent_list().map_err(sealock_engine::EngineError::from)?,
            created_at: row
                .created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| row.created_at.to_string()),
        })
    }
}

/// Request body for creating a library.
#[derive(Debug, Deserialize)]
pub struct CreateLibraryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
}

/// POST /libraries - create a library.
#[tracing::instrument(skip(state, request), fields(name = %request.name))]
pub async fn create_library(
    State(state): State<AppState>,
    Json(request): Json<CreateLibraryRequest>,
) -> ApiResult<(StatusCode, Json<LibraryView>)> {
    let now = OffsetDateTime::now_utc();
    let library = LibraryRow {
        id: 0,
        uuid: Uuid::new_v4(),
        name: request.name,
        description: request.description,
        owner: request.owner,
        current_commit: None,
        total_size: 0,
        file_count: 0,
        version_count: 0,
        created_at: now,
        updated_at: now,
    };
    let id = state
        .metadata
        .create_library(&library)
        .await
        .map_err(sealock_engine::EngineError::from)?;
    Ok((
        StatusCode::CREATED,
        Json(LibraryView::from(&LibraryRow { id, ..library })),
    ))
}

/// GET /libraries - list all libraries.
pub async fn list_libraries(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LibraryView>>> {
    let libraries = state
        .metadata
        .list_libraries()
        .await
        .map_err(sealock_engine::EngineError::from)?;
    Ok(Json(libraries.iter().map(LibraryView::from).collect()))
}

/// Request body for committing a version.
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub message: String,
    pub author: String,
}

/// POST /libraries/{id}/commits - commit the current state.
#[tracing::instrument(skip(state, request), fields(library_id))]
pub async fn commit_version(
    State(state): State<AppState>,
    Path(library_id): Path<i64>,
    Json(request): Json<CommitRequest>,
) -> ApiResult<(StatusCode, Json<VersionView>)> {
    let version = state
        .snapshots
        .commit_version(library_id, &request.message, &request.author)
        .await?;
    Ok((StatusCode::CREATED, Json(VersionView::from_row(&version)?)))
}

/// GET /libraries/{id}/commits - version history, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_commits(
    State(state): State<AppState>,
    Path(library_id): Path<i64>,
) -> ApiResult<Json<Vec<VersionView>>> {
    let versions = state.snapshots.history(library_id).await?;
    versions
        .iter()
        .map(VersionView::from_row)
        .collect::<ApiResult<Vec<_>>>()
        .map(Json)
}
