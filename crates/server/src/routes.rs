//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (unauthenticated, for load balancers)
        .route("/health", get(handlers::health_check))
        // Upload surface
        .route("/upload/check", get(handlers::check_file))
        .route("/upload/chunk", post(handlers::upload_chunk))
        .route("/upload/finish", post(handlers::finish_upload))
        .route("/upload/{upload_id}", delete(handlers::cancel_upload))
        // Files
        .route("/files", get(handlers::list_files))
        .route(
            "/files/{file_hash}",
            get(handlers::download_file).delete(handlers::delete_file),
        )
        .route("/files/{file_hash}/integrity", get(handlers::file_integrity))
        // Snapshots
        .route(
            "/snapshots",
            post(handlers::create_snapshot).get(handlers::list_snapshots),
        )
        .route(
            "/snapshots/{old_id}/diff/{new_id}",
            get(handlers::compare_snapshots),
        )
        // Libraries and version history
        .route(
            "/libraries",
            post(handlers::create_library).get(handlers::list_libraries),
        )
        .route(
            "/libraries/{library_id}/commits",
            post(handlers::commit_version).get(handlers::list_commits),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
