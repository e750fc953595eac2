//! HTTP surface for the Sealock storage engine.
//!
//! Exposes the chunked-upload contract, file download/delete, snapshot
//! creation and diffing, and version history over axum. All policy
//! (authorization, quotas) lives outside this layer.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
