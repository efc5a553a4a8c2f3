//! HTTP API (feature `server`).
//!
//! | Method | Path                | Body               | Response                  |
//! |--------|---------------------|--------------------|---------------------------|
//! | POST   | `/convert`          | multipart `file`   | PDF attachment            |
//! | POST   | `/process`          | multipart `file`   | `ProcessOutput` JSON      |
//! | GET    | `/download/:job_id` |                    | PDF attachment, once      |
//! | GET    | `/health`           |                    | status and live job count |

pub mod error;
pub mod routes;

pub use error::{ApiError, ApiResult};

use crate::service::DocumentService;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
pub const DEFAULT_UPLOAD_LIMIT: usize = 50 * 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DocumentService>,
}

impl AppState {
    pub fn new(service: Arc<DocumentService>) -> Self {
        Self { service }
    }
}

/// Create the router with all routes and middleware.
pub fn create_router(state: AppState, upload_limit: usize) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/convert", post(routes::convert))
        .route("/process", post(routes::process))
        .route("/download/:job_id", get(routes::download))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
