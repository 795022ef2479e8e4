//! Trifivend Call Agent Server
//!
//! HTTP endpoints for call setup, caller utterances, reply audio, status
//! events and provider callbacks.

pub mod calls;
pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use metrics::{describe_metrics, init_metrics};
pub use state::AppState;

use thiserror::Error;
use trifivend_pipeline::PipelineError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Call already ended: {0}")]
    CallEnded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Too many active calls")]
    Capacity,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::CallNotFound(id) => ServerError::CallNotFound(id),
            PipelineError::CallEnded(id) => ServerError::CallEnded(id),
            PipelineError::InvalidInput(msg) => ServerError::InvalidRequest(msg),
            PipelineError::CapacityExceeded(_) => ServerError::Capacity,
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::CallNotFound(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::CallEnded(_) => axum::http::StatusCode::CONFLICT,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Capacity => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
