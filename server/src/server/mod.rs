//! HTTP server: routes, state, handlers

pub mod salt_handlers;
pub mod serve;
pub mod slurm_handlers;
pub mod state;
pub mod system_handlers;
pub mod task_handlers;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::ClusterError;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// HTTP-mapped error wrapper so handlers can use `?` on `ClusterError`
pub struct ApiError(pub ClusterError);

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ClusterError::ValidationError(_) | ClusterError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            ClusterError::AuthError(_) => StatusCode::UNAUTHORIZED,
            ClusterError::NotFound(_) => StatusCode::NOT_FOUND,
            ClusterError::Conflict(_) => StatusCode::CONFLICT,
            ClusterError::ServiceUnavailable(_) | ClusterError::Unreachable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ClusterError::TimeoutError(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}
