//! Web API module for Volcano
//!
//! Provides REST API endpoints for:
//! - Request execution (fast or durable path)
//! - Workflow control: start, status, signal, query, cancel, result
//! - Installed definitions per tenant
//! - Manual reloads and engine metrics

pub mod definitions;
pub mod execute;
pub mod health;
pub mod metrics;
pub mod reload;
pub mod workflows;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Router;
use serde::Serialize;
use tracing::warn;
use volcano_core::{Error, ErrorKind, UserFriendlyError};

pub use definitions::definitions_routes;
pub use execute::execute_routes;
pub use health::health_routes;
pub use metrics::metrics_routes;
pub use reload::reload_routes;
pub use workflows::workflows_routes;

/// Create the API router with all endpoints
pub fn api_router() -> Router {
    Router::new()
        .merge(health_routes())
        .merge(execute_routes())
        .merge(workflows_routes())
        .merge(definitions_routes())
        .merge(reload_routes())
        .merge(metrics_routes())
}

/// Envelope for every API response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            suggestion: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            error_kind: None,
            suggestion: None,
        }
    }

    fn from_error(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.user_message()),
            error_kind: Some(error.kind()),
            suggestion: error.suggestion(),
        }
    }
}

/// HTTP status for a failed operation
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::DecompositionError | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::ToolNotFound | ErrorKind::WorkflowNotFound | ErrorKind::SessionNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorKind::ToolExecutionError
        | ErrorKind::ReloadValidationError
        | ErrorKind::WorkflowFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::LatencyBudgetExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::WorkflowStartRejected => StatusCode::BAD_GATEWAY,
        ErrorKind::DurablePathUnavailable | ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Core error rendered as an [`ApiResponse`] with a matching status
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if kind == ErrorKind::Internal {
            warn!(error = %self.0, "Internal error in API handler");
        }
        (status_for(kind), Json(ApiResponse::<()>::from_error(&self.0))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_hides_internals() {
        let error = Error::DurablePathUnavailable {
            attempts: 3,
            last_error: "connection refused: 10.0.0.7:7233".to_string(),
        };
        let body = serde_json::to_value(ApiResponse::<()>::from_error(&error)).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "durable_path_unavailable");
        assert!(!body["error"].as_str().unwrap().contains("10.0.0.7"));
        assert!(body.get("data").is_none());
        assert_eq!(status_for(error.kind()), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(status_for(ErrorKind::WorkflowNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidState), StatusCode::CONFLICT);
    }
}
