//! Reload API endpoint
//!
//! POST /api/v1/reload - Poll every watched branch now
//! POST /api/v1/reload?branch=... - Poll one branch

use axum::extract::{Extension, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use volcano_core::{BranchFailure, ReloadSummary, ReloadSupervisor};
use volcano_registry::is_safe_branch_name;

use super::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct ReloadQuery {
    #[serde(default)]
    pub branch: Option<String>,
}

async fn reload(
    Extension(supervisor): Extension<Arc<ReloadSupervisor>>,
    Query(query): Query<ReloadQuery>,
) -> Response {
    let Some(branch) = query.branch else {
        let summary = supervisor.reload_all().await;
        return Json(ApiResponse::success(summary)).into_response();
    };

    if !is_safe_branch_name(&branch) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(format!("Invalid branch name: {branch}"))),
        )
            .into_response();
    }

    let mut summary = ReloadSummary::default();
    match supervisor.reload_branch(&branch).await {
        Ok(Some(event)) => summary.reloaded.push(event),
        Ok(None) => {}
        Err(e) => summary.failed.push(BranchFailure {
            branch,
            error: e.to_string(),
        }),
    }
    Json(ApiResponse::success(summary)).into_response()
}

/// Reload routes
pub fn reload_routes() -> Router {
    Router::new().route("/api/v1/reload", post(reload))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_reload_without_changes() {
        let app = state().await.router();
        let (status, body) = send(&app, "POST", "/api/v1/reload", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reloaded"].as_array().unwrap().len(), 0);
        assert_eq!(body["data"]["failed"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_branch() {
        let app = state().await.router();
        let (status, body) = send(&app, "POST", "/api/v1/reload?branch=..%2Fetc", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
