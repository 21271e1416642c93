//! Execute API endpoint
//!
//! POST /api/v1/execute - Run a natural-language request

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use volcano_core::{Request, VolcanoEngine};

use super::status_for;

/// Request body
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub text: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl From<ExecuteRequest> for Request {
    fn from(body: ExecuteRequest) -> Self {
        Self {
            text: body.text,
            session_id: body.session_id,
            tenant_id: body.tenant_id,
        }
    }
}

/// Process a request; the engine response is returned as-is
async fn execute(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
    Json(body): Json<ExecuteRequest>,
) -> impl IntoResponse {
    // cancelled if the client goes away and this future is dropped
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();

    let response = engine.process(body.into(), &token).await;
    let status = match response.error_kind {
        Some(kind) => status_for(kind),
        None => StatusCode::OK,
    };
    (status, Json(response))
}

/// Execute routes
pub fn execute_routes() -> Router {
    Router::new().route("/api/v1/execute", post(execute))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, state};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_fast_path_with_session() {
        let app = state().await.router();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/execute",
            Some(json!({"text": "Calculate 100 + 50", "session_id": "web-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], 150);
        assert_eq!(body["path"], "fast");

        let (_, body) = send(
            &app,
            "POST",
            "/api/v1/execute",
            Some(json!({"text": "Multiply it by 2", "session_id": "web-1"})),
        )
        .await;
        assert_eq!(body["result"], 300);
    }

    #[tokio::test]
    async fn test_durable_path_returns_workflow() {
        let app = state().await.router();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/execute",
            Some(json!({"text": "Generate the quarterly report", "tenant_id": "acme"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], "durable");
        assert!(body["workflow_id"]
            .as_str()
            .unwrap()
            .starts_with("LongRunningAnalyticsWorkflow-acme-"));
    }

    #[tokio::test]
    async fn test_decomposition_error_is_bad_request() {
        let app = state().await.router();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/execute",
            Some(json!({"text": "Multiply it by 2"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "decomposition_error");
    }
}
