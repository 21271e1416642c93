//! Workflow API endpoints
//!
//! POST /api/v1/workflows/execute - Start a workflow by type
//! GET  /api/v1/workflows - List workflows started by this process
//! GET  /api/v1/workflows/:id/runs/:run/status - Engine status
//! POST /api/v1/workflows/:id/runs/:run/signal - Send a signal (pause, resume, ...)
//! POST /api/v1/workflows/:id/runs/:run/query - Run a query
//! POST /api/v1/workflows/:id/runs/:run/cancel - Cancel
//! GET  /api/v1/workflows/:id/runs/:run/result - Result, once completed
//!
//! A run id that is not the current run of the workflow is reported as
//! `workflow_not_found`.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use volcano_core::{Error, VolcanoEngine, WorkflowHandle};
use volcano_durable::{WorkflowState, WorkflowStatus};

use super::{ApiError, ApiResponse, ApiResult};

/// Start request
#[derive(Debug, Deserialize)]
pub struct StartWorkflowRequest {
    pub workflow_type: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default = "empty_object")]
    pub params: serde_json::Value,
}

/// Signal request
#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub signal: String,
    #[serde(default = "empty_object")]
    pub payload: serde_json::Value,
}

/// Query request
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query_type: String,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

/// Result view; `result` stays empty while the workflow is open
#[derive(Debug, Serialize)]
pub struct WorkflowResult {
    pub state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

fn ensure_run(engine: &VolcanoEngine, id: &str, run: &str) -> Result<(), ApiError> {
    match engine.durable().handle(id) {
        Some(handle) if handle.execution.run_id == run => Ok(()),
        _ => Err(Error::WorkflowNotFound(format!("{id}/{run}")).into()),
    }
}

async fn start_workflow(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
    Json(body): Json<StartWorkflowRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WorkflowHandle>>), ApiError> {
    // cancelled if the client goes away and this future is dropped
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();

    let handle = engine
        .execute_workflow(
            &body.workflow_type,
            body.tenant_id.as_deref(),
            body.params,
            &token,
        )
        .await?;
    info!(
        workflow_id = %handle.execution.workflow_id,
        workflow_type = %handle.workflow_type,
        "Workflow started via API"
    );
    Ok((StatusCode::CREATED, Json(ApiResponse::success(handle))))
}

async fn list_workflows(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
) -> Json<ApiResponse<Vec<WorkflowHandle>>> {
    Json(ApiResponse::success(engine.durable().handles()))
}

async fn get_status(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
    Path((id, run)): Path<(String, String)>,
) -> ApiResult<WorkflowStatus> {
    ensure_run(&engine, &id, &run)?;
    let status = engine.durable().status(&id).await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn signal_workflow(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
    Path((id, run)): Path<(String, String)>,
    Json(body): Json<SignalRequest>,
) -> ApiResult<WorkflowStatus> {
    ensure_run(&engine, &id, &run)?;
    engine.durable().signal(&id, &body.signal, body.payload).await?;
    let status = engine.durable().status(&id).await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn query_workflow(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
    Path((id, run)): Path<(String, String)>,
    Json(body): Json<QueryRequest>,
) -> ApiResult<serde_json::Value> {
    ensure_run(&engine, &id, &run)?;
    let value = engine.durable().query(&id, &body.query_type).await?;
    Ok(Json(ApiResponse::success(value)))
}

async fn cancel_workflow(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
    Path((id, run)): Path<(String, String)>,
) -> ApiResult<WorkflowStatus> {
    ensure_run(&engine, &id, &run)?;
    engine.durable().cancel(&id).await?;
    let status = engine.durable().status(&id).await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn get_result(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
    Path((id, run)): Path<(String, String)>,
) -> ApiResult<WorkflowResult> {
    ensure_run(&engine, &id, &run)?;
    let result = engine.durable().result(&id).await?;
    let state = match result {
        Some(_) => WorkflowState::Completed,
        None => engine.durable().status(&id).await?.state,
    };
    Ok(Json(ApiResponse::success(WorkflowResult { state, result })))
}

/// Workflow routes
pub fn workflows_routes() -> Router {
    Router::new()
        .route("/api/v1/workflows", get(list_workflows))
        .route("/api/v1/workflows/execute", post(start_workflow))
        .route("/api/v1/workflows/:id/runs/:run/status", get(get_status))
        .route("/api/v1/workflows/:id/runs/:run/signal", post(signal_workflow))
        .route("/api/v1/workflows/:id/runs/:run/query", post(query_workflow))
        .route("/api/v1/workflows/:id/runs/:run/cancel", post(cancel_workflow))
        .route("/api/v1/workflows/:id/runs/:run/result", get(get_result))
}
