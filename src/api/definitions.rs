//! Definitions API endpoint
//!
//! GET /api/v1/definitions?tenant_id=... - Tools, workflows and settings
//! installed for a tenant's branch

use axum::extract::{Extension, Query};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use volcano_core::VolcanoEngine;
use volcano_registry::WorkflowDefinition;
use volcano_tools::ToolDefinition;

use super::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct DefinitionsQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Installed tool; `source_path` is absent for built-ins
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    #[serde(flatten)]
    pub definition: ToolDefinition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

/// Installed workflow; `source_path` is absent for built-ins
#[derive(Debug, Serialize)]
pub struct WorkflowInfo {
    #[serde(flatten)]
    pub definition: WorkflowDefinition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DefinitionsView {
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub tools: Vec<ToolInfo>,
    pub workflows: Vec<WorkflowInfo>,
    pub config: BTreeMap<String, serde_json::Value>,
}

async fn list_definitions(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
    Query(query): Query<DefinitionsQuery>,
) -> Json<ApiResponse<DefinitionsView>> {
    let tenant_id = query.tenant_id.as_deref();
    let branch = engine.resolver().resolve(tenant_id);
    let snapshot = engine.snapshot_for(tenant_id);

    let mut tools: Vec<ToolInfo> = snapshot
        .tools()
        .iter()
        .map(|installed| ToolInfo {
            definition: (*installed.definition).clone(),
            source_path: installed.source_path.clone(),
        })
        .collect();
    tools.sort_by(|a, b| a.definition.name.cmp(&b.definition.name));

    let mut workflows: Vec<WorkflowInfo> = snapshot
        .workflows()
        .map(|installed| WorkflowInfo {
            definition: (*installed.definition).clone(),
            source_path: installed.source_path.clone(),
        })
        .collect();
    workflows.sort_by(|a, b| a.definition.name.cmp(&b.definition.name));

    Json(ApiResponse::success(DefinitionsView {
        branch,
        revision: snapshot.revision().map(|r| r.to_string()),
        tools,
        workflows,
        config: snapshot.config().clone(),
    }))
}

/// Definitions routes
pub fn definitions_routes() -> Router {
    Router::new().route("/api/v1/definitions", get(list_definitions))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_builtins_listed() {
        let app = state().await.router();
        let (status, body) = send(&app, "GET", "/api/v1/definitions", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["branch"], "main");
        let tools = body["data"]["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "add" && t.get("source_path").is_none()));
        let workflows = body["data"]["workflows"].as_array().unwrap();
        assert!(workflows
            .iter()
            .any(|w| w["name"] == "GeneralPurposeWorkflow"));
    }
}
