//! Health check endpoint
//!
//! `/health` reports the base branch revision and the durable engine kind,
//! so load balancers and operators can see whether definitions loaded.

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use volcano_core::VolcanoEngine;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Installed revision of the base branch, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub active_workflows: usize,
}

async fn health(Extension(engine): Extension<Arc<VolcanoEngine>>) -> Json<HealthResponse> {
    let snapshot = engine.snapshot_for(None);
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        revision: snapshot.revision().map(|r| r.to_string()),
        active_workflows: engine
            .durable()
            .handles()
            .iter()
            .filter(|h| !h.status.is_terminal())
            .count(),
    })
}

/// Health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health))
}
