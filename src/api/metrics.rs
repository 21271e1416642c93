//! GET /api/v1/metrics - Engine counters

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use volcano_core::{MetricsSnapshot, VolcanoEngine};

use super::ApiResponse;

async fn get_metrics(
    Extension(engine): Extension<Arc<VolcanoEngine>>,
) -> Json<ApiResponse<MetricsSnapshot>> {
    Json(ApiResponse::success(engine.metrics().snapshot()))
}

/// Metrics routes
pub fn metrics_routes() -> Router {
    Router::new().route("/api/v1/metrics", get(get_metrics))
}
