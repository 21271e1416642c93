//! HTTP gateway engine
//!
//! Talks to a durable-execution gateway over REST:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | start  | `POST {base}/api/v1/workflows/start` |
//! | status | `GET  {base}/api/v1/workflows/{id}/runs/{run}/status` |
//! | signal | `POST {base}/api/v1/workflows/{id}/runs/{run}/signal` |
//! | query  | `POST {base}/api/v1/workflows/{id}/runs/{run}/query` |
//! | cancel | `POST {base}/api/v1/workflows/{id}/runs/{run}/cancel` |
//! | cancel current run | `POST {base}/api/v1/workflows/{id}/cancel` |
//!
//! Connection failures, timeouts and 5xx responses are transient; everything
//! else is final.

use crate::engine::{DurableEngine, StartRequest, WorkflowExecution, WorkflowStatus};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Gateway client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpEngineConfig {
    /// Gateway base URL
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7233".to_string(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl HttpEngineConfig {
    /// Create a config for `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

#[derive(Serialize)]
struct SignalBody<'a> {
    signal_name: &'a str,
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query_type: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: serde_json::Value,
}

/// REST gateway engine
pub struct HttpEngine {
    client: Client,
    config: HttpEngineConfig,
}

impl HttpEngine {
    /// Create a new gateway client
    pub fn new(config: HttpEngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn run_url(&self, execution: &WorkflowExecution, action: &str) -> String {
        self.url(&format!(
            "/api/v1/workflows/{}/runs/{}/{}",
            execution.workflow_id, execution.run_id, action
        ))
    }

    fn send_error(&self, e: &reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout(self.config.timeout_ms)
        } else if e.is_connect() || e.is_request() {
            EngineError::Unavailable(e.to_string())
        } else {
            EngineError::Internal(e.to_string())
        }
    }

    async fn read<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| self.send_error(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            warn!(status = %status, "Engine gateway returned an error");
            return Err(status_error(status, body));
        }
        if body.trim().is_empty() {
            return serde_json::from_str("null")
                .map_err(|e| EngineError::Internal(format!("unexpected empty response: {e}")));
        }
        serde_json::from_str(&body).map_err(|e| EngineError::Internal(e.to_string()))
    }
}

/// Map a non-success status to an engine error
fn status_error(status: StatusCode, body: String) -> EngineError {
    match status {
        StatusCode::NOT_FOUND => EngineError::NotFound(body),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => EngineError::Timeout(0),
        s if s.is_server_error() => EngineError::Unavailable(format!("{s}: {body}")),
        s if s.is_client_error() => EngineError::Rejected(body),
        s => EngineError::Internal(format!("unexpected status {s}")),
    }
}

#[async_trait]
impl DurableEngine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&self, request: StartRequest) -> Result<WorkflowExecution> {
        debug!(workflow_id = %request.workflow_id, "Starting workflow via gateway");
        self.read(
            self.client
                .post(self.url("/api/v1/workflows/start"))
                .json(&request),
        )
        .await
    }

    async fn signal(
        &self,
        execution: &WorkflowExecution,
        signal_name: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .read(
                self.client
                    .post(self.run_url(execution, "signal"))
                    .json(&SignalBody {
                        signal_name,
                        payload,
                    }),
            )
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        execution: &WorkflowExecution,
        query_type: &str,
    ) -> Result<serde_json::Value> {
        let response: QueryResponse = self
            .read(
                self.client
                    .post(self.run_url(execution, "query"))
                    .json(&QueryBody { query_type }),
            )
            .await?;
        Ok(response.result)
    }

    async fn cancel(&self, execution: &WorkflowExecution) -> Result<()> {
        let _: serde_json::Value = self
            .read(self.client.post(self.run_url(execution, "cancel")))
            .await?;
        Ok(())
    }

    async fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        let url = self.url(&format!("/api/v1/workflows/{workflow_id}/cancel"));
        let _: serde_json::Value = self.read(self.client.post(url)).await?;
        Ok(())
    }

    async fn status(&self, execution: &WorkflowExecution) -> Result<WorkflowStatus> {
        self.read(self.client.get(self.run_url(execution, "status")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new()),
            EngineError::NotFound(_)
        ));
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_transient());
        assert!(status_error(StatusCode::GATEWAY_TIMEOUT, String::new()).is_transient());
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "already started".into()),
            EngineError::Rejected(_)
        ));
    }

    #[test]
    fn test_urls() {
        let engine = HttpEngine::new(HttpEngineConfig::new("http://gateway:8080/")).unwrap();
        let execution = WorkflowExecution::new("wf-1", "run-1");
        assert_eq!(
            engine.run_url(&execution, "status"),
            "http://gateway:8080/api/v1/workflows/wf-1/runs/run-1/status"
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transient() {
        let engine = HttpEngine::new(
            HttpEngineConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(500)),
        )
        .unwrap();
        let err = engine
            .status(&WorkflowExecution::new("wf-1", "run-1"))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn test_cancel_workflow_unreachable_is_transient() {
        let engine = HttpEngine::new(
            HttpEngineConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(500)),
        )
        .unwrap();
        let err = engine.cancel_workflow("wf-1").await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }
}
