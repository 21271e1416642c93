//! Utility modules for volcano-core
//!
//! - retry: Retry logic with exponential backoff
//! - metrics: Lightweight metrics collection

mod metrics;
mod retry;

pub use metrics::{Counter, EngineMetrics, Gauge, Histogram, MetricsSnapshot};
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
