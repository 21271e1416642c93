//! Volcano Core - Dual-path request engine
//!
//! This crate turns natural-language requests into results, including:
//! - Pipeline: classification, entity extraction and decomposition into plans
//! - Router: choosing between the fast path and the durable path
//! - Executor: running small plans synchronously within a latency budget
//! - Durable: starting and controlling workflows on the durable engine
//! - Sessions: "it" / "that" continuity between requests
//! - Reload: polling the configuration source and installing snapshots
//! - Utils: retry with backoff and lightweight metrics

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod durable;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod executor;
pub mod pipeline;
pub mod reload;
pub mod router;
pub mod session;
pub mod shutdown;
pub mod utils;

pub use durable::{DurableConfig, DurablePathAdapter, WorkflowHandle};
pub use engine::{EngineConfig, Request, Response, VolcanoEngine};
pub use error::{format_error_for_cli, Error, ErrorKind, Result, UserFriendlyError};
pub use event_bus::{EventBus, VolcanoEvent};
pub use executor::{FastPathExecutor, DEFAULT_LATENCY_BUDGET};
pub use pipeline::{
    extract, Classification, Classifier, DecompositionError, Decomposer, Entity, EntityKind,
    EntityValue, ExecutionPlan, ToolInvocation,
};
pub use reload::{BranchFailure, ReloadSummary, ReloadSupervisor};
pub use router::{IntelligentRouter, Route, RouteDecision, RouteReason, RouterConfig};
pub use session::{Session, SessionStore, DEFAULT_SESSION_TTL};
pub use shutdown::{ShutdownController, ShutdownPhase, TaskGuard};
pub use utils::{retry_with_backoff, EngineMetrics, MetricsSnapshot, RetryConfig, RetryError};
