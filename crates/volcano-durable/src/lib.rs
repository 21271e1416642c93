//! Volcano Durable - Bridge to an external durable-execution engine
//!
//! Volcano does not run workflows. It starts them on an engine that
//! survives crashes and retries on its own, then mirrors their state:
//! - `DurableEngine`: start / signal / query / cancel / status
//! - `WorkflowState`: the mirrored state machine
//! - `InMemoryEngine`: local engine for development and tests
//! - `HttpEngine`: REST gateway client

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod http;
pub mod memory;
pub mod state;

pub use engine::{DurableEngine, StartRequest, WorkflowExecution, WorkflowStatus};
pub use error::{EngineError, Result};
pub use http::{HttpEngine, HttpEngineConfig};
pub use memory::InMemoryEngine;
pub use state::WorkflowState;
