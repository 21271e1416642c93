//! Volcano Tools - Tool contract and built-in tools
//!
//! This crate provides the tool layer used by the fast path:
//! - Registry: immutable name → installed tool map
//! - Builtins: the closed set of tool variants (arithmetic, reference, lookup, template)
//!
//! Tools are synchronous and pure. Anything that needs I/O, retries or
//! durability belongs on the durable path instead.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod error;
pub mod registry;

pub use builtins::{build_tool, number_value, ArithmeticOp};
pub use error::{Error, Result};
pub use registry::{
    InstalledTool, SessionContext, Tool, ToolDefinition, ToolKind, ToolRegistry, MATH_DOMAIN,
};
