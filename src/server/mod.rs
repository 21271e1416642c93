//! Server module for Volcano
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all server components
//! - `loader`: Configuration loading from files and environment
//! - `init`: Component wiring and the HTTP run loop
//! - `background_tasks`: Reload polling and session sweeping

mod background_tasks;
pub mod config;
mod init;
mod loader;

pub use init::{build_state, run, seed_memory_source, AppState};
pub use loader::load_config;
