//! Volcano Registry - Live-reloaded definitions
//!
//! This crate owns everything that changes while traffic is flowing:
//! - Definition parsing and validation (tools, workflows, config files)
//! - `Snapshot`: one immutable view of a branch's definitions plus compiled rules
//! - `SnapshotStore`: the per-branch "current snapshot" pointer
//! - `ConfigSource`: the version-controlled store (in-memory and git)
//! - `ConfigWatcher` / `HotReloadCoordinator`: change detection and installation
//! - `TenantResolver`: tenant id → branch mapping
//!
//! Only the coordinator installs snapshots; everyone else reads `Arc<Snapshot>`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coordinator;
pub mod definition;
pub mod error;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod tenant;
pub mod watcher;
pub mod workflow;

pub use coordinator::{HotReloadCoordinator, RejectedChange, ReloadEvent};
pub use definition::{DefinitionFormat, DefinitionKind};
pub use error::{Error, Result};
pub use snapshot::{Rule, RuleGroup, Snapshot, GENERAL_PURPOSE_WORKFLOW};
pub use source::{ConfigSource, GitSource, InMemorySource, Revision};
pub use store::SnapshotStore;
pub use tenant::{is_safe_branch_name, TenantConfig, TenantResolver};
pub use watcher::{Change, ChangeSet, ConfigWatcher};
pub use workflow::{InstalledWorkflow, RetryPolicy, WorkflowConfiguration, WorkflowDefinition};
