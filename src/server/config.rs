//! Server configuration types
//!
//! Every section has defaults, so a partial file or an empty environment
//! still deserializes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use volcano_core::EngineConfig;
use volcano_durable::HttpEngineConfig;
use volcano_registry::TenantConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tenants: TenantConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8088
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Where definitions come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// In-process source, optionally seeded from a directory
    #[default]
    Memory,
    /// A git repository polled for new commits
    Git,
}

/// Definition source settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Seed directory (memory) or repository path (git)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Background reload and session sweeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_session_sweep_secs")]
    pub session_sweep_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    5
}

fn default_session_sweep_secs() -> u64 {
    60
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            session_sweep_secs: default_session_sweep_secs(),
        }
    }
}

/// Which durable engine backs the durable path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// In-process engine
    #[default]
    Memory,
    /// Remote workflow gateway over HTTP
    Http,
}

/// Durable engine connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub kind: GatewayKind,
    #[serde(default)]
    pub http: HttpEngineConfig,
}
