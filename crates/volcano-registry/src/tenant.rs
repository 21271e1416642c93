//! Tenant Resolver - tenant id → configuration branch
//!
//! Resolution is pure: the same config and tenant id always produce the same
//! branch. It never checks whether the branch exists; the snapshot store
//! falls back to the base branch when nothing is installed there.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Tenant resolution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Branch used for requests without a tenant and as fallback
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Prefix for per-tenant branches (`<prefix><tenant_id>`)
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Whether tenants get their own branch by convention
    #[serde(default)]
    pub per_tenant_branches: bool,
    /// Explicit tenant → branch overrides, consulted first
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_branch_prefix() -> String {
    "tenant/".to_string()
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            base_branch: default_base_branch(),
            branch_prefix: default_branch_prefix(),
            per_tenant_branches: false,
            overrides: HashMap::new(),
        }
    }
}

impl TenantConfig {
    /// Set the base branch
    #[must_use]
    pub fn with_base_branch(mut self, branch: impl Into<String>) -> Self {
        self.base_branch = branch.into();
        self
    }

    /// Enable or disable per-tenant branches
    #[must_use]
    pub fn with_per_tenant_branches(mut self, enabled: bool) -> Self {
        self.per_tenant_branches = enabled;
        self
    }

    /// Add an explicit override
    #[must_use]
    pub fn with_override(mut self, tenant_id: impl Into<String>, branch: impl Into<String>) -> Self {
        self.overrides.insert(tenant_id.into(), branch.into());
        self
    }
}

/// Maps tenants to branches and task queues
#[derive(Debug, Clone, Default)]
pub struct TenantResolver {
    config: TenantConfig,
}

impl TenantResolver {
    /// Create a resolver
    #[must_use]
    pub fn new(config: TenantConfig) -> Self {
        Self { config }
    }

    /// Base branch
    #[must_use]
    pub fn base_branch(&self) -> &str {
        &self.config.base_branch
    }

    /// Resolve the branch for a tenant
    #[must_use]
    pub fn resolve(&self, tenant_id: Option<&str>) -> String {
        let Some(tenant_id) = tenant_id.filter(|t| !t.is_empty()) else {
            return self.config.base_branch.clone();
        };

        if let Some(branch) = self.config.overrides.get(tenant_id) {
            return branch.clone();
        }

        if self.config.per_tenant_branches {
            let branch = format!("{}{}", self.config.branch_prefix, tenant_id);
            if is_safe_branch_name(&branch) {
                return branch;
            }
            debug!(tenant = %tenant_id, "Tenant id is not a safe branch name, using base branch");
        }

        self.config.base_branch.clone()
    }

    /// Branches that should be kept loaded: base, overrides and nothing else
    ///
    /// Convention branches are discovered per request, not listed here.
    #[must_use]
    pub fn known_branches(&self) -> Vec<String> {
        let mut branches: Vec<String> = std::iter::once(self.config.base_branch.clone())
            .chain(self.config.overrides.values().cloned())
            .collect();
        branches.sort();
        branches.dedup();
        branches
    }

    /// Task queue for a tenant: `<task_queue>-<tenant_id>`, or the base queue
    #[must_use]
    pub fn task_queue_for(&self, task_queue: &str, tenant_id: Option<&str>) -> String {
        match tenant_id.filter(|t| !t.is_empty()) {
            Some(tenant) => format!("{task_queue}-{tenant}"),
            None => task_queue.to_string(),
        }
    }
}

/// Whether `name` can be passed to git as a branch name without surprises
pub fn is_safe_branch_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }

    // would be parsed as a flag
    if name.starts_with('-') {
        return false;
    }

    let dangerous_chars = [
        '`', '$', '|', ';', '&', '>', '<', '\n', '\r', '\0', ' ', '~', '^', ':', '?', '*', '[',
        '\\',
    ];
    if name.chars().any(|c| dangerous_chars.contains(&c) || c.is_control()) {
        return false;
    }

    !(name.contains("..")
        || name.contains("//")
        || name.contains("@{")
        || name.ends_with('/')
        || name.ends_with(".lock")
        || name.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TenantResolver {
        TenantResolver::new(
            TenantConfig::default()
                .with_per_tenant_branches(true)
                .with_override("globex", "customers/globex"),
        )
    }

    #[test]
    fn test_no_tenant_uses_base() {
        assert_eq!(resolver().resolve(None), "main");
        assert_eq!(resolver().resolve(Some("")), "main");
    }

    #[test]
    fn test_override_first() {
        assert_eq!(resolver().resolve(Some("globex")), "customers/globex");
    }

    #[test]
    fn test_convention() {
        assert_eq!(resolver().resolve(Some("acme")), "tenant/acme");
        assert_eq!(resolver().resolve(Some("acme")), resolver().resolve(Some("acme")));
    }

    #[test]
    fn test_convention_disabled() {
        let resolver = TenantResolver::new(TenantConfig::default());
        assert_eq!(resolver.resolve(Some("acme")), "main");
    }

    #[test]
    fn test_unsafe_tenant_falls_back() {
        let resolver = resolver();
        assert_eq!(resolver.resolve(Some("../etc")), "main");
        assert_eq!(resolver.resolve(Some("a;rm -rf")), "main");
        assert_eq!(resolver.resolve(Some("x.lock")), "main");
    }

    #[test]
    fn test_task_queue() {
        let resolver = resolver();
        assert_eq!(
            resolver.task_queue_for("volcano-workflows", Some("enterprise-corp")),
            "volcano-workflows-enterprise-corp"
        );
        assert_eq!(
            resolver.task_queue_for("volcano-workflows", None),
            "volcano-workflows"
        );
    }

    #[test]
    fn test_is_safe_branch_name() {
        assert!(is_safe_branch_name("main"));
        assert!(is_safe_branch_name("tenant/acme-1"));
        assert!(!is_safe_branch_name(""));
        assert!(!is_safe_branch_name("-x"));
        assert!(!is_safe_branch_name("a..b"));
        assert!(!is_safe_branch_name("a b"));
        assert!(!is_safe_branch_name(&"a".repeat(256)));
    }

    #[test]
    fn test_known_branches() {
        assert_eq!(resolver().known_branches(), vec!["customers/globex", "main"]);
    }
}
