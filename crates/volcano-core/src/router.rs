//! Intelligent router - fast path or durable path
//!
//! Rules, first match wins:
//! 1. classified domain is on the durable allow-list → durable
//! 2. nothing matched → durable
//! 3. plan has more than `max_fast_steps` steps → durable
//! 4. otherwise → fast
//!
//! The allow-list is the configured domains plus the domain of every
//! installed workflow. Both settings can be overridden per branch through
//! `router.durable_domains` / `router.max_fast_steps` in a config file.

use crate::pipeline::Classification;
use serde::{Deserialize, Serialize};
use volcano_registry::Snapshot;

/// Snapshot config key overriding [`RouterConfig::durable_domains`]
pub const DURABLE_DOMAINS_KEY: &str = "router.durable_domains";
/// Snapshot config key overriding [`RouterConfig::max_fast_steps`]
pub const MAX_FAST_STEPS_KEY: &str = "router.max_fast_steps";

/// Router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Domains always sent to the durable path
    pub durable_domains: Vec<String>,
    /// Largest plan the fast path will run
    pub max_fast_steps: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            durable_domains: Vec::new(),
            max_fast_steps: 5,
        }
    }
}

/// Execution path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Synchronous tool execution
    Fast,
    /// Workflow on the durable engine
    Durable,
}

impl Route {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Durable => "durable",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a route was chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RouteReason {
    /// Domain is on the durable allow-list
    DurableDomain {
        /// Classified domain
        domain: String,
    },
    /// No rule matched
    UnknownDomain,
    /// Plan is larger than the fast-path limit
    TooManySteps {
        /// Planned steps
        steps: usize,
        /// Limit in effect
        max: usize,
    },
    /// Small plan in a fast-path domain
    Simple,
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DurableDomain { domain } => write!(f, "domain '{domain}' is durable"),
            Self::UnknownDomain => f.write_str("unclassified request"),
            Self::TooManySteps { steps, max } => {
                write!(f, "{steps} steps exceeds fast-path limit of {max}")
            }
            Self::Simple => f.write_str("simple request"),
        }
    }
}

/// A routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    /// Chosen path
    pub route: Route,
    /// Why
    #[serde(flatten)]
    pub reason: RouteReason,
}

impl RouteDecision {
    fn durable(reason: RouteReason) -> Self {
        Self {
            route: Route::Durable,
            reason,
        }
    }
}

/// Stateless router
#[derive(Debug, Clone, Default)]
pub struct IntelligentRouter {
    config: RouterConfig,
}

impl IntelligentRouter {
    /// Create a router
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Step limit in effect for `snapshot`
    #[must_use]
    pub fn max_fast_steps(&self, snapshot: &Snapshot) -> usize {
        snapshot
            .config_u64(MAX_FAST_STEPS_KEY)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(self.config.max_fast_steps)
    }

    /// Whether `domain` is on the durable allow-list for `snapshot`
    #[must_use]
    pub fn is_durable_domain(&self, domain: &str, snapshot: &Snapshot) -> bool {
        let configured = snapshot
            .config_string_list(DURABLE_DOMAINS_KEY)
            .unwrap_or_else(|| self.config.durable_domains.clone());
        configured.iter().any(|d| d == domain)
            || snapshot.workflows().any(|w| w.definition.domain == domain)
    }

    /// Decide from the classification alone, if possible
    ///
    /// Returns `None` when the answer depends on the plan size.
    #[must_use]
    pub fn route_before_planning(
        &self,
        classification: &Classification,
        snapshot: &Snapshot,
    ) -> Option<RouteDecision> {
        if self.is_durable_domain(&classification.domain, snapshot) {
            return Some(RouteDecision::durable(RouteReason::DurableDomain {
                domain: classification.domain.clone(),
            }));
        }
        if classification.is_unknown() {
            return Some(RouteDecision::durable(RouteReason::UnknownDomain));
        }
        None
    }

    /// Full decision once the plan size is known
    #[must_use]
    pub fn route(
        &self,
        classification: &Classification,
        planned_steps: usize,
        snapshot: &Snapshot,
    ) -> RouteDecision {
        if let Some(decision) = self.route_before_planning(classification, snapshot) {
            return decision;
        }

        let max = self.max_fast_steps(snapshot);
        if planned_steps > max {
            return RouteDecision::durable(RouteReason::TooManySteps {
                steps: planned_steps,
                max,
            });
        }

        RouteDecision {
            route: Route::Fast,
            reason: RouteReason::Simple,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Classifier;

    fn classify(text: &str, snapshot: &Snapshot) -> Classification {
        Classifier::default().classify(text, snapshot)
    }

    #[test]
    fn test_step_threshold() {
        let snapshot = Snapshot::builtin();
        let router = IntelligentRouter::default();
        let math = classify("calculate 1 + 1", &snapshot);

        assert_eq!(router.route(&math, 5, &snapshot).route, Route::Fast);
        assert_eq!(
            router.route(&math, 6, &snapshot).reason,
            RouteReason::TooManySteps { steps: 6, max: 5 }
        );
    }

    #[test]
    fn test_workflow_domains_are_durable() {
        let snapshot = Snapshot::builtin();
        let router = IntelligentRouter::default();
        let decision = router
            .route_before_planning(&classify("deploy the api", &snapshot), &snapshot)
            .unwrap();
        assert_eq!(decision.route, Route::Durable);
        assert_eq!(
            decision.reason,
            RouteReason::DurableDomain {
                domain: "gitops".to_string()
            }
        );
    }

    #[test]
    fn test_configured_durable_domain() {
        let snapshot = Snapshot::builtin();
        let router = IntelligentRouter::new(RouterConfig {
            durable_domains: vec!["math".to_string()],
            ..Default::default()
        });
        let decision = router.route(&classify("calculate 1 + 1", &snapshot), 1, &snapshot);
        assert_eq!(decision.route, Route::Durable);
    }

    #[test]
    fn test_unknown_goes_durable() {
        let snapshot = Snapshot::builtin();
        let decision = IntelligentRouter::default().route(&Classification::unknown(), 1, &snapshot);
        assert_eq!(decision.route, Route::Durable);
        assert_eq!(decision.reason, RouteReason::UnknownDomain);
    }

    #[test]
    fn test_allow_list_checked_before_unknown() {
        let snapshot = Snapshot::builtin();
        let unknown = Classification::unknown();
        let router = IntelligentRouter::new(RouterConfig {
            durable_domains: vec![unknown.domain.clone()],
            ..Default::default()
        });
        let decision = router.route(&unknown, 1, &snapshot);
        assert_eq!(decision.route, Route::Durable);
        assert_eq!(
            decision.reason,
            RouteReason::DurableDomain {
                domain: unknown.domain.clone()
            }
        );
    }

    #[test]
    fn test_decision_serializes_flat() {
        let decision = RouteDecision {
            route: Route::Fast,
            reason: RouteReason::Simple,
        };
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            serde_json::json!({"route": "fast", "reason": "simple"})
        );
    }
}
