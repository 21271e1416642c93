//! Snapshot - one immutable view of a branch's definitions
//!
//! A snapshot is built by the reload coordinator, installed once, and then
//! only ever read through `Arc<Snapshot>`. The coordinator derives the next
//! snapshot by cloning the current one and applying validated changes; the
//! clone is shallow (every definition sits behind an `Arc`).

use crate::definition::compile_patterns;
use crate::source::Revision;
use crate::workflow::{InstalledWorkflow, WorkflowDefinition};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use volcano_tools::builtins::{ArithmeticTool, ResolveReferenceTool};
use volcano_tools::{InstalledTool, Tool, ToolDefinition, ToolKind, ToolRegistry};

/// Workflow used for unclassified and over-threshold requests
pub const GENERAL_PURPOSE_WORKFLOW: &str = "GeneralPurposeWorkflow";

/// Which definition group a rule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGroup {
    /// Workflow rules are evaluated first
    Workflow,
    /// Then tool rules
    Tool,
}

impl RuleGroup {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Tool => "tool",
        }
    }
}

/// A compiled classification rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Stable id: `<group>:<name>#<pattern index>`
    pub id: String,
    /// Source group
    pub group: RuleGroup,
    /// Domain assigned on match
    pub domain: String,
    /// Tool or workflow name that owns the rule
    pub target: String,
    /// Compiled pattern
    pub regex: Regex,
}

/// Immutable per-branch view of tools, workflows, config and rules
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    tools: ToolRegistry,
    workflows: BTreeMap<String, InstalledWorkflow>,
    config_files: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    config: BTreeMap<String, serde_json::Value>,
    revision: Option<Revision>,
    rules: Vec<Rule>,
}

impl Snapshot {
    /// Built-in snapshot: the math tools and the stock workflows
    #[must_use]
    pub fn builtin() -> Self {
        let mut snapshot = Self::default();

        let math_tools = [
            ToolDefinition::new("add", ToolKind::Add)
                .with_description("Add two numbers")
                .with_pattern(r"\b(calculate|compute|evaluate)\b")
                .with_pattern(r"\bplus\b|\badd\b|\+"),
            ToolDefinition::new("subtract", ToolKind::Subtract)
                .with_description("Subtract the second number from the first")
                .with_pattern(r"\bminus\b|\bsubtract\b")
                .with_pattern(r"\d\s*-\s*\d"),
            ToolDefinition::new("multiply", ToolKind::Multiply)
                .with_description("Multiply two numbers")
                .with_pattern(r"\btimes\b|\bmultipl(y|ied)\b|[*×]"),
            ToolDefinition::new("divide", ToolKind::Divide)
                .with_description("Divide the first number by the second")
                .with_pattern(r"\bdivided?\b|\bover\b|[/÷]"),
        ];
        for definition in math_tools {
            let tool: Arc<dyn Tool> = Arc::new(ArithmeticTool::new(definition.clone()));
            snapshot.insert_tool(definition, tool, None);
        }

        let reference = ToolDefinition::new("resolve_reference", ToolKind::ResolveReference)
            .with_description("Resolve 'it' / 'that' to the session's last result");
        let tool: Arc<dyn Tool> = Arc::new(ResolveReferenceTool::new(reference.clone()));
        snapshot.insert_tool(reference, tool, None);

        let workflows = [
            WorkflowDefinition::new("DataPipelineWorkflow", "data_pipeline")
                .with_description("Extract, transform and load a dataset")
                .with_pattern(r"\b(etl|data pipeline|ingest(ion)?)\b")
                .with_pattern(r"\bprocess\b.*\bdata\b")
                .with_stages(&["extract", "transform", "load"]),
            WorkflowDefinition::new("GitOpsWorkflow", "gitops")
                .with_description("Deploy a change through git")
                .with_pattern(r"\b(deploy(ment)?|gitops|rollout|rollback)\b")
                .with_max_duration("30m")
                .with_stages(&["validate", "apply", "verify"]),
            WorkflowDefinition::new("CustomerOnboardingWorkflow", "onboarding")
                .with_description("Provision and welcome a new customer")
                .with_pattern(r"\bonboard(ing)?\b")
                .with_pattern(r"\bnew customer\b")
                .with_stages(&["validate_customer", "provision_account", "send_welcome"]),
            WorkflowDefinition::new("LongRunningAnalyticsWorkflow", "analytics")
                .with_description("Long-running analytics job with pause/resume")
                .with_pattern(r"\banaly(sis|ze|se|tics)\b")
                .with_pattern(r"\breport\b")
                .with_max_duration("24h")
                .with_stages(&["collect", "aggregate", "report"]),
            WorkflowDefinition::new(GENERAL_PURPOSE_WORKFLOW, "general")
                .with_description("Fallback for requests the fast path cannot serve"),
        ];
        for definition in workflows {
            snapshot.insert_workflow(definition, None);
        }

        snapshot.rebuild_rules();
        snapshot
    }

    /// Installed tools
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Look up a tool by name
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&InstalledTool> {
        self.tools.get(name)
    }

    /// Installed workflows, by name
    pub fn workflows(&self) -> impl Iterator<Item = &InstalledWorkflow> {
        self.workflows.values()
    }

    /// Look up a workflow by type name
    #[must_use]
    pub fn workflow(&self, name: &str) -> Option<&Arc<WorkflowDefinition>> {
        self.workflows.get(name).map(|w| &w.definition)
    }

    /// Lowest-named workflow serving `domain`
    #[must_use]
    pub fn workflow_for_domain(&self, domain: &str) -> Option<&Arc<WorkflowDefinition>> {
        self.workflows
            .values()
            .find(|w| w.definition.domain == domain)
            .map(|w| &w.definition)
    }

    /// Merged, flattened config (`a.b.c` → value)
    #[must_use]
    pub fn config(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.config
    }

    /// A config value as an unsigned integer
    #[must_use]
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(serde_json::Value::as_u64)
    }

    /// A config value as a list of strings (non-string items are skipped)
    #[must_use]
    pub fn config_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.config.get(key).and_then(|v| v.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
    }

    /// Revision this snapshot was built from (`None` for the built-in snapshot)
    #[must_use]
    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    /// Classification rules in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Path that owns the tool named `name`; `Some(None)` for a built-in
    #[must_use]
    pub fn tool_owner(&self, name: &str) -> Option<Option<&str>> {
        self.tools.get(name).map(|t| t.source_path.as_deref())
    }

    /// Path that owns the workflow named `name`; `Some(None)` for a built-in
    #[must_use]
    pub fn workflow_owner(&self, name: &str) -> Option<Option<&str>> {
        self.workflows.get(name).map(|w| w.source_path.as_deref())
    }

    /// Copy of this snapshot with `tool` installed under its definition's name
    ///
    /// For embedding custom tool implementations; the result is not
    /// installed anywhere until the caller does so.
    #[must_use]
    pub fn with_tool(mut self, definition: ToolDefinition, tool: Arc<dyn Tool>) -> Self {
        self.insert_tool(definition.normalized(), tool, None);
        self.rebuild_rules();
        self
    }

    // -- mutation, used only while the coordinator builds the next snapshot --

    pub(crate) fn insert_tool(
        &mut self,
        definition: ToolDefinition,
        tool: Arc<dyn Tool>,
        source_path: Option<String>,
    ) {
        self.tools.insert(InstalledTool {
            definition: Arc::new(definition),
            tool,
            source_path,
        });
    }

    pub(crate) fn insert_workflow(
        &mut self,
        definition: WorkflowDefinition,
        source_path: Option<String>,
    ) {
        self.workflows.insert(
            definition.name.clone(),
            InstalledWorkflow {
                definition: Arc::new(definition),
                source_path,
            },
        );
    }

    pub(crate) fn insert_config_file(
        &mut self,
        path: &str,
        values: BTreeMap<String, serde_json::Value>,
    ) {
        self.config_files.insert(path.to_string(), values);
        self.merge_config();
    }

    /// Drop whatever `path` defines; returns whether anything was removed
    pub(crate) fn remove_path(&mut self, path: &str) -> bool {
        let mut removed = false;

        if let Some(name) = self.tools.name_for_path(path).map(str::to_string) {
            self.tools.remove(&name);
            removed = true;
        }

        let workflow = self
            .workflows
            .values()
            .find(|w| w.source_path.as_deref() == Some(path))
            .map(|w| w.definition.name.clone());
        if let Some(name) = workflow {
            self.workflows.remove(&name);
            removed = true;
        }

        if self.config_files.remove(path).is_some() {
            self.merge_config();
            removed = true;
        }

        removed
    }

    pub(crate) fn set_revision(&mut self, revision: Revision) {
        self.revision = Some(revision);
    }

    fn merge_config(&mut self) {
        // later paths (ascending order) override earlier ones
        self.config = self
            .config_files
            .values()
            .flat_map(|values| values.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect();
    }

    /// Recompile the ordered rule list: workflow rules, then tool rules;
    /// each group by descending priority, then name, then pattern index
    pub(crate) fn rebuild_rules(&mut self) {
        let mut entries: Vec<(RuleGroup, i32, &str, &str, &[String])> = Vec::new();

        for workflow in self.workflows.values() {
            let def = &workflow.definition;
            entries.push((
                RuleGroup::Workflow,
                def.priority,
                def.name.as_str(),
                def.domain.as_str(),
                def.patterns.as_slice(),
            ));
        }
        for tool in self.tools.iter() {
            let def = &tool.definition;
            if def.enabled {
                entries.push((
                    RuleGroup::Tool,
                    def.priority,
                    def.name.as_str(),
                    def.domain.as_str(),
                    def.patterns.as_slice(),
                ));
            }
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));

        let mut rules = Vec::new();
        for (group, _, name, domain, patterns) in entries {
            let compiled = match compile_patterns(patterns) {
                Ok(compiled) => compiled,
                Err(e) => {
                    // installed definitions were validated; only reachable for hand-built ones
                    warn!(definition = %name, error = %e, "Skipping rules for definition");
                    continue;
                }
            };
            for (index, regex) in compiled.into_iter().enumerate() {
                rules.push(Rule {
                    id: format!("{}:{}#{}", group.as_str(), name, index),
                    group,
                    domain: domain.to_string(),
                    target: name.to_string(),
                    regex,
                });
            }
        }

        self.rules = rules;
    }
}
