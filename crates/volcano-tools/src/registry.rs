//! Registry - Tool definitions and the installed tool map
//!
//! A [`ToolRegistry`] is an immutable value: definitions are shared behind
//! `Arc` and a changed definition always produces a new [`InstalledTool`].
//! Snapshots clone the registry (cheap, `Arc` per entry) and swap the whole
//! thing at once, so nothing here is ever mutated while readers hold it.

use crate::builtins::ArithmeticOp;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Domain shared by the arithmetic tools
pub const MATH_DOMAIN: &str = "math";

/// Closed set of tool variants a definition can select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// `a + b`
    Add,
    /// `a - b`
    Subtract,
    /// `a * b`
    Multiply,
    /// `a / b`
    Divide,
    /// Reads the session's last result
    ResolveReference,
    /// Table lookup keyed by the first identifier
    Lookup,
    /// String template filled with extracted entities
    Template,
}

impl ToolKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::ResolveReference => "resolve_reference",
            Self::Lookup => "lookup",
            Self::Template => "template",
        }
    }

    /// The arithmetic operator this kind implements, if any
    #[must_use]
    pub fn arithmetic_op(&self) -> Option<ArithmeticOp> {
        match self {
            Self::Add => Some(ArithmeticOp::Add),
            Self::Subtract => Some(ArithmeticOp::Subtract),
            Self::Multiply => Some(ArithmeticOp::Multiply),
            Self::Divide => Some(ArithmeticOp::Divide),
            _ => None,
        }
    }

    /// Domain used when a definition leaves `domain` empty
    #[must_use]
    pub fn default_domain(&self) -> Option<&'static str> {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::ResolveReference => {
                Some(MATH_DOMAIN)
            }
            Self::Lookup | Self::Template => None,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tool metadata as loaded from a definition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// Definition version (dotted numeric)
    pub version: String,
    /// Which built-in variant implements this tool
    pub kind: ToolKind,
    /// Classification domain the tool serves
    #[serde(default)]
    pub domain: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Classification patterns (case-insensitive regular expressions)
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Kind-specific configuration
    #[serde(default)]
    pub config: serde_json::Value,
    /// Rule ordering inside the tool group (higher first)
    #[serde(default)]
    pub priority: i32,
    /// Whether the tool is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ToolDefinition {
    /// Create a new tool definition
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ToolKind) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            kind,
            domain: kind.default_domain().unwrap_or_default().to_string(),
            description: String::new(),
            patterns: Vec::new(),
            config: serde_json::Value::Null,
            priority: 0,
            enabled: true,
        }
    }

    /// Set the version
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the domain
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a classification pattern
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Set the kind-specific configuration
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Set the rule priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set enabled status
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fill defaults that depend on other fields (currently the domain)
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.domain.trim().is_empty() {
            if let Some(domain) = self.kind.default_domain() {
                self.domain = domain.to_string();
            }
        }
        self
    }
}

/// Read-only view of a session handed to tools
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionContext<'a> {
    /// Session identifier, if the request carried one
    pub session_id: Option<&'a str>,
    /// Result of the last successful fast-path run in this session
    pub last_result: Option<&'a serde_json::Value>,
}

impl<'a> SessionContext<'a> {
    /// Context for a request without a session
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context for a session with an optional prior result
    #[must_use]
    pub fn new(session_id: Option<&'a str>, last_result: Option<&'a serde_json::Value>) -> Self {
        Self {
            session_id,
            last_result,
        }
    }
}

/// Trait for tool implementations
///
/// Implementations must be pure and complete within the fast-path budget:
/// no I/O, no blocking, no shared mutable state.
pub trait Tool: Send + Sync {
    /// Get the tool definition
    fn definition(&self) -> &ToolDefinition;

    /// Execute the tool with resolved arguments
    fn execute(&self, arguments: &serde_json::Value, ctx: &SessionContext<'_>)
        -> Result<serde_json::Value>;

    /// Validate input before execution
    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        if !input.is_object() {
            return Err(Error::InvalidInput("input must be an object".to_string()));
        }
        Ok(())
    }
}

/// A definition together with the implementation built from it
#[derive(Clone)]
pub struct InstalledTool {
    /// The definition the tool was built from
    pub definition: Arc<ToolDefinition>,
    /// The implementation
    pub tool: Arc<dyn Tool>,
    /// Path of the definition file that owns this name (`None` for built-ins)
    pub source_path: Option<String>,
}

impl std::fmt::Debug for InstalledTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledTool")
            .field("definition", &self.definition)
            .field("source_path", &self.source_path)
            .finish()
    }
}

/// Immutable name → tool map
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, InstalledTool>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a tool, returning the previous entry
    pub fn insert(&mut self, installed: InstalledTool) -> Option<InstalledTool> {
        let name = installed.definition.name.clone();
        debug!(tool = %name, kind = %installed.definition.kind, "Registering tool");
        self.tools.insert(name, installed)
    }

    /// Remove a tool by name
    pub fn remove(&mut self, name: &str) -> Option<InstalledTool> {
        self.tools.remove(name)
    }

    /// Get a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&InstalledTool> {
        self.tools.get(name)
    }

    /// Get a tool definition by name
    #[must_use]
    pub fn get_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| t.definition.as_ref())
    }

    /// Check if a tool exists
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Name of the tool that owns `path`, if any
    #[must_use]
    pub fn name_for_path(&self, path: &str) -> Option<&str> {
        self.tools
            .values()
            .find(|t| t.source_path.as_deref() == Some(path))
            .map(|t| t.definition.name.as_str())
    }

    /// List all tool names (sorted)
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Iterate installed tools in name order
    pub fn iter(&self) -> impl Iterator<Item = &InstalledTool> {
        self.tools.values()
    }

    /// List enabled tool definitions
    #[must_use]
    pub fn list_enabled(&self) -> Vec<&ToolDefinition> {
        self.tools
            .values()
            .map(|t| t.definition.as_ref())
            .filter(|d| d.enabled)
            .collect()
    }

    /// Lowest-named enabled tool implementing `op`
    #[must_use]
    pub fn tool_for_op(&self, op: ArithmeticOp) -> Option<&str> {
        self.tools
            .values()
            .find(|t| t.definition.enabled && t.definition.kind.arithmetic_op() == Some(op))
            .map(|t| t.definition.name.as_str())
    }

    /// Lowest-named enabled tool of the given kind
    #[must_use]
    pub fn tool_of_kind(&self, kind: ToolKind) -> Option<&str> {
        self.tools
            .values()
            .find(|t| t.definition.enabled && t.definition.kind == kind)
            .map(|t| t.definition.name.as_str())
    }

    /// Get tool count
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
