//! Definition files - format detection, parsing and schema validation
//!
//! Tool and workflow files may be JSON, TOML or YAML; the extension decides.
//! Everything returned from here has passed validation, so installing a
//! parsed definition cannot fail later for schema reasons.

use crate::error::{Error, Result};
use crate::workflow::WorkflowDefinition;
use regex::{Regex, RegexBuilder};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use volcano_tools::ToolDefinition;

/// Maximum length of a classification pattern
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Maximum length of a definition name
const MAX_NAME_LENGTH: usize = 128;

/// Compiled-regex size cap
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Domain reserved for "no rule matched"
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// Serialization format of a definition file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionFormat {
    /// `.json`
    Json,
    /// `.toml`
    Toml,
    /// `.yaml` / `.yml`
    Yaml,
}

impl DefinitionFormat {
    /// Infer the format from a path's extension
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let file = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
        }
    }

    /// Parse raw bytes into a value of this format
    pub fn parse<T: DeserializeOwned>(&self, content: &[u8]) -> Result<T> {
        let parse_err = |message: String| Error::Parse {
            format: self.as_str(),
            message,
        };
        match self {
            Self::Json => serde_json::from_slice(content).map_err(|e| parse_err(e.to_string())),
            Self::Toml => {
                let text = std::str::from_utf8(content).map_err(|e| parse_err(e.to_string()))?;
                toml::from_str(text).map_err(|e| parse_err(e.to_string()))
            }
            Self::Yaml => serde_yaml::from_slice(content).map_err(|e| parse_err(e.to_string())),
        }
    }
}

/// What a changed path defines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    /// File under `tools/`
    Tool,
    /// File under `workflows/`
    Workflow,
    /// File under `config/`
    Config,
}

impl DefinitionKind {
    /// Infer the kind from the nearest `tools/`, `workflows/` or `config/` directory
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let mut segments: Vec<&str> = path.split('/').collect();
        // the last segment is the file itself
        segments.pop();
        segments.iter().rev().find_map(|segment| match *segment {
            "tools" => Some(Self::Tool),
            "workflows" => Some(Self::Workflow),
            "config" => Some(Self::Config),
            _ => None,
        })
    }
}

/// Parse and validate a tool definition
pub fn parse_tool(content: &[u8], format: DefinitionFormat) -> Result<ToolDefinition> {
    let value: serde_json::Value = format.parse(content)?;
    let definition: ToolDefinition = serde_json::from_value(value).map_err(|e| Error::Parse {
        format: format.as_str(),
        message: e.to_string(),
    })?;
    let definition = definition.normalized();
    validate_tool(&definition)?;
    Ok(definition)
}

/// Validate a tool definition's schema
pub fn validate_tool(definition: &ToolDefinition) -> Result<()> {
    validate_name(&definition.name)?;
    validate_version(&definition.version)?;
    validate_domain(&definition.domain)?;
    compile_patterns(&definition.patterns)?;
    // kind-specific config is checked by building the implementation
    volcano_tools::build_tool(definition.clone())?;
    Ok(())
}

/// Parse and validate a workflow definition
pub fn parse_workflow(content: &[u8], format: DefinitionFormat) -> Result<WorkflowDefinition> {
    let value: serde_json::Value = format.parse(content)?;
    let definition: WorkflowDefinition =
        serde_json::from_value(value).map_err(|e| Error::Parse {
            format: format.as_str(),
            message: e.to_string(),
        })?;
    validate_workflow(&definition)?;
    Ok(definition)
}

/// Validate a workflow definition's schema
pub fn validate_workflow(definition: &WorkflowDefinition) -> Result<()> {
    validate_name(&definition.name)?;
    validate_version(&definition.version)?;
    validate_domain(&definition.domain)?;
    if definition.task_queue.trim().is_empty() {
        return Err(Error::Invalid("task_queue must not be empty".to_string()));
    }
    if definition.configuration.retry_policy.maximum_attempts == 0 {
        return Err(Error::Invalid(
            "retry_policy.maximum_attempts must be positive".to_string(),
        ));
    }
    parse_duration(&definition.configuration.max_duration)?;
    compile_patterns(&definition.patterns)?;
    Ok(())
}

/// Parse a config file into flattened `a.b.c` keys
pub fn parse_config(
    content: &[u8],
    format: DefinitionFormat,
) -> Result<BTreeMap<String, serde_json::Value>> {
    let value: serde_json::Value = format.parse(content)?;
    let serde_json::Value::Object(map) = value else {
        return Err(Error::Invalid(
            "config file must contain a table at the top level".to_string(),
        ));
    };

    let mut flat = BTreeMap::new();
    for (key, value) in map {
        flatten_into(&mut flat, key, value);
    }
    Ok(flat)
}

fn flatten_into(flat: &mut BTreeMap<String, serde_json::Value>, prefix: String, value: serde_json::Value) {
    match value {
        serde_json::Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(flat, format!("{prefix}.{key}"), child);
            }
        }
        other => {
            flat.insert(prefix, other);
        }
    }
}

/// Names are non-empty and limited to `[A-Za-z0-9_.-]`
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Invalid("name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::Invalid(format!(
            "name exceeds {MAX_NAME_LENGTH} characters"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(Error::Invalid(format!(
            "name '{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}

/// Versions are dotted numerics such as `1`, `1.2` or `1.2.3`
pub fn validate_version(version: &str) -> Result<()> {
    let valid = !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(Error::Invalid(format!("invalid version '{version}'")))
    }
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.trim().is_empty() {
        return Err(Error::Invalid("domain must not be empty".to_string()));
    }
    if domain == UNKNOWN_DOMAIN {
        return Err(Error::Invalid(format!(
            "domain '{UNKNOWN_DOMAIN}' is reserved"
        )));
    }
    Ok(())
}

/// Compile one classification pattern (case-insensitive, length-limited)
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(Error::Invalid(format!(
            "pattern exceeds {MAX_PATTERN_LENGTH} characters"
        )));
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| Error::Invalid(format!("invalid pattern '{pattern}': {e}")))
}

/// Compile every pattern of a definition
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile_pattern(p)).collect()
}

/// Parse `500ms`, `45s`, `30m`, `1h` or `2d`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| Error::Invalid(format!("invalid duration '{input}'")))?;
    if amount == 0 {
        return Err(Error::Invalid("duration must be positive".to_string()));
    }
    let seconds = match unit {
        "ms" => return Ok(Duration::from_millis(amount)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(Error::Invalid(format!("invalid duration '{input}'"))),
    };
    Ok(Duration::from_secs(amount.saturating_mul(seconds)))
}
