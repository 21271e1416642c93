//! `lookup` - table lookup keyed by the first extracted identifier
//!
//! ```json
//! {"table": {"enterprise-corp": "platinum"}, "default": "standard"}
//! ```

use super::string_args;
use crate::error::{Error, Result};
use crate::registry::{SessionContext, Tool, ToolDefinition};
use std::collections::HashMap;

/// Static table lookup
pub struct LookupTool {
    definition: ToolDefinition,
    /// Keys stored lowercased
    table: HashMap<String, serde_json::Value>,
    default: Option<serde_json::Value>,
}

impl LookupTool {
    /// Create the tool; `config.table` must be an object
    pub fn new(definition: ToolDefinition) -> Result<Self> {
        let table = definition
            .config
            .get("table")
            .and_then(|t| t.as_object())
            .ok_or_else(|| {
                Error::InvalidDefinition("lookup tool requires a 'table' object".to_string())
            })?
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();
        let default = definition.config.get("default").cloned();

        Ok(Self {
            definition,
            table,
            default,
        })
    }
}

impl Tool for LookupTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn execute(
        &self,
        arguments: &serde_json::Value,
        _ctx: &SessionContext<'_>,
    ) -> Result<serde_json::Value> {
        self.validate_input(arguments)?;
        let key = string_args(arguments, "identifiers")
            .first()
            .map(|s| s.to_lowercase())
            .ok_or_else(|| Error::InvalidInput("an identifier is required".to_string()))?;

        self.table
            .get(&key)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| Error::Execution(format!("no entry for '{key}'")))
    }
}
