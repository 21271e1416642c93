//! `resolve_reference` - yields the session's last result

use crate::error::{Error, Result};
use crate::registry::{SessionContext, Tool, ToolDefinition};

/// Resolves "it" / "that" against the session
pub struct ResolveReferenceTool {
    definition: ToolDefinition,
}

impl ResolveReferenceTool {
    /// Create the tool
    #[must_use]
    pub fn new(definition: ToolDefinition) -> Self {
        Self { definition }
    }
}

impl Tool for ResolveReferenceTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn execute(
        &self,
        _arguments: &serde_json::Value,
        ctx: &SessionContext<'_>,
    ) -> Result<serde_json::Value> {
        ctx.last_result.cloned().ok_or(Error::MissingReference)
    }

    fn validate_input(&self, _input: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolKind;
    use serde_json::json;

    #[test]
    fn test_resolves_last_result() {
        let tool = ResolveReferenceTool::new(ToolDefinition::new(
            "resolve_reference",
            ToolKind::ResolveReference,
        ));
        let last = json!(150);
        let ctx = SessionContext::new(Some("s1"), Some(&last));

        assert_eq!(tool.execute(&json!({}), &ctx).unwrap(), json!(150));
    }

    #[test]
    fn test_missing_reference() {
        let tool = ResolveReferenceTool::new(ToolDefinition::new(
            "resolve_reference",
            ToolKind::ResolveReference,
        ));
        let err = tool.execute(&json!({}), &SessionContext::empty()).unwrap_err();
        assert_eq!(err, Error::MissingReference);
    }
}
