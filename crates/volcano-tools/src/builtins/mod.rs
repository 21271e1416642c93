//! Built-in tool variants
//!
//! Every installable tool is one of these variants; a definition file picks
//! the variant through `kind` and parameterizes it through `config`.

mod arithmetic;
mod lookup;
mod reference;
mod template;

pub use arithmetic::{ArithmeticOp, ArithmeticTool};
pub use lookup::LookupTool;
pub use reference::ResolveReferenceTool;
pub use template::TemplateTool;

use crate::error::Result;
use crate::registry::{Tool, ToolDefinition, ToolKind};
use std::sync::Arc;

/// Build the implementation for a definition, validating kind-specific config
pub fn build_tool(definition: ToolDefinition) -> Result<Arc<dyn Tool>> {
    let tool: Arc<dyn Tool> = match definition.kind {
        ToolKind::Add | ToolKind::Subtract | ToolKind::Multiply | ToolKind::Divide => {
            Arc::new(ArithmeticTool::new(definition))
        }
        ToolKind::ResolveReference => Arc::new(ResolveReferenceTool::new(definition)),
        ToolKind::Lookup => Arc::new(LookupTool::new(definition)?),
        ToolKind::Template => Arc::new(TemplateTool::new(definition)?),
    };
    Ok(tool)
}

/// JSON number for an `f64`, emitted as an integer when the value is integral
#[must_use]
pub fn number_value(value: f64) -> serde_json::Value {
    // 2^53: beyond this, integral f64 values no longer map 1:1 to i64
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT {
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// String arguments under `key` (missing key → empty)
pub(crate) fn string_args<'a>(arguments: &'a serde_json::Value, key: &str) -> Vec<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(100.0), json!(100));
        assert_eq!(number_value(-3.0), json!(-3));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(f64::NAN), serde_json::Value::Null);
    }

    #[test]
    fn test_build_tool_per_kind() {
        let add = build_tool(ToolDefinition::new("add", ToolKind::Add)).unwrap();
        assert_eq!(add.definition().name, "add");

        let reference =
            build_tool(ToolDefinition::new("resolve_reference", ToolKind::ResolveReference))
                .unwrap();
        assert_eq!(reference.definition().kind, ToolKind::ResolveReference);
    }

    #[test]
    fn test_build_tool_rejects_bad_config() {
        let lookup = ToolDefinition::new("tiers", ToolKind::Lookup).with_domain("tiers");
        assert!(build_tool(lookup).is_err());

        let template = ToolDefinition::new("greet", ToolKind::Template)
            .with_domain("greeting")
            .with_config(json!({"template": 42}));
        assert!(build_tool(template).is_err());
    }
}
