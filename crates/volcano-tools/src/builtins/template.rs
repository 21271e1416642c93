//! `template` - fills a string template with extracted entities
//!
//! Placeholders: `{identifier}`, `{number}`, `{date}`, `{last_result}`.
//! Each takes the first entity of that kind; a placeholder with no value is
//! an input error.

use super::string_args;
use crate::error::{Error, Result};
use crate::registry::{SessionContext, Tool, ToolDefinition};

const PLACEHOLDERS: [&str; 4] = ["identifier", "number", "date", "last_result"];

/// String template tool
pub struct TemplateTool {
    definition: ToolDefinition,
    template: String,
}

impl TemplateTool {
    /// Create the tool; `config.template` must be a string using known placeholders
    pub fn new(definition: ToolDefinition) -> Result<Self> {
        let template = definition
            .config
            .get("template")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                Error::InvalidDefinition("template tool requires a 'template' string".to_string())
            })?
            .to_string();

        for name in placeholders(&template) {
            if !PLACEHOLDERS.contains(&name) {
                return Err(Error::InvalidDefinition(format!(
                    "unknown placeholder '{{{name}}}'"
                )));
            }
        }

        Ok(Self {
            definition,
            template,
        })
    }
}

/// Names between `{` and `}` in order of appearance
fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

fn first_number(arguments: &serde_json::Value) -> Option<String> {
    arguments
        .get("numbers")
        .and_then(|v| v.as_array())
        .and_then(|items| items.first())
        .map(|n| n.to_string())
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Tool for TemplateTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn execute(
        &self,
        arguments: &serde_json::Value,
        ctx: &SessionContext<'_>,
    ) -> Result<serde_json::Value> {
        self.validate_input(arguments)?;
        let mut output = self.template.clone();

        for name in PLACEHOLDERS {
            let token = format!("{{{name}}}");
            if !output.contains(&token) {
                continue;
            }
            let value = match name {
                "identifier" => string_args(arguments, "identifiers")
                    .first()
                    .map(|s| (*s).to_string()),
                "number" => first_number(arguments),
                "date" => string_args(arguments, "dates").first().map(|s| (*s).to_string()),
                _ => ctx.last_result.map(render_value),
            };
            let value = value
                .ok_or_else(|| Error::InvalidInput(format!("no value for '{token}'")))?;
            output = output.replace(&token, &value);
        }

        Ok(serde_json::Value::String(output))
    }
}
