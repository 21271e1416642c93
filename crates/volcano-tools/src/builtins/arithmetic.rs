//! Arithmetic tools (`add`, `subtract`, `multiply`, `divide`)

use super::number_value;
use crate::error::{Error, Result};
use crate::registry::{SessionContext, Tool, ToolDefinition};
use serde::{Deserialize, Serialize};

/// The four binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    /// Addition
    Add,
    /// Subtraction
    Subtract,
    /// Multiplication
    Multiply,
    /// Division
    Divide,
}

impl ArithmeticOp {
    /// Apply the operator, rejecting division by zero and non-finite results
    pub fn apply(&self, a: f64, b: f64) -> Result<f64> {
        let value = match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide => {
                if b == 0.0 {
                    return Err(Error::Execution("division by zero".to_string()));
                }
                a / b
            }
        };
        if !value.is_finite() {
            return Err(Error::Execution("result is not a finite number".to_string()));
        }
        Ok(value)
    }

    /// Operator symbol
    #[must_use]
    pub fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Subtract => '-',
            Self::Multiply => '*',
            Self::Divide => '/',
        }
    }

    /// Name of the built-in tool for this operator
    #[must_use]
    pub fn canonical_tool(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
        }
    }

    /// Binding strength (`* /` over `+ -`)
    #[must_use]
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Subtract => 1,
            Self::Multiply | Self::Divide => 2,
        }
    }
}

/// Binary arithmetic over `{"a": number, "b": number}`
pub struct ArithmeticTool {
    definition: ToolDefinition,
    op: ArithmeticOp,
}

impl ArithmeticTool {
    /// Create the tool; `definition.kind` selects the operator
    #[must_use]
    pub fn new(definition: ToolDefinition) -> Self {
        let op = definition.kind.arithmetic_op().unwrap_or(ArithmeticOp::Add);
        Self { definition, op }
    }

    fn operand(arguments: &serde_json::Value, key: &str) -> Result<f64> {
        arguments
            .get(key)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| Error::InvalidInput(format!("operand '{key}' must be a number")))
    }
}

impl Tool for ArithmeticTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn execute(
        &self,
        arguments: &serde_json::Value,
        _ctx: &SessionContext<'_>,
    ) -> Result<serde_json::Value> {
        self.validate_input(arguments)?;
        let a = Self::operand(arguments, "a")?;
        let b = Self::operand(arguments, "b")?;
        self.op.apply(a, b).map(number_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolKind;
    use serde_json::json;

    fn tool(kind: ToolKind) -> ArithmeticTool {
        ArithmeticTool::new(ToolDefinition::new(kind.as_str(), kind))
    }

    #[test]
    fn test_operators() {
        let ctx = SessionContext::empty();
        assert_eq!(
            tool(ToolKind::Add).execute(&json!({"a": 42, "b": 58}), &ctx).unwrap(),
            json!(100)
        );
        assert_eq!(
            tool(ToolKind::Subtract).execute(&json!({"a": 89, "b": 34}), &ctx).unwrap(),
            json!(55)
        );
        assert_eq!(
            tool(ToolKind::Multiply).execute(&json!({"a": 1.5, "b": 3}), &ctx).unwrap(),
            json!(4.5)
        );
        assert_eq!(
            tool(ToolKind::Divide).execute(&json!({"a": 55, "b": 5}), &ctx).unwrap(),
            json!(11)
        );
    }

    #[test]
    fn test_division_by_zero() {
        let err = tool(ToolKind::Divide)
            .execute(&json!({"a": 1, "b": 0}), &SessionContext::empty())
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_missing_operand() {
        let err = tool(ToolKind::Add)
            .execute(&json!({"a": 1}), &SessionContext::empty())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = tool(ToolKind::Add)
            .execute(&json!([1, 2]), &SessionContext::empty())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_precedence() {
        assert!(ArithmeticOp::Multiply.precedence() > ArithmeticOp::Add.precedence());
        assert_eq!(ArithmeticOp::Divide.precedence(), ArithmeticOp::Multiply.precedence());
        assert_eq!(ArithmeticOp::Subtract.canonical_tool(), "subtract");
    }
}
