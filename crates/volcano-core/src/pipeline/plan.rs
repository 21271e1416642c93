//! Execution plans

use serde::Serialize;

/// Key of an argument that refers to an earlier step's output
pub const STEP_REF_KEY: &str = "$step";

/// One tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    /// Tool to call
    pub tool_name: String,
    /// Arguments; `{"$step": i}` values are replaced by step `i`'s output
    pub arguments: serde_json::Value,
}

impl ToolInvocation {
    /// Create an invocation
    #[must_use]
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Ordered tool calls; the last step's output is the answer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionPlan {
    steps: Vec<ToolInvocation>,
}

impl ExecutionPlan {
    /// Create an empty plan
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and return a reference to its output
    pub fn push(&mut self, invocation: ToolInvocation) -> serde_json::Value {
        self.steps.push(invocation);
        step_ref(self.steps.len() - 1)
    }

    /// Steps in execution order
    #[must_use]
    pub fn steps(&self) -> &[ToolInvocation] {
        &self.steps
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<Vec<ToolInvocation>> for ExecutionPlan {
    fn from(steps: Vec<ToolInvocation>) -> Self {
        Self { steps }
    }
}

/// `{"$step": index}`
#[must_use]
pub fn step_ref(index: usize) -> serde_json::Value {
    serde_json::json!({ STEP_REF_KEY: index })
}

/// Step index if `value` is a step reference
#[must_use]
pub fn as_step_ref(value: &serde_json::Value) -> Option<usize> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object
        .get(STEP_REF_KEY)?
        .as_u64()
        .and_then(|i| usize::try_from(i).ok())
}
