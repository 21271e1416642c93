//! Request pipeline
//!
//! ```text
//! text ──▶ Classifier ──▶ Extractor ──▶ Decomposer ──▶ ExecutionPlan
//!            (rules)       (entities)    (tool steps)
//! ```
//!
//! Every stage is a pure function of its inputs and the snapshot it was
//! handed, so the same text against the same snapshot always yields the
//! same plan.

pub mod classifier;
pub mod decomposer;
pub mod entity;
pub mod extractor;
pub mod plan;

pub use classifier::{Classification, Classifier, DEFAULT_MAX_INPUT_LENGTH};
pub use decomposer::{DecompositionError, Decomposer};
pub use entity::{
    depth, walk, DateValue, Entity, EntityKind, EntityValue, OperatorForm, RelativeDate, Span,
    MAX_GROUP_DEPTH,
};
pub use extractor::extract;
pub use plan::{as_step_ref, step_ref, ExecutionPlan, ToolInvocation, STEP_REF_KEY};
