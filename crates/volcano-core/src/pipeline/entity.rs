//! Entities produced by the extractor
//!
//! Entities borrow from the request text and live only until the plan is
//! built.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use volcano_tools::ArithmeticOp;

/// Byte range of an entity in the request text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Create a span
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// How an operator was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorForm {
    /// `+ - * / × ÷`
    Symbol,
    /// `plus`, `minus`, `times`, `multiplied`, `divided`, `over`
    Infix,
    /// `add`, `subtract`, `multiply`, `divide`; starts a clause
    Verb,
}

/// `today` / `tomorrow` / `yesterday`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeDate {
    /// Today
    Today,
    /// Today + 1
    Tomorrow,
    /// Today - 1
    Yesterday,
}

impl RelativeDate {
    /// Resolve against `today`
    #[must_use]
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Today => today,
            Self::Tomorrow => today.checked_add_days(Days::new(1)).unwrap_or(today),
            Self::Yesterday => today.checked_sub_days(Days::new(1)).unwrap_or(today),
        }
    }
}

/// A date as written in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateValue {
    /// `YYYY-MM-DD`
    Iso(NaiveDate),
    /// Relative to the day the request is decomposed
    Relative(RelativeDate),
}

impl DateValue {
    /// Calendar date, resolving relative dates against `today`
    #[must_use]
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Iso(date) => *date,
            Self::Relative(relative) => relative.resolve(today),
        }
    }
}

/// Entity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Integer or decimal
    Number,
    /// Arithmetic operator
    Operator,
    /// ISO or relative date
    Date,
    /// Word containing a digit, `_` or `-`
    Identifier,
    /// Unresolved "it" / "that"
    Reference,
    /// Parenthesized sub-expression
    Group,
}

/// Entity payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityValue<'a> {
    /// Numeric literal
    Number(f64),
    /// Operator and its written form
    Operator {
        /// Operation
        op: ArithmeticOp,
        /// Written form
        form: OperatorForm,
    },
    /// Date
    Date(DateValue),
    /// Identifier text as written
    Identifier(&'a str),
    /// "it" / "that"
    Reference,
    /// Entities inside the parentheses
    Group(Vec<Entity<'a>>),
}

/// One extracted entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity<'a> {
    /// Payload
    pub value: EntityValue<'a>,
    /// Where it was found
    pub span: Span,
}

impl<'a> Entity<'a> {
    /// Create an entity
    #[must_use]
    pub fn new(value: EntityValue<'a>, span: Span) -> Self {
        Self { value, span }
    }

    /// Entity category
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self.value {
            EntityValue::Number(_) => EntityKind::Number,
            EntityValue::Operator { .. } => EntityKind::Operator,
            EntityValue::Date(_) => EntityKind::Date,
            EntityValue::Identifier(_) => EntityKind::Identifier,
            EntityValue::Reference => EntityKind::Reference,
            EntityValue::Group(_) => EntityKind::Group,
        }
    }

    /// Whether this entity can stand as an operand
    #[must_use]
    pub fn is_operand(&self) -> bool {
        matches!(
            self.value,
            EntityValue::Number(_) | EntityValue::Reference | EntityValue::Group(_)
        )
    }
}

/// Deepest parenthesis nesting a request may use
pub const MAX_GROUP_DEPTH: usize = 64;

/// Nesting depth of the deepest group; a flat list has depth 0
#[must_use]
pub fn depth(entities: &[Entity<'_>]) -> usize {
    entities
        .iter()
        .map(|entity| match &entity.value {
            EntityValue::Group(children) => 1 + depth(children),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

/// Depth-first walk over entities, descending into groups
pub fn walk<'e, 'a>(entities: &'e [Entity<'a>], visit: &mut impl FnMut(&'e Entity<'a>)) {
    for entity in entities {
        if let EntityValue::Group(children) = &entity.value {
            walk(children, visit);
        } else {
            visit(entity);
        }
    }
}
