//! Task Decomposer - entities → execution plan
//!
//! Math requests are parsed as a sequence of clauses. A verb-form operator
//! (`add`, `multiply`, ...) starts a new clause; everything else is infix
//! with `* /` binding tighter than `+ -`. Each binary operation becomes one
//! tool invocation, emitted in post-order, so the last step is the answer.
//!
//! ```text
//! "calculate 10 + 5, then multiply by 3"
//!   clause 1: 10 + 5          → #0 add(10, 5)
//!   clause 2: multiply by 3   → #1 multiply(#0, 3)
//! ```
//!
//! Other tool domains get a single invocation of the matched tool with the
//! extracted entities as arguments.

use super::classifier::Classification;
use super::entity::{depth, walk, Entity, EntityValue, OperatorForm, MAX_GROUP_DEPTH};
use super::plan::{step_ref, ExecutionPlan, ToolInvocation};
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;
use volcano_registry::Snapshot;
use volcano_tools::{number_value, ArithmeticOp, ToolDefinition, ToolKind, MATH_DOMAIN};

/// Why a request could not be turned into a plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecompositionError {
    /// The domain's required entities are absent
    #[error("a {domain} request needs at least one {entity}")]
    MissingEntities {
        /// Matched domain
        domain: String,
        /// Missing entity kind
        entity: &'static str,
    },

    /// Dangling operator, missing operand, or similar
    #[error("malformed expression: {0}")]
    Malformed(String),

    /// "it" / "that" with no earlier result in the session
    #[error("there is no previous result to refer to")]
    MissingReference,

    /// No fast-path tool serves this classification
    #[error("no tool handles the '{0}' domain")]
    UnsupportedDomain(String),
}

type Result<T> = std::result::Result<T, DecompositionError>;

/// Most arithmetic operators one request may chain
pub const MAX_OPERATIONS: usize = 512;

fn malformed(message: impl Into<String>) -> DecompositionError {
    DecompositionError::Malformed(message.into())
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    /// The session's last result
    Reference,
    /// The previous clause's result
    Previous,
    Binary {
        op: ArithmeticOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: ArithmeticOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn mentions_reference(&self) -> bool {
        match self {
            Self::Reference => true,
            Self::Binary { lhs, rhs, .. } => lhs.mentions_reference() || rhs.mentions_reference(),
            Self::Number(_) | Self::Previous => false,
        }
    }
}

#[derive(Debug)]
enum Token {
    Operand(Expr),
    Op(ArithmeticOp),
}

struct Clause<'e, 'a> {
    verb: Option<ArithmeticOp>,
    items: Vec<&'e Entity<'a>>,
}

/// Builds plans against one snapshot
pub struct Decomposer<'s> {
    snapshot: &'s Snapshot,
    today: NaiveDate,
}

impl<'s> Decomposer<'s> {
    /// Create a decomposer; relative dates resolve against `today`
    #[must_use]
    pub fn new(snapshot: &'s Snapshot, today: NaiveDate) -> Self {
        Self { snapshot, today }
    }

    /// Build the plan for a classified request
    ///
    /// `last_result` is the session's previous result, if any.
    pub fn decompose(
        &self,
        classification: &Classification,
        entities: &[Entity<'_>],
        last_result: Option<&serde_json::Value>,
    ) -> Result<ExecutionPlan> {
        let target = classification
            .target
            .as_deref()
            .and_then(|name| self.snapshot.tool(name));

        let is_math = classification.domain == MATH_DOMAIN
            || target.is_some_and(|t| t.definition.kind.arithmetic_op().is_some());
        if is_math {
            return self.decompose_math(entities, last_result);
        }

        match target {
            Some(tool) => self.single_invocation(
                &classification.domain,
                &tool.definition,
                entities,
                last_result,
            ),
            None => Err(DecompositionError::UnsupportedDomain(
                classification.domain.clone(),
            )),
        }
    }

    fn decompose_math(
        &self,
        entities: &[Entity<'_>],
        last_result: Option<&serde_json::Value>,
    ) -> Result<ExecutionPlan> {
        if depth(entities) > MAX_GROUP_DEPTH {
            return Err(malformed(format!(
                "parentheses nested deeper than {MAX_GROUP_DEPTH} levels"
            )));
        }

        let mut has_number = false;
        let mut operations = 0;
        walk(entities, &mut |e| match e.value {
            EntityValue::Number(_) => has_number = true,
            EntityValue::Operator { .. } => operations += 1,
            _ => {}
        });
        if operations > MAX_OPERATIONS {
            return Err(malformed(format!(
                "more than {MAX_OPERATIONS} operations in one request"
            )));
        }
        if !has_number {
            return Err(DecompositionError::MissingEntities {
                domain: MATH_DOMAIN.to_string(),
                entity: "number",
            });
        }

        let mut exprs = Vec::new();
        for clause in split_clauses(entities) {
            let implicit = if exprs.is_empty() {
                Expr::Reference
            } else {
                Expr::Previous
            };
            exprs.push(clause_expr(clause, implicit)?);
        }

        let mut plan = ExecutionPlan::new();
        let reference = if exprs.iter().any(Expr::mentions_reference) {
            if last_result.is_none() {
                return Err(DecompositionError::MissingReference);
            }
            let tool = self
                .snapshot
                .tools()
                .tool_of_kind(ToolKind::ResolveReference)
                .unwrap_or("resolve_reference");
            Some(plan.push(ToolInvocation::new(tool, json!({}))))
        } else {
            None
        };

        let mut previous: Option<serde_json::Value> = None;
        for expr in &exprs {
            let value = self.emit(expr, &mut plan, reference.as_ref(), previous.as_ref())?;
            previous = Some(value);
        }

        // the answer must be the output of the last step
        let last = plan.len().checked_sub(1).map(step_ref);
        if plan.is_empty() || previous != last {
            return Err(malformed("nothing to compute"));
        }
        Ok(plan)
    }

    fn emit(
        &self,
        expr: &Expr,
        plan: &mut ExecutionPlan,
        reference: Option<&serde_json::Value>,
        previous: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        match expr {
            Expr::Number(n) => Ok(number_value(*n)),
            Expr::Reference => reference
                .cloned()
                .ok_or(DecompositionError::MissingReference),
            Expr::Previous => previous
                .cloned()
                .ok_or_else(|| malformed("no previous clause")),
            Expr::Binary { op, lhs, rhs } => {
                let a = self.emit(lhs, plan, reference, previous)?;
                let b = self.emit(rhs, plan, reference, previous)?;
                let tool = self
                    .snapshot
                    .tools()
                    .tool_for_op(*op)
                    .unwrap_or_else(|| op.canonical_tool());
                Ok(plan.push(ToolInvocation::new(tool, json!({ "a": a, "b": b }))))
            }
        }
    }

    fn single_invocation(
        &self,
        domain: &str,
        definition: &ToolDefinition,
        entities: &[Entity<'_>],
        last_result: Option<&serde_json::Value>,
    ) -> Result<ExecutionPlan> {
        let mut identifiers = Vec::new();
        let mut numbers = Vec::new();
        let mut dates = Vec::new();
        walk(entities, &mut |e| match &e.value {
            EntityValue::Identifier(id) => identifiers.push(json!(id)),
            EntityValue::Number(n) => numbers.push(number_value(*n)),
            EntityValue::Date(date) => dates.push(json!(date
                .resolve(self.today)
                .format("%Y-%m-%d")
                .to_string())),
            _ => {}
        });

        let missing = |entity: &'static str| DecompositionError::MissingEntities {
            domain: domain.to_string(),
            entity,
        };
        match definition.kind {
            ToolKind::Lookup if identifiers.is_empty() => return Err(missing("identifier")),
            ToolKind::ResolveReference if last_result.is_none() => {
                return Err(DecompositionError::MissingReference)
            }
            ToolKind::Template => {
                let template = definition
                    .config
                    .get("template")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default();
                if template.contains("{identifier}") && identifiers.is_empty() {
                    return Err(missing("identifier"));
                }
                if template.contains("{number}") && numbers.is_empty() {
                    return Err(missing("number"));
                }
                if template.contains("{date}") && dates.is_empty() {
                    return Err(missing("date"));
                }
                if template.contains("{last_result}") && last_result.is_none() {
                    return Err(DecompositionError::MissingReference);
                }
            }
            _ => {}
        }

        let mut plan = ExecutionPlan::new();
        plan.push(ToolInvocation::new(
            definition.name.clone(),
            json!({
                "identifiers": identifiers,
                "numbers": numbers,
                "dates": dates,
            }),
        ));
        Ok(plan)
    }
}

/// Split top-level entities at verb-form operators
fn split_clauses<'e, 'a>(entities: &'e [Entity<'a>]) -> Vec<Clause<'e, 'a>> {
    let mut clauses = Vec::new();
    let mut current = Clause {
        verb: None,
        items: Vec::new(),
    };

    for entity in entities {
        match entity.value {
            EntityValue::Operator {
                op,
                form: OperatorForm::Verb,
            } => {
                if current.verb.is_some() || !current.items.is_empty() {
                    clauses.push(current);
                }
                current = Clause {
                    verb: Some(op),
                    items: Vec::new(),
                };
            }
            EntityValue::Number(_)
            | EntityValue::Operator { .. }
            | EntityValue::Reference
            | EntityValue::Group(_) => current.items.push(entity),
            // dates and identifiers play no part in arithmetic
            EntityValue::Date(_) | EntityValue::Identifier(_) => {}
        }
    }

    if current.verb.is_some() || !current.items.is_empty() {
        clauses.push(current);
    }
    clauses
}

fn clause_expr(clause: Clause<'_, '_>, implicit: Expr) -> Result<Expr> {
    let mut tokens = tokenize(clause.items.iter().copied())?;

    let Some(verb) = clause.verb else {
        // "... , then + 3": a leading operator continues from the last result
        if matches!(tokens.first(), Some(Token::Op(_))) {
            tokens.insert(0, Token::Operand(implicit));
        }
        let mut exprs = parse_expressions(tokens)?;
        return match exprs.len() {
            1 => Ok(exprs.remove(0)),
            _ => Err(malformed("missing operator between operands")),
        };
    };

    let mut exprs = parse_expressions(tokens)?.into_iter();
    match (exprs.len(), verb) {
        (0, _) => Err(malformed(format!(
            "'{}' is missing its operands",
            verb.canonical_tool()
        ))),
        (1, _) => Ok(Expr::binary(verb, implicit, exprs.next().unwrap_or(Expr::Previous))),
        // "subtract A from B"
        (2, ArithmeticOp::Subtract) => {
            let subtrahend = exprs.next().unwrap_or(Expr::Previous);
            let minuend = exprs.next().unwrap_or(Expr::Previous);
            Ok(Expr::binary(verb, minuend, subtrahend))
        }
        (2, _) | (_, ArithmeticOp::Add | ArithmeticOp::Multiply) => {
            let first = exprs.next().unwrap_or(Expr::Previous);
            Ok(exprs.fold(first, |acc, e| Expr::binary(verb, acc, e)))
        }
        _ => Err(malformed(format!(
            "'{}' takes at most two operands",
            verb.canonical_tool()
        ))),
    }
}

fn tokenize<'e, 'a: 'e>(items: impl Iterator<Item = &'e Entity<'a>>) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    for entity in items {
        match &entity.value {
            EntityValue::Number(n) => tokens.push(Token::Operand(Expr::Number(*n))),
            EntityValue::Reference => tokens.push(Token::Operand(Expr::Reference)),
            EntityValue::Group(children) => tokens.push(Token::Operand(group_expr(children)?)),
            EntityValue::Operator {
                form: OperatorForm::Verb,
                op,
            } => {
                return Err(malformed(format!(
                    "'{}' cannot appear inside parentheses",
                    op.canonical_tool()
                )))
            }
            EntityValue::Operator { op, .. } => tokens.push(Token::Op(*op)),
            EntityValue::Date(_) | EntityValue::Identifier(_) => {}
        }
    }
    Ok(tokens)
}

fn group_expr(children: &[Entity<'_>]) -> Result<Expr> {
    let mut exprs = parse_expressions(tokenize(children.iter())?)?;
    match exprs.len() {
        0 => Err(malformed("empty parentheses")),
        1 => Ok(exprs.remove(0)),
        _ => Err(malformed("parentheses must hold a single expression")),
    }
}

/// Split where two operands are adjacent, then parse each run as infix
fn parse_expressions(tokens: Vec<Token>) -> Result<Vec<Expr>> {
    let mut runs: Vec<Vec<Token>> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    for token in tokens {
        let adjacent = matches!(token, Token::Operand(_))
            && matches!(current.last(), Some(Token::Operand(_)));
        if adjacent {
            runs.push(std::mem::take(&mut current));
        }
        current.push(token);
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs.into_iter().map(parse_infix).collect()
}

/// Operator-precedence parse of `operand (op operand)*`
fn parse_infix(run: Vec<Token>) -> Result<Expr> {
    let mut tokens = run.into_iter();
    let first = match tokens.next() {
        Some(Token::Operand(expr)) => expr,
        Some(Token::Op(op)) => {
            return Err(malformed(format!("'{}' is missing its left operand", op.symbol())))
        }
        None => return Err(malformed("empty expression")),
    };

    let mut values = vec![first];
    let mut ops: Vec<ArithmeticOp> = Vec::new();

    while let Some(token) = tokens.next() {
        let Token::Op(op) = token else {
            return Err(malformed("missing operator between operands"));
        };
        let operand = match tokens.next() {
            Some(Token::Operand(expr)) => expr,
            Some(Token::Op(_)) => {
                return Err(malformed(format!("'{}' is missing an operand", op.symbol())))
            }
            None => return Err(malformed(format!("dangling operator '{}'", op.symbol()))),
        };

        while ops.last().is_some_and(|top| top.precedence() >= op.precedence()) {
            reduce(&mut values, &mut ops)?;
        }
        ops.push(op);
        values.push(operand);
    }

    while !ops.is_empty() {
        reduce(&mut values, &mut ops)?;
    }
    values.pop().ok_or_else(|| malformed("empty expression"))
}

fn reduce(values: &mut Vec<Expr>, ops: &mut Vec<ArithmeticOp>) -> Result<()> {
    let (Some(op), Some(rhs), Some(lhs)) = (ops.pop(), values.pop(), values.pop()) else {
        return Err(malformed("missing operand"));
    };
    values.push(Expr::binary(op, lhs, rhs));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classifier::Classifier;
    use crate::pipeline::extractor::extract;
    use std::sync::Arc;
    use volcano_tools::build_tool;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn plan_with(
        snapshot: &Snapshot,
        text: &str,
        last_result: Option<&serde_json::Value>,
    ) -> Result<ExecutionPlan> {
        let classification = Classifier::default().classify(text, snapshot);
        Decomposer::new(snapshot, today()).decompose(&classification, &extract(text), last_result)
    }

    fn plan(text: &str, last_result: Option<&serde_json::Value>) -> Result<ExecutionPlan> {
        plan_with(&Snapshot::builtin(), text, last_result)
    }

    fn tools(plan: &ExecutionPlan) -> Vec<&str> {
        plan.steps().iter().map(|s| s.tool_name.as_str()).collect()
    }

    #[test]
    fn test_single_operation() {
        let plan = plan("Calculate 42 + 58", None).unwrap();
        assert_eq!(tools(&plan), vec!["add"]);
        assert_eq!(plan.steps()[0].arguments, json!({"a": 42, "b": 58}));
    }

    #[test]
    fn test_precedence_and_groups() {
        let plan = plan("calculate (15 * 7) + (89 - 34) / 5", None).unwrap();
        assert_eq!(tools(&plan), vec!["multiply", "subtract", "divide", "add"]);
        assert_eq!(plan.steps()[2].arguments, json!({"a": {"$step": 1}, "b": 5}));
        assert_eq!(
            plan.steps()[3].arguments,
            json!({"a": {"$step": 0}, "b": {"$step": 2}})
        );
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |levels: usize| {
            format!("calculate {}1 + 1{}", "(".repeat(levels), ")".repeat(levels))
        };
        let plan = plan(&nested(MAX_GROUP_DEPTH), None).unwrap();
        assert_eq!(tools(&plan), vec!["add"]);

        let err = plan_with(&Snapshot::builtin(), &nested(MAX_GROUP_DEPTH + 1), None).unwrap_err();
        assert!(matches!(err, DecompositionError::Malformed(ref m) if m.contains("nested")));

        let unclosed = format!("calculate {}1 + 1", "(".repeat(5000));
        assert!(matches!(
            plan_with(&Snapshot::builtin(), &unclosed, None),
            Err(DecompositionError::Malformed(_))
        ));
    }

    #[test]
    fn test_operation_limit() {
        let chain = |terms: usize| format!("calculate 1{}", " + 1".repeat(terms - 1));
        assert_eq!(plan(&chain(MAX_OPERATIONS + 1), None).unwrap().len(), MAX_OPERATIONS);

        let err = plan(&chain(MAX_OPERATIONS + 2), None).unwrap_err();
        assert!(matches!(err, DecompositionError::Malformed(ref m) if m.contains("operations")));
    }

    #[test]
    fn test_left_associative() {
        let plan = plan("calculate 10 - 4 - 3", None).unwrap();
        assert_eq!(plan.steps()[0].arguments, json!({"a": 10, "b": 4}));
        assert_eq!(plan.steps()[1].arguments, json!({"a": {"$step": 0}, "b": 3}));
    }

    #[test]
    fn test_sequential_clauses() {
        let plan = plan("calculate 10 + 5, then multiply by 3", None).unwrap();
        assert_eq!(tools(&plan), vec!["add", "multiply"]);
        assert_eq!(plan.steps()[1].arguments, json!({"a": {"$step": 0}, "b": 3}));
    }

    #[test]
    fn test_reference_prepends_resolve_step() {
        let last = json!(150);
        let plan = plan("Multiply it by 2", Some(&last)).unwrap();
        assert_eq!(tools(&plan), vec!["resolve_reference", "multiply"]);
        assert_eq!(plan.steps()[1].arguments, json!({"a": {"$step": 0}, "b": 2}));
    }

    #[test]
    fn test_verb_without_left_operand_uses_session() {
        let last = json!(10);
        let plan = plan("divide by 4", Some(&last)).unwrap();
        assert_eq!(tools(&plan), vec!["resolve_reference", "divide"]);

        assert_eq!(
            self::plan("divide by 4", None).unwrap_err(),
            DecompositionError::MissingReference
        );
    }

    #[test]
    fn test_subtract_from() {
        let plan = plan("subtract 5 from 20", None).unwrap();
        assert_eq!(plan.steps()[0].arguments, json!({"a": 20, "b": 5}));
    }

    #[test]
    fn test_verb_fold() {
        let plan = plan("add 1 2 3", None).unwrap();
        assert_eq!(tools(&plan), vec!["add", "add"]);
        assert!(matches!(
            self::plan("divide 1 2 3", None),
            Err(DecompositionError::Malformed(_))
        ));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            plan("calculate something", None).unwrap_err(),
            DecompositionError::MissingEntities {
                domain: "math".to_string(),
                entity: "number"
            }
        );
        assert!(matches!(
            plan("calculate 5 +", None),
            Err(DecompositionError::Malformed(_))
        ));
        assert!(matches!(
            plan("calculate 2 3", None),
            Err(DecompositionError::Malformed(_))
        ));
        assert!(matches!(
            plan("calculate (1 2) + 3", None),
            Err(DecompositionError::Malformed(_))
        ));
        assert!(matches!(
            plan("calculate 5", None),
            Err(DecompositionError::Malformed(_))
        ));
        assert_eq!(
            plan("calculate it + 1", None).unwrap_err(),
            DecompositionError::MissingReference
        );
    }

    fn lookup_snapshot() -> Snapshot {
        let definition = ToolDefinition::new("tier_lookup", ToolKind::Lookup)
            .with_domain("tiers")
            .with_pattern(r"\btier\b")
            .with_config(json!({"table": {"enterprise-corp": "platinum"}}));
        let tool: Arc<dyn volcano_tools::Tool> = build_tool(definition.clone()).unwrap();
        Snapshot::builtin().with_tool(definition, tool)
    }

    #[test]
    fn test_tool_domain_single_invocation() {
        let snapshot = lookup_snapshot();
        let plan = plan_with(&snapshot, "What tier is enterprise-corp as of today?", None).unwrap();
        assert_eq!(tools(&plan), vec!["tier_lookup"]);
        assert_eq!(
            plan.steps()[0].arguments,
            json!({"identifiers": ["enterprise-corp"], "numbers": [], "dates": ["2024-05-01"]})
        );

        assert_eq!(
            plan_with(&snapshot, "What tier am I on?", None).unwrap_err(),
            DecompositionError::MissingEntities {
                domain: "tiers".to_string(),
                entity: "identifier"
            }
        );
    }

    #[test]
    fn test_unknown_domain_unsupported() {
        let snapshot = Snapshot::builtin();
        let entities = extract("hello");
        let err = Decomposer::new(&snapshot, today())
            .decompose(&Classification::unknown(), &entities, None)
            .unwrap_err();
        assert_eq!(err, DecompositionError::UnsupportedDomain("unknown".into()));
    }
}
