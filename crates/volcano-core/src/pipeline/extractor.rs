//! Entity Extractor
//!
//! One left-to-right pass over the text. Parentheses open a new frame;
//! closing one turns the frame into a `group` entity in its parent. Tokens
//! that are not entities are dropped here; missing entities are the
//! decomposer's problem.
//!
//! Frames stop nesting one level past [`MAX_GROUP_DEPTH`]; deeper
//! parentheses and their matching `)` are ignored, so the decomposer still
//! sees a too-deep group and can reject it.

use super::entity::{
    DateValue, Entity, EntityValue, OperatorForm, RelativeDate, Span, MAX_GROUP_DEPTH,
};
use chrono::NaiveDate;
use volcano_tools::ArithmeticOp;

struct Frame<'a> {
    start: usize,
    entities: Vec<Entity<'a>>,
}

#[derive(Default)]
struct Builder<'a> {
    root: Vec<Entity<'a>>,
    open: Vec<Frame<'a>>,
    /// `(` past the frame limit still waiting for their `)`
    flattened: usize,
}

impl<'a> Builder<'a> {
    fn current(&mut self) -> &mut Vec<Entity<'a>> {
        match self.open.last_mut() {
            Some(frame) => &mut frame.entities,
            None => &mut self.root,
        }
    }

    fn push(&mut self, entity: Entity<'a>) {
        self.current().push(entity);
    }

    fn operand_precedes(&self) -> bool {
        let current = match self.open.last() {
            Some(frame) => &frame.entities,
            None => &self.root,
        };
        current.last().is_some_and(Entity::is_operand)
    }

    fn open(&mut self, start: usize) {
        if self.open.len() > MAX_GROUP_DEPTH {
            self.flattened += 1;
            return;
        }
        self.open.push(Frame {
            start,
            entities: Vec::new(),
        });
    }

    fn close(&mut self, end: usize) {
        if self.flattened > 0 {
            self.flattened -= 1;
            return;
        }
        if let Some(frame) = self.open.pop() {
            let group = Entity::new(EntityValue::Group(frame.entities), Span::new(frame.start, end));
            self.push(group);
        }
    }

    fn finish(mut self, end: usize) -> Vec<Entity<'a>> {
        while !self.open.is_empty() {
            self.close(end);
        }
        self.root
    }
}

/// Extract entities from `text`, in order of appearance
#[must_use]
pub fn extract(text: &str) -> Vec<Entity<'_>> {
    let bytes = text.as_bytes();
    let mut builder = Builder::default();
    let mut pos = 0;

    while let Some(c) = text[pos..].chars().next() {
        let len = c.len_utf8();
        match c {
            '(' => {
                builder.open(pos);
                pos += len;
            }
            ')' => {
                // a stray ')' closes nothing
                builder.close(pos + len);
                pos += len;
            }
            '+' => {
                builder.push(symbol(ArithmeticOp::Add, pos, len));
                pos += len;
            }
            '*' | '×' => {
                builder.push(symbol(ArithmeticOp::Multiply, pos, len));
                pos += len;
            }
            '/' | '÷' => {
                builder.push(symbol(ArithmeticOp::Divide, pos, len));
                pos += len;
            }
            '-' => {
                if starts_number(bytes, pos + 1) && !builder.operand_precedes() {
                    let (entity, end) = scan_number(text, pos, pos + 1);
                    builder.push(entity);
                    pos = end;
                } else {
                    builder.push(symbol(ArithmeticOp::Subtract, pos, len));
                    pos += len;
                }
            }
            '.' if starts_number(bytes, pos) => {
                let (entity, end) = scan_number(text, pos, pos);
                builder.push(entity);
                pos = end;
            }
            c if c.is_ascii_digit() => {
                let (entity, end) = scan_number(text, pos, pos);
                builder.push(entity);
                pos = end;
            }
            c if c.is_alphabetic() => {
                let raw_end = scan_word(text, pos);
                let end = trim_hyphens(text, pos, raw_end);
                if let Some(entity) = classify_word(&text[pos..end], Span::new(pos, end)) {
                    builder.push(entity);
                }
                pos = raw_end;
            }
            _ => pos += len,
        }
    }

    builder.finish(text.len())
}

fn symbol<'a>(op: ArithmeticOp, pos: usize, len: usize) -> Entity<'a> {
    Entity::new(
        EntityValue::Operator {
            op,
            form: OperatorForm::Symbol,
        },
        Span::new(pos, pos + len),
    )
}

fn starts_number(bytes: &[u8], at: usize) -> bool {
    match bytes.get(at) {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'.') => bytes.get(at + 1).is_some_and(u8::is_ascii_digit),
        _ => false,
    }
}

fn digits_end(bytes: &[u8], mut at: usize) -> usize {
    while bytes.get(at).is_some_and(u8::is_ascii_digit) {
        at += 1;
    }
    at
}

/// Scan a numeric token: an ISO date, a number, or an identifier that
/// starts with digits (`2nd`, `42abc`)
fn scan_number(text: &str, start: usize, digits_start: usize) -> (Entity<'_>, usize) {
    let bytes = text.as_bytes();
    let signed = start != digits_start;

    if !signed {
        if let Some(date) = iso_date(text, start) {
            let end = start + 10;
            return (
                Entity::new(EntityValue::Date(DateValue::Iso(date)), Span::new(start, end)),
                end,
            );
        }
    }

    let mut end = digits_end(bytes, digits_start);
    if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
        end = digits_end(bytes, end + 1);
    }

    if !signed && text[end..].chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') {
        let raw_end = scan_word(text, end);
        let word_end = trim_hyphens(text, start, raw_end);
        return (
            Entity::new(
                EntityValue::Identifier(&text[start..word_end]),
                Span::new(start, word_end),
            ),
            raw_end,
        );
    }

    // digits with an optional fraction always parse
    let value = text[start..end].parse::<f64>().unwrap_or_default();
    (
        Entity::new(EntityValue::Number(value), Span::new(start, end)),
        end,
    )
}

/// `YYYY-MM-DD` not followed by another word character
fn iso_date(text: &str, start: usize) -> Option<NaiveDate> {
    let candidate = text.get(start..start + 10)?;
    let shape = candidate.bytes().enumerate().all(|(i, b)| match i {
        4 | 7 => b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !shape {
        return None;
    }
    if text[start + 10..]
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        return None;
    }
    NaiveDate::parse_from_str(candidate, "%Y-%m-%d").ok()
}

/// End of a run of alphanumerics, `_` and `-` starting at `start`
fn scan_word(text: &str, start: usize) -> usize {
    let mut end = start;
    for (offset, c) in text[start..].char_indices() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            end = start + offset + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Drop trailing `-` from a scanned word
fn trim_hyphens(text: &str, start: usize, mut end: usize) -> usize {
    while end > start && text.as_bytes()[end - 1] == b'-' {
        end -= 1;
    }
    end
}

fn classify_word(word: &str, span: Span) -> Option<Entity<'_>> {
    if word
        .chars()
        .any(|c| c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Some(Entity::new(EntityValue::Identifier(word), span));
    }

    let operator = |op, form| Some(EntityValue::Operator { op, form });
    let value = match word.to_ascii_lowercase().as_str() {
        "plus" => operator(ArithmeticOp::Add, OperatorForm::Infix),
        "minus" => operator(ArithmeticOp::Subtract, OperatorForm::Infix),
        "times" | "multiplied" => operator(ArithmeticOp::Multiply, OperatorForm::Infix),
        "divided" | "over" => operator(ArithmeticOp::Divide, OperatorForm::Infix),
        "add" => operator(ArithmeticOp::Add, OperatorForm::Verb),
        "subtract" => operator(ArithmeticOp::Subtract, OperatorForm::Verb),
        "multiply" => operator(ArithmeticOp::Multiply, OperatorForm::Verb),
        "divide" => operator(ArithmeticOp::Divide, OperatorForm::Verb),
        "it" | "that" => Some(EntityValue::Reference),
        "today" => Some(EntityValue::Date(DateValue::Relative(RelativeDate::Today))),
        "tomorrow" => Some(EntityValue::Date(DateValue::Relative(RelativeDate::Tomorrow))),
        "yesterday" => Some(EntityValue::Date(DateValue::Relative(RelativeDate::Yesterday))),
        _ => None,
    }?;
    Some(Entity::new(value, span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::entity::{depth, EntityKind};

    fn kinds(entities: &[Entity<'_>]) -> Vec<EntityKind> {
        entities.iter().map(Entity::kind).collect()
    }

    fn numbers(entities: &[Entity<'_>]) -> Vec<f64> {
        entities
            .iter()
            .filter_map(|e| match e.value {
                EntityValue::Number(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_simple_expression() {
        let entities = extract("Calculate 42 + 58");
        assert_eq!(
            kinds(&entities),
            vec![EntityKind::Number, EntityKind::Operator, EntityKind::Number]
        );
        assert_eq!(numbers(&entities), vec![42.0, 58.0]);
        assert_eq!(entities[0].span, Span::new(10, 12));
    }

    #[test]
    fn test_negative_numbers() {
        assert_eq!(numbers(&extract("-5 * 3")), vec![-5.0, 3.0]);
        // an operand precedes, so '-' is subtraction
        let entities = extract("10 -5");
        assert_eq!(numbers(&entities), vec![10.0, 5.0]);
        assert_eq!(entities.len(), 3);
        // after an operator it binds again
        assert_eq!(numbers(&extract("2 * -3.5")), vec![2.0, -3.5]);
    }

    #[test]
    fn test_decimals() {
        assert_eq!(numbers(&extract("1.5 plus .25")), vec![1.5, 0.25]);
        assert_eq!(numbers(&extract("3.25 times 4")), vec![3.25, 4.0]);
    }

    #[test]
    fn test_groups() {
        let entities = extract("(15 * 7) + (89 - 34) / 5");
        assert_eq!(
            kinds(&entities),
            vec![
                EntityKind::Group,
                EntityKind::Operator,
                EntityKind::Group,
                EntityKind::Operator,
                EntityKind::Number
            ]
        );
        match &entities[2].value {
            EntityValue::Group(children) => assert_eq!(numbers(children), vec![89.0, 34.0]),
            other => panic!("expected group, got {other:?}"),
        }
        assert_eq!(entities[0].span, Span::new(0, 8));
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let entities = extract("(1 + (2 * 3");
        assert_eq!(kinds(&entities), vec![EntityKind::Group]);
        assert_eq!(entities[0].span.end, 11);

        let entities = extract("1 + 2) * 3");
        assert_eq!(entities.len(), 5);
    }

    #[test]
    fn test_deep_nesting_is_flattened() {
        let text = format!("{}1 + 1{}", "(".repeat(5000), ")".repeat(5000));
        let entities = extract(&text);
        assert_eq!(entities.len(), 1);
        assert_eq!(depth(&entities), MAX_GROUP_DEPTH + 1);
        assert_eq!(entities[0].span, Span::new(0, text.len()));

        let unclosed = format!("{}1 + 1", "(".repeat(5000));
        assert_eq!(depth(&extract(&unclosed)), MAX_GROUP_DEPTH + 1);
    }

    #[test]
    fn test_operator_forms() {
        let entities = extract("multiply 6 by 7 then divided over");
        let forms: Vec<OperatorForm> = entities
            .iter()
            .filter_map(|e| match e.value {
                EntityValue::Operator { form, .. } => Some(form),
                _ => None,
            })
            .collect();
        assert_eq!(
            forms,
            vec![OperatorForm::Verb, OperatorForm::Infix, OperatorForm::Infix]
        );
        assert_eq!(kinds(&extract("6 × 7 ÷ 2")).len(), 5);
    }

    #[test]
    fn test_dates_identifiers_references() {
        let entities = extract("Upgrade enterprise-corp INV-42 on 2024-05-01 or tomorrow; keep it");
        assert_eq!(
            kinds(&entities),
            vec![
                EntityKind::Identifier,
                EntityKind::Identifier,
                EntityKind::Date,
                EntityKind::Date,
                EntityKind::Reference
            ]
        );
        assert_eq!(entities[0].value, EntityValue::Identifier("enterprise-corp"));
        assert_eq!(
            entities[2].value,
            EntityValue::Date(DateValue::Iso(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
        );
    }

    #[test]
    fn test_invalid_date_is_numbers() {
        let entities = extract("2024-13-45");
        assert_eq!(numbers(&entities), vec![2024.0, 13.0, 45.0]);
    }

    #[test]
    fn test_trailing_hyphen_trimmed() {
        let entities = extract("acme- corp");
        assert!(entities.is_empty());
        assert_eq!(extract("2nd")[0].value, EntityValue::Identifier("2nd"));
    }

    #[test]
    fn test_deterministic() {
        let text = "calculate (15 * 7) + (89 - 34) / 5";
        assert_eq!(extract(text), extract(text));
    }
}
