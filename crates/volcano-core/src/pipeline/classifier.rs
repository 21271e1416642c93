//! Classifier - first matching snapshot rule wins
//!
//! The rule order is fixed when the snapshot is built, so classification is
//! a pure function of `(text, snapshot)`.

use serde::Serialize;
use volcano_registry::definition::UNKNOWN_DOMAIN;
use volcano_registry::Snapshot;

/// Default upper bound on classified input length (bytes)
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 10_000;

/// Result of classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// Matched domain, or `"unknown"`
    pub domain: String,
    /// 1.0 on a rule match, 0.0 otherwise
    pub confidence: f32,
    /// Id of the rule that matched
    pub matched_rule_id: Option<String>,
    /// Tool or workflow that owns the matched rule
    pub target: Option<String>,
}

impl Classification {
    /// The "no rule matched" classification
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            domain: UNKNOWN_DOMAIN.to_string(),
            confidence: 0.0,
            matched_rule_id: None,
            target: None,
        }
    }

    /// Whether no rule matched
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.domain == UNKNOWN_DOMAIN
    }
}

/// Rule-based classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    max_input_length: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_LENGTH)
    }
}

impl Classifier {
    /// Create a classifier that treats longer inputs as unknown
    #[must_use]
    pub fn new(max_input_length: usize) -> Self {
        Self { max_input_length }
    }

    /// Classify `text` against the snapshot's ordered rules
    #[must_use]
    pub fn classify(&self, text: &str, snapshot: &Snapshot) -> Classification {
        if text.len() > self.max_input_length {
            return Classification::unknown();
        }

        snapshot
            .rules()
            .iter()
            .find(|rule| rule.regex.is_match(text))
            .map(|rule| Classification {
                domain: rule.domain.clone(),
                confidence: 1.0,
                matched_rule_id: Some(rule.id.clone()),
                target: Some(rule.target.clone()),
            })
            .unwrap_or_else(Classification::unknown)
    }
}
