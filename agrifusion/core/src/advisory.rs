use serde::{Deserialize, Serialize};

use crate::assembler::FeatureRecord;

/// Threshold test applied to one raw input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "threshold", rename_all = "snake_case")]
pub enum Comparison {
    /// Fires when the value is strictly below the threshold.
    Below(f64),
    /// Fires when the value is strictly above the threshold.
    Above(f64),
}

impl Comparison {
    fn holds(self, value: f64) -> bool {
        match self {
            Self::Below(threshold) => value < threshold,
            Self::Above(threshold) => value > threshold,
        }
    }
}

/// Rule-based guidance emitted from raw inputs, independent of the prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRule {
    /// Stable identifier, used in logs.
    pub id: String,
    /// Input inspected by the rule.
    pub field: String,
    /// Test applied to the input.
    pub comparison: Comparison,
    /// Guidance text emitted when the rule fires.
    pub message: String,
}

impl AdvisoryRule {
    /// Rule firing when `field < threshold`.
    #[must_use]
    pub fn below(id: &str, field: &str, threshold: f64, message: &str) -> Self {
        Self::new(id, field, Comparison::Below(threshold), message)
    }

    /// Rule firing when `field > threshold`.
    #[must_use]
    pub fn above(id: &str, field: &str, threshold: f64, message: &str) -> Self {
        Self::new(id, field, Comparison::Above(threshold), message)
    }

    fn new(id: &str, field: &str, comparison: Comparison, message: &str) -> Self {
        Self {
            id: id.to_string(),
            field: field.to_string(),
            comparison,
            message: message.to_string(),
        }
    }

    /// Whether the rule fires for `record`; a record without the field never fires.
    #[must_use]
    pub fn matches(&self, record: &FeatureRecord) -> bool {
        record
            .get(&self.field)
            .is_some_and(|value| self.comparison.holds(value))
    }
}

/// Messages of every matching rule, in rule order.
#[must_use]
pub fn evaluate(record: &FeatureRecord, rules: &[AdvisoryRule]) -> Vec<String> {
    rules
        .iter()
        .filter(|rule| rule.matches(record))
        .map(|rule| rule.message.clone())
        .collect()
}

/// Ordered rule list with an optional message for when nothing fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryEngine {
    rules: Vec<AdvisoryRule>,
    fallback: Option<String>,
}

impl AdvisoryEngine {
    /// Engine over `rules`, evaluated in list order.
    #[must_use]
    pub fn new(rules: Vec<AdvisoryRule>) -> Self {
        Self {
            rules,
            fallback: None,
        }
    }

    /// Sets the message emitted when no rule fires.
    #[must_use]
    pub fn with_fallback(mut self, message: &str) -> Self {
        self.fallback = Some(message.to_string());
        self
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[AdvisoryRule] {
        &self.rules
    }

    /// Fallback message, if configured.
    #[must_use]
    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Fired messages in rule order, or the fallback alone when none fire.
    #[must_use]
    pub fn evaluate(&self, record: &FeatureRecord) -> Vec<String> {
        let fired = evaluate(record, &self.rules);
        match (&self.fallback, fired.is_empty()) {
            (Some(fallback), true) => vec![fallback.clone()],
            _ => fired,
        }
    }
}
