use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Raw request inputs keyed by field name, in submission order.
pub type RawInputs = IndexMap<String, RawValue>;

/// Validated inputs keyed by field name, in schema order.
pub type ValidatedInputs = IndexMap<String, FieldValue>;

/// Value exactly as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Numeric submission (form widgets, JSON numbers).
    Number(f64),
    /// Textual submission (selections, command-line values).
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for RawValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Validated field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Whole-number measurement.
    Integer(i64),
    /// Real-valued measurement.
    Float(f64),
    /// Member of an enumerated vocabulary.
    Category(String),
}

impl FieldValue {
    /// Numeric view of the value; `None` for categories.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Category(_) => None,
        }
    }

    /// Category view of the value; `None` for numbers.
    #[must_use]
    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Category(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            // Debug keeps the trailing `.0` on whole floats.
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Category(value) => f.write_str(value),
        }
    }
}

/// How numeric inputs outside their range are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    /// Pull the value onto the nearest bound, as bounded form widgets do.
    #[default]
    Clamp,
    /// Refuse the request with [`PipelineError::OutOfRange`].
    Reject,
}

/// Semantic type and domain of a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// Whole numbers in `min..=max`.
    Integer {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Real numbers in `min..=max`.
    Float {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// One of a fixed vocabulary.
    Category {
        /// Accepted values, in display order.
        allowed: Vec<String>,
    },
}

/// Immutable description of one input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    /// Name used in requests, feature order and advisory rules.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Display unit, if any.
    pub unit: Option<String>,
    /// Type and domain.
    pub kind: FieldKind,
    /// Value used when the request omits the field.
    pub default: FieldValue,
}

impl FieldSpec {
    /// Integer field with an inclusive range.
    #[must_use]
    pub fn integer(name: &str, label: &str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            unit: None,
            kind: FieldKind::Integer { min, max },
            default: FieldValue::Integer(default),
        }
    }

    /// Float field with an inclusive range.
    #[must_use]
    pub fn float(name: &str, label: &str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            unit: None,
            kind: FieldKind::Float { min, max },
            default: FieldValue::Float(default),
        }
    }

    /// Enumerated field; the first allowed value is the default.
    pub fn category(name: &str, label: &str, allowed: Vec<String>) -> PipelineResult<Self> {
        let default = allowed
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::Schema(format!("field {name} has no allowed values")))?;
        Ok(Self {
            name: name.to_string(),
            label: label.to_string(),
            unit: None,
            kind: FieldKind::Category { allowed },
            default: FieldValue::Category(default),
        })
    }

    /// Attaches a display unit.
    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Whether the field is encoded through a categorical encoder.
    #[must_use]
    pub const fn is_categorical(&self) -> bool {
        matches!(self.kind, FieldKind::Category { .. })
    }

    /// Short rendering of the accepted domain, e.g. `[0, 150]` or `Sandy | Clayey`.
    #[must_use]
    pub fn domain(&self) -> String {
        match &self.kind {
            FieldKind::Integer { min, max } => format!("[{min}, {max}]"),
            FieldKind::Float { min, max } => format!("[{min:?}, {max:?}]"),
            FieldKind::Category { allowed } => allowed.join(" | "),
        }
    }

    /// Renders a value with the field's unit.
    #[must_use]
    pub fn display_value(&self, value: &FieldValue) -> String {
        match &self.unit {
            Some(unit) if unit.starts_with('%') || unit.starts_with('°') => format!("{value}{unit}"),
            Some(unit) => format!("{value} {unit}"),
            None => value.to_string(),
        }
    }

    /// Validates one raw input; a missing input takes the default.
    pub fn validate(&self, raw: Option<&RawValue>, policy: RangePolicy) -> PipelineResult<FieldValue> {
        let Some(raw) = raw else {
            return Ok(self.default.clone());
        };
        match &self.kind {
            FieldKind::Integer { min, max } => {
                let value = self.numeric(raw)?;
                if value.fract() != 0.0 {
                    return Err(self.invalid(format!("expected a whole number, got {value}")));
                }
                #[allow(clippy::cast_precision_loss)]
                let bounded = self.bound(value, *min as f64, *max as f64, policy)?;
                #[allow(clippy::cast_possible_truncation)]
                let whole = bounded as i64;
                Ok(FieldValue::Integer(whole))
            }
            FieldKind::Float { min, max } => {
                let value = self.numeric(raw)?;
                Ok(FieldValue::Float(self.bound(value, *min, *max, policy)?))
            }
            FieldKind::Category { allowed } => {
                let RawValue::Text(text) = raw else {
                    return Err(self.invalid(format!("expected one of {}", allowed.join(", "))));
                };
                if allowed.iter().any(|candidate| candidate == text) {
                    Ok(FieldValue::Category(text.clone()))
                } else {
                    Err(PipelineError::UnknownCategory {
                        field: self.name.clone(),
                        value: text.clone(),
                        valid: allowed.clone(),
                    })
                }
            }
        }
    }

    fn numeric(&self, raw: &RawValue) -> PipelineResult<f64> {
        let value = match raw {
            RawValue::Number(value) => *value,
            RawValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| self.invalid(format!("`{text}` is not a number")))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(format!("{value} is not a finite number")))
        }
    }

    fn bound(&self, value: f64, min: f64, max: f64, policy: RangePolicy) -> PipelineResult<f64> {
        if (min..=max).contains(&value) {
            return Ok(value);
        }
        match policy {
            RangePolicy::Clamp => Ok(value.clamp(min, max)),
            RangePolicy::Reject => Err(PipelineError::OutOfRange {
                field: self.name.clone(),
                value,
                min,
                max,
            }),
        }
    }

    fn invalid(&self, reason: String) -> PipelineError {
        PipelineError::InvalidValue {
            field: self.name.clone(),
            reason,
        }
    }
}
