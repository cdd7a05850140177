use serde::Serialize;
use thiserror::Error;

/// Request-scoped failures surfaced by a pipeline run.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    /// A model or encoder artifact is missing or could not be deserialised.
    #[error("model artifact `{artifact}` unavailable: {reason}")]
    ModelUnavailable {
        /// Path or name of the artifact.
        artifact: String,
        /// Full context chain of the load failure.
        reason: String,
    },
    /// A categorical input is not part of the encoder's trained vocabulary.
    #[error("unknown {field} `{value}`; valid options: {}", .valid.join(", "))]
    UnknownCategory {
        /// Field being encoded.
        field: String,
        /// Offending value.
        value: String,
        /// Vocabulary accepted for the field.
        valid: Vec<String>,
    },
    /// The predictor returned a code outside the label table.
    #[error("predictor returned code {code}, outside the label domain 0..{domain}")]
    UnknownLabel {
        /// Returned code.
        code: i64,
        /// Number of known labels.
        domain: usize,
    },
    /// The predictor rejected the feature vector.
    #[error("prediction failed: {0}")]
    PredictionFailed(String),
    /// A numeric input fell outside its inclusive range under the reject policy.
    #[error("{field} = {value} is outside the valid range [{min}, {max}]")]
    OutOfRange {
        /// Field being validated.
        field: String,
        /// Supplied value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// An input could not be interpreted for its field type.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field being validated.
        field: String,
        /// Why the value was refused.
        reason: String,
    },
    /// Pipeline configuration does not agree with itself or with its artifacts.
    #[error("schema mismatch: {0}")]
    Schema(String),
}

impl PipelineError {
    /// Stable snake-case name of the error kind, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::UnknownCategory { .. } => "unknown_category",
            Self::UnknownLabel { .. } => "unknown_label",
            Self::PredictionFailed(_) => "prediction_failed",
            Self::OutOfRange { .. } => "out_of_range",
            Self::InvalidValue { .. } => "invalid_value",
            Self::Schema(_) => "schema",
        }
    }

    /// Builds a [`PipelineError::ModelUnavailable`] from a load failure, keeping its context chain.
    #[must_use]
    pub fn unavailable(artifact: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::ModelUnavailable {
            artifact: artifact.into(),
            reason: format!("{err:#}"),
        }
    }
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
