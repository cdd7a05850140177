use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    encoder::Encoder,
    error::{PipelineError, PipelineResult},
    field::{FieldValue, ValidatedInputs},
};

/// Categorical encoders keyed by the field they resolve.
pub type EncoderSet = IndexMap<String, Arc<dyn Encoder>>;

/// Ordered numeric feature vector handed to a predictor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    columns: Vec<String>,
    values: Vec<f64>,
}

impl FeatureRecord {
    /// Pairs column names with values; both must have the same length.
    pub fn new(columns: Vec<String>, values: Vec<f64>) -> PipelineResult<Self> {
        if columns.len() != values.len() {
            return Err(PipelineError::Schema(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Column names in predictor order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in predictor order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|idx| self.values[idx])
    }
}

/// Arranges validated inputs into exactly `order`, encoding categorical fields.
///
/// The output is a direct reindex of `values` by `order`; a field in `order`
/// without a value, or a categorical value without an encoder, is a schema error.
pub fn assemble(
    values: &ValidatedInputs,
    order: &[String],
    encoders: &EncoderSet,
) -> PipelineResult<FeatureRecord> {
    let mut features = Vec::with_capacity(order.len());
    for name in order {
        let value = values
            .get(name)
            .ok_or_else(|| PipelineError::Schema(format!("no value for feature {name}")))?;
        let feature = match value {
            FieldValue::Category(category) => {
                let encoder = encoders.get(name).ok_or_else(|| {
                    PipelineError::Schema(format!("no encoder for categorical feature {name}"))
                })?;
                f64::from(encoder.encode(category)?)
            }
            numeric => numeric.as_f64().ok_or_else(|| {
                PipelineError::Schema(format!("feature {name} is not numeric"))
            })?,
        };
        features.push(feature);
    }
    FeatureRecord::new(order.to_vec(), features)
}
