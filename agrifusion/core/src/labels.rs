use indexmap::IndexSet;

use crate::error::{PipelineError, PipelineResult};

/// Dense reverse mapping from predictor codes `0..N` to display labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: IndexSet<String>,
}

impl LabelTable {
    /// Builds a table whose code for a label is its position; labels must be unique and non-empty.
    pub fn new<I, S>(labels: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = IndexSet::new();
        for label in labels {
            let label = label.into();
            if label.trim().is_empty() {
                return Err(PipelineError::Schema("blank label in label table".into()));
            }
            if !table.insert(label.clone()) {
                return Err(PipelineError::Schema(format!("duplicate label {label}")));
            }
        }
        if table.is_empty() {
            return Err(PipelineError::Schema("empty label table".into()));
        }
        Ok(Self { labels: table })
    }

    /// Builds a table from explicit `(label, code)` pairs; codes must cover `0..N` without gaps.
    pub fn from_codes<S: AsRef<str>>(pairs: &[(S, u32)]) -> PipelineResult<Self> {
        let mut slots: Vec<Option<String>> = vec![None; pairs.len()];
        for (label, code) in pairs {
            let slot = usize::try_from(*code)
                .ok()
                .and_then(|idx| slots.get_mut(idx))
                .ok_or_else(|| {
                    PipelineError::Schema(format!(
                        "label code {code} leaves a gap in 0..{}",
                        pairs.len()
                    ))
                })?;
            if slot.replace(label.as_ref().to_string()).is_some() {
                return Err(PipelineError::Schema(format!("label code {code} assigned twice")));
            }
        }
        // Every slot is filled: codes are in range and distinct.
        Self::new(slots.into_iter().flatten())
    }

    /// Maps every label through `display`, keeping codes.
    pub fn map_labels(&self, display: impl Fn(&str) -> String) -> PipelineResult<Self> {
        Self::new(self.labels.iter().map(|label| display(label)))
    }

    /// Label for `code`; out-of-domain codes fail with [`PipelineError::UnknownLabel`].
    pub fn decode(&self, code: i64) -> PipelineResult<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.labels.get_index(idx))
            .map(String::as_str)
            .ok_or(PipelineError::UnknownLabel {
                code,
                domain: self.labels.len(),
            })
    }

    /// Code of a label, if known.
    #[must_use]
    pub fn code_of(&self, label: &str) -> Option<u32> {
        self.labels
            .get_index_of(label)
            .and_then(|idx| u32::try_from(idx).ok())
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a constructed table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in code order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// Label decoder entry point.
pub fn decode(code: i64, table: &LabelTable) -> PipelineResult<&str> {
    table.decode(code)
}
