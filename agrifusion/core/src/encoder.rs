use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use indexmap::IndexSet;
use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};

/// Bidirectional mapping between a fixed vocabulary and dense integer codes.
pub trait Encoder: Send + Sync {
    /// Code of a vocabulary member; fails with [`PipelineError::UnknownCategory`] otherwise.
    fn encode(&self, value: &str) -> PipelineResult<u32>;

    /// Vocabulary member for a code; fails with [`PipelineError::UnknownLabel`] otherwise.
    fn decode(&self, code: i64) -> PipelineResult<&str>;

    /// Vocabulary in code order.
    fn classes(&self) -> &[String];
}

/// Label encoder whose code for a class is its position in the trained vocabulary.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    field: String,
    classes: Vec<String>,
    index: IndexSet<String>,
}

#[derive(Debug, Deserialize)]
struct EncoderArtifact {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Builds an encoder for `field`; the vocabulary must be non-empty and duplicate-free.
    pub fn new(field: impl Into<String>, classes: Vec<String>) -> Result<Self> {
        let field = field.into();
        if classes.is_empty() {
            bail!("encoder for {field} has an empty vocabulary");
        }
        let index: IndexSet<String> = classes.iter().cloned().collect();
        if index.len() != classes.len() {
            bail!("encoder for {field} has duplicate classes");
        }
        Ok(Self {
            field,
            classes,
            index,
        })
    }

    /// Loads an encoder artifact (`{"classes": [..]}`) from disk.
    pub fn load(field: impl Into<String>, path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        Self::read(field, path)
            .map_err(|err| PipelineError::unavailable(path.display().to_string(), &err))
    }

    fn read(field: impl Into<String>, path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading encoder artifact {}", path.display()))?;
        let artifact: EncoderArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("parsing encoder artifact {}", path.display()))?;
        Self::new(field, artifact.classes)
    }

    /// Field this encoder resolves.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Encoder for LabelEncoder {
    fn encode(&self, value: &str) -> PipelineResult<u32> {
        self.index
            .get_index_of(value)
            .and_then(|code| u32::try_from(code).ok())
            .ok_or_else(|| PipelineError::UnknownCategory {
                field: self.field.clone(),
                value: value.to_string(),
                valid: self.classes.clone(),
            })
    }

    fn decode(&self, code: i64) -> PipelineResult<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.classes.get(idx))
            .map(String::as_str)
            .ok_or(PipelineError::UnknownLabel {
                code,
                domain: self.classes.len(),
            })
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn soils() -> LabelEncoder {
        LabelEncoder::new("soil_type", vec!["Sandy".into(), "Clayey".into()]).unwrap()
    }

    #[test]
    fn encodes_and_decodes_by_position() {
        let encoder = soils();
        assert_eq!(encoder.encode("Sandy").unwrap(), 0);
        assert_eq!(encoder.encode("Clayey").unwrap(), 1);
        assert_eq!(encoder.decode(1).unwrap(), "Clayey");
        assert_eq!(encoder.classes(), ["Sandy".to_string(), "Clayey".to_string()]);
    }

    #[test]
    fn unknown_category_is_not_encoded_as_zero() {
        let err = soils().encode("Loamy").unwrap_err();
        assert_eq!(
            err,
            PipelineError::UnknownCategory {
                field: "soil_type".into(),
                value: "Loamy".into(),
                valid: vec!["Sandy".into(), "Clayey".into()],
            }
        );
    }

    #[test]
    fn decode_outside_vocabulary_fails() {
        let encoder = soils();
        assert!(matches!(
            encoder.decode(2),
            Err(PipelineError::UnknownLabel { code: 2, domain: 2 })
        ));
        assert!(encoder.decode(-1).is_err());
    }

    #[test]
    fn rejects_empty_or_duplicate_vocabularies() {
        assert!(LabelEncoder::new("crop_type", Vec::new()).is_err());
        assert!(LabelEncoder::new("crop_type", vec!["Maize".into(), "Maize".into()]).is_err());
    }

    #[test]
    fn loads_artifact_and_reports_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("le_soil.json");
        fs::write(&path, r#"{"classes": ["Black", "Clayey", "Loamy"]}"#).unwrap();
        let encoder = LabelEncoder::load("soil_type", &path).unwrap();
        assert_eq!(encoder.encode("Loamy").unwrap(), 2);
        assert_eq!(encoder.field(), "soil_type");

        let err = LabelEncoder::load("soil_type", dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.kind(), "model_unavailable");

        fs::write(&path, "{ not json").unwrap();
        let err = LabelEncoder::load("soil_type", &path).unwrap_err();
        assert_eq!(err.kind(), "model_unavailable");
    }
}
