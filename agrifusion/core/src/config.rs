use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared_logging::LogLevel;

use crate::field::RangePolicy;

/// Advisor settings loaded from `agrifusion.toml`.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    /// Structured log output.
    pub logging: LoggingConfig,
    /// Input validation behaviour.
    pub validation: ValidationConfig,
    /// Crop pipeline artifacts.
    pub crop: ModelSection,
    /// Soil fertility pipeline artifacts.
    pub fertility: ModelSection,
    /// Fertilizer pipeline artifacts.
    pub fertilizer: FertilizerSection,
    source_dir: PathBuf,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self::rooted_at(".")
    }
}

impl AdvisorConfig {
    /// Default settings with relative paths resolved against `dir`.
    #[must_use]
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        Self::from_document(AdvisorDocument::default(), dir.into())
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading advisor config {}", path.display()))?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&raw, source_dir).with_context(|| format!("parsing {}", path.display()))
    }

    /// Like [`Self::load`], but a missing file yields defaults resolved against the working directory.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses a TOML document whose relative paths are anchored at `source_dir`.
    pub fn parse(raw: &str, source_dir: impl Into<PathBuf>) -> Result<Self> {
        let document: AdvisorDocument = toml::from_str(raw)?;
        document.logging.min_level()?;
        Ok(Self::from_document(document, source_dir.into()))
    }

    fn from_document(document: AdvisorDocument, source_dir: PathBuf) -> Self {
        let mut config = Self {
            logging: document.logging,
            validation: document.validation,
            crop: ModelSection {
                model: document.crop.model.unwrap_or_else(default_crop_model),
            },
            fertility: ModelSection {
                model: document.fertility.model.unwrap_or_else(default_fertility_model),
            },
            fertilizer: document.fertilizer,
            source_dir,
        };
        config.logging.path = config.resolve_path(&config.logging.path);
        config.crop.model = config.resolve_path(&config.crop.model);
        config.fertility.model = config.resolve_path(&config.fertility.model);
        let fertilizer = &config.fertilizer;
        let resolved = FertilizerSection {
            model: config.resolve_path(&fertilizer.model),
            soil_encoder: config.resolve_path(&fertilizer.soil_encoder),
            crop_encoder: config.resolve_path(&fertilizer.crop_encoder),
            label_encoder: config.resolve_path(&fertilizer.label_encoder),
        };
        config.fertilizer = resolved;
        config
    }

    /// Directory relative paths are resolved against.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Resolves a path relative to the configuration file.
    #[must_use]
    pub fn resolve_path(&self, candidate: impl AsRef<Path>) -> PathBuf {
        let candidate = candidate.as_ref();
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.source_dir.join(candidate)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdvisorDocument {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    validation: ValidationConfig,
    #[serde(default)]
    crop: ModelDocument,
    #[serde(default)]
    fertility: ModelDocument,
    #[serde(default)]
    fertilizer: FertilizerSection,
}

impl Default for AdvisorDocument {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            validation: ValidationConfig::default(),
            crop: ModelDocument::default(),
            fertility: ModelDocument::default(),
            fertilizer: FertilizerSection::default(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON lines when true.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// JSON-lines log file.
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
    /// Minimum level written, e.g. `info`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    /// Parsed minimum level.
    pub fn min_level(&self) -> Result<LogLevel> {
        self.level
            .parse()
            .with_context(|| format!("invalid logging level {}", self.level))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_log_path(),
            level: default_log_level(),
        }
    }
}

/// `[validation]` section.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ValidationConfig {
    /// Out-of-range handling shared by every pipeline.
    #[serde(default)]
    pub range_policy: RangePolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelDocument {
    model: Option<PathBuf>,
}

/// Section naming a single model artifact.
#[derive(Debug, Clone)]
pub struct ModelSection {
    /// Model artifact path.
    pub model: PathBuf,
}

/// `[fertilizer]` section: the model plus its three encoders.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FertilizerSection {
    /// Model artifact path.
    #[serde(default = "default_fertilizer_model")]
    pub model: PathBuf,
    /// Soil type encoder.
    #[serde(default = "default_soil_encoder")]
    pub soil_encoder: PathBuf,
    /// Crop type encoder.
    #[serde(default = "default_crop_encoder")]
    pub crop_encoder: PathBuf,
    /// Fertilizer name encoder.
    #[serde(default = "default_label_encoder")]
    pub label_encoder: PathBuf,
}

impl Default for FertilizerSection {
    fn default() -> Self {
        Self {
            model: default_fertilizer_model(),
            soil_encoder: default_soil_encoder(),
            crop_encoder: default_crop_encoder(),
            label_encoder: default_label_encoder(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_log_path() -> PathBuf {
    PathBuf::from("logs/agrifusion.jsonl")
}

fn default_log_level() -> String {
    "info".into()
}

fn default_crop_model() -> PathBuf {
    PathBuf::from("artifacts/crop_model.json")
}

fn default_fertility_model() -> PathBuf {
    PathBuf::from("artifacts/soil_fertility_model.json")
}

fn default_fertilizer_model() -> PathBuf {
    PathBuf::from("artifacts/fertilizer_model.json")
}

fn default_soil_encoder() -> PathBuf {
    PathBuf::from("artifacts/le_soil.json")
}

fn default_crop_encoder() -> PathBuf {
    PathBuf::from("artifacts/le_crop.json")
}

fn default_label_encoder() -> PathBuf {
    PathBuf::from("artifacts/le_fert.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_resolve_against_root() {
        let config = AdvisorConfig::rooted_at("/srv/agri");
        assert_eq!(config.crop.model, PathBuf::from("/srv/agri/artifacts/crop_model.json"));
        assert_eq!(
            config.fertilizer.label_encoder,
            PathBuf::from("/srv/agri/artifacts/le_fert.json")
        );
        assert_eq!(config.validation.range_policy, RangePolicy::Clamp);
        assert_eq!(config.logging.min_level().unwrap(), LogLevel::Info);
    }

    #[test]
    fn load_resolves_relative_paths_against_config_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agrifusion.toml");
        fs::write(
            &path,
            r#"
[logging]
level = "warn"

[validation]
range_policy = "reject"

[crop]
model = "models/crop.json"

[fertilizer]
soil_encoder = "/opt/encoders/soil.json"
"#,
        )
        .unwrap();
        let config = AdvisorConfig::load(&path).unwrap();
        assert_eq!(config.source_dir(), dir.path());
        assert_eq!(config.crop.model, dir.path().join("models/crop.json"));
        assert_eq!(
            config.fertility.model,
            dir.path().join("artifacts/soil_fertility_model.json")
        );
        assert_eq!(
            config.fertilizer.soil_encoder,
            PathBuf::from("/opt/encoders/soil.json")
        );
        assert_eq!(config.fertilizer.crop_encoder, dir.path().join("artifacts/le_crop.json"));
        assert_eq!(config.logging.path, dir.path().join("logs/agrifusion.jsonl"));
        assert_eq!(config.logging.min_level().unwrap(), LogLevel::Warn);
        assert_eq!(config.validation.range_policy, RangePolicy::Reject);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = AdvisorConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.source_dir(), Path::new("."));
        assert!(AdvisorConfig::load(dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn empty_sections_keep_defaults() {
        let config = AdvisorConfig::parse("[crop]\n[fertilizer]\n", "/srv").unwrap();
        assert_eq!(config.crop.model, PathBuf::from("/srv/artifacts/crop_model.json"));
        assert_eq!(config.fertilizer.model, PathBuf::from("/srv/artifacts/fertilizer_model.json"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AdvisorConfig::parse("[validation]\nrange_policy = \"wrap\"", ".").is_err());
        assert!(AdvisorConfig::parse("[logging]\nlevel = \"loud\"", ".").is_err());
        assert!(AdvisorConfig::parse("[orchard]\nmodel = \"x\"", ".").is_err());
    }
}
