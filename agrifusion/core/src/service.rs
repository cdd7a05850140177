use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    catalog::{crop_config, fertility_config, fertilizer_config, FertilizerEncoders, PipelineKind},
    config::AdvisorConfig,
    encoder::LabelEncoder,
    error::PipelineResult,
    field::{FieldSpec, RawInputs},
    pipeline::{Pipeline, PredictionResult},
    predictor::load_model,
    telemetry::AdvisorTelemetry,
};

/// Process-wide entry point owning one lazily built pipeline per kind.
///
/// A pipeline's artifacts are read on its first request. Concurrent first
/// requests wait for a single load; a failed load is not remembered, so the
/// next request tries again. Pipelines never share load state.
#[derive(Debug)]
pub struct AgronomyAdvisor {
    config: AdvisorConfig,
    telemetry: AdvisorTelemetry,
    crop: OnceCell<Arc<Pipeline>>,
    fertility: OnceCell<Arc<Pipeline>>,
    fertilizer: OnceCell<Arc<Pipeline>>,
}

impl AgronomyAdvisor {
    /// Creates the service; nothing is loaded until a pipeline is requested.
    #[must_use]
    pub fn new(config: AdvisorConfig, telemetry: AdvisorTelemetry) -> Self {
        Self {
            config,
            telemetry,
            crop: OnceCell::new(),
            fertility: OnceCell::new(),
            fertilizer: OnceCell::new(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Whether a pipeline has been built already.
    #[must_use]
    pub fn is_loaded(&self, kind: PipelineKind) -> bool {
        self.slot(kind).get().is_some()
    }

    /// Built pipeline for `kind`, loading its artifacts on first use.
    pub fn pipeline(&self, kind: PipelineKind) -> PipelineResult<Arc<Pipeline>> {
        self.slot(kind)
            .get_or_try_init(|| self.load(kind))
            .map(Arc::clone)
    }

    /// Runs one request through the pipeline for `kind`.
    pub fn run(&self, kind: PipelineKind, inputs: &RawInputs) -> PipelineResult<PredictionResult> {
        self.pipeline(kind)?.run(inputs)
    }

    /// Field schema for `kind`; the fertilizer vocabularies require its encoders.
    pub fn fields(&self, kind: PipelineKind) -> PipelineResult<Vec<FieldSpec>> {
        Ok(self.pipeline(kind)?.fields().to_vec())
    }

    const fn slot(&self, kind: PipelineKind) -> &OnceCell<Arc<Pipeline>> {
        match kind {
            PipelineKind::Crop => &self.crop,
            PipelineKind::Fertility => &self.fertility,
            PipelineKind::Fertilizer => &self.fertilizer,
        }
    }

    fn load(&self, kind: PipelineKind) -> PipelineResult<Arc<Pipeline>> {
        self.telemetry.record(
            LogLevel::Info,
            "artifact.load.start",
            json!({ "pipeline": kind }),
        );
        match self.build(kind) {
            Ok(pipeline) => {
                self.telemetry.record(
                    LogLevel::Info,
                    "artifact.load.completed",
                    json!({
                        "pipeline": kind,
                        "features": pipeline.config().order,
                        "labels": pipeline.config().labels.len(),
                    }),
                );
                Ok(Arc::new(pipeline))
            }
            Err(err) => {
                self.telemetry.record(
                    LogLevel::Error,
                    "artifact.load.failed",
                    json!({ "pipeline": kind, "kind": err.kind(), "error": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    fn build(&self, kind: PipelineKind) -> PipelineResult<Pipeline> {
        let policy = self.config.validation.range_policy;
        let (config, predictor) = match kind {
            PipelineKind::Crop => (crop_config(policy)?, load_model(&self.config.crop.model)?),
            PipelineKind::Fertility => (
                fertility_config(policy)?,
                load_model(&self.config.fertility.model)?,
            ),
            PipelineKind::Fertilizer => {
                let paths = &self.config.fertilizer;
                let encoders = FertilizerEncoders {
                    soil: Arc::new(LabelEncoder::load("soil_type", &paths.soil_encoder)?),
                    crop: Arc::new(LabelEncoder::load("crop_type", &paths.crop_encoder)?),
                    fertilizer: Arc::new(LabelEncoder::load("fertilizer", &paths.label_encoder)?),
                };
                (fertilizer_config(&encoders, policy)?, load_model(&paths.model)?)
            }
        };
        Pipeline::new(config, predictor, self.telemetry.scoped(kind.as_str()))
    }
}
