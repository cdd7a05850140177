use std::{collections::HashSet, fmt, sync::Arc};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    advisory::AdvisoryEngine,
    assembler::{assemble, EncoderSet, FeatureRecord},
    error::{PipelineError, PipelineResult},
    field::{FieldKind, FieldSpec, RangePolicy, RawInputs, ValidatedInputs},
    labels::LabelTable,
    predictor::Predictor,
    report::{ReportDocument, ReportLayout},
    telemetry::AdvisorTelemetry,
};

/// Everything a pipeline needs besides its predictor.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Pipeline name, used in logs and results.
    pub name: String,
    /// Input schema in form order.
    pub fields: Vec<FieldSpec>,
    /// Column order the predictor was trained on.
    pub order: Vec<String>,
    /// Reverse mapping for predictor codes.
    pub labels: LabelTable,
    /// Optional description per decoded label.
    pub descriptions: IndexMap<String, String>,
    /// Guidance rules over the raw inputs.
    pub advisory: AdvisoryEngine,
    /// Encoders for categorical fields.
    pub encoders: EncoderSet,
    /// Out-of-range handling.
    pub policy: RangePolicy,
    /// Report wording.
    pub report: ReportLayout,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("order", &self.order)
            .field("labels", &self.labels.len())
            .field("encoders", &self.encoders.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PipelineConfig {
    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Cross-checks schema, feature order, encoders and advisory rules.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(self.schema(format!("duplicate field {}", field.name)));
            }
        }

        let mut ordered = HashSet::new();
        for column in &self.order {
            if !names.contains(column.as_str()) {
                return Err(self.schema(format!("feature {column} has no field")));
            }
            if !ordered.insert(column.as_str()) {
                return Err(self.schema(format!("feature {column} listed twice")));
            }
        }
        if let Some(field) = self.fields.iter().find(|f| !ordered.contains(f.name.as_str())) {
            return Err(self.schema(format!("field {} missing from feature order", field.name)));
        }

        for field in self.fields.iter().filter(|field| field.is_categorical()) {
            let encoder = self
                .encoders
                .get(&field.name)
                .ok_or_else(|| self.schema(format!("no encoder for {}", field.name)))?;
            if let FieldKind::Category { allowed } = &field.kind {
                if allowed.as_slice() != encoder.classes() {
                    return Err(self.schema(format!(
                        "field {} vocabulary differs from its encoder",
                        field.name
                    )));
                }
            }
        }

        for rule in self.advisory.rules() {
            match self.field(&rule.field) {
                Some(field) if !field.is_categorical() => {}
                _ => {
                    return Err(self.schema(format!(
                        "advisory rule {} reads unknown numeric field {}",
                        rule.id, rule.field
                    )))
                }
            }
        }
        Ok(())
    }

    fn schema(&self, detail: String) -> PipelineError {
        PipelineError::Schema(format!("{}: {detail}", self.name))
    }
}

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Pipeline that produced the result.
    pub pipeline: String,
    /// Raw predictor code.
    pub code: i64,
    /// Decoded label.
    pub label: String,
    /// Label description, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Advisory messages in rule order.
    pub advisories: Vec<String>,
    /// Inputs after validation, in schema order.
    pub inputs: ValidatedInputs,
    /// Feature vector handed to the predictor.
    pub features: FeatureRecord,
}

/// Validate, assemble, predict, decode and advise for one request.
pub struct Pipeline {
    config: PipelineConfig,
    predictor: Arc<dyn Predictor>,
    telemetry: AdvisorTelemetry,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("n_features", &self.predictor.n_features())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Binds a configuration to a predictor after checking that they agree.
    pub fn new(
        config: PipelineConfig,
        predictor: Arc<dyn Predictor>,
        telemetry: AdvisorTelemetry,
    ) -> PipelineResult<Self> {
        config.validate()?;
        if predictor.n_features() != config.order.len() {
            return Err(config.schema(format!(
                "predictor expects {} features, feature order has {}",
                predictor.n_features(),
                config.order.len()
            )));
        }
        if let Some(names) = predictor.feature_names() {
            if names != config.order.as_slice() {
                return Err(config.schema(format!(
                    "predictor was trained on [{}], feature order is [{}]",
                    names.join(", "),
                    config.order.join(", ")
                )));
            }
        }
        if let Some(classes) = predictor.n_classes() {
            if classes != config.labels.len() {
                return Err(config.schema(format!(
                    "predictor emits {classes} classes, label table has {}",
                    config.labels.len()
                )));
            }
        }
        Ok(Self {
            config,
            predictor,
            telemetry,
        })
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Bound configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Input schema in form order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.config.fields
    }

    /// Runs one request; the first failing stage aborts the run.
    pub fn run(&self, raw: &RawInputs) -> PipelineResult<PredictionResult> {
        let run_id = Uuid::new_v4();
        self.telemetry.record(
            LogLevel::Info,
            "pipeline.run.start",
            json!({ "run_id": run_id, "pipeline": self.config.name, "inputs": raw.len() }),
        );
        match self.execute(raw, run_id) {
            Ok(result) => {
                self.telemetry.record(
                    LogLevel::Info,
                    "pipeline.run.completed",
                    json!({
                        "run_id": run_id,
                        "pipeline": self.config.name,
                        "code": result.code,
                        "label": result.label,
                        "advisories": result.advisories.len(),
                    }),
                );
                Ok(result)
            }
            Err(err) => {
                self.telemetry.record(
                    LogLevel::Warn,
                    "pipeline.run.failed",
                    json!({
                        "run_id": run_id,
                        "pipeline": self.config.name,
                        "kind": err.kind(),
                        "error": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    fn execute(&self, raw: &RawInputs, run_id: Uuid) -> PipelineResult<PredictionResult> {
        for name in raw.keys().filter(|name| self.config.field(name).is_none()) {
            self.telemetry.record(
                LogLevel::Warn,
                "pipeline.input.ignored",
                json!({ "run_id": run_id, "pipeline": self.config.name, "field": name }),
            );
        }

        let mut inputs = ValidatedInputs::with_capacity(self.config.fields.len());
        for field in &self.config.fields {
            let value = field.validate(raw.get(&field.name), self.config.policy)?;
            inputs.insert(field.name.clone(), value);
        }

        let features = assemble(&inputs, &self.config.order, &self.config.encoders)?;
        let code = self.predictor.predict(&features)?;
        let label = self.config.labels.decode(code)?.to_string();
        let description = self.config.descriptions.get(&label).cloned();
        let advisories = self.config.advisory.evaluate(&features);

        Ok(PredictionResult {
            pipeline: self.config.name.clone(),
            code,
            label,
            description,
            advisories,
            inputs,
            features,
        })
    }

    /// Report for a result: inputs with units, the decoded label, its description and numbered tips.
    #[must_use]
    pub fn report(&self, result: &PredictionResult) -> ReportDocument {
        let layout = &self.config.report;
        let mut document = ReportDocument::new(&layout.title);
        for field in &self.config.fields {
            if let Some(value) = result.inputs.get(&field.name) {
                document.push(&field.label, field.display_value(value));
            }
        }
        document.push(&layout.heading, &result.label);
        if let Some(description) = &result.description {
            document.push("Description", description);
        }
        for (idx, tip) in result.advisories.iter().enumerate() {
            document.push(format!("Tip {}", idx + 1), tip);
        }
        document
    }

    /// Suggested report file name for a result.
    #[must_use]
    pub fn report_file_name(&self, result: &PredictionResult) -> String {
        self.config.report.file_name_for(&result.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        advisory::AdvisoryRule,
        encoder::LabelEncoder,
        field::{FieldValue, RawValue},
    };
    use shared_logging::MemoryLogger;

    struct FixedPredictor {
        code: i64,
        n_features: usize,
    }

    impl Predictor for FixedPredictor {
        fn predict(&self, record: &FeatureRecord) -> PipelineResult<i64> {
            assert_eq!(record.len(), self.n_features);
            Ok(self.code)
        }

        fn n_features(&self) -> usize {
            self.n_features
        }
    }

    /// Predicts class 1 when N is below 50, reading N through the column order.
    struct ThresholdPredictor;

    impl Predictor for ThresholdPredictor {
        fn predict(&self, record: &FeatureRecord) -> PipelineResult<i64> {
            Ok(i64::from(record.values()[0] < 50.0))
        }

        fn n_features(&self) -> usize {
            2
        }

        fn n_classes(&self) -> Option<usize> {
            Some(2)
        }
    }

    fn soil_config() -> PipelineConfig {
        let mut encoders = EncoderSet::new();
        encoders.insert(
            "soil".into(),
            Arc::new(LabelEncoder::new("soil", vec!["Sandy".into(), "Clayey".into()]).unwrap()),
        );
        PipelineConfig {
            name: "soil".into(),
            fields: vec![
                FieldSpec::integer("N", "Nitrogen", 0, 100, 30).with_unit("mg/kg"),
                FieldSpec::category("soil", "Soil Type", vec!["Sandy".into(), "Clayey".into()])
                    .unwrap(),
            ],
            order: vec!["N".into(), "soil".into()],
            labels: LabelTable::new(["Healthy", "Depleted"]).unwrap(),
            descriptions: IndexMap::from([("Depleted".to_string(), "Needs inputs".to_string())]),
            advisory: AdvisoryEngine::new(vec![AdvisoryRule::below(
                "low_n",
                "N",
                20.0,
                "Low Nitrogen: add urea",
            )])
            .with_fallback("All good"),
            encoders,
            policy: RangePolicy::Clamp,
            report: ReportLayout::new("Soil Report", "Status", "Soil_{label}.pdf"),
        }
    }

    fn inputs(pairs: &[(&str, RawValue)]) -> RawInputs {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn runs_every_stage() {
        let pipeline =
            Pipeline::new(soil_config(), Arc::new(ThresholdPredictor), AdvisorTelemetry::disabled())
                .unwrap();
        let result = pipeline
            .run(&inputs(&[("soil", "Clayey".into()), ("N", 10_i64.into())]))
            .unwrap();
        assert_eq!(result.code, 1);
        assert_eq!(result.label, "Depleted");
        assert_eq!(result.description.as_deref(), Some("Needs inputs"));
        assert_eq!(result.advisories, vec!["Low Nitrogen: add urea"]);
        assert_eq!(result.features.values(), &[10.0, 1.0]);
        assert_eq!(
            result.inputs.keys().collect::<Vec<_>>(),
            vec!["N", "soil"],
            "inputs come back in schema order"
        );
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let pipeline =
            Pipeline::new(soil_config(), Arc::new(ThresholdPredictor), AdvisorTelemetry::disabled())
                .unwrap();
        let request = inputs(&[("N", 60_i64.into())]);
        let first = pipeline.run(&request).unwrap();
        for _ in 0..5 {
            assert_eq!(pipeline.run(&request).unwrap(), first);
        }
        assert_eq!(first.advisories, vec!["All good"]);
        assert_eq!(first.description, None);
    }

    #[test]
    fn fixed_code_decodes_through_table() {
        let mut config = soil_config();
        config.labels = LabelTable::new(["Rice"]).unwrap();
        let pipeline = Pipeline::new(
            config,
            Arc::new(FixedPredictor { code: 0, n_features: 2 }),
            AdvisorTelemetry::disabled(),
        )
        .unwrap();
        assert_eq!(pipeline.run(&RawInputs::new()).unwrap().label, "Rice");
    }

    #[test]
    fn out_of_domain_code_fails_without_partial_result() {
        let mut config = soil_config();
        config.labels = LabelTable::new(["Low", "Moderate", "High"]).unwrap();
        let memory = Arc::new(MemoryLogger::new());
        let telemetry = AdvisorTelemetry::builder("test").sink(memory.clone()).build().unwrap();
        let pipeline = Pipeline::new(
            config,
            Arc::new(FixedPredictor { code: 99, n_features: 2 }),
            telemetry,
        )
        .unwrap();
        let err = pipeline.run(&RawInputs::new()).unwrap_err();
        assert_eq!(err, PipelineError::UnknownLabel { code: 99, domain: 3 });
        assert_eq!(
            memory.messages(),
            vec!["pipeline.run.start".to_string(), "pipeline.run.failed".to_string()]
        );
    }

    #[test]
    fn unknown_category_stops_before_prediction() {
        let pipeline = Pipeline::new(
            soil_config(),
            Arc::new(FixedPredictor { code: 0, n_features: 2 }),
            AdvisorTelemetry::disabled(),
        )
        .unwrap();
        let err = pipeline.run(&inputs(&[("soil", "Loamy".into())])).unwrap_err();
        assert_eq!(err.kind(), "unknown_category");
    }

    #[test]
    fn reject_policy_surfaces_out_of_range() {
        let mut config = soil_config();
        config.policy = RangePolicy::Reject;
        let pipeline =
            Pipeline::new(config, Arc::new(ThresholdPredictor), AdvisorTelemetry::disabled()).unwrap();
        let err = pipeline.run(&inputs(&[("N", 500_i64.into())])).unwrap_err();
        assert_eq!(err.kind(), "out_of_range");

        let clamped =
            Pipeline::new(soil_config(), Arc::new(ThresholdPredictor), AdvisorTelemetry::disabled())
                .unwrap()
                .run(&inputs(&[("N", 500_i64.into())]))
                .unwrap();
        assert_eq!(clamped.inputs["N"], FieldValue::Integer(100));
    }

    #[test]
    fn unknown_inputs_are_ignored_and_logged() {
        let memory = Arc::new(MemoryLogger::new());
        let telemetry = AdvisorTelemetry::builder("test").sink(memory.clone()).build().unwrap();
        let pipeline = Pipeline::new(soil_config(), Arc::new(ThresholdPredictor), telemetry).unwrap();
        pipeline.run(&inputs(&[("colour", "brown".into())])).unwrap();
        assert!(memory.messages().contains(&"pipeline.input.ignored".to_string()));
    }

    #[test]
    fn construction_rejects_mismatched_predictors() {
        let err = Pipeline::new(
            soil_config(),
            Arc::new(FixedPredictor { code: 0, n_features: 3 }),
            AdvisorTelemetry::disabled(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "schema");

        let mut config = soil_config();
        config.labels = LabelTable::new(["Only"]).unwrap();
        assert!(Pipeline::new(config, Arc::new(ThresholdPredictor), AdvisorTelemetry::disabled()).is_err());
    }

    #[test]
    fn config_validation_catches_inconsistencies() {
        let mut config = soil_config();
        config.order.reverse();
        config.order.push("N".into());
        assert!(config.validate().is_err());

        let mut config = soil_config();
        config.encoders.clear();
        assert!(config.validate().is_err());

        let mut config = soil_config();
        config.advisory = AdvisoryEngine::new(vec![AdvisoryRule::below("x", "soil", 1.0, "x")]);
        assert!(config.validate().is_err());

        let mut config = soil_config();
        config.order.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn report_lists_inputs_label_and_tips() {
        let pipeline =
            Pipeline::new(soil_config(), Arc::new(ThresholdPredictor), AdvisorTelemetry::disabled())
                .unwrap();
        let result = pipeline.run(&inputs(&[("N", 10_i64.into())])).unwrap();
        let report = pipeline.report(&result);
        assert_eq!(report.title(), "Soil Report");
        let entries: Vec<_> = report
            .entries()
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect();
        assert_eq!(
            entries,
            vec![
                "Nitrogen: 10 mg/kg",
                "Soil Type: Sandy",
                "Status: Depleted",
                "Description: Needs inputs",
                "Tip 1: Low Nitrogen: add urea",
            ]
        );
        assert_eq!(pipeline.report_file_name(&result), "Soil_Depleted.pdf");
    }
}
