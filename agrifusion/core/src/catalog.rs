use std::{fmt, str::FromStr, sync::Arc};

use anyhow::bail;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    advisory::{AdvisoryEngine, AdvisoryRule},
    assembler::EncoderSet,
    encoder::{Encoder, LabelEncoder},
    error::PipelineResult,
    field::{FieldSpec, RangePolicy},
    labels::LabelTable,
    pipeline::PipelineConfig,
    report::ReportLayout,
};

/// The three recommendation pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Crop recommendation from soil nutrients and climate.
    Crop,
    /// Soil fertility tier from a full nutrient panel.
    Fertility,
    /// Fertilizer recommendation from conditions, soil and crop.
    Fertilizer,
}

impl PipelineKind {
    /// Every pipeline, in menu order.
    pub const ALL: [Self; 3] = [Self::Crop, Self::Fertility, Self::Fertilizer];

    /// Lowercase name used in configuration and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Fertility => "fertility",
            Self::Fertilizer => "fertilizer",
        }
    }

    /// Report wording for the pipeline.
    #[must_use]
    pub fn report_layout(self) -> ReportLayout {
        match self {
            Self::Crop => ReportLayout::new(
                "Crop Recommendation Report",
                "Recommended Crop",
                "Crop_Recommendation_{label}.pdf",
            ),
            Self::Fertility => ReportLayout::new(
                "Soil Fertility Report",
                "Soil Fertility",
                "Soil_Fertility_Report.pdf",
            ),
            Self::Fertilizer => ReportLayout::new(
                "Fertilizer Recommendation Report",
                "Recommended Fertilizer",
                "Fertilizer_Recommendation_{label}.pdf",
            ),
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "crop" => Ok(Self::Crop),
            "fertility" | "soil" => Ok(Self::Fertility),
            "fertilizer" | "fertiliser" => Ok(Self::Fertilizer),
            other => bail!("unknown pipeline {other}; expected crop, fertility or fertilizer"),
        }
    }
}

const CROP_CODES: [(&str, u32); 22] = [
    ("rice", 0),
    ("maize", 1),
    ("chickpea", 2),
    ("kidneybeans", 3),
    ("pigeonpeas", 4),
    ("mothbeans", 5),
    ("mungbean", 6),
    ("blackgram", 7),
    ("lentil", 8),
    ("pomegranate", 9),
    ("banana", 10),
    ("mango", 11),
    ("grapes", 12),
    ("watermelon", 13),
    ("muskmelon", 14),
    ("apple", 15),
    ("orange", 16),
    ("papaya", 17),
    ("coconut", 18),
    ("cotton", 19),
    ("jute", 20),
    ("coffee", 21),
];

const CROP_NOTES: [(&str, &str); 22] = [
    ("Rice", "Staple for over half of the world's population; needs warm temperatures and plenty of water."),
    ("Maize", "Grown for food, feed and industry; does best in well-drained fertile soils."),
    ("Chickpea", "Protein-rich legume that fixes nitrogen and improves soil fertility."),
    ("Kidneybeans", "Thrives in warm climates; high in protein and fiber."),
    ("Pigeonpeas", "Drought-resistant legume that improves soil health."),
    ("Mothbeans", "Tolerates heat and dry spells; suited to arid regions."),
    ("Mungbean", "Fast-growing legume that enriches soil by fixing nitrogen."),
    ("Blackgram", "Nutrient-rich pulse that improves soil through nitrogen fixation."),
    ("Lentil", "Cool-season, protein-rich crop that improves soil quality."),
    ("Pomegranate", "Needs a warm climate and well-drained soil; rich in antioxidants."),
    ("Banana", "Needs a tropical climate with rich soil and plenty of moisture."),
    ("Mango", "Thrives in tropical and subtropical climates with a dry season."),
    ("Grapes", "Grows well in moderate climates with good drainage."),
    ("Watermelon", "Prefers warm temperatures and sandy loam for sweet fruit."),
    ("Muskmelon", "Needs a warm climate and well-drained soil."),
    ("Apple", "Requires a temperate climate with winter chilling hours."),
    ("Orange", "Best in subtropical to tropical climates with ample sunlight."),
    ("Papaya", "Grows quickly in tropical climates on well-drained soil."),
    ("Coconut", "Thrives in coastal tropical areas with sandy soil."),
    ("Cotton", "Needs a long frost-free season and moderate rainfall."),
    ("Jute", "Bast fiber crop for warm, humid climates."),
    ("Coffee", "Best in tropical highlands with rich soil and shade."),
];

fn names(raw: &[&str]) -> Vec<String> {
    raw.iter().map(ToString::to_string).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

/// Crop recommendation: seven integer and float inputs, 22 crops.
pub fn crop_config(policy: RangePolicy) -> PipelineResult<PipelineConfig> {
    let fields = vec![
        FieldSpec::integer("N", "Nitrogen", 0, 150, 50).with_unit("kg/ha"),
        FieldSpec::integer("P", "Phosphorus", 5, 150, 40).with_unit("kg/ha"),
        FieldSpec::integer("K", "Potassium", 5, 250, 50).with_unit("kg/ha"),
        FieldSpec::float("temperature", "Temperature", 5.0, 45.0, 25.0).with_unit("°C"),
        FieldSpec::float("humidity", "Humidity", 14.3, 99.98, 60.0).with_unit("%"),
        FieldSpec::float("ph", "Soil pH", 3.5, 9.9, 6.5),
        FieldSpec::float("rainfall", "Rainfall", 20.2, 298.6, 100.0).with_unit("mm"),
    ];
    Ok(PipelineConfig {
        name: PipelineKind::Crop.as_str().into(),
        fields,
        order: names(&["N", "P", "K", "temperature", "humidity", "ph", "rainfall"]),
        labels: LabelTable::from_codes(CROP_CODES.as_slice())?.map_labels(capitalize)?,
        descriptions: CROP_NOTES
            .iter()
            .map(|(crop, note)| ((*crop).to_string(), (*note).to_string()))
            .collect(),
        advisory: AdvisoryEngine::default(),
        encoders: EncoderSet::new(),
        policy,
        report: PipelineKind::Crop.report_layout(),
    })
}

/// Soil fertility: twelve float nutrients, three tiers.
pub fn fertility_config(policy: RangePolicy) -> PipelineResult<PipelineConfig> {
    let fields = vec![
        FieldSpec::float("N", "Nitrogen (N)", 6.0, 383.0, 100.0).with_unit("kg/ha"),
        FieldSpec::float("P", "Phosphorus (P)", 2.9, 125.0, 50.0).with_unit("kg/ha"),
        FieldSpec::float("K", "Potassium (K)", 11.0, 887.0, 150.0).with_unit("kg/ha"),
        FieldSpec::float("pH", "pH", 0.9, 11.15, 6.5),
        FieldSpec::float("EC", "Electrical Conductivity (EC)", 0.1, 0.95, 0.5).with_unit("dS/m"),
        FieldSpec::float("OC", "Organic Carbon (OC)", 0.1, 24.0, 0.75).with_unit("%"),
        FieldSpec::float("S", "Sulfur (S)", 0.64, 31.0, 10.0).with_unit("ppm"),
        FieldSpec::float("Zn", "Zinc (Zn)", 0.07, 42.0, 0.5).with_unit("ppm"),
        FieldSpec::float("Fe", "Iron (Fe)", 0.21, 44.0, 4.0).with_unit("ppm"),
        FieldSpec::float("Cu", "Copper (Cu)", 0.09, 3.02, 0.5).with_unit("ppm"),
        FieldSpec::float("Mn", "Manganese (Mn)", 0.11, 31.0, 5.0).with_unit("ppm"),
        FieldSpec::float("B", "Boron (B)", 0.06, 2.82, 0.5).with_unit("ppm"),
    ];
    let advisory = AdvisoryEngine::new(vec![
        AdvisoryRule::below("low_nitrogen", "N", 50.0, "Low Nitrogen: Add compost or urea"),
        AdvisoryRule::below(
            "low_phosphorus",
            "P",
            20.0,
            "Low Phosphorus: Apply Single Super Phosphate",
        ),
        AdvisoryRule::below("acidic_soil", "pH", 6.0, "Acidic Soil: Add lime"),
        AdvisoryRule::above("alkaline_soil", "pH", 8.0, "Alkaline Soil: Add gypsum or sulfur"),
    ]);
    Ok(PipelineConfig {
        name: PipelineKind::Fertility.as_str().into(),
        fields,
        order: names(&["N", "P", "K", "pH", "EC", "OC", "S", "Zn", "Fe", "Cu", "Mn", "B"]),
        labels: LabelTable::new(["Low Fertility", "Moderate Fertility", "High Fertility"])?,
        descriptions: IndexMap::new(),
        advisory,
        encoders: EncoderSet::new(),
        policy,
        report: PipelineKind::Fertility.report_layout(),
    })
}

/// Trained vocabularies the fertilizer pipeline is built from.
#[derive(Debug, Clone)]
pub struct FertilizerEncoders {
    /// Soil type vocabulary.
    pub soil: Arc<LabelEncoder>,
    /// Crop type vocabulary.
    pub crop: Arc<LabelEncoder>,
    /// Fertilizer names, indexed by predictor code.
    pub fertilizer: Arc<LabelEncoder>,
}

/// Fertilizer recommendation: conditions, soil and crop selections, three nutrients.
pub fn fertilizer_config(
    encoders: &FertilizerEncoders,
    policy: RangePolicy,
) -> PipelineResult<PipelineConfig> {
    let fields = vec![
        FieldSpec::float("temperature", "Temperature", 10.0, 50.0, 30.0).with_unit("°C"),
        FieldSpec::float("humidity", "Humidity", 10.0, 90.0, 50.0).with_unit("%"),
        FieldSpec::float("moisture", "Moisture", 10.0, 80.0, 40.0).with_unit("%"),
        FieldSpec::category("soil_type", "Soil Type", encoders.soil.classes().to_vec())?,
        FieldSpec::category("crop_type", "Crop Type", encoders.crop.classes().to_vec())?,
        FieldSpec::integer("N", "Nitrogen", 0, 100, 30).with_unit("mg/kg"),
        FieldSpec::integer("K", "Potassium", 0, 50, 20).with_unit("mg/kg"),
        FieldSpec::integer("P", "Phosphorous", 0, 50, 15).with_unit("mg/kg"),
    ];
    let advisory = AdvisoryEngine::new(vec![
        AdvisoryRule::below(
            "low_nitrogen",
            "N",
            20.0,
            "Low Nitrogen Detected: Consider applying Urea (46-0-0) or organic compost \
             to boost nitrogen levels for better plant growth.",
        ),
        AdvisoryRule::below(
            "low_phosphorous",
            "P",
            15.0,
            "Low Phosphorous: Apply Single Super Phosphate (SSP) or Diammonium Phosphate (DAP) \
             to improve root development and flowering.",
        ),
        AdvisoryRule::below(
            "low_potassium",
            "K",
            15.0,
            "Low Potassium: Use Muriate of Potash (MOP) or Sulphate of Potash \
             to enhance disease resistance and fruit quality.",
        ),
        AdvisoryRule::above(
            "high_temperature",
            "temperature",
            35.0,
            "High Temperature: Ensure adequate irrigation and consider shade nets \
             to protect your crops from heat stress.",
        ),
        AdvisoryRule::above(
            "high_humidity",
            "humidity",
            70.0,
            "High Humidity: Improve drainage and air circulation to prevent fungal diseases.",
        ),
    ])
    .with_fallback(
        "Optimal Conditions: Your soil parameters look good! \
         The recommended fertilizer should work perfectly for your crop.",
    );

    let mut set = EncoderSet::new();
    set.insert("soil_type".into(), encoders.soil.clone() as Arc<dyn Encoder>);
    set.insert("crop_type".into(), encoders.crop.clone() as Arc<dyn Encoder>);

    Ok(PipelineConfig {
        name: PipelineKind::Fertilizer.as_str().into(),
        fields,
        order: names(&[
            "temperature",
            "humidity",
            "moisture",
            "soil_type",
            "crop_type",
            "N",
            "K",
            "P",
        ]),
        labels: LabelTable::new(encoders.fertilizer.classes().iter().cloned())?,
        descriptions: IndexMap::new(),
        advisory,
        encoders: set,
        policy,
        report: PipelineKind::Fertilizer.report_layout(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembler::assemble,
        field::{FieldValue, RawValue, ValidatedInputs},
    };

    fn encoders() -> FertilizerEncoders {
        let make = |field: &str, classes: &[&str]| {
            Arc::new(LabelEncoder::new(field, names(classes)).unwrap())
        };
        FertilizerEncoders {
            soil: make("soil_type", &["Black", "Clayey", "Loamy", "Red", "Sandy"]),
            crop: make("crop_type", &["Maize", "Paddy", "Wheat"]),
            fertilizer: make("fertilizer", &["DAP", "Urea"]),
        }
    }

    fn defaults(config: &PipelineConfig) -> ValidatedInputs {
        config
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.default.clone()))
            .collect()
    }

    #[test]
    fn every_config_is_internally_consistent() {
        crop_config(RangePolicy::Clamp).unwrap().validate().unwrap();
        fertility_config(RangePolicy::Clamp).unwrap().validate().unwrap();
        fertilizer_config(&encoders(), RangePolicy::Clamp)
            .unwrap()
            .validate()
            .unwrap();
    }

    #[test]
    fn assembled_columns_follow_trained_order() {
        let configs = [
            crop_config(RangePolicy::Clamp).unwrap(),
            fertility_config(RangePolicy::Clamp).unwrap(),
            fertilizer_config(&encoders(), RangePolicy::Clamp).unwrap(),
        ];
        for config in &configs {
            let mut values = defaults(config);
            values.reverse();
            let record = assemble(&values, &config.order, &config.encoders).unwrap();
            assert_eq!(record.columns(), config.order.as_slice(), "{}", config.name);
        }
    }

    #[test]
    fn crop_labels_are_capitalized_with_notes() {
        let config = crop_config(RangePolicy::Clamp).unwrap();
        assert_eq!(config.labels.len(), 22);
        assert_eq!(config.labels.decode(0).unwrap(), "Rice");
        assert_eq!(config.labels.decode(3).unwrap(), "Kidneybeans");
        assert_eq!(config.labels.decode(21).unwrap(), "Coffee");
        for label in config.labels.iter() {
            assert!(config.descriptions.contains_key(label), "{label}");
        }
    }

    #[test]
    fn fertility_rules_follow_nutrient_thresholds() {
        let config = fertility_config(RangePolicy::Clamp).unwrap();
        let mut values = defaults(&config);
        values.insert("N".into(), FieldValue::Float(30.0));
        values.insert("pH".into(), FieldValue::Float(8.5));
        let record = assemble(&values, &config.order, &config.encoders).unwrap();
        assert_eq!(
            config.advisory.evaluate(&record),
            vec!["Low Nitrogen: Add compost or urea", "Alkaline Soil: Add gypsum or sulfur"]
        );
    }

    #[test]
    fn fertilizer_low_nitrogen_tip_depends_on_threshold() {
        let config = fertilizer_config(&encoders(), RangePolicy::Clamp).unwrap();
        let nitrogen = config.field("N").unwrap();
        let mut values = defaults(&config);

        values.insert(
            "N".into(),
            nitrogen.validate(Some(&RawValue::from(10_i64)), config.policy).unwrap(),
        );
        let record = assemble(&values, &config.order, &config.encoders).unwrap();
        let tips = config.advisory.evaluate(&record);
        assert!(tips[0].starts_with("Low Nitrogen Detected"));

        values.insert("N".into(), FieldValue::Integer(80));
        let record = assemble(&values, &config.order, &config.encoders).unwrap();
        let tips = config.advisory.evaluate(&record);
        assert!(tips.iter().all(|tip| !tip.starts_with("Low Nitrogen")));
    }

    #[test]
    fn fertilizer_fallback_when_conditions_are_fine() {
        let config = fertilizer_config(&encoders(), RangePolicy::Clamp).unwrap();
        let mut values = defaults(&config);
        values.insert("N".into(), FieldValue::Integer(40));
        values.insert("P".into(), FieldValue::Integer(30));
        values.insert("K".into(), FieldValue::Integer(30));
        let record = assemble(&values, &config.order, &config.encoders).unwrap();
        let tips = config.advisory.evaluate(&record);
        assert_eq!(tips.len(), 1);
        assert!(tips[0].starts_with("Optimal Conditions"));
    }

    #[test]
    fn fertilizer_categories_come_from_encoders() {
        let config = fertilizer_config(&encoders(), RangePolicy::Clamp).unwrap();
        let soil = config.field("soil_type").unwrap();
        assert_eq!(soil.default, FieldValue::Category("Black".into()));
        assert_eq!(config.labels.decode(1).unwrap(), "Urea");
    }

    #[test]
    fn kinds_parse_and_name_reports() {
        assert_eq!("Fertility".parse::<PipelineKind>().unwrap(), PipelineKind::Fertility);
        assert!("orchard".parse::<PipelineKind>().is_err());
        assert_eq!(
            PipelineKind::Crop.report_layout().file_name_for("Rice"),
            "Crop_Recommendation_Rice.pdf"
        );
        assert_eq!(PipelineKind::ALL.map(PipelineKind::as_str), ["crop", "fertility", "fertilizer"]);
    }
}
