#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! AgriFusion core – validates agronomic form inputs, runs frozen classifiers, decodes their
//! codes and attaches rule-based advice for the crop, soil-fertility and fertilizer pipelines.

/// Request-scoped error taxonomy.
pub mod error;

/// Field schemas and input validation.
pub mod field;

/// Categorical encoders.
pub mod encoder;

/// Feature vector assembly in trained column order.
pub mod assembler;

/// Predictor trait and JSON classifier artifacts.
pub mod predictor;

/// Code to label decoding.
pub mod labels;

/// Threshold advisory rules.
pub mod advisory;

/// Logging handle shared by the service and its pipelines.
pub mod telemetry;

/// Pipeline orchestration.
pub mod pipeline;

/// The crop, fertility and fertilizer pipeline definitions.
pub mod catalog;

/// Report documents and their PDF/text renderings.
pub mod report;

/// TOML configuration.
pub mod config;

/// Lazily loaded, process-wide advisor.
pub mod service;

pub use catalog::PipelineKind;
pub use config::AdvisorConfig;
pub use error::{PipelineError, PipelineResult};
pub use field::{FieldSpec, FieldValue, RangePolicy, RawInputs, RawValue};
pub use pipeline::{Pipeline, PipelineConfig, PredictionResult};
pub use report::{PdfReport, ReportDocument, ReportFormat, TextReport};
pub use service::AgronomyAdvisor;
pub use telemetry::AdvisorTelemetry;
