use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use agrifusion_core::{
    AdvisorConfig, AdvisorTelemetry, AgronomyAdvisor, FieldSpec, PdfReport, Pipeline,
    PipelineKind, PredictionResult, RawInputs, RawValue, ReportFormat, TextReport,
};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "agri",
    version,
    about = "Crop, soil fertility and fertilizer recommendations"
)]
struct Cli {
    /// Advisor configuration; defaults apply when the file is absent.
    #[arg(long, global = true, default_value = "agrifusion.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs one pipeline over the supplied inputs.
    Predict {
        /// crop, fertility or fertilizer.
        pipeline: PipelineKind,
        /// Input as NAME=VALUE; omitted fields take their defaults.
        #[arg(short = 'f', long = "field", value_parser = parse_assignment)]
        fields: Vec<(String, String)>,
        /// Prints the result as JSON.
        #[arg(long)]
        json: bool,
        /// Writes a report to this file, or into this directory under its suggested name.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Lists the input fields of a pipeline.
    Fields {
        /// crop, fertility or fertilizer.
        pipeline: PipelineKind,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AdvisorConfig::load_or_default(&cli.config)?;
    let telemetry = telemetry(&config)?;
    let advisor = AgronomyAdvisor::new(config, telemetry);
    match cli.command {
        Commands::Predict {
            pipeline,
            fields,
            json,
            report,
        } => {
            let handle = advisor.pipeline(pipeline)?;
            let inputs: RawInputs = fields
                .into_iter()
                .map(|(name, value)| (name, RawValue::Text(value)))
                .collect();
            let result = handle.run(&inputs)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", render_text(&handle, &result));
            }
            if let Some(target) = report {
                let written = write_report(&handle, &result, &target)?;
                eprintln!("report written to {}", written.display());
            }
            Ok(())
        }
        Commands::Fields { pipeline } => {
            for field in advisor.fields(pipeline)? {
                println!("{}", describe_field(&field));
            }
            Ok(())
        }
    }
}

fn telemetry(config: &AdvisorConfig) -> Result<AdvisorTelemetry> {
    if !config.logging.enabled {
        return Ok(AdvisorTelemetry::disabled());
    }
    AdvisorTelemetry::builder("agri")
        .log_path(&config.logging.path)
        .min_level(config.logging.min_level()?)
        .build()
        .with_context(|| format!("opening log file {}", config.logging.path.display()))
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn render_text(pipeline: &Pipeline, result: &PredictionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", pipeline.config().report.heading, result.label);
    if let Some(description) = &result.description {
        let _ = writeln!(out, "{description}");
    }
    if !result.advisories.is_empty() {
        let _ = writeln!(out);
        for (idx, tip) in result.advisories.iter().enumerate() {
            let _ = writeln!(out, "Tip {}: {tip}", idx + 1);
        }
    }
    out
}

fn describe_field(field: &FieldSpec) -> String {
    let unit = field.unit.as_deref().map_or_else(String::new, |unit| format!(" ({unit})"));
    format!(
        "{:<12} {}{unit}: {} default {}",
        field.name,
        field.label,
        field.domain(),
        field.default
    )
}

fn write_report(pipeline: &Pipeline, result: &PredictionResult, target: &Path) -> Result<PathBuf> {
    let path = if target.is_dir() {
        target.join(pipeline.report_file_name(result))
    } else {
        target.to_path_buf()
    };
    let document = pipeline.report(result).generated_at(Utc::now());
    let bytes = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(TextReport.extension()) => TextReport.render(&document),
        _ => PdfReport.render(&document),
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    fs::write(&path, bytes).with_context(|| format!("writing report {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn advisor() -> AgronomyAdvisor {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../core");
        AgronomyAdvisor::new(AdvisorConfig::rooted_at(root), AdvisorTelemetry::disabled())
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(
            parse_assignment("soil_type = Sandy").unwrap(),
            ("soil_type".to_string(), "Sandy".to_string())
        );
        assert_eq!(parse_assignment("N=").unwrap().1, "");
        assert!(parse_assignment("N").is_err());
        assert!(parse_assignment("=3").is_err());
    }

    #[test]
    fn cli_accepts_repeated_fields() {
        let cli = Cli::try_parse_from([
            "agri", "predict", "fertility", "-f", "N=30", "--field", "pH=5.5", "--json",
        ])
        .unwrap();
        let Commands::Predict {
            pipeline,
            fields,
            json,
            report,
        } = cli.command
        else {
            panic!("expected predict");
        };
        assert_eq!(pipeline, PipelineKind::Fertility);
        assert_eq!(fields.len(), 2);
        assert!(json && report.is_none());
        assert!(Cli::try_parse_from(["agri", "predict", "orchard"]).is_err());
    }

    #[test]
    fn renders_numbered_tips() {
        let pipeline = advisor().pipeline(PipelineKind::Fertility).unwrap();
        let mut inputs = RawInputs::new();
        inputs.insert("N".into(), RawValue::Text("30".into()));
        inputs.insert("pH".into(), RawValue::Text("5.5".into()));
        let result = pipeline.run(&inputs).unwrap();
        let text = render_text(&pipeline, &result);
        assert!(text.starts_with("Soil Fertility: Low Fertility\n"));
        assert!(text.contains("Tip 1: Low Nitrogen: Add compost or urea"));
        assert!(text.contains("Tip 2: Acidic Soil: Add lime"));
    }

    #[test]
    fn report_lands_under_suggested_name_in_directories() {
        let dir = tempdir().unwrap();
        let pipeline = advisor().pipeline(PipelineKind::Fertilizer).unwrap();
        let result = pipeline.run(&RawInputs::new()).unwrap();
        let written = write_report(&pipeline, &result, dir.path()).unwrap();
        assert_eq!(written, dir.path().join("Fertilizer_Recommendation_17-17-17.pdf"));
        assert!(fs::read(&written).unwrap().starts_with(b"%PDF-1.4"));

        let text = write_report(&pipeline, &result, &dir.path().join("out/report.txt")).unwrap();
        let body = fs::read_to_string(text).unwrap();
        assert!(body.contains("Recommended Fertilizer: 17-17-17"));
        assert!(body.contains("Nitrogen: 30 mg/kg"));
    }

    #[test]
    fn describes_fields_with_domain_and_unit() {
        let fields = advisor().fields(PipelineKind::Crop).unwrap();
        let line = describe_field(&fields[0]);
        assert!(line.starts_with("N"));
        assert!(line.contains("Nitrogen (kg/ha): [0, 150] default 50"));
    }
}
