//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod parse;
pub mod process;

use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;

use abastece_core::error::VisionError;
use abastece_core::models::config::AbasteceConfig;
use abastece_core::{
    csv_header, DocumentOutcome, ExtractedRecord, ExtractionMode, OpenRouterClient,
    ReceiptPipeline, TesseractEngine,
};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON list of records
    Json,
    /// CSV with the export header
    Csv,
    /// Per-field checklist
    Text,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum Mode {
    /// Tesseract OCR and regex rules
    Ocr,
    /// Hosted vision model
    #[default]
    Vision,
    /// OCR first, vision model for the rest
    Hybrid,
}

impl From<Mode> for ExtractionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Ocr => ExtractionMode::Ocr,
            Mode::Vision => ExtractionMode::Vision,
            Mode::Hybrid => ExtractionMode::Hybrid,
        }
    }
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("abastece")
        .join("config.json")
}

/// Configuration file in use: the explicit one or the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// Load the configuration, falling back to defaults when no file exists.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<AbasteceConfig> {
    if let Some(path) = explicit {
        return AbasteceConfig::from_file(Path::new(path))
            .with_context(|| format!("failed to read config file {path}"));
    }

    let path = default_config_path();
    if path.exists() {
        AbasteceConfig::from_file(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))
    } else {
        Ok(AbasteceConfig::default())
    }
}

/// Build a pipeline with the engines the mode needs.
///
/// A missing API key stops here, before any document is read.
pub fn build_pipeline(config: &AbasteceConfig, mode: ExtractionMode) -> anyhow::Result<ReceiptPipeline> {
    let mut pipeline = ReceiptPipeline::new(config)?.with_mode(mode);

    if mode.uses_ocr() {
        pipeline = pipeline.with_ocr_engine(Box::new(TesseractEngine::from_config(&config.ocr)));
    }

    if mode.uses_vision() {
        let client = match OpenRouterClient::from_config(&config.vision) {
            Ok(client) => client,
            Err(VisionError::MissingApiKey(var)) => {
                anyhow::bail!(
                    "API key not found: set the {} environment variable or use --mode ocr",
                    var
                );
            }
            Err(e) => return Err(e.into()),
        };
        pipeline = pipeline.with_vision_client(Box::new(client));
    }

    pipeline.ensure_ready()?;
    Ok(pipeline)
}

/// Render outcomes in the requested format.
pub fn format_outcomes(outcomes: &[DocumentOutcome], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            let records: Vec<&ExtractedRecord> = outcomes.iter().map(|o| &o.record).collect();
            Ok(serde_json::to_string_pretty(&records)?)
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            write_records(&mut wtr, outcomes.iter().map(|o| &o.record))?;
            Ok(String::from_utf8(wtr.into_inner()?)?)
        }
        OutputFormat::Text => Ok(outcomes
            .iter()
            .map(format_checklist)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

/// Write the export header and one row per record.
pub fn write_records<'a, W, I>(wtr: &mut csv::Writer<W>, records: I) -> anyhow::Result<()>
where
    W: std::io::Write,
    I: IntoIterator<Item = &'a ExtractedRecord>,
{
    wtr.write_record(csv_header())?;
    for record in records {
        wtr.write_record(record.csv_row())?;
    }
    wtr.flush()?;
    Ok(())
}

/// Found/missing view of one document.
pub fn format_checklist(outcome: &DocumentOutcome) -> String {
    let record = &outcome.record;
    let checklist = record.checklist();
    let mut output = String::new();

    output.push_str(&format!(
        "{} ({} campos)\n",
        style(&record.source_file).bold(),
        checklist.summary()
    ));

    for (field, value) in &checklist.entries {
        match value {
            Some(value) => {
                output.push_str(&format!("  {} {}: {}\n", style("✓").green(), field.label(), value))
            }
            None => output.push_str(&format!("  {} {}\n", style("✗").red(), field.label())),
        }
    }

    for (key, value) in &record.extra {
        output.push_str(&format!("  {} {}: {}\n", style("+").cyan(), key, value));
    }

    if let Some(confidence) = &record.confidence {
        output.push_str(&format!("  {} certeza_ia: {}\n", style("ℹ").blue(), confidence));
    }

    for warning in &record.warnings {
        output.push_str(&format!("  {} {}\n", style("!").yellow(), warning));
    }

    if let Some(message) = &outcome.review.message {
        output.push_str(&format!("  {}\n", style(message).yellow().bold()));
    }

    output
}
