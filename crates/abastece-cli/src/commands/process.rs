//! Process command - extract fields from a single receipt.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use abastece_core::pdf;

use super::{build_pipeline, format_outcomes, load_config, Mode, OutputFormat};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Extraction mode
    #[arg(short, long, value_enum, default_value = "vision")]
    mode: Mode,
}

pub fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    if !pdf::is_supported(&args.input) {
        anyhow::bail!("Unsupported file format: {}", args.input.display());
    }

    let pipeline = build_pipeline(&config, args.mode.into())?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!("Processing {}", args.input.display()));
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let outcome = pipeline.process_file(&args.input);
    pb.finish_and_clear();

    debug!(
        "{} regions in {}ms",
        outcome.regions, outcome.processing_time_ms
    );

    let output = format_outcomes(std::slice::from_ref(&outcome), args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if let Some(message) = &outcome.review.message {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }

    if let Some(error) = outcome.error {
        anyhow::bail!(error);
    }

    Ok(())
}
