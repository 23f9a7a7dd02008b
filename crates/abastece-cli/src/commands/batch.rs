//! Batch command - extract many receipts into one CSV file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use abastece_core::pdf;
use abastece_core::DocumentOutcome;

use super::{build_pipeline, format_checklist, format_outcomes, load_config, write_records, Mode, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files, directories or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// CSV output file (default: output.csv_path from the configuration)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the records as JSON to this file
    #[arg(long)]
    json: Option<PathBuf>,

    /// Extraction mode
    #[arg(short, long, value_enum, default_value = "vision")]
    mode: Mode,

    /// Do not print the per-document checklist
    #[arg(short, long)]
    quiet: bool,
}

pub fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files = collect_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No supported files found in: {}", args.inputs.join(", "));
    }

    let pipeline = build_pipeline(&config, args.mode.into())?;

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut outcomes: Vec<DocumentOutcome> = Vec::with_capacity(files.len());
    for path in &files {
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        pb.set_message(name.to_string());

        let outcome = pipeline.process_file(path);
        if let Some(error) = &outcome.error {
            warn!("Failed to process {}: {}", path.display(), error);
        }
        if !args.quiet {
            pb.println(format_checklist(&outcome));
        }

        outcomes.push(outcome);
        pb.inc(1);
    }

    pb.finish_with_message("Complete");

    let csv_path = args.output.clone().unwrap_or_else(|| config.output.csv_path.clone());
    write_csv(&csv_path, &outcomes)?;
    println!(
        "{} CSV written to {}",
        style("✓").green(),
        csv_path.display()
    );

    if let Some(json_path) = &args.json {
        fs::write(json_path, format_outcomes(&outcomes, OutputFormat::Json)?)?;
        println!(
            "{} JSON written to {}",
            style("✓").green(),
            json_path.display()
        );
    }

    print_summary(&outcomes);
    debug!("Batch finished in {:?}", start.elapsed());

    Ok(())
}

/// Expand files, directories and glob patterns into supported documents.
///
/// Directory entries are not recursed into. Order follows the inputs, and
/// paths from a directory or pattern are sorted.
fn collect_inputs(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut seen = BTreeSet::new();
    let mut files = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        let mut found: Vec<PathBuf> = if path.is_dir() {
            fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect()
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            glob(input)?.filter_map(|r| r.ok()).filter(|p| p.is_file()).collect()
        };
        found.sort();

        for file in found {
            if !pdf::is_supported(&file) {
                debug!("Skipping unsupported file {}", file.display());
                continue;
            }
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }

    Ok(files)
}

fn write_csv(path: &Path, outcomes: &[DocumentOutcome]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    write_records(&mut wtr, outcomes.iter().map(|o| &o.record))
}

fn print_summary(outcomes: &[DocumentOutcome]) {
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    let flagged: Vec<&DocumentOutcome> = outcomes.iter().filter(|o| o.review.needs_review).collect();

    println!();
    println!(
        "{} Processed {} files ({} failed)",
        style("✓").green(),
        outcomes.len(),
        failed
    );

    if !flagged.is_empty() {
        println!(
            "{} {} files need manual review:",
            style("⚠").yellow(),
            flagged.len()
        );
        for outcome in flagged {
            println!(
                "  - {} (certeza_ia {})",
                outcome.record.source_file,
                outcome.record.confidence.as_deref().unwrap_or("-")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collect_inputs_from_directory_and_glob() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PNG", "notas.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let dir_input = dir.path().to_string_lossy().into_owned();
        let glob_input = dir.path().join("*.pdf").to_string_lossy().into_owned();
        let files = collect_inputs(&[dir_input, glob_input]).unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.pdf"]);
    }

    #[test]
    fn test_collect_inputs_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("*.pdf").to_string_lossy().into_owned();
        assert!(collect_inputs(&[pattern]).unwrap().is_empty());
    }
}
