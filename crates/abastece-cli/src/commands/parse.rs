//! Parse command - run the regex rules over recognized text.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use abastece_core::ReceiptPipeline;

use super::{format_outcomes, load_config, OutputFormat};

/// Arguments for the parse command.
#[derive(Args)]
pub struct ParseArgs {
    /// Text file with OCR output (default: stdin)
    input: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub fn run(args: ParseArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let pipeline = ReceiptPipeline::new(&config)?;

    let (name, text) = match &args.input {
        Some(path) if path.as_os_str() != "-" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            (name, text)
        }
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            ("stdin".to_string(), text)
        }
    };

    let outcome = pipeline.process_text(&name, &text);
    println!("{}", format_outcomes(std::slice::from_ref(&outcome), args.format)?);

    Ok(())
}
