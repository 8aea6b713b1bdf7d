//! Process command - extract fields from a single fapiao file.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use fapiao_core::models::record::DISPLAY_HEADERS;
use fapiao_core::{ExtractedRecord, ExtractionMode, UploadedDocument};

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
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Extraction mode (regex, llm, vlm); defaults to the configured mode
    #[arg(short, long)]
    mode: Option<ExtractionMode>,

    /// Model profile name; defaults to the active profile
    #[arg(short, long)]
    profile: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = super::load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let document = UploadedDocument::from_path(&args.input)?;
    let pipeline = super::build_pipeline(&config, args.mode, args.profile.as_deref())?;
    info!("Processing file: {} ({} mode)", args.input.display(), pipeline.mode());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!("Extracting {}...", document.name));
    pb.enable_steady_tick(Duration::from_millis(120));

    // The model client blocks, so the whole pipeline lives on a blocking thread.
    let record = tokio::task::spawn_blocking(move || pipeline.process(&document)).await?;

    pb.finish_and_clear();

    let output = format_record(&record, args.format)?;
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

    debug!("Total processing time: {:?}", start.elapsed());

    if let Some(reason) = &record.error_reason {
        anyhow::bail!("Extraction failed: {}", reason);
    }

    let missing = record.missing_fields();
    if !missing.is_empty() {
        eprintln!(
            "{} Fields not extracted: {}",
            style("!").yellow(),
            missing.join(", ")
        );
    }
    if !record.amounts_consistent() {
        eprintln!(
            "{} Amount plus tax does not match the total",
            style("!").yellow()
        );
    }

    Ok(())
}

/// Render one record in the requested format.
pub fn format_record(record: &ExtractedRecord, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        OutputFormat::Csv => format_csv(record),
        OutputFormat::Text => Ok(format_text(record)),
    }
}

fn format_csv(record: &ExtractedRecord) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(DISPLAY_HEADERS)?;
    wtr.write_record(record.display_row())?;
    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(record: &ExtractedRecord) -> String {
    let row = record.display_row();
    let mut output = String::new();
    for (label, value) in DISPLAY_HEADERS.iter().zip(&row).take(9) {
        output.push_str(&format!("{}: {}\n", label, value));
    }
    if let Some(reason) = &record.error_reason {
        output.push_str(&format!("{}: {}\n", DISPLAY_HEADERS[10], reason));
    }
    if !record.raw_text.is_empty() {
        output.push_str(&format!("\n{}:\n{}\n", DISPLAY_HEADERS[9], record.raw_text));
    }
    output
}
