//! Batch processing command for multiple fapiao files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::StreamExt;
use futures_util::stream;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use fapiao_core::models::record::DISPLAY_HEADERS;
use fapiao_core::{DocumentKind, ExtractedRecord, ExtractionMode, UploadedDocument};

use super::process::{OutputFormat, format_record};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern for input files
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Exit successfully even when some files fail
    #[arg(long)]
    continue_on_error: bool,

    /// Extraction mode (regex, llm, vlm); defaults to the configured mode
    #[arg(short, long)]
    mode: Option<ExtractionMode>,

    /// Model profile name; defaults to the active profile
    #[arg(short, long)]
    profile: Option<String>,
}

/// Result of processing a single file.
struct ProcessResult {
    path: PathBuf,
    record: ExtractedRecord,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = super::load_config(config_path)?;

    let mut files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file() && DocumentKind::from_extension(p).is_some())
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    // Mode and model profile are fixed for the whole batch.
    let pipeline = Arc::new(super::build_pipeline(
        &config,
        args.mode,
        args.profile.as_deref(),
    )?);
    debug!(mode = %pipeline.mode(), jobs = args.jobs, "starting batch");

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut tasks = stream::iter(files.into_iter().enumerate())
        .map(|(index, path)| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                let file_start = Instant::now();
                let name = file_name(&path);
                let worker_path = path.clone();
                let worker_name = name.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    match UploadedDocument::from_path(&worker_path) {
                        Ok(document) => pipeline.process(&document),
                        Err(e) => ExtractedRecord::failed(worker_name, format!("cannot read file: {e}")),
                    }
                })
                .await;
                let record = joined.unwrap_or_else(|e| {
                    error!("Worker for {} did not finish: {}", path.display(), e);
                    ExtractedRecord::failed(name, format!("worker aborted: {e}"))
                });
                let result = ProcessResult {
                    path,
                    record,
                    processing_time_ms: file_start.elapsed().as_millis() as u64,
                };
                (index, result)
            }
        })
        .buffer_unordered(args.jobs.max(1));

    let mut results = Vec::new();
    while let Some((index, result)) = tasks.next().await {
        if let Some(reason) = &result.record.error_reason {
            warn!("Failed to process {}: {}", result.path.display(), reason);
        }
        overall_pb.inc(1);
        results.push((index, result));
    }
    drop(tasks);
    overall_pb.finish_and_clear();

    // The blocking HTTP client must not be dropped on the async runtime.
    tokio::task::spawn_blocking(move || drop(pipeline)).await?;

    results.sort_by_key(|(index, _)| *index);
    let results: Vec<ProcessResult> = results.into_iter().map(|(_, result)| result).collect();

    if let Some(output_dir) = &args.output_dir {
        for result in results.iter().filter(|r| !r.record.is_failed()) {
            let output_name = result
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("fapiao");
            let output_path =
                output_dir.join(format!("{}.{}", output_name, args.format.extension()));
            fs::write(&output_path, format_record(&result.record, args.format)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| r.record.is_failed()).collect();
    let successful = results.len() - failed.len();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.record.error_reason.as_deref().unwrap_or("unknown error")
            );
        }
        if !args.continue_on_error {
            anyhow::bail!("{} of {} files failed", failed.len(), results.len());
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One row per file: the display row, then status and timing.
fn write_summary(path: &Path, results: &[ProcessResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = DISPLAY_HEADERS.to_vec();
    header.extend(["状态", "处理时间(ms)"]);
    wtr.write_record(&header)?;

    for result in results {
        let status = if result.record.is_failed() { "error" } else { "success" };
        let mut row = result.record.display_row().to_vec();
        row.push(status.to_string());
        row.push(result.processing_time_ms.to_string());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_rows_follow_display_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let results = vec![
            ProcessResult {
                path: PathBuf::from("a.pdf"),
                record: ExtractedRecord {
                    invoice_number: Some("12345678".to_string()),
                    ..ExtractedRecord::new("a.pdf")
                },
                processing_time_ms: 5,
            },
            ProcessResult {
                path: PathBuf::from("b.pdf"),
                record: ExtractedRecord::failed("b.pdf", "PDF has no pages"),
                processing_time_ms: 1,
            },
        ];

        write_summary(&path, &results).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 13);
        assert_eq!(&headers[0], "文件名");
        assert_eq!(&headers[11], "状态");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][1], "12345678");
        assert_eq!(&rows[0][11], "success");
        assert_eq!(&rows[1][2], "未提取");
        assert_eq!(&rows[1][10], "PDF has no pages");
        assert_eq!(&rows[1][11], "error");
    }
}
