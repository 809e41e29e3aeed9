//! Dataset preparation CLI
//!
//! One subcommand per utility: scoring, filtering, splitting, scraping and
//! fetching detector weights.

use super::config::CliConfigBuilder;
use crate::tracing_config::TracingFormat;
use crate::{fetch_model, filter_human_centric, load_records, scrape_images, split_dataset};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

/// Image dataset preparation tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgprep")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = TracingFormat::Console)]
    pub log_format: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score every image in a class-labeled corpus by person coverage
    Score(ScoreArgs),
    /// Print the paths of records whose person coverage meets a threshold
    Filter(FilterArgs),
    /// Move class directories into train and test sets
    Split(SplitArgs),
    /// Download images listed in a CSV file
    Scrape(ScrapeArgs),
    /// Download detector weights
    FetchModel(FetchModelArgs),
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Corpus root containing one directory per class
    #[arg(long, value_name = "DIR")]
    pub corpus: PathBuf,

    /// ONNX detector weights
    #[arg(long, value_name = "FILE", default_value = "models/yolov8n.onnx")]
    pub model: PathBuf,

    /// Record list to write
    #[arg(short, long, value_name = "FILE", default_value = "detection_list.json")]
    pub output: PathBuf,

    /// Minimum detection confidence (0.0-1.0)
    #[arg(long, default_value_t = 0.25)]
    pub confidence: f32,

    /// IoU threshold for non-maximum suppression (0.0-1.0)
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// Square detector input size, a multiple of 32
    #[arg(long, default_value_t = 640)]
    pub input_size: u32,

    /// Execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// Number of intra-op threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Attempt every file, not only known image extensions
    #[arg(long)]
    pub all_files: bool,
}

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Record list written by `score`
    #[arg(long, value_name = "FILE", default_value = "detection_list.json")]
    pub records: PathBuf,

    /// Minimum summed person ratio
    #[arg(long, default_value_t = 0.1)]
    pub min_ratio: f64,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    #[arg(long, value_name = "DIR", default_value = "data")]
    pub input: PathBuf,

    #[arg(long, value_name = "DIR", default_value = "train")]
    pub train: PathBuf,

    #[arg(long, value_name = "DIR", default_value = "test")]
    pub test: PathBuf,

    /// Fraction of each class moved to the test set
    #[arg(long, default_value_t = 0.2)]
    pub test_ratio: f64,

    /// Seed for a reproducible split
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// CSV file with label and link columns
    #[arg(long, value_name = "FILE")]
    pub csv: PathBuf,

    /// Directory receiving one subdirectory per label (reset on start)
    #[arg(short, long, value_name = "DIR", default_value = "data/images")]
    pub output: PathBuf,

    /// Mapping CSV listing every saved image
    #[arg(long, value_name = "FILE", default_value = "data/water_tech_dictionary.csv")]
    pub mapping: PathBuf,

    #[arg(long, default_value = "water_tech")]
    pub label_column: String,

    #[arg(long, default_value = "photo_lnk")]
    pub link_column: String,

    /// Upper bound on rows attempted
    #[arg(long, default_value_t = 1000)]
    pub max_images: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct FetchModelArgs {
    /// URL of the ONNX weight file
    #[arg(long)]
    pub url: String,

    /// Destination path
    #[arg(short, long, value_name = "FILE", default_value = "models/yolov8n.onnx")]
    pub output: PathBuf,

    /// Expected SHA-256 (hex) of the weight file
    #[arg(long)]
    pub sha256: Option<String>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    crate::tracing_config::init_cli_tracing(cli.verbose, cli.log_format)
        .context("Failed to initialize tracing")?;

    match cli.command {
        Command::Score(args) => score(&args),
        Command::Filter(args) => filter(&args),
        Command::Split(args) => split(&args),
        Command::Scrape(args) => scrape(&args).await,
        Command::FetchModel(args) => fetch(&args).await,
    }
}

#[cfg(feature = "onnx")]
fn score(args: &ScoreArgs) -> Result<()> {
    let config = CliConfigBuilder::score_config(args).context("Invalid score arguments")?;
    let start = Instant::now();

    let pb = progress_bar(0);
    let report = crate::score_corpus_with_progress(&config, |index, total, path| {
        pb.set_length(total as u64);
        pb.set_position(index as u64);
        pb.set_message(
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
    })
    .with_context(|| {
        format!(
            "Failed to score corpus {} with {}",
            config.corpus_dir.display(),
            config.detector.model_path.display()
        )
    })?;
    pb.finish_and_clear();

    for skipped in &report.skipped {
        warn!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    info!(
        "Wrote {} record(s) to {} in {:.1}s ({} skipped, {} detector failure(s))",
        report.records.len(),
        config.output_path.display(),
        start.elapsed().as_secs_f64(),
        report.skipped.len(),
        report.detection_failures
    );
    Ok(())
}

#[cfg(not(feature = "onnx"))]
fn score(_args: &ScoreArgs) -> Result<()> {
    anyhow::bail!("Scoring requires the `onnx` feature. Please rebuild with --features onnx")
}

fn filter(args: &FilterArgs) -> Result<()> {
    if !args.min_ratio.is_finite() || args.min_ratio < 0.0 {
        anyhow::bail!("--min-ratio must be a non-negative number");
    }

    let records = load_records(&args.records)
        .with_context(|| format!("Failed to load records from {}", args.records.display()))?;

    let kept = filter_human_centric(&records, args.min_ratio);
    for record in &kept {
        println!("{}", record.path);
    }

    info!(
        "{} of {} record(s) have person coverage >= {}",
        kept.len(),
        records.len(),
        args.min_ratio
    );
    Ok(())
}

fn split(args: &SplitArgs) -> Result<()> {
    let config = CliConfigBuilder::split_config(args);
    let summary = split_dataset(&config)
        .with_context(|| format!("Failed to split {}", config.input_dir.display()))?;

    info!(
        "Split {} class(es): {} train, {} test",
        summary.classes.len(),
        summary.train_total(),
        summary.test_total()
    );
    Ok(())
}

async fn scrape(args: &ScrapeArgs) -> Result<()> {
    let config = CliConfigBuilder::scrape_config(args);
    let start = Instant::now();

    let summary = scrape_images(&config)
        .await
        .with_context(|| format!("Failed to scrape images listed in {}", config.csv_path.display()))?;

    info!(
        "Saved {} of {} image(s) in {:.1}s, mapping written to {}",
        summary.saved,
        summary.attempted,
        start.elapsed().as_secs_f64(),
        config.mapping_file.display()
    );
    Ok(())
}

async fn fetch(args: &FetchModelArgs) -> Result<()> {
    let digest = fetch_model(&args.url, &args.output, args.sha256.as_deref(), true)
        .await
        .with_context(|| format!("Failed to fetch model from {}", args.url))?;

    println!("{}  {}", digest, args.output.display());
    Ok(())
}

#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
