#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # imgprep
//!
//! Data-preparation utilities for image-classification datasets.
//!
//! The core operation scores a class-labeled image corpus by how much of
//! each image is covered by detected people, so that human-centric images
//! can be filtered out before training a classifier.
//!
//! ## Features
//!
//! - **Person-occupancy scoring**: sum of person bounding-box areas over image area
//! - **Corpus walking**: deterministic two-level traversal with per-file skip policy
//! - **ONNX detector**: YOLO-family exports through ONNX Runtime (CUDA, `CoreML`, CPU)
//! - **Dataset utilities**: CSV-driven scraping, seeded train/test splitting,
//!   checksummed weight download
//! - **CLI Integration**: `imgprep` binary (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgprep::{save_records, walk_and_score, DetectorConfig, OnnxDetector};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = DetectorConfig::builder()
//!     .model_path("models/yolov8n.onnx")
//!     .confidence_threshold(0.3)
//!     .build()?;
//! let detector = OnnxDetector::load(&config)?;
//!
//! let records = walk_and_score(Path::new("data/train"), detector)?;
//! save_records("detection_list.json", &records)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime detector
//! - `cli` (default): command-line interface, progress bars and subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod detection;
pub mod download;
pub mod error;
pub mod inference;
pub mod ratio;
pub mod records;
pub mod scrape;
pub mod split;
pub mod tracing_config;
pub mod walker;

// Public API exports
pub use backends::MockDetector;
#[cfg(feature = "onnx")]
pub use backends::OnnxDetector;
pub use config::{
    DetectorConfig, DetectorConfigBuilder, ExecutionProvider, ScoreConfig, ScrapeConfig,
    SplitConfig,
};
pub use detection::{non_max_suppression, BoundingBox, Detection, PERSON_LABEL};
pub use download::{fetch_model, sha256_file, Downloader};
pub use error::{PrepError, Result};
pub use inference::ObjectDetector;
pub use ratio::{compute_person_ratios, human_ratio_sum};
pub use records::{filter_human_centric, load_records, save_records, ImageRecord};
pub use scrape::{scrape_images, ScrapeSummary};
pub use split::{split_dataset, SplitSummary};
pub use walker::{walk_and_score, CorpusListing, CorpusWalker, SkippedFile, WalkReport};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Score a corpus described by a [`ScoreConfig`] and write the record list
///
/// Loads the ONNX detector (fatal on failure), walks the corpus and saves
/// the records to `config.output_path`.
///
/// # Errors
/// - `PrepError::ModelLoad` when the detector cannot be loaded
/// - Corpus root missing or unreadable
/// - Record file cannot be written
#[cfg(feature = "onnx")]
pub fn score_corpus(config: &ScoreConfig) -> Result<WalkReport> {
    score_corpus_with_progress(config, |_, _, _| {})
}

/// Like [`score_corpus`], calling `on_file(index, total, path)` before each
/// file is scored
#[cfg(feature = "onnx")]
pub fn score_corpus_with_progress<F>(config: &ScoreConfig, on_file: F) -> Result<WalkReport>
where
    F: FnMut(usize, usize, &std::path::Path),
{
    let detector = OnnxDetector::load(&config.detector)?;
    score_corpus_with(config, detector, on_file)
}

/// Score `config.corpus_dir` with an already constructed detector and save
/// the records to `config.output_path`
///
/// The record file is written even when every file was skipped.
pub fn score_corpus_with<D, F>(config: &ScoreConfig, detector: D, on_file: F) -> Result<WalkReport>
where
    D: ObjectDetector,
    F: FnMut(usize, usize, &std::path::Path),
{
    config.validate()?;
    let report = CorpusWalker::new(detector)
        .images_only(config.images_only)
        .run_with_progress(&config.corpus_dir, on_file)?;
    save_records(&config.output_path, &report.records)?;
    Ok(report)
}
