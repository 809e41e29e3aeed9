//! Configuration types for dataset preparation operations

use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(PrepError::invalid_config(format!(
                "Unknown execution provider '{}' (expected auto, cpu, cuda or coreml)",
                other
            ))),
        }
    }
}

/// Configuration for the object detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Path to the ONNX weight file
    pub model_path: PathBuf,

    /// Minimum class score for a candidate to be kept (0.0-1.0)
    pub confidence_threshold: f32,

    /// IoU above which overlapping same-class boxes are suppressed (0.0-1.0)
    pub iou_threshold: f32,

    /// Square model input size in pixels
    pub input_size: u32,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
        }
    }
}

impl DetectorConfig {
    #[must_use]
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Confidence or IoU threshold outside 0.0-1.0
    /// - Input size of zero or not a multiple of 32
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PrepError::config_value_error(
                "confidence threshold",
                self.confidence_threshold,
                "0.0-1.0",
                Some(0.25),
            ));
        }

        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(PrepError::config_value_error(
                "IoU threshold",
                self.iou_threshold,
                "0.0-1.0",
                Some(0.45),
            ));
        }

        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(PrepError::config_value_error(
                "input size",
                self.input_size,
                "positive multiple of 32",
                Some(640),
            ));
        }

        Ok(())
    }
}

/// Builder for `DetectorConfig`
#[derive(Debug, Default)]
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl DetectorConfigBuilder {
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_path = path.into();
        self
    }

    #[must_use]
    pub fn confidence_threshold(mut self, threshold: f32) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn iou_threshold(mut self, threshold: f32) -> Self {
        self.config.iou_threshold = threshold;
        self
    }

    #[must_use]
    pub fn input_size(mut self, size: u32) -> Self {
        self.config.input_size = size;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Build the configuration, validating it first
    ///
    /// # Errors
    /// - Any rule checked by [`DetectorConfig::validate`]
    pub fn build(self) -> Result<DetectorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for a person-occupancy scoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreConfig {
    /// Root of the class-labeled corpus
    pub corpus_dir: PathBuf,

    /// Where the record list is written
    pub output_path: PathBuf,

    /// Only attempt files with a known image extension
    pub images_only: bool,

    pub detector: DetectorConfig,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("data/train"),
            output_path: PathBuf::from("detection_list.json"),
            images_only: true,
            detector: DetectorConfig::default(),
        }
    }
}

impl ScoreConfig {
    /// # Errors
    /// - Invalid detector settings
    pub fn validate(&self) -> Result<()> {
        self.detector.validate()
    }
}

/// Configuration for a train/test split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Directory holding one subdirectory per class
    pub input_dir: PathBuf,
    pub train_dir: PathBuf,
    pub test_dir: PathBuf,

    /// Fraction of each class moved to the test set (0.0-1.0)
    pub test_ratio: f64,

    /// Seed for a reproducible split; `None` draws from the OS
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            train_dir: PathBuf::from("train"),
            test_dir: PathBuf::from("test"),
            test_ratio: 0.2,
            seed: None,
        }
    }
}

impl SplitConfig {
    /// # Errors
    /// - Test ratio outside 0.0-1.0
    /// - Input directory equal to the train or test directory
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.test_ratio) {
            return Err(PrepError::config_value_error(
                "test ratio",
                self.test_ratio,
                "0.0-1.0",
                Some(0.2),
            ));
        }

        if self.input_dir == self.train_dir || self.input_dir == self.test_dir {
            return Err(PrepError::invalid_config(
                "input directory must differ from the train and test directories",
            ));
        }

        if self.train_dir == self.test_dir {
            return Err(PrepError::invalid_config(
                "train and test directories must differ",
            ));
        }

        Ok(())
    }
}

/// Configuration for scraping images listed in a spreadsheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// CSV file with one row per candidate image
    pub csv_path: PathBuf,

    /// Column holding the class label
    pub label_column: String,

    /// Column holding the image URL
    pub link_column: String,

    /// Images are saved under `<output_dir>/<label>/`
    pub output_dir: PathBuf,

    /// CSV written with one `label,file_name` row per saved image
    pub mapping_file: PathBuf,

    /// Upper bound on rows attempted
    pub max_images: usize,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("water_tech_image_links.csv"),
            label_column: "water_tech".to_string(),
            link_column: "photo_lnk".to_string(),
            output_dir: PathBuf::from("data/images"),
            mapping_file: PathBuf::from("data/water_tech_dictionary.csv"),
            max_images: 1000,
            timeout_secs: 30,
        }
    }
}

impl ScrapeConfig {
    /// # Errors
    /// - Empty column names
    /// - Zero timeout
    pub fn validate(&self) -> Result<()> {
        if self.label_column.trim().is_empty() || self.link_column.trim().is_empty() {
            return Err(PrepError::invalid_config("column names must not be empty"));
        }

        if self.timeout_secs == 0 {
            return Err(PrepError::config_value_error(
                "timeout",
                self.timeout_secs,
                "1 or more seconds",
                Some(30),
            ));
        }

        Ok(())
    }
}
