//! Conversion of CLI arguments into library configuration

use super::main_impl::{ScoreArgs, ScrapeArgs, SplitArgs};
use crate::config::{DetectorConfig, ExecutionProvider, ScoreConfig, ScrapeConfig, SplitConfig};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated [`ScoreConfig`] from `score` arguments
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    pub(crate) fn score_config(args: &ScoreArgs) -> Result<ScoreConfig> {
        let execution_provider: ExecutionProvider = args
            .execution_provider
            .parse()
            .context("Invalid execution provider")?;

        let detector = DetectorConfig::builder()
            .model_path(args.model.clone())
            .confidence_threshold(args.confidence)
            .iou_threshold(args.iou)
            .input_size(args.input_size)
            .execution_provider(execution_provider)
            .intra_threads(args.threads)
            .build()?;

        let config = ScoreConfig {
            corpus_dir: args.corpus.clone(),
            output_path: args.output.clone(),
            images_only: !args.all_files,
            detector,
        };
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn split_config(args: &SplitArgs) -> SplitConfig {
        SplitConfig {
            input_dir: args.input.clone(),
            train_dir: args.train.clone(),
            test_dir: args.test.clone(),
            test_ratio: args.test_ratio,
            seed: args.seed,
        }
    }

    pub(crate) fn scrape_config(args: &ScrapeArgs) -> ScrapeConfig {
        ScrapeConfig {
            csv_path: args.csv.clone(),
            label_column: args.label_column.clone(),
            link_column: args.link_column.clone(),
            output_dir: args.output.clone(),
            mapping_file: args.mapping.clone(),
            max_images: args.max_images,
            timeout_secs: args.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::main_impl::{Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_score_config_from_args() {
        let Command::Score(args) = parse(&[
            "imgprep",
            "score",
            "--corpus",
            "data/train",
            "--model",
            "weights/det.onnx",
            "--confidence",
            "0.4",
            "--execution-provider",
            "cpu",
            "--all-files",
        ]) else {
            panic!("expected score subcommand");
        };

        let config = CliConfigBuilder::score_config(&args).unwrap();
        assert_eq!(config.corpus_dir, PathBuf::from("data/train"));
        assert_eq!(config.detector.model_path, PathBuf::from("weights/det.onnx"));
        assert_eq!(config.detector.confidence_threshold, 0.4);
        assert_eq!(config.detector.execution_provider, ExecutionProvider::Cpu);
        assert!(!config.images_only);
    }

    #[test]
    fn test_score_config_rejects_bad_values() {
        let Command::Score(args) = parse(&[
            "imgprep",
            "score",
            "--corpus",
            "data",
            "--execution-provider",
            "tpu",
        ]) else {
            panic!("expected score subcommand");
        };
        assert!(CliConfigBuilder::score_config(&args).is_err());

        let Command::Score(args) = parse(&["imgprep", "score", "--corpus", "data", "--input-size", "100"])
        else {
            panic!("expected score subcommand");
        };
        assert!(CliConfigBuilder::score_config(&args).is_err());
    }

    #[test]
    fn test_scrape_config_from_args() {
        let Command::Scrape(args) = parse(&[
            "imgprep",
            "scrape",
            "--csv",
            "links.csv",
            "--max-images",
            "5",
            "--label-column",
            "kind",
        ]) else {
            panic!("expected scrape subcommand");
        };

        let config = CliConfigBuilder::scrape_config(&args);
        assert_eq!(config.csv_path, PathBuf::from("links.csv"));
        assert_eq!(config.max_images, 5);
        assert_eq!(config.label_column, "kind");
        assert_eq!(config.link_column, "photo_lnk");
        assert!(config.validate().is_ok());
    }
}
