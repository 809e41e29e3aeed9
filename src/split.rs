//! Train/test split of a class-labeled image directory
//!
//! Files are moved, not copied: after a split the input class directories
//! are emptied and removed.

use crate::config::SplitConfig;
use crate::error::{PrepError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Per-class outcome of a split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSplit {
    pub class: String,
    pub train: usize,
    pub test: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub classes: Vec<ClassSplit>,
}

impl SplitSummary {
    #[must_use]
    pub fn train_total(&self) -> usize {
        self.classes.iter().map(|c| c.train).sum()
    }

    #[must_use]
    pub fn test_total(&self) -> usize {
        self.classes.iter().map(|c| c.test).sum()
    }
}

/// Number of files sent to the test set for a class of `file_count` files
///
/// Rounds half away from zero and never exceeds `file_count`.
#[must_use]
pub fn test_count(file_count: usize, test_ratio: f64) -> usize {
    ((file_count as f64 * test_ratio).round() as usize).min(file_count)
}

/// Split every class under `config.input_dir` into train and test sets
///
/// Existing train and test directories are removed first.
///
/// # Errors
/// - Invalid configuration
/// - Input directory missing or unreadable
/// - A file cannot be moved
pub fn split_dataset(config: &SplitConfig) -> Result<SplitSummary> {
    config.validate()?;

    let input_dir = config.input_dir.as_path();
    if !input_dir.is_dir() {
        return Err(PrepError::file_io_error(
            "read input directory",
            input_dir,
            &std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    for dir in [&config.train_dir, &config.test_dir] {
        if dir.exists() {
            log::info!("Removing existing {}", dir.display());
            fs::remove_dir_all(dir)
                .map_err(|e| PrepError::file_io_error("remove existing split directory", dir, &e))?;
        }
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut summary = SplitSummary::default();
    for class_dir in sorted_entries(input_dir)?
        .into_iter()
        .filter(|path| path.is_dir())
    {
        let class = class_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut files: Vec<PathBuf> = sorted_entries(&class_dir)?
            .into_iter()
            .filter(|path| path.is_file())
            .collect();
        let n_test = test_count(files.len(), config.test_ratio);

        files.shuffle(&mut rng);
        let (test_files, train_files) = files.split_at(n_test);

        move_all(test_files, &config.test_dir.join(&class))?;
        move_all(train_files, &config.train_dir.join(&class))?;

        // Leaves the directory in place if it still holds subdirectories
        if fs::read_dir(&class_dir).map(|mut d| d.next().is_none()).unwrap_or(false) {
            fs::remove_dir(&class_dir)
                .map_err(|e| PrepError::file_io_error("remove class directory", &class_dir, &e))?;
        }

        log::info!(
            "{}: {} train, {} test",
            class,
            train_files.len(),
            test_files.len()
        );
        summary.classes.push(ClassSplit {
            class,
            train: train_files.len(),
            test: test_files.len(),
        });
    }

    Ok(summary)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            entry
                .map(walkdir::DirEntry::into_path)
                .map_err(|e| PrepError::Io(e.into()))
        })
        .collect()
}

fn move_all(files: &[PathBuf], destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)
        .map_err(|e| PrepError::file_io_error("create split directory", destination, &e))?;

    for file in files {
        let target = destination.join(file.file_name().unwrap_or_default());
        move_file(file, &target)?;
    }
    Ok(())
}

/// Rename, falling back to copy-and-delete across filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    fs::copy(from, to).map_err(|e| PrepError::file_io_error("copy file", from, &e))?;
    fs::remove_file(from).map_err(|e| PrepError::file_io_error("remove moved file", from, &e))
}
