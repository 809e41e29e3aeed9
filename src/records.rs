//! Persistence for per-image person-occupancy records
//!
//! The record list is stored as a single JSON array and is always written
//! whole; a run never appends to an earlier file.

use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Summed person-occupancy ratio for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: String,
    pub human_ratio_sum: f64,
}

impl ImageRecord {
    #[must_use]
    pub fn new<S: Into<String>>(path: S, human_ratio_sum: f64) -> Self {
        Self {
            path: path.into(),
            human_ratio_sum,
        }
    }
}

/// Write `records` to `path`, replacing any previous file
///
/// The list is written to a sibling temporary file first and renamed into
/// place, so readers never observe a partial list.
///
/// # Errors
/// - Parent directory cannot be created
/// - Serialization or write failure
pub fn save_records<P: AsRef<Path>>(path: P, records: &[ImageRecord]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| PrepError::file_io_error("create output directory", parent, &e))?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let file = fs::File::create(&temp_path)
        .map_err(|e| PrepError::file_io_error("create record file", &temp_path, &e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer
        .flush()
        .map_err(|e| PrepError::file_io_error("write record file", &temp_path, &e))?;
    drop(writer);

    fs::rename(&temp_path, path)
        .map_err(|e| PrepError::file_io_error("replace record file", path, &e))?;

    log::info!("Saved {} record(s) to {}", records.len(), path.display());
    Ok(())
}

/// Read a record list written by [`save_records`]
///
/// # Errors
/// - File cannot be opened
/// - Contents are not a valid record list
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<ImageRecord>> {
    let path = path.as_ref();
    let data =
        fs::read(path).map_err(|e| PrepError::file_io_error("read record file", path, &e))?;
    Ok(serde_json::from_slice(&data)?)
}

/// Records whose summed ratio is at least `min_ratio`, in their original order
#[must_use]
pub fn filter_human_centric(records: &[ImageRecord], min_ratio: f64) -> Vec<&ImageRecord> {
    records
        .iter()
        .filter(|record| record.human_ratio_sum >= min_ratio)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_preserves_values_exactly() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("detection_list.json");

        let records = vec![
            ImageRecord::new("data/train/hand_pump/a.jpg", 0.1 + 0.2),
            ImageRecord::new("data/train/well/ünïcödé \"quoted\".png", 1.0 / 3.0),
            ImageRecord::new("data/train/well/tiny.png", 5e-324),
            ImageRecord::new("data/train/well/none.png", 0.0),
        ];

        save_records(&path, &records).unwrap();
        let loaded = load_records(&path).unwrap();

        assert_eq!(loaded, records);
        for (a, b) in loaded.iter().zip(&records) {
            assert_eq!(a.human_ratio_sum.to_bits(), b.human_ratio_sum.to_bits());
        }
    }

    #[test]
    fn test_save_overwrites_previous_run() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("out/records.json");

        save_records(&path, &[ImageRecord::new("old.png", 0.5)]).unwrap();
        save_records(&path, &[ImageRecord::new("new.png", 0.25)]).unwrap();

        let loaded = load_records(&path).unwrap();
        assert_eq!(loaded, vec![ImageRecord::new("new.png", 0.25)]);
        assert!(!temp_dir.path().join("out/records.json.tmp").exists());
    }

    #[test]
    fn test_empty_list_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("empty.json");

        save_records(&path, &[]).unwrap();
        assert!(load_records(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("garbage.json");
        fs::write(&path, b"{\"not\": \"a list\"}").unwrap();

        assert!(matches!(load_records(&path), Err(PrepError::Serialization(_))));
        assert!(matches!(
            load_records(temp_dir.path().join("missing.json")),
            Err(PrepError::Io(_))
        ));
    }

    #[test]
    fn test_filter_human_centric() {
        let records = vec![
            ImageRecord::new("a.png", 0.05),
            ImageRecord::new("b.png", 0.4),
            ImageRecord::new("c.png", 0.1),
        ];

        let kept: Vec<&str> = filter_human_centric(&records, 0.1)
            .into_iter()
            .map(|r| r.path.as_str())
            .collect();
        assert_eq!(kept, vec!["b.png", "c.png"]);
    }
}
