//! CSV-driven image scraping
//!
//! Each CSV row names a label and an image URL. Downloads are sequential;
//! rows whose request fails are logged and skipped.

use crate::config::ScrapeConfig;
use crate::download::Downloader;
use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Directory name used for rows with an empty label
pub const UNLABELED: &str = "unlabeled";

/// One usable row of the link spreadsheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRow {
    pub label: String,
    pub url: String,
}

/// A row of the mapping file written after scraping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub label: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Rows for which a request was made
    pub attempted: usize,
    pub saved: usize,
    pub failed: usize,
    pub entries: Vec<MappingEntry>,
}

/// Read label/link pairs from a CSV file with a header row
///
/// Rows with an empty link are dropped.
///
/// # Errors
/// - File cannot be read or parsed
/// - `PrepError::InvalidConfig` when either column is missing from the header
pub fn read_link_rows<P: AsRef<Path>>(
    path: P,
    label_column: &str,
    link_column: &str,
) -> Result<Vec<LinkRow>> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|e| PrepError::file_io_error("open CSV", path, &e))?;
    parse_link_rows(file, label_column, link_column)
}

/// Parse label/link pairs from any CSV reader
///
/// # Errors
/// - Malformed CSV
/// - `PrepError::InvalidConfig` when either column is missing from the header
pub fn parse_link_rows<R: std::io::Read>(
    reader: R,
    label_column: &str,
    link_column: &str,
) -> Result<Vec<LinkRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PrepError::invalid_config(format!("CSV has no '{}' column", name)))
    };
    let label_idx = column_index(label_column)?;
    let link_idx = column_index(link_column)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let url = record.get(link_idx).unwrap_or_default().trim();
        if url.is_empty() {
            continue;
        }
        rows.push(LinkRow {
            label: record.get(label_idx).unwrap_or_default().trim().to_string(),
            url: url.to_string(),
        });
    }

    Ok(rows)
}

/// Turn a free-text label into a single safe directory name
#[must_use]
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.replace("..", "_");
    if cleaned.is_empty() || cleaned == "." {
        UNLABELED.to_string()
    } else {
        cleaned
    }
}

/// Download up to `config.max_images` images listed in `config.csv_path`
///
/// The output directory is removed and recreated. Saved images land at
/// `<output_dir>/<label>/<uuid>.jpg` and are listed in `config.mapping_file`.
///
/// # Errors
/// - Invalid configuration or unreadable CSV
/// - File system failures; network failures only skip the row
pub async fn scrape_images(config: &ScrapeConfig) -> Result<ScrapeSummary> {
    config.validate()?;

    let rows = read_link_rows(&config.csv_path, &config.label_column, &config.link_column)?;
    log::info!(
        "Found {} link(s) in {}, downloading at most {}",
        rows.len(),
        config.csv_path.display(),
        config.max_images
    );

    reset_dir(&config.output_dir)?;

    let downloader = Downloader::new(Duration::from_secs(config.timeout_secs))?;
    let mut summary = ScrapeSummary::default();

    for row in rows.iter().take(config.max_images) {
        summary.attempted += 1;

        let label = sanitize_label(&row.label);
        let label_dir = config.output_dir.join(&label);
        let new_label_dir = !label_dir.is_dir();
        fs::create_dir_all(&label_dir)
            .map_err(|e| PrepError::file_io_error("create label directory", &label_dir, &e))?;

        let file_name = format!("{}.jpg", Uuid::new_v4());
        let destination = label_dir.join(&file_name);

        match downloader.download_to(&row.url, &destination, None).await {
            Ok(downloaded) => {
                log::debug!("Saved {} ({} bytes)", destination.display(), downloaded.bytes);
                summary.saved += 1;
                summary.entries.push(MappingEntry { label, file_name });
            },
            Err(e @ PrepError::Io(_)) => return Err(e),
            Err(e) => {
                log::warn!("Skipping {}: {}", row.url, e);
                summary.failed += 1;
                // A label whose first row failed must not leave an empty class behind
                if new_label_dir {
                    if let Err(cleanup_err) = fs::remove_dir(&label_dir) {
                        log::warn!(
                            "Failed to remove empty label directory {}: {}",
                            label_dir.display(),
                            cleanup_err
                        );
                    }
                }
            },
        }
    }

    write_mapping(&config.mapping_file, &summary.entries)?;
    log::info!(
        "Scraped {} of {} image(s), {} failed",
        summary.saved,
        summary.attempted,
        summary.failed
    );

    Ok(summary)
}

/// Write the `label,file_name` mapping CSV
///
/// # Errors
/// - Parent directory or file cannot be written
pub fn write_mapping<P: AsRef<Path>>(path: P, entries: &[MappingEntry]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| PrepError::file_io_error("create mapping directory", parent, &e))?;
    }

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(["label", "file_name"])?;
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer
        .flush()
        .map_err(|e| PrepError::file_io_error("write mapping file", path, &e))?;
    Ok(())
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        log::info!("Removing existing {}", dir.display());
        fs::remove_dir_all(dir)
            .map_err(|e| PrepError::file_io_error("remove output directory", dir, &e))?;
    }
    fs::create_dir_all(dir)
        .map_err(|e| PrepError::file_io_error("create output directory", dir, &e))
}
