//! HTTP downloads: detector weights and scraped images
//!
//! Downloads are streamed to disk while a SHA-256 digest is computed.
//! There are no retries; a failed request is reported to the caller.

use crate::error::{PrepError, Result};
use crate::tracing_config::spans;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::Instrument;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Byte-level progress bar when the `cli` feature is enabled
    #[must_use]
    pub fn bytes() -> Self {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::NoOp
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

/// A completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the content
    pub sha256: String,
}

/// Sequential HTTP downloader
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PrepError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client })
    }

    /// Stream `url` into `destination`
    ///
    /// Only a `200 OK` response is saved. A partially written file is
    /// removed on failure.
    ///
    /// # Errors
    /// - `PrepError::InvalidConfig` for a URL that is not http(s)
    /// - `PrepError::Network` for transport failures and non-200 statuses
    /// - `PrepError::Io` when the destination cannot be written
    pub async fn download_to(
        &self,
        url: &str,
        destination: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<Downloaded> {
        validate_url(url)?;

        self.fetch(url, destination, progress)
            .instrument(spans::download(url, destination))
            .await
    }

    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<Downloaded> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PrepError::network_error(&format!("GET {}", url), e))?;

        if response.status() != StatusCode::OK {
            return Err(PrepError::network_error(
                &format!("GET {}", url),
                response.status(),
            ));
        }

        if let (Some(pb), Some(total)) = (progress, response.content_length()) {
            pb.set_length(total);
        }

        let stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        match write_stream(stream, destination, progress).await {
            Ok((bytes, sha256)) => {
                log::debug!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(Downloaded {
                    path: destination.to_path_buf(),
                    bytes,
                    sha256,
                })
            },
            Err(e) => {
                if destination.exists() {
                    if let Err(cleanup_err) = fs::remove_file(destination) {
                        log::warn!("Failed to remove partial download: {}", cleanup_err);
                    }
                }
                Err(e)
            },
        }
    }
}

async fn write_stream<R>(
    mut stream: R,
    destination: &Path,
    progress: Option<&ProgressIndicator>,
) -> Result<(u64, String)>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| PrepError::file_io_error("create file", destination, &e))?;

    let mut hasher = Sha256::new();
    let mut downloaded = 0u64;
    let mut buffer = vec![0; 8192];

    loop {
        let bytes_read = stream
            .read(&mut buffer)
            .await
            .map_err(|e| PrepError::network_error("Failed to read download stream", e))?;
        if bytes_read == 0 {
            break;
        }

        let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
        hasher.update(chunk);
        file.write_all(chunk)
            .await
            .map_err(|e| PrepError::file_io_error("write to file", destination, &e))?;

        downloaded += bytes_read as u64;
        if let Some(pb) = progress {
            pb.set_position(downloaded);
        }
    }

    file.flush()
        .await
        .map_err(|e| PrepError::file_io_error("flush file", destination, &e))?;

    Ok((downloaded, format!("{:x}", hasher.finalize())))
}

/// Download detector weights to `destination`
///
/// An existing file is kept when it matches `expected_sha256` (or when no
/// digest is given). The download lands in a `.part` sibling and is renamed
/// into place only after verification. Returns the file's SHA-256.
///
/// # Errors
/// - Network or file system failures
/// - `PrepError::Integrity` when the content does not match `expected_sha256`
pub async fn fetch_model(
    url: &str,
    destination: &Path,
    expected_sha256: Option<&str>,
    show_progress: bool,
) -> Result<String> {
    let expected = expected_sha256.map(str::to_ascii_lowercase);

    if destination.is_file() {
        let existing = sha256_file(destination)?;
        match expected.as_deref() {
            None => {
                log::info!("Model already present: {}", destination.display());
                return Ok(existing);
            },
            Some(digest) if digest == existing => {
                log::info!("Model already present and verified: {}", destination.display());
                return Ok(existing);
            },
            Some(_) => {
                log::warn!(
                    "Existing model {} does not match the expected checksum, downloading again",
                    destination.display()
                );
            },
        }
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| PrepError::file_io_error("create model directory", parent, &e))?;
    }

    let mut part_name = destination.file_name().unwrap_or_default().to_os_string();
    part_name.push(".part");
    let part_path = destination.with_file_name(part_name);

    let progress = show_progress.then(ProgressIndicator::bytes);
    let downloader = Downloader::new(Duration::from_secs(300))?;
    log::info!("Downloading model from {}", url);
    let downloaded = downloader
        .download_to(url, &part_path, progress.as_ref())
        .await?;

    if let Some(digest) = expected.as_deref() {
        if digest != downloaded.sha256 {
            if let Err(cleanup_err) = fs::remove_file(&part_path) {
                log::warn!(
                    "Failed to remove unverified download {}: {}",
                    part_path.display(),
                    cleanup_err
                );
            }
            if let Some(pb) = &progress {
                pb.finish_with_message("checksum mismatch".to_string());
            }
            return Err(PrepError::integrity(format!(
                "{}: expected sha256 {}, got {}",
                url, digest, downloaded.sha256
            )));
        }
    }

    fs::rename(&part_path, destination)
        .map_err(|e| PrepError::file_io_error("move downloaded model", destination, &e))?;

    if let Some(pb) = &progress {
        pb.finish_with_message(format!("Downloaded {}", destination.display()));
    }
    log::info!(
        "Saved model to {} ({} bytes, sha256 {})",
        destination.display(),
        downloaded.bytes,
        downloaded.sha256
    );

    Ok(downloaded.sha256)
}

/// Lowercase hex SHA-256 of a file's contents
///
/// # Errors
/// - File cannot be read
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).map_err(|e| PrepError::file_io_error("open file", path, &e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .map_err(|e| PrepError::file_io_error("hash file", path, &e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Accept only absolute http(s) URLs
///
/// # Errors
/// - `PrepError::InvalidConfig` for empty or non-http(s) URLs
pub fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(PrepError::invalid_config("URL cannot be empty"));
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            PrepError::invalid_config(format!(
                "Unsupported URL: {}. Only http:// and https:// are supported",
                url
            ))
        })?;

    if rest.split('/').next().unwrap_or_default().is_empty() {
        return Err(PrepError::invalid_config(format!("URL has no host: {}", url)));
    }

    Ok(())
}
