//! Corpus walker: scores every image in a class-labeled directory tree

use crate::error::{PrepError, Result};
use crate::inference::ObjectDetector;
use crate::ratio::human_ratio_sum;
use crate::records::ImageRecord;
use crate::tracing_config::spans;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions treated as images when the walker is restricted to images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tif", "tiff", "gif"];

/// A file the walker could not score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one scoring run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkReport {
    /// One record per scored file, in traversal order
    pub records: Vec<ImageRecord>,
    /// Files dropped because they could not be listed or are not readable images
    pub skipped: Vec<SkippedFile>,
    /// Files recorded with zero detections because the detector failed
    pub detection_failures: usize,
}

/// Files found under a corpus root, plus the entries that could not be read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusListing {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

impl CorpusListing {
    fn skip_entry(&mut self, dir: &Path, error: &walkdir::Error) {
        let path = error.path().unwrap_or(dir).to_path_buf();
        log::warn!("Skipping {}: {}", path.display(), error);
        self.skipped.push(SkippedFile {
            path,
            reason: error.to_string(),
        });
    }
}

/// Result of scoring a single file
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFile {
    pub record: ImageRecord,
    pub dimensions: (u32, u32),
    pub person_count: usize,
    pub detection_failed: bool,
}

/// Walks `root/<class>/<file>` and scores each file with an injected detector
pub struct CorpusWalker<D> {
    detector: D,
    images_only: bool,
}

impl<D: ObjectDetector> CorpusWalker<D> {
    #[must_use]
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            images_only: true,
        }
    }

    /// Restrict traversal to files with a known image extension (default: on)
    #[must_use]
    pub fn images_only(mut self, images_only: bool) -> Self {
        self.images_only = images_only;
        self
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn into_detector(self) -> D {
        self.detector
    }

    /// List the files a run over `root` would visit, in traversal order
    ///
    /// Class directories and the files inside them are sorted by file name.
    /// Files directly under `root` and anything nested deeper than one class
    /// directory are ignored. Entries that cannot be read, such as dangling
    /// symlinks or unlistable class directories, are returned as skips.
    ///
    /// # Errors
    /// - `root` is missing, not a directory, or cannot be listed
    pub fn collect_files(&self, root: &Path) -> Result<CorpusListing> {
        if !root.is_dir() {
            return Err(PrepError::file_io_error(
                "read corpus directory",
                root,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let mut listing = CorpusListing::default();
        for class_entry in shallow_walk(root) {
            let class_entry = match class_entry {
                Ok(entry) => entry,
                // Depth 0 is the root itself
                Err(e) if e.depth() == 0 => return Err(std::io::Error::from(e).into()),
                Err(e) => {
                    listing.skip_entry(root, &e);
                    continue;
                },
            };
            if !class_entry.file_type().is_dir() {
                continue;
            }

            for file_entry in shallow_walk(class_entry.path()) {
                let file_entry = match file_entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        listing.skip_entry(class_entry.path(), &e);
                        continue;
                    },
                };
                if !file_entry.file_type().is_file() {
                    continue;
                }
                let path = file_entry.path();
                if !self.images_only || is_image_file(path) {
                    listing.files.push(path.to_path_buf());
                }
            }
        }

        Ok(listing)
    }

    /// Score one file
    ///
    /// A detector failure is logged and scored as zero detections.
    ///
    /// # Errors
    /// - `PrepError::InvalidImage` when the file is not a readable image or
    ///   has zero area
    /// - `PrepError::InvalidImage` when the path is not valid UTF-8, since
    ///   the saved record could not name the file
    pub fn score_file(&mut self, path: &Path) -> Result<ScoredFile> {
        let Some(record_path) = path.to_str() else {
            return Err(PrepError::invalid_image(format!(
                "'{}' is not a valid UTF-8 path",
                path.display()
            )));
        };
        let dimensions = read_dimensions(path)?;
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(PrepError::invalid_image(format!(
                "'{}' has zero area ({}x{})",
                path.display(),
                dimensions.0,
                dimensions.1
            )));
        }

        let (detections, detection_failed) = match self.detector.detect(path) {
            Ok(detections) => (detections, false),
            Err(e) => {
                log::warn!(
                    "Detector '{}' failed on {}: {}",
                    self.detector.name(),
                    path.display(),
                    e
                );
                (Vec::new(), true)
            },
        };

        let ratio_sum = human_ratio_sum(dimensions, &detections)?;
        let person_count = detections.iter().filter(|d| d.is_person()).count();

        tracing::debug!(
            width = dimensions.0,
            height = dimensions.1,
            persons = person_count,
            human_ratio_sum = ratio_sum,
            "Scored file"
        );

        Ok(ScoredFile {
            record: ImageRecord::new(record_path, ratio_sum),
            dimensions,
            person_count,
            detection_failed,
        })
    }

    /// Score every file under `root`
    ///
    /// # Errors
    /// - `root` cannot be listed; per-file failures never abort the run
    pub fn run(&mut self, root: &Path) -> Result<WalkReport> {
        self.run_with_progress(root, |_, _, _| {})
    }

    /// Like [`CorpusWalker::run`], calling `on_file(index, total, path)`
    /// before each file is scored
    ///
    /// # Errors
    /// - `root` cannot be listed; per-file failures never abort the run
    pub fn run_with_progress<F>(&mut self, root: &Path, mut on_file: F) -> Result<WalkReport>
    where
        F: FnMut(usize, usize, &Path),
    {
        let CorpusListing { files, skipped } = self.collect_files(root)?;
        let total = files.len();
        log::info!("Scoring {} file(s) under {}", total, root.display());

        let mut report = WalkReport {
            records: Vec::with_capacity(total),
            skipped,
            ..WalkReport::default()
        };

        let run_span = spans::scoring(root, self.detector.name(), total);
        let _run_guard = run_span.enter();

        for (index, path) in files.iter().enumerate() {
            on_file(index, total, path);

            let span = spans::file_processing(path);
            let _guard = span.enter();

            match self.score_file(path) {
                Ok(scored) => {
                    if scored.detection_failed {
                        report.detection_failures += 1;
                    }
                    report.records.push(scored.record);
                },
                Err(e) if e.is_per_file() => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    report.skipped.push(SkippedFile {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                },
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "Scored {} file(s), skipped {}, {} detector failure(s)",
            report.records.len(),
            report.skipped.len(),
            report.detection_failures
        );

        Ok(report)
    }
}

/// Score every image under `root` with `detector`
///
/// Unreadable files are skipped; see [`CorpusWalker::run`] for the full
/// report including what was skipped.
///
/// # Errors
/// - `root` is missing or cannot be listed
pub fn walk_and_score<D: ObjectDetector>(root: &Path, detector: D) -> Result<Vec<ImageRecord>> {
    Ok(CorpusWalker::new(detector).run(root)?.records)
}

/// Check if file is an image based on extension
#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn shallow_walk(dir: &Path) -> walkdir::IntoIter {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
}

/// Read pixel dimensions from the image header; the file handle is dropped on return
fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::ImageReader::open(path)
        .map_err(|e| PrepError::invalid_image(format!("cannot open '{}': {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| PrepError::invalid_image(format!("cannot read '{}': {}", path.display(), e)))?
        .into_dimensions()
        .map_err(|e| {
            PrepError::invalid_image(format!("'{}' is not a decodable image: {}", path.display(), e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockDetector;
    use crate::detection::{BoundingBox, Detection};
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([120, 80, 40]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("pump.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_collect_files_two_levels_sorted() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write_png(&root.join("zebra/b.png"), 4, 4);
        write_png(&root.join("zebra/a.png"), 4, 4);
        write_png(&root.join("apple/z.png"), 4, 4);
        write_png(&root.join("apple/nested/deep.png"), 4, 4);
        write_png(&root.join("stray.png"), 4, 4);
        fs::write(root.join("apple/readme.txt"), b"notes").unwrap();

        let walker = CorpusWalker::new(MockDetector::new());
        let listing = walker.collect_files(root).unwrap();
        assert!(listing.skipped.is_empty());
        let relative: Vec<_> = listing
            .files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            relative,
            vec![
                PathBuf::from("apple/z.png"),
                PathBuf::from("zebra/a.png"),
                PathBuf::from("zebra/b.png"),
            ]
        );

        let walker = CorpusWalker::new(MockDetector::new()).images_only(false);
        assert_eq!(walker.collect_files(root).unwrap().files.len(), 4);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let result = walk_and_score(&temp_dir.path().join("absent"), MockDetector::new());
        assert!(matches!(result, Err(PrepError::Io(_))));
    }

    #[test]
    fn test_score_file_full_frame() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("people/crowd.png");
        write_png(&path, 40, 30);

        let detector = MockDetector::new().with_detections(
            "crowd.png",
            vec![
                Detection::person(0.9, BoundingBox::new(0.0, 0.0, 20.0, 15.0)),
                Detection::new("dog", 0.8, BoundingBox::full_frame(40, 30)),
                Detection::person(0.7, BoundingBox::new(20.0, 15.0, 40.0, 30.0)),
            ],
        );
        let mut walker = CorpusWalker::new(detector);
        let scored = walker.score_file(&path).unwrap();

        assert_eq!(scored.dimensions, (40, 30));
        assert_eq!(scored.person_count, 2);
        assert_eq!(scored.record.human_ratio_sum, 0.5);
        assert!(!scored.detection_failed);
    }

    #[test]
    fn test_undecodable_file_is_skipped() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write_png(&root.join("pumps/good.png"), 8, 8);
        fs::write(root.join("pumps/broken.jpg"), b"definitely not a jpeg").unwrap();

        let detector = MockDetector::new()
            .with_detections("good.png", vec![Detection::person(0.9, BoundingBox::full_frame(8, 8))]);
        let mut walker = CorpusWalker::new(detector);
        let report = walker.run(root).unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].human_ratio_sum, 1.0);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("pumps/broken.jpg"));
        // The detector is never consulted for a file that fails to decode
        assert_eq!(walker.detector().calls(), 1);
    }

    #[test]
    fn test_detector_failure_records_zero() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write_png(&root.join("wells/flaky.png"), 8, 8);

        let detector = MockDetector::new().failing_on("flaky.png");
        let report = CorpusWalker::new(detector).run(root).unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].human_ratio_sum, 0.0);
        assert_eq!(report.detection_failures, 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_progress_callback_sees_every_file() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write_png(&root.join("a/1.png"), 2, 2);
        write_png(&root.join("b/2.png"), 2, 2);

        let mut seen = Vec::new();
        CorpusWalker::new(MockDetector::new())
            .run_with_progress(root, |index, total, _path| seen.push((index, total)))
            .unwrap();

        assert_eq!(seen, vec![(0, 2), (1, 2)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_skipped() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write_png(&root.join("pump/a.png"), 8, 8);
        write_png(&root.join("pump/c.png"), 8, 8);
        std::os::unix::fs::symlink(root.join("missing.png"), root.join("pump/b.png")).unwrap();

        let mut walker = CorpusWalker::new(MockDetector::new());
        let report = walker.run(root).unwrap();

        let scored: Vec<_> = report.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            scored,
            vec![
                root.join("pump/a.png").to_str().unwrap(),
                root.join("pump/c.png").to_str().unwrap(),
            ]
        );
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, root.join("pump/b.png"));
        assert_eq!(walker.detector().calls(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_class_symlink_is_skipped() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write_png(&root.join("well/a.png"), 8, 8);
        std::os::unix::fs::symlink(root.join("gone"), root.join("pump")).unwrap();

        let report = CorpusWalker::new(MockDetector::new()).run(root).unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, root.join("pump"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_path_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write_png(&root.join("pump/good.png"), 8, 8);
        let bad = root.join("pump").join(OsStr::from_bytes(b"bad\xff.png"));
        write_png(&bad, 8, 8);

        let mut walker = CorpusWalker::new(MockDetector::new());
        let report = walker.run(root).unwrap();

        assert_eq!(report.records.len(), 1);
        assert!(report.records[0].path.ends_with("good.png"));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, bad);
        assert!(report.skipped[0].reason.contains("UTF-8"));
        assert_eq!(walker.detector().calls(), 1);
    }
}
