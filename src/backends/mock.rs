//! Scripted detector for tests and dry runs

use crate::detection::Detection;
use crate::error::{PrepError, Result};
use crate::inference::ObjectDetector;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Detector that replays canned detections keyed by file name
///
/// Files with no script return no detections. Files registered with
/// [`MockDetector::failing_on`] return `PrepError::Detection`.
#[derive(Debug, Default)]
pub struct MockDetector {
    scripted: HashMap<String, Vec<Detection>>,
    failures: HashSet<String>,
    calls: usize,
}

impl MockDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `detections` for any path whose file name is `file_name`
    #[must_use]
    pub fn with_detections<S: Into<String>>(
        mut self,
        file_name: S,
        detections: Vec<Detection>,
    ) -> Self {
        self.scripted.insert(file_name.into(), detections);
        self
    }

    /// Fail detection for any path whose file name is `file_name`
    #[must_use]
    pub fn failing_on<S: Into<String>>(mut self, file_name: S) -> Self {
        self.failures.insert(file_name.into());
        self
    }

    /// Number of `detect` calls so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl ObjectDetector for MockDetector {
    fn detect(&mut self, path: &Path) -> Result<Vec<Detection>> {
        self.calls += 1;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.failures.contains(&file_name) {
            return Err(PrepError::detection(format!(
                "scripted failure for '{}'",
                path.display()
            )));
        }

        Ok(self.scripted.get(&file_name).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
