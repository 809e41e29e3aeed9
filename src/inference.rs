//! Object detector abstraction

use crate::detection::Detection;
use crate::error::Result;
use std::path::Path;

/// Trait for object detectors
///
/// A detector is constructed once, up front, and handed to the corpus
/// walker. Implementations may keep mutable session state between calls.
pub trait ObjectDetector {
    /// Detect objects in the image stored at `path`
    ///
    /// Bounding boxes are in the source image's pixel coordinates.
    ///
    /// # Errors
    /// - `PrepError::Detection` when the image cannot be run through the model
    fn detect(&mut self, path: &Path) -> Result<Vec<Detection>>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

impl<D: ObjectDetector + ?Sized> ObjectDetector for Box<D> {
    fn detect(&mut self, path: &Path) -> Result<Vec<Detection>> {
        (**self).detect(path)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<D: ObjectDetector + ?Sized> ObjectDetector for &mut D {
    fn detect(&mut self, path: &Path) -> Result<Vec<Detection>> {
        (**self).detect(path)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockDetector;
    use crate::detection::BoundingBox;

    #[test]
    fn test_boxed_detector_forwards() {
        let mut detector: Box<dyn ObjectDetector> = Box::new(
            MockDetector::new().with_detections(
                "a.png",
                vec![Detection::person(0.9, BoundingBox::full_frame(4, 4))],
            ),
        );

        assert_eq!(detector.name(), "mock");
        let detections = detector.detect(Path::new("class/a.png")).unwrap();
        assert_eq!(detections.len(), 1);
        assert!(detector.detect(Path::new("class/b.png")).unwrap().is_empty());
    }

    #[test]
    fn test_borrowed_detector_forwards() {
        fn detect_once<D: ObjectDetector>(mut detector: D, path: &str) -> Result<Vec<Detection>> {
            detector.detect(Path::new(path))
        }

        let mut mock = MockDetector::new().failing_on("bad.png");
        assert!(detect_once(&mut mock, "bad.png").is_err());
        assert!(detect_once(&mut mock, "good.png").is_ok());
        assert_eq!(mock.calls(), 2);
    }
}
