//! ONNX Runtime detector for YOLO-family object detection models
//!
//! Expects an export whose single output is `[1, 4 + classes, candidates]`
//! (center-x, center-y, width, height followed by per-class scores, in the
//! model's input pixel space). The transposed `[1, candidates, 4 + classes]`
//! layout is accepted too.

use crate::config::{DetectorConfig, ExecutionProvider};
use crate::detection::{non_max_suppression, BoundingBox, Detection, COCO_CLASSES};
use crate::error::{PrepError, Result};
use crate::inference::ObjectDetector;
use image::imageops::FilterType;
use ndarray::{s, Array4, ArrayD, Axis, Ix2};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::path::Path;
use std::time::Instant;

/// ONNX Runtime object detector
#[derive(Debug)]
pub struct OnnxDetector {
    session: Session,
    config: DetectorConfig,
}

impl OnnxDetector {
    /// Load the model named by `config.model_path`
    ///
    /// # Errors
    /// - `PrepError::InvalidConfig` for out-of-range thresholds
    /// - `PrepError::ModelLoad` when the weight file is missing or ONNX
    ///   Runtime cannot build a session from it
    pub fn load(config: &DetectorConfig) -> Result<Self> {
        config.validate()?;

        let model_path = config.model_path.as_path();
        if !model_path.is_file() {
            return Err(PrepError::model_error_with_context(
                "load",
                model_path,
                "weight file not found",
            ));
        }

        let span = crate::tracing_config::spans::model_loading(
            model_path,
            &config.execution_provider.to_string(),
        );
        let _guard = span.enter();
        let model_load_start = Instant::now();

        let session_builder = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .map_err(|e| {
                PrepError::model_error_with_context("configure session for", model_path, &e.to_string())
            })?;

        let session_builder = Self::with_provider(session_builder, config.execution_provider)
            .map_err(|e| {
                PrepError::model_error_with_context("register provider for", model_path, &e.to_string())
            })?;

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| PrepError::model_error_with_context("load", model_path, &e.to_string()))?;

        log::info!(
            "Loaded detector {} ({} provider, {} threads) in {:.0}ms",
            model_path.display(),
            config.execution_provider,
            intra_threads,
            model_load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session,
            config: config.clone(),
        })
    }

    /// Register the requested execution provider, falling back to CPU
    fn with_provider(
        session_builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> ort::Result<SessionBuilder> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        match provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available {
                    log::debug!("CUDA execution provider is available");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available {
                    log::debug!("CoreML execution provider is available");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                    Ok(session_builder)
                } else {
                    session_builder.with_execution_providers(providers)
                }
            },
            ExecutionProvider::Cpu => Ok(session_builder),
            ExecutionProvider::Cuda if cuda_available => {
                session_builder.with_execution_providers([CUDAExecutionProvider::default().build()])
            },
            ExecutionProvider::CoreMl if coreml_available => session_builder
                .with_execution_providers([CoreMLExecutionProvider::default()
                    .with_subgraphs(true)
                    .build()]),
            ExecutionProvider::Cuda | ExecutionProvider::CoreMl => {
                log::warn!(
                    "{} execution provider requested but not available, falling back to CPU",
                    provider
                );
                Ok(session_builder)
            },
        }
    }

    /// Resize to the square input and scale to `[0, 1]` in CHW order
    fn preprocess(&self, image: &image::DynamicImage) -> Array4<f32> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(&image.to_rgb8(), size, size, FilterType::Triangle);

        Array4::from_shape_fn((1, 3, size as usize, size as usize), |(_, c, y, x)| {
            f32::from(resized.get_pixel(x as u32, y as u32).0.get(c).copied().unwrap_or(0)) / 255.0
        })
    }

    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let input_value = Value::from_array(input)
            .map_err(|e| PrepError::detection(format!("Failed to convert input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| PrepError::detection(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| PrepError::detection("No output tensors found"))?;

        let output = outputs
            .get(first_key)
            .ok_or_else(|| PrepError::detection("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| PrepError::detection(format!("Failed to extract output tensor: {e}")))?
            .to_owned();

        Ok(output)
    }
}

/// Turn raw model output into detections in source-image coordinates
///
/// `output` is `[1, 4 + classes, candidates]` or its transpose, with boxes
/// in the `config.input_size` square. Candidates below
/// `config.confidence_threshold` are dropped, boxes are scaled to
/// `width` x `height` and clamped to the frame, and the survivors go
/// through per-class NMS at `config.iou_threshold`.
///
/// # Errors
/// - `PrepError::Detection` when the tensor is not 3D or carries no class scores
pub fn decode_output(
    output: &ArrayD<f32>,
    config: &DetectorConfig,
    width: u32,
    height: u32,
) -> Result<Vec<Detection>> {
    if output.ndim() != 3 {
        return Err(PrepError::detection(format!(
            "Expected 3D output tensor, got {}D",
            output.ndim()
        )));
    }

    let view = output
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| PrepError::detection(format!("Unexpected output layout: {e}")))?;
    // Candidates always outnumber attributes; normalize to (attributes, candidates)
    let view = if view.nrows() > view.ncols() {
        view.reversed_axes()
    } else {
        view
    };

    if view.nrows() <= 4 {
        return Err(PrepError::detection(format!(
            "Output has {} attributes per candidate, expected box plus class scores",
            view.nrows()
        )));
    }

    let input_size = f64::from(config.input_size);
    let sx = f64::from(width) / input_size;
    let sy = f64::from(height) / input_size;

    let mut detections = Vec::new();
    for candidate in view.columns() {
        let best = candidate
            .slice(s![4..])
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b));

        let Some((class_id, score)) = best else {
            continue;
        };
        if score < config.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (
            f64::from(candidate[0]),
            f64::from(candidate[1]),
            f64::from(candidate[2]),
            f64::from(candidate[3]),
        );
        let bounding_box = BoundingBox::new(
            (cx - w / 2.0) * sx,
            (cy - h / 2.0) * sy,
            (cx + w / 2.0) * sx,
            (cy + h / 2.0) * sy,
        )
        .clamp_to(width, height);

        let label = COCO_CLASSES
            .get(class_id)
            .map_or_else(|| format!("class_{class_id}"), |name| (*name).to_string());

        detections.push(Detection::new(label, score, bounding_box));
    }

    Ok(non_max_suppression(
        detections,
        f64::from(config.iou_threshold),
    ))
}

impl ObjectDetector for OnnxDetector {
    fn detect(&mut self, path: &Path) -> Result<Vec<Detection>> {
        let inference_start = Instant::now();

        let image = image::open(path).map_err(|e| {
            PrepError::detection(format!("Failed to decode '{}': {e}", path.display()))
        })?;
        let (width, height) = (image.width(), image.height());

        let input = self.preprocess(&image);
        let output = self.run(input)?;
        let detections = decode_output(&output, &self.config, width, height)?;

        log::debug!(
            "{}: {} detection(s) in {:.2}ms",
            path.display(),
            detections.len(),
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(detections)
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::tempdir;

    #[test]
    fn test_missing_model_is_model_load_error() {
        let temp_dir = tempdir().unwrap();
        let config = DetectorConfig::builder()
            .model_path(temp_dir.path().join("absent.onnx"))
            .build()
            .unwrap();

        let result = OnnxDetector::load(&config);
        assert!(matches!(result, Err(PrepError::ModelLoad(_))));
    }

    #[test]
    fn test_corrupt_model_is_model_load_error() {
        let temp_dir = tempdir().unwrap();
        let model_path = temp_dir.path().join("corrupt.onnx");
        std::fs::write(&model_path, b"not an onnx graph").unwrap();

        let config = DetectorConfig::builder()
            .model_path(&model_path)
            .execution_provider(ExecutionProvider::Cpu)
            .build()
            .unwrap();

        let result = OnnxDetector::load(&config);
        assert!(matches!(result, Err(PrepError::ModelLoad(_))));
    }

    /// One candidate per column of a `[1, attributes, candidates]` tensor
    fn candidates(attributes: usize, count: usize) -> Array3<f32> {
        Array3::zeros((1, attributes, count))
    }

    fn set_candidate(
        output: &mut Array3<f32>,
        index: usize,
        [cx, cy, w, h]: [f32; 4],
        class_id: usize,
        score: f32,
    ) {
        output[[0, 0, index]] = cx;
        output[[0, 1, index]] = cy;
        output[[0, 2, index]] = w;
        output[[0, 3, index]] = h;
        output[[0, 4 + class_id, index]] = score;
    }

    fn config() -> DetectorConfig {
        DetectorConfig::builder()
            .input_size(640)
            .confidence_threshold(0.25)
            .iou_threshold(0.45)
            .build()
            .unwrap()
    }

    #[test]
    fn test_decode_scales_to_non_square_source() {
        let mut output = candidates(84, 100);
        set_candidate(&mut output, 7, [320.0, 320.0, 64.0, 64.0], 0, 0.9);

        let detections = decode_output(&output.into_dyn(), &config(), 1280, 480).unwrap();

        assert_eq!(detections.len(), 1);
        assert!(detections[0].is_person());
        assert_eq!(detections[0].score, 0.9);
        assert_eq!(
            detections[0].bounding_box,
            BoundingBox::new(576.0, 216.0, 704.0, 264.0)
        );
    }

    #[test]
    fn test_decode_accepts_transposed_layout() {
        let mut output = candidates(84, 100);
        set_candidate(&mut output, 7, [320.0, 320.0, 64.0, 64.0], 0, 0.9);
        let transposed = output.permuted_axes([0, 2, 1]);
        assert_eq!(transposed.shape(), &[1, 100, 84]);

        let detections = decode_output(&transposed.into_dyn(), &config(), 1280, 480).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(
            detections[0].bounding_box,
            BoundingBox::new(576.0, 216.0, 704.0, 264.0)
        );
    }

    #[test]
    fn test_decode_confidence_cutoff() {
        let mut output = candidates(84, 100);
        set_candidate(&mut output, 0, [100.0, 100.0, 10.0, 10.0], 0, 0.2);
        set_candidate(&mut output, 1, [300.0, 300.0, 10.0, 10.0], 0, 0.25);

        let detections = decode_output(&output.into_dyn(), &config(), 640, 640).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].score, 0.25);
        assert_eq!(
            detections[0].bounding_box,
            BoundingBox::new(295.0, 295.0, 305.0, 305.0)
        );
    }

    #[test]
    fn test_decode_clamps_to_frame() {
        let mut output = candidates(84, 100);
        set_candidate(&mut output, 0, [10.0, 630.0, 40.0, 40.0], 0, 0.8);

        let detections = decode_output(&output.into_dyn(), &config(), 640, 640).unwrap();

        assert_eq!(
            detections[0].bounding_box,
            BoundingBox::new(0.0, 610.0, 30.0, 640.0)
        );
    }

    #[test]
    fn test_decode_labels() {
        // 81 class scores: one past the COCO table
        let mut output = candidates(85, 100);
        set_candidate(&mut output, 0, [100.0, 100.0, 20.0, 20.0], 16, 0.7);
        set_candidate(&mut output, 1, [400.0, 400.0, 20.0, 20.0], 80, 0.6);

        let detections = decode_output(&output.into_dyn(), &config(), 640, 640).unwrap();
        let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();

        assert_eq!(labels, vec!["dog", "class_80"]);
    }

    #[test]
    fn test_decode_suppresses_duplicates() {
        let mut output = candidates(84, 100);
        set_candidate(&mut output, 0, [200.0, 200.0, 100.0, 100.0], 0, 0.6);
        set_candidate(&mut output, 1, [202.0, 202.0, 100.0, 100.0], 0, 0.9);
        set_candidate(&mut output, 2, [200.0, 200.0, 100.0, 100.0], 16, 0.5);

        let detections = decode_output(&output.into_dyn(), &config(), 640, 640).unwrap();
        let kept: Vec<(&str, f32)> = detections
            .iter()
            .map(|d| (d.label.as_str(), d.score))
            .collect();

        assert_eq!(kept, vec![("person", 0.9), ("dog", 0.5)]);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let flat = ndarray::Array2::<f32>::zeros((84, 100)).into_dyn();
        assert!(matches!(
            decode_output(&flat, &config(), 640, 640),
            Err(PrepError::Detection(_))
        ));

        let boxes_only = candidates(4, 100).into_dyn();
        assert!(matches!(
            decode_output(&boxes_only, &config(), 640, 640),
            Err(PrepError::Detection(_))
        ));
    }
}
