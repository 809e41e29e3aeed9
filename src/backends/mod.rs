//! Detector implementations
//!
//! - ONNX Runtime detector for YOLO-family exports (`onnx` feature)
//! - Scripted mock detector for tests

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use self::mock::MockDetector;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxDetector;
