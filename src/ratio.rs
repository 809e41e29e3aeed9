//! Person-occupancy ratio calculation

use crate::detection::Detection;
use crate::error::{PrepError, Result};

/// Fraction of the image area covered by each detected person
///
/// Returns one ratio per detection labeled `"person"`, in the order the
/// detector emitted them. Overlapping boxes are not merged.
///
/// # Errors
/// - `PrepError::InvalidImage` when `width * height == 0`
///
/// # Examples
/// ```rust
/// use imgprep::{compute_person_ratios, BoundingBox, Detection};
///
/// let detections = vec![
///     Detection::person(0.9, BoundingBox::new(0.0, 0.0, 50.0, 50.0)),
///     Detection::new("dog", 0.8, BoundingBox::new(0.0, 0.0, 100.0, 100.0)),
/// ];
/// let ratios = compute_person_ratios((100, 100), &detections)?;
/// assert_eq!(ratios, vec![0.25]);
/// # Ok::<(), imgprep::PrepError>(())
/// ```
pub fn compute_person_ratios(
    image_dimensions: (u32, u32),
    detections: &[Detection],
) -> Result<Vec<f64>> {
    let image_area = image_area(image_dimensions)?;

    Ok(detections
        .iter()
        .filter(|detection| detection.is_person())
        .map(|detection| detection.bounding_box.area() / image_area)
        .collect())
}

/// Sum of [`compute_person_ratios`] for one image
///
/// # Errors
/// - `PrepError::InvalidImage` when `width * height == 0`
pub fn human_ratio_sum(image_dimensions: (u32, u32), detections: &[Detection]) -> Result<f64> {
    // Folding from +0.0 keeps an empty sum from serializing as -0.0
    Ok(compute_person_ratios(image_dimensions, detections)?
        .into_iter()
        .fold(0.0, |sum, ratio| sum + ratio))
}

fn image_area((width, height): (u32, u32)) -> Result<f64> {
    let area = f64::from(width) * f64::from(height);
    if area > 0.0 {
        Ok(area)
    } else {
        Err(PrepError::invalid_image(format!(
            "image has zero area ({}x{})",
            width, height
        )))
    }
}
