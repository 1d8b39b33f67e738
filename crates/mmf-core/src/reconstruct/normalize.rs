use ndarray::{Array1, Array2, ArrayView1};

use crate::consts::DEGENERATE_GRAY;
use crate::error::{raise, Result, Warning};
use crate::frame::FrameShape;
use crate::pipeline::config::OutputMode;

/// (min, max) of the finite values, or None when there are none.
pub fn value_range(values: ArrayView1<f32>) -> Option<(f32, f32)> {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Min–max rescale to 0–255.
///
/// A vector without dynamic range becomes uniform mid-gray and raises
/// [`Warning::DegenerateResult`].
pub fn normalize_to_u8(values: ArrayView1<f32>, warnings: &mut Vec<Warning>) -> Array1<u8> {
    let Some((min, max)) = value_range(values).filter(|(lo, hi)| hi > lo) else {
        let value = value_range(values).map_or(f32::NAN, |(lo, _)| lo);
        raise(warnings, Warning::DegenerateResult { value });
        return Array1::from_elem(values.len(), DEGENERATE_GRAY);
    };
    let scale = 255.0 / (max - min);
    values.mapv(|v| {
        if v.is_finite() {
            ((v - min) * scale).round().clamp(0.0, 255.0) as u8
        } else {
            0
        }
    })
}

/// 255 where the value is positive, else 0.
pub fn binarize_positive(values: ArrayView1<f32>) -> Array1<u8> {
    values.mapv(|v| if v > 0.0 { 255 } else { 0 })
}

/// Convert a reconstruction to an H×W 8-bit image.
pub fn to_image(
    values: ArrayView1<f32>,
    shape: FrameShape,
    mode: OutputMode,
    warnings: &mut Vec<Warning>,
) -> Result<Array2<u8>> {
    let flat = match mode {
        OutputMode::Normalized => normalize_to_u8(values, warnings),
        OutputMode::Binarized => binarize_positive(values),
    };
    Ok(flat.into_shape_with_order((shape.height, shape.width))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rescales_to_full_range() {
        let mut warnings = Vec::new();
        let out = normalize_to_u8(array![-2.0f32, 0.0, 2.0].view(), &mut warnings);
        assert_eq!(out, array![0u8, 128, 255]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn uniform_vector_is_mid_gray() {
        let mut warnings = Vec::new();
        let out = normalize_to_u8(array![3.5f32, 3.5, 3.5, 3.5].view(), &mut warnings);
        assert!(out.iter().all(|&v| v == DEGENERATE_GRAY));
        assert_eq!(warnings, vec![Warning::DegenerateResult { value: 3.5 }]);
    }

    #[test]
    fn binarized_output_thresholds_at_zero() {
        let out = binarize_positive(array![-1.0f32, 0.0, 0.5].view());
        assert_eq!(out, array![0u8, 0, 255]);
    }
}
