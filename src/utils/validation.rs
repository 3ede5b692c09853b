//! Buffer and tensor invariant checks
//!
//! Centralized validation for the pipeline's structural invariants: RGBA
//! buffer lengths, pixel dimensions, and the fixed `[1, 1, H, W]` mask
//! output contract.

use crate::error::{Result, RmbgError};
use ndarray::Array4;

/// Largest accepted image edge, matching common decoder limits.
const MAX_DIMENSION: u32 = 16384;

/// Validate that an interleaved RGBA buffer length matches its dimensions.
pub fn validate_rgba_buffer(len: usize, width: u32, height: u32) -> Result<()> {
    validate_pixel_dimensions(width, height)?;

    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(RmbgError::processing(format!(
            "RGBA buffer length {len} does not match {width}x{height}x4 = {expected}"
        )));
    }
    Ok(())
}

/// Validate image dimensions are non-zero and within decoder bounds.
pub fn validate_pixel_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(RmbgError::processing(format!(
            "Image dimensions must be non-zero, got {width}x{height}"
        )));
    }

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(RmbgError::processing(format!(
            "Image dimensions too large: {width}x{height}. Maximum: {MAX_DIMENSION}x{MAX_DIMENSION}"
        )));
    }

    Ok(())
}

/// Validate the fixed mask-output contract: shape `[1, 1, H, W]` with
/// non-empty spatial extent.
///
/// Backends adapt whatever their runtime returns to this shape; by the time
/// a tensor reaches the postprocessor it must already satisfy it.
pub fn validate_mask_output_shape(tensor: &Array4<f32>) -> Result<()> {
    let shape = tensor.shape();
    let batch = shape.first().copied().unwrap_or(0);
    let channels = shape.get(1).copied().unwrap_or(0);
    let height = shape.get(2).copied().unwrap_or(0);
    let width = shape.get(3).copied().unwrap_or(0);

    if batch != 1 || channels != 1 {
        return Err(RmbgError::processing(format!(
            "Mask output must have shape [1, 1, H, W], got [{batch}, {channels}, {height}, {width}]"
        )));
    }

    if height == 0 || width == 0 {
        return Err(RmbgError::processing(
            "Mask output has empty spatial dimensions",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_buffer_validation() {
        assert!(validate_rgba_buffer(16, 2, 2).is_ok());
        assert!(validate_rgba_buffer(15, 2, 2).is_err());
        assert!(validate_rgba_buffer(0, 0, 2).is_err());
    }

    #[test]
    fn test_dimension_bounds() {
        assert!(validate_pixel_dimensions(1, 1).is_ok());
        assert!(validate_pixel_dimensions(MAX_DIMENSION, 1).is_ok());
        assert!(validate_pixel_dimensions(MAX_DIMENSION + 1, 1).is_err());
        assert!(validate_pixel_dimensions(0, 10).is_err());
    }

    #[test]
    fn test_mask_output_shape_contract() {
        let good = Array4::<f32>::zeros((1, 1, 4, 4));
        assert!(validate_mask_output_shape(&good).is_ok());

        let multi_channel = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(validate_mask_output_shape(&multi_channel).is_err());

        let batched = Array4::<f32>::zeros((2, 1, 4, 4));
        assert!(validate_mask_output_shape(&batched).is_err());
    }
}
