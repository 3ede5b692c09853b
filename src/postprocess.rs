//! Model-output-to-mask postprocessing
//!
//! The segmentation model emits a single-channel float field at its own
//! spatial resolution, with no guaranteed value range. Postprocessing
//! min-max normalizes that field to `[0, 1]`, resamples it to the original
//! image dimensions with the same edge-clamped bilinear mapping used on the
//! way in, and expands it into a replicated 4-channel [`AlphaMask`].

use crate::error::Result;
use crate::types::AlphaMask;
use ndarray::Array4;

/// Converts raw model output tensors into alpha masks.
///
/// The output contract is fixed: the tensor shape must be `[1, 1, H, W]`.
/// Adapting other model output layouts belongs in the backend that produced
/// the tensor, not here.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Convert a `[1, 1, H, W]` output tensor into a mask at the original
    /// image dimensions.
    ///
    /// A flat tensor (every value identical) carries no boundary
    /// information; the whole image is treated as foreground and a fully
    /// opaque mask is returned.
    ///
    /// # Errors
    /// - Tensor shape is not `[1, 1, H, W]` or is empty
    /// - Target dimensions are zero or oversized
    pub fn postprocess(
        &self,
        output: &Array4<f32>,
        target_width: u32,
        target_height: u32,
    ) -> Result<AlphaMask> {
        crate::utils::validate_mask_output_shape(output)?;
        crate::utils::validate_pixel_dimensions(target_width, target_height)?;

        let (_, _, source_height, source_width) = output.dim();

        let (min, max) = output
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        if range <= 0.0 || !range.is_finite() {
            log::debug!(
                "Flat model output (min = max = {min}); returning fully opaque mask"
            );
            return Ok(AlphaMask::opaque(target_width, target_height));
        }

        let normalized: Vec<f32> = output.iter().map(|&v| (v - min) / range).collect();
        let resized = resize_field(
            &normalized,
            source_width,
            source_height,
            target_width as usize,
            target_height as usize,
        );

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let values: Vec<u8> = resized
            .iter()
            .map(|&v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();

        AlphaMask::from_values(&values, target_width, target_height)
    }
}

/// Bilinear resample of a single-channel float field.
///
/// Same coordinate mapping as the RGBA resampler: `src = dst * src_dim /
/// dst_dim`, taps clamped to the field bounds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn resize_field(
    field: &[f32],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
) -> Vec<f32> {
    if src_width == dst_width && src_height == dst_height {
        return field.to_vec();
    }

    let x_ratio = src_width as f32 / dst_width as f32;
    let y_ratio = src_height as f32 / dst_height as f32;

    let mut out = Vec::with_capacity(dst_width * dst_height);

    #[allow(clippy::indexing_slicing)] // All indices bounded by the clamps below
    for y in 0..dst_height {
        let src_y = y as f32 * y_ratio;
        let y0 = (src_y.floor() as usize).min(src_height - 1);
        let y1 = (y0 + 1).min(src_height - 1);
        let dy = src_y - src_y.floor();

        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let x0 = (src_x.floor() as usize).min(src_width - 1);
            let x1 = (x0 + 1).min(src_width - 1);
            let dx = src_x - src_x.floor();

            let top = field[y0 * src_width + x0] * (1.0 - dx) + field[y0 * src_width + x1] * dx;
            let bottom = field[y1 * src_width + x0] * (1.0 - dx) + field[y1 * src_width + x1] * dx;
            out.push(top * (1.0 - dy) + bottom * dy);
        }
    }

    out
}
