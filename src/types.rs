//! Core data types shared across the background removal pipeline
//!
//! The pipeline hands ownership strictly forward: a [`PixelBuffer`] goes into
//! preprocessing, the raw model output comes back as a tensor, and the
//! postprocessor produces an [`AlphaMask`] sized to the original image. No
//! stage keeps a reference to a buffer after producing the next one.

use crate::error::{Result, RmbgError};
use crate::services::ImageIOService;
use image::{DynamicImage, ImageBuffer, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Interleaved 8-bit RGBA pixel data with explicit dimensions.
///
/// Invariant: `data.len() == width * height * 4`, row-major. Created once per
/// source image by the host's decoding facility and owned by the caller;
/// immutable once handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Create a pixel buffer, validating the length invariant.
    ///
    /// # Errors
    /// Returns [`RmbgError::Processing`] when the buffer length does not
    /// match `width * height * 4` or either dimension is zero.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        crate::utils::validate_rgba_buffer(data.len(), width, height)?;
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build a pixel buffer from any decoded image, converting to RGBA8.
    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            data: rgba.into_raw(),
            width,
            height,
        }
    }

    /// Decode a pixel buffer from encoded image bytes (PNG, JPEG, WebP, ...).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::from_image(&image))
    }

    /// Image width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw interleaved RGBA bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning the raw bytes
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// View the buffer as an [`RgbaImage`], cloning the pixel data.
    pub fn to_image(&self) -> Result<RgbaImage> {
        ImageBuffer::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            RmbgError::processing("Pixel buffer length does not form a complete RGBA image")
        })
    }
}

/// Per-pixel alpha mask aligned to the original image dimensions.
///
/// The external representation replicates every mask value into all four
/// channels, so the same buffer doubles as a grayscale visualization and an
/// alpha source. Invariant: `data.len() == width * height * 4`, values in
/// `[0, 255]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaMask {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl AlphaMask {
    /// Create a mask from replicated 4-channel data, validating the length
    /// invariant.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        crate::utils::validate_rgba_buffer(data.len(), width, height)?;
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Create a mask from one sample per pixel, replicating each value into
    /// all four channels.
    ///
    /// # Errors
    /// Returns [`RmbgError::Processing`] when `values.len()` does not match
    /// `width * height`.
    pub fn from_values(values: &[u8], width: u32, height: u32) -> Result<Self> {
        crate::utils::validate_pixel_dimensions(width, height)?;
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(RmbgError::processing(format!(
                "Mask sample count {} does not match {width}x{height} ({expected} pixels)",
                values.len()
            )));
        }

        let mut data = Vec::with_capacity(expected * 4);
        for &value in values {
            data.extend_from_slice(&[value, value, value, value]);
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Create a fully opaque mask (every value 255) at the given size.
    ///
    /// This is the defined fallback for degenerate model output where every
    /// tensor value is identical.
    #[must_use]
    pub fn opaque(width: u32, height: u32) -> Self {
        Self {
            data: vec![255; width as usize * height as usize * 4],
            width,
            height,
        }
    }

    /// Mask width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Replicated 4-channel mask bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Alpha value for the pixel at `(x, y)`
    #[must_use]
    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.data.get(idx).copied().unwrap_or(0)
    }

    /// Apply this mask to the original pixel buffer, producing a composited
    /// RGBA buffer whose alpha channel comes from the mask.
    ///
    /// # Errors
    /// Returns [`RmbgError::Processing`] when mask and image dimensions
    /// differ.
    pub fn apply_to(&self, pixels: &PixelBuffer) -> Result<PixelBuffer> {
        if pixels.width() != self.width || pixels.height() != self.height {
            return Err(RmbgError::processing(format!(
                "Mask dimensions {}x{} do not match image dimensions {}x{}",
                self.width,
                self.height,
                pixels.width(),
                pixels.height()
            )));
        }

        let mut composited = pixels.data().to_vec();
        for (pixel, mask_pixel) in composited.chunks_exact_mut(4).zip(self.data.chunks_exact(4)) {
            pixel[3] = mask_pixel[3];
        }
        PixelBuffer::new(composited, self.width, self.height)
    }

    /// Apply this mask to a decoded image, producing an [`RgbaImage`] with
    /// the mask as its alpha channel.
    pub fn apply_to_image(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let (img_width, img_height) = (image.width(), image.height());
        if img_width != self.width || img_height != self.height {
            return Err(RmbgError::processing(format!(
                "Mask dimensions {}x{} do not match image dimensions {img_width}x{img_height}",
                self.width, self.height
            )));
        }

        let mut rgba = image.to_rgba8();
        for (i, pixel) in rgba.pixels_mut().enumerate() {
            pixel[3] = self.data.get(i * 4).copied().unwrap_or(0);
        }
        Ok(rgba)
    }

    /// Collapse the replicated channels into a grayscale visualization.
    pub fn to_grayscale_image(&self) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let gray: Vec<u8> = self.data.chunks_exact(4).map(|px| px[0]).collect();
        ImageBuffer::from_raw(self.width, self.height, gray)
            .ok_or_else(|| RmbgError::processing("Failed to create image from mask data"))
    }

    /// Save the grayscale mask visualization as PNG.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let image = self.to_grayscale_image()?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let mut min = 255u8;
        let mut max = 0u8;
        let mut sum = 0u64;
        let mut foreground = 0usize;

        for px in self.data.chunks_exact(4) {
            let alpha = px[0];
            min = min.min(alpha);
            max = max.max(alpha);
            sum += u64::from(alpha);
            if alpha > 127 {
                foreground += 1;
            }
        }

        let total = self.width as usize * self.height as usize;
        MaskStatistics {
            total_pixels: total,
            foreground_pixels: foreground,
            background_pixels: total - foreground,
            foreground_ratio: if total == 0 {
                0.0
            } else {
                foreground as f32 / total as f32
            },
            min_alpha: if total == 0 { 0 } else { min },
            max_alpha: max,
            mean_alpha: if total == 0 {
                0.0
            } else {
                sum as f32 / total as f32
            },
        }
    }
}

/// Statistics about an alpha mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub min_alpha: u8,
    pub max_alpha: u8,
    pub mean_alpha: f32,
}

/// Detailed timing breakdown for background removal processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image loading and decoding from file (zero when given decoded pixels)
    pub image_decode_ms: u64,

    /// Preprocessing (bilinear resample, normalize, tensor conversion)
    pub preprocessing_ms: u64,

    /// Model forward pass
    pub inference_ms: u64,

    /// Postprocessing (normalize, resize, mask expansion)
    pub postprocessing_ms: u64,

    /// Applying the alpha mask to the original image
    pub compositing_ms: u64,

    /// Final image encoding (if saving to file)
    pub image_encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            image_decode_ms: 0,
            preprocessing_ms: 0,
            inference_ms: 0,
            postprocessing_ms: 0,
            compositing_ms: 0,
            image_encode_ms: None,
            total_ms: 0,
        }
    }

    /// Fraction of total time spent in the model forward pass
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Human-readable timing summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        let pct = |ms: u64| {
            if self.total_ms == 0 {
                0.0
            } else {
                (ms as f64 / self.total_ms as f64) * 100.0
            }
        };

        let mut summary = format!(
            "Total: {}ms | Decode: {}ms ({:.1}%) | Preprocess: {}ms ({:.1}%) | Inference: {}ms ({:.1}%) | Postprocess: {}ms ({:.1}%) | Composite: {}ms ({:.1}%)",
            self.total_ms,
            self.image_decode_ms, pct(self.image_decode_ms),
            self.preprocessing_ms, pct(self.preprocessing_ms),
            self.inference_ms, pct(self.inference_ms),
            self.postprocessing_ms, pct(self.postprocessing_ms),
            self.compositing_ms, pct(self.compositing_ms),
        );

        if let Some(encode_ms) = self.image_encode_ms {
            summary.push_str(&format!(" | Encode: {}ms ({:.1}%)", encode_ms, pct(encode_ms)));
        }

        summary
    }
}

impl Default for ProcessingTimings {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Composited image with the mask applied as its alpha channel
    pub image: RgbaImage,

    /// The alpha mask at the original image dimensions
    pub mask: AlphaMask,

    /// Per-stage timing breakdown
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    #[must_use]
    pub fn new(image: RgbaImage, mask: AlphaMask, timings: ProcessingTimings) -> Self {
        Self {
            image,
            mask,
            timings,
        }
    }

    /// Output dimensions (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Encode the composited image into the given output format.
    pub fn to_bytes(&self, format: crate::config::OutputFormat) -> Result<Vec<u8>> {
        crate::services::OutputFormatHandler::encode(&self.image, format)
    }

    /// Save the composited image, creating parent directories as needed.
    ///
    /// Records the encode time into `timings.image_encode_ms`.
    pub fn save<P: AsRef<Path>>(
        &mut self,
        path: P,
        format: crate::config::OutputFormat,
    ) -> Result<()> {
        let encode_start = instant::Instant::now();
        ImageIOService::save_image(
            &DynamicImage::ImageRgba8(self.image.clone()),
            path,
            format,
        )?;
        self.timings.image_encode_ms = Some(encode_start.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Human-readable timing summary for display
    #[must_use]
    pub fn timing_summary(&self) -> String {
        self.timings.summary()
    }
}
