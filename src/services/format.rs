//! Output format encoding service

use crate::config::OutputFormat;
use crate::error::{Result, RmbgError};
use image::RgbaImage;

/// Encodes composited RGBA results into the supported output formats.
///
/// Every supported format carries an alpha channel, so encoding never
/// flattens transparency.
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an RGBA image into the given format's byte representation.
    ///
    /// `Rgba8` is the raw pixel buffer with no container around it.
    ///
    /// # Errors
    /// - Encoder failures from the underlying codec
    /// - WebP requested in a build without the `webp-support` feature
    pub fn encode(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
        match format {
            OutputFormat::Png => Self::encode_with(image, image::ImageFormat::Png),
            OutputFormat::Tiff => Self::encode_with(image, image::ImageFormat::Tiff),
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => Self::encode_with(image, image::ImageFormat::WebP),
            #[cfg(not(feature = "webp-support"))]
            OutputFormat::WebP => Err(RmbgError::unsupported_format(
                "WebP output requires the webp-support feature",
            )),
            OutputFormat::Rgba8 => Ok(image.as_raw().clone()),
        }
    }

    fn encode_with(image: &RgbaImage, format: image::ImageFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        image.write_to(&mut cursor, format).map_err(|e| {
            RmbgError::processing(format!("failed to encode {format:?}: {e}"))
        })?;
        Ok(buffer)
    }

    /// File extension (without the dot) for a given output format.
    #[must_use]
    pub fn extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Rgba8 => "raw",
        }
    }
}
