//! Image file I/O service

use crate::config::OutputFormat;
use crate::error::{Result, RmbgError};
use crate::services::OutputFormatHandler;
use image::DynamicImage;
use std::path::Path;

/// Service for image file input/output.
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path.
    ///
    /// Tries extension-based format detection first and falls back to
    /// content-based detection for files with missing or lying extensions.
    ///
    /// # Errors
    /// - File does not exist or cannot be read
    /// - Neither detection strategy can decode the data
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(RmbgError::file_io_error(
                "read image file",
                path,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path) {
            Ok(decoded) => Ok(decoded),
            Err(open_err) => Self::load_ignoring_extension(path, &open_err),
        }
    }

    /// Retry with content sniffing when the extension lies or is missing.
    fn load_ignoring_extension(path: &Path, open_err: &image::ImageError) -> Result<DynamicImage> {
        log::debug!(
            "extension-based decode failed for {}: {open_err}; sniffing content",
            path.display()
        );
        let data = std::fs::read(path)
            .map_err(|e| RmbgError::file_io_error("read image data", path, &e))?;

        image::load_from_memory(&data).map_err(|sniff_err| {
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown");
            RmbgError::processing_stage_error(
                "image loading",
                &format!(
                    "extension-based ({extension}) and content-based detection both failed: {open_err}; {sniff_err}"
                ),
                Some(&format!(
                    "path: {}, size: {} bytes",
                    path.display(),
                    data.len()
                )),
            )
        })
    }

    /// Decode an image from in-memory bytes.
    ///
    /// # Errors
    /// - The bytes are not a decodable image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes)
            .map_err(|e| RmbgError::processing(format!("failed to decode image from bytes: {e}")))
    }

    /// Save an image in the given output format, creating parent directories.
    ///
    /// # Errors
    /// - Directory creation or file write failures
    /// - Encoder failures for the chosen format
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| RmbgError::file_io_error("create output directory", parent, &e))?;
        }

        let bytes = OutputFormatHandler::encode(&image.to_rgba8(), format)?;
        std::fs::write(path, bytes)
            .map_err(|e| RmbgError::file_io_error("write output image", path, &e))
    }

    /// Whether a path has an extension this crate can decode.
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp"
                )
            })
    }
}
