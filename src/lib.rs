#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Background Removal Library
//!
//! A Rust library for removing image backgrounds with the `RMBG-1.4`
//! segmentation model, running on ONNX Runtime or the pure-Rust Tract backend.
//!
//! The pipeline decodes an image, resamples it into the model's normalized
//! 1024×1024 input tensor, runs inference, turns the single-channel output
//! into an alpha mask at the original resolution, and composites that mask
//! onto the source pixels. Inference runs on dedicated worker threads so
//! callers never block on model work.
//!
//! ## Features
//!
//! - **Two Backends**: Tract (pure Rust, no native dependencies) and ONNX
//!   Runtime, selectable at runtime
//! - **Worker Pool**: parallel batch processing with one model session per
//!   worker and round-robin dispatch
//! - **Model Management**: ordered source fallback (cache, file, URL) with
//!   on-disk caching and coarse load-progress milestones
//! - **Format Support**: JPEG, PNG, WebP, BMP, TIFF inputs; PNG, WebP, TIFF,
//!   and raw RGBA outputs
//! - **CLI Integration**: optional command-line interface (enable with the
//!   `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rmbg::{remove_background_from_file, OutputFormat, RemovalConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder().build()?;
//! let mut result = remove_background_from_file("input.jpg", &config).await?;
//! result.save("output.png", OutputFormat::Png)?;
//! # Ok(())
//! # }
//! ```
//!
//! The one-call helpers build a fresh session per call, so the model load is
//! paid every time. To amortize it across many images, hold a
//! [`WorkerPool`] (or a [`BackgroundRemovalProcessor`] for single-threaded
//! use) and feed it the whole batch:
//!
//! ```rust,no_run
//! use rmbg::{BackendKind, RemovalConfig, WorkerPool};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder().workers(4).build()?;
//! let pool = WorkerPool::new(config, BackendKind::Tract)?;
//! pool.ensure_loaded(None).await?;
//!
//! let mut result = pool.process_file("photo.jpg").await?;
//! result.save("photo_no_bg.png", rmbg::OutputFormat::Png)?;
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Library vs CLI Usage
//!
//! All processing functionality is available by default; the `cli` feature
//! only adds the `rmbg` binary and its argument parsing, progress bars, and
//! tracing setup.
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust backend
//! - `onnx`: ONNX Runtime backend
//! - `cli` (default): command-line interface
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON-formatted tracing output
//!
//! Library-only usage without the CLI dependencies:
//!
//! ```toml
//! [dependencies]
//! rmbg = { version = "0.1", default-features = false, features = ["tract", "webp-support"] }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod postprocess;
pub mod preprocess;
pub mod processor;
pub mod services;
pub mod session;
pub mod tracing_config;
pub mod types;
pub mod utils;
pub mod worker;

use std::path::Path;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{OutputFormat, RemovalConfig, RemovalConfigBuilder};
pub use download::{LoadProgressFn, ModelFetcher};
pub use error::{Result, RmbgError};
pub use inference::{BackendKind, InferenceBackend, SessionOptions};
pub use models::{
    ModelSource, ModelSpec, NormalizationConfig, RMBG_14_INPUT_SIZE, RMBG_14_MODEL_ID,
};
pub use postprocess::MaskPostprocessor;
pub use preprocess::TensorPreprocessor;
pub use processor::{BackendFactory, BackgroundRemovalProcessor, DefaultBackendFactory};
pub use services::{
    ConsoleProgressReporter, ImageIOService, OutputFormatHandler, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate, SilentReporter,
};
pub use session::{InferenceSession, SessionState};
pub use tracing_config::{spans, TracingConfig, TracingFormat};
pub use types::{AlphaMask, MaskStatistics, PixelBuffer, ProcessingTimings, RemovalResult};
pub use worker::{ProcessInput, RemovalWorker, RequestId, WorkerPool};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;

/// Remove the background from encoded image bytes.
///
/// Accepts any format the `image` crate can sniff (JPEG, PNG, WebP, BMP,
/// TIFF). Builds a session with the default backend, loads the model, and
/// processes the single image.
///
/// # Examples
///
/// ```rust,no_run
/// use rmbg::{remove_background_from_bytes, OutputFormat, RemovalConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let config = RemovalConfig::builder().build()?;
/// let result = remove_background_from_bytes(&upload, &config).await?;
/// let png = result.to_bytes(OutputFormat::Png)?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone(), BackendKind::default())?;
    processor.process_bytes(image_bytes).await
}

/// Remove the background from an already-decoded [`image::DynamicImage`].
///
/// The most direct in-memory entry point: no file I/O and no decode step,
/// just preprocessing, inference, and compositing.
pub async fn remove_background_from_image(
    image: image::DynamicImage,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone(), BackendKind::default())?;
    processor.process_image(&image).await
}

/// Remove the background from an image file on disk.
///
/// # Examples
///
/// ```rust,no_run
/// use rmbg::{remove_background_from_file, OutputFormat, RemovalConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = RemovalConfig::builder().build()?;
/// let mut result = remove_background_from_file("portrait.jpg", &config).await?;
/// result.save("portrait_no_bg.png", OutputFormat::Png)?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_file<P: AsRef<Path>>(
    input_path: P,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone(), BackendKind::default())?;
    processor.process_file(input_path.as_ref()).await
}
