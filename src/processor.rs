//! Background removal processing pipeline
//!
//! `BackgroundRemovalProcessor` ties the pipeline together: decode,
//! preprocess into the input tensor, run the model, turn the output into an
//! alpha mask, and composite the mask onto the source pixels. It owns one
//! [`InferenceSession`] and is the unit of work a worker thread carries.

use crate::config::RemovalConfig;
use crate::download::LoadProgressFn;
use crate::error::{Result, RmbgError};
use crate::inference::{BackendKind, InferenceBackend};
use crate::postprocess::MaskPostprocessor;
use crate::preprocess::TensorPreprocessor;
use crate::services::{ImageIOService, ProcessingStage, ProgressReporter, ProgressTracker};
use crate::session::{InferenceSession, SessionState};
use crate::types::{AlphaMask, PixelBuffer, ProcessingTimings, RemovalResult};
use image::DynamicImage;
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tracing::{instrument, span, Level};

/// Factory trait for creating inference backends.
///
/// The pipeline never constructs concrete backends itself; sessions ask a
/// factory so tests and embedders can substitute their own.
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the given kind.
    ///
    /// # Errors
    /// - The backend kind is not compiled into this build
    fn create_backend(&self, kind: BackendKind) -> Result<Box<dyn InferenceBackend>>;
}

/// Factory producing the backends compiled into this build.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, kind: BackendKind) -> Result<Box<dyn InferenceBackend>> {
        match kind {
            #[cfg(feature = "tract")]
            BackendKind::Tract => Ok(Box::new(crate::backends::TractBackend::new())),
            #[cfg(feature = "onnx")]
            BackendKind::Onnx => Ok(Box::new(crate::backends::OnnxBackend::new())),
            #[allow(unreachable_patterns)]
            other => Err(RmbgError::invalid_config(format!(
                "backend '{other}' is not enabled in this build"
            ))),
        }
    }
}

/// Full background removal pipeline over one inference session.
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    session: InferenceSession,
    preprocessor: TensorPreprocessor,
    postprocessor: MaskPostprocessor,
    tracker: ProgressTracker,
}

impl BackgroundRemovalProcessor {
    /// Create a processor using the backends compiled into this build.
    ///
    /// # Errors
    /// - Model cache or HTTP client initialization failures
    pub fn new(config: RemovalConfig, kind: BackendKind) -> Result<Self> {
        Self::with_factory(config, kind, Arc::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory.
    ///
    /// # Errors
    /// - Model cache or HTTP client initialization failures
    pub fn with_factory(
        config: RemovalConfig,
        kind: BackendKind,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<Self> {
        let session = InferenceSession::new(config.clone(), kind, factory)?;
        Ok(Self::with_session(config, session))
    }

    /// Create a processor around an existing session handle.
    ///
    /// The session must have been built from the same configuration.
    #[must_use]
    pub fn with_session(config: RemovalConfig, session: InferenceSession) -> Self {
        let preprocessor = TensorPreprocessor::for_spec(&config.model_spec);
        Self {
            config,
            session,
            preprocessor,
            postprocessor: MaskPostprocessor::new(),
            tracker: ProgressTracker::silent(),
        }
    }

    /// Route stage progress to the given reporter.
    pub fn set_progress_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.tracker = ProgressTracker::new(reporter);
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Lifecycle state of the underlying session.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether the model is loaded and inference is available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    /// Load the model if it is not loaded yet.
    ///
    /// Processing operations call this themselves; calling it up front just
    /// moves the one-time model cost to a convenient moment.
    ///
    /// # Errors
    /// - Model acquisition or session build failures
    pub async fn ensure_ready(&mut self) -> Result<()> {
        self.ensure_ready_with(None).await
    }

    /// Load the model, forwarding coarse 0-100 load milestones.
    ///
    /// # Errors
    /// - Model acquisition or session build failures
    pub async fn ensure_ready_with(&mut self, progress: Option<LoadProgressFn<'_>>) -> Result<()> {
        if self.session.is_ready() {
            if let Some(callback) = progress {
                callback(100);
            }
            return Ok(());
        }
        self.tracker.enter(ProcessingStage::ModelLoading);
        self.session.ensure_ready(progress).await
    }

    /// Remove the background from an image file.
    ///
    /// # Errors
    /// - File read or decode failures
    /// - Model loading and inference failures
    pub async fn process_file<P: AsRef<Path>>(&mut self, input_path: P) -> Result<RemovalResult> {
        let path_ref = input_path.as_ref();
        self.tracker.enter(ProcessingStage::Decoding);

        let decode_start = Instant::now();
        let image = ImageIOService::load_image(path_ref)?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        self.process_decoded(&image, decode_ms).await
    }

    /// Remove the background from encoded image bytes (PNG, JPEG, WebP, ...).
    ///
    /// # Errors
    /// - Decode failures
    /// - Model loading and inference failures
    pub async fn process_bytes(&mut self, image_bytes: &[u8]) -> Result<RemovalResult> {
        self.tracker.enter(ProcessingStage::Decoding);

        let decode_start = Instant::now();
        let image = ImageIOService::load_from_bytes(image_bytes)?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        self.process_decoded(&image, decode_ms).await
    }

    /// Remove the background from an already-decoded image.
    ///
    /// # Errors
    /// - Model loading and inference failures
    pub async fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        self.process_decoded(image, 0).await
    }

    /// Remove the background from a raw RGBA pixel buffer.
    ///
    /// # Errors
    /// - Model loading and inference failures
    pub async fn process_pixels(&mut self, pixels: &PixelBuffer) -> Result<RemovalResult> {
        let image = DynamicImage::ImageRgba8(pixels.to_image()?);
        self.process_decoded(&image, 0).await
    }

    /// Compute the alpha mask for an image without compositing.
    ///
    /// # Errors
    /// - Model loading and inference failures
    pub async fn segment_mask(&mut self, image: &DynamicImage) -> Result<AlphaMask> {
        self.ensure_ready_with(None).await?;

        let input = self.preprocessor.preprocess_image(image)?;
        let output = self.session.run(&input)?;
        self.postprocessor
            .postprocess(&output, image.width(), image.height())
    }

    /// Composite a previously computed mask onto an image.
    ///
    /// Does not touch the model; the mask must match the image dimensions.
    ///
    /// # Errors
    /// - Mask and image dimensions differ
    pub fn apply_mask(&mut self, image: &DynamicImage, mask: &AlphaMask) -> Result<RemovalResult> {
        self.tracker.enter(ProcessingStage::Compositing);

        let start = Instant::now();
        let composited = mask.apply_to_image(image)?;
        let timings = ProcessingTimings {
            compositing_ms: start.elapsed().as_millis() as u64,
            total_ms: start.elapsed().as_millis() as u64,
            ..ProcessingTimings::default()
        };

        Ok(RemovalResult::new(composited, mask.clone(), timings))
    }

    #[instrument(
        skip(self, image),
        fields(
            model = %self.config.model_spec.name,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    async fn process_decoded(
        &mut self,
        image: &DynamicImage,
        image_decode_ms: u64,
    ) -> Result<RemovalResult> {
        let result = self.run_pipeline(image, image_decode_ms).await;
        if let Err(error) = &result {
            self.tracker.fail(&error.to_string());
        }
        result
    }

    async fn run_pipeline(
        &mut self,
        image: &DynamicImage,
        image_decode_ms: u64,
    ) -> Result<RemovalResult> {
        self.ensure_ready_with(None).await?;

        let total_start = Instant::now();
        let mut timings = ProcessingTimings {
            image_decode_ms,
            ..ProcessingTimings::default()
        };
        let (width, height) = (image.width(), image.height());

        self.tracker.enter(ProcessingStage::Preprocessing);
        let input_tensor = {
            let _span = span!(Level::DEBUG, "preprocessing", width, height).entered();
            let start = Instant::now();
            let tensor = self.preprocessor.preprocess_image(image)?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        self.tracker.enter(ProcessingStage::Inference);
        let output_tensor = {
            let _span = span!(Level::INFO, "inference", model = %self.config.model_spec.name)
                .entered();
            let start = Instant::now();
            let tensor = self.session.run(&input_tensor)?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        self.tracker.enter(ProcessingStage::Postprocessing);
        let mask = {
            let _span = span!(Level::DEBUG, "postprocessing", width, height).entered();
            let start = Instant::now();
            let mask = self.postprocessor.postprocess(&output_tensor, width, height)?;
            timings.postprocessing_ms = start.elapsed().as_millis() as u64;
            mask
        };

        self.tracker.enter(ProcessingStage::Compositing);
        let composited = {
            let start = Instant::now();
            let composited = mask.apply_to_image(image)?;
            timings.compositing_ms = start.elapsed().as_millis() as u64;
            composited
        };

        timings.total_ms = image_decode_ms + total_start.elapsed().as_millis() as u64;

        self.tracker.enter(ProcessingStage::Completed);
        self.tracker.complete(&timings);

        Ok(RemovalResult::new(composited, mask, timings))
    }
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("model", &self.config.model_spec.name)
            .field("session_state", &self.session.state())
            .finish()
    }
}
