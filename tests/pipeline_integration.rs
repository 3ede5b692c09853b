//! Integration tests for the background removal pipeline
//!
//! These tests drive the public API end to end without a real model file:
//! tensor preparation, mask generation, compositing, and the worker-pool
//! error paths that do not require inference.

use image::{DynamicImage, Rgba, RgbaImage};
use ndarray::Array4;
use rmbg::{
    AlphaMask, MaskPostprocessor, ModelSpec, NormalizationConfig, OutputFormat, PixelBuffer,
    ProcessingTimings, RemovalConfig, RemovalResult, TensorPreprocessor,
};
#[cfg(feature = "tract")]
use rmbg::{
    BackendKind, BackgroundRemovalProcessor, DefaultBackendFactory, InferenceSession, ModelCache,
    ModelFetcher, RemovalWorker, WorkerPool,
};
#[cfg(feature = "tract")]
use std::sync::Arc;
use tempfile::TempDir;

/// Gradient test image with distinct per-pixel colors.
fn create_test_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let r = ((x * 255) / width.max(1)) as u8;
        let g = ((y * 255) / height.max(1)) as u8;
        Rgba([r, g, 128, 255])
    });
    DynamicImage::ImageRgba8(image)
}

#[cfg(feature = "tract")]
fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}

/// Surface library logs when tests run with `RUST_LOG` set.
#[cfg(feature = "tract")]
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Worker pool wired to a temp-dir cache so tests never touch the real one.
#[cfg(feature = "tract")]
fn hermetic_pool(spec: ModelSpec, temp_dir: &TempDir) -> WorkerPool {
    let config = RemovalConfig::builder().model_spec(spec).build().unwrap();
    let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
    let session = InferenceSession::with_fetcher(
        config.clone(),
        BackendKind::Tract,
        Arc::new(DefaultBackendFactory),
        ModelFetcher::with_cache(cache),
    );
    let processor = BackgroundRemovalProcessor::with_session(config, session);
    let worker = RemovalWorker::spawn(processor).unwrap();
    WorkerPool::from_workers(vec![worker]).unwrap()
}

#[test]
fn test_tensor_contract_through_public_api() {
    let preprocessor = TensorPreprocessor::new(16, NormalizationConfig::default());
    let pixels = PixelBuffer::from_image(&create_test_image(40, 25));

    let tensor = preprocessor.preprocess(&pixels).unwrap();
    assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
    for &value in tensor.iter() {
        assert!((-1.0..=1.0).contains(&value));
    }

    // The production contract is fixed at 1024x1024
    let production = TensorPreprocessor::for_spec(&ModelSpec::rmbg14());
    assert_eq!(production.input_size(), 1024);
}

#[test]
fn test_mask_pipeline_produces_composited_output() {
    // 2x2 model output; min-max normalization maps it to [0, 1, 0.5, 1]
    let output = Array4::from_shape_vec((1, 1, 2, 2), vec![0.0, 10.0, 5.0, 10.0]).unwrap();
    let image = create_test_image(4, 4);

    let mask = MaskPostprocessor::new().postprocess(&output, 4, 4).unwrap();
    assert_eq!((mask.width(), mask.height()), (4, 4));

    let composited = mask.apply_to_image(&image).unwrap();

    // Corner alphas land exactly on the normalized source samples
    assert_eq!(composited.get_pixel(0, 0)[3], 0);
    assert_eq!(composited.get_pixel(3, 0)[3], 255);
    assert_eq!(composited.get_pixel(0, 3)[3], 128);
    assert_eq!(composited.get_pixel(3, 3)[3], 255);

    // Color channels pass through untouched
    let original = image.to_rgba8();
    for (a, b) in composited.pixels().zip(original.pixels()) {
        assert_eq!(a[0], b[0]);
        assert_eq!(a[1], b[1]);
        assert_eq!(a[2], b[2]);
    }

    // The composited result survives PNG encoding with its alpha intact
    let result = RemovalResult::new(composited, mask, ProcessingTimings::default());
    let encoded = result.to_bytes(OutputFormat::Png).unwrap();
    let decoded = image::load_from_memory(&encoded).unwrap().to_rgba8();
    assert_eq!(decoded.get_pixel(0, 0)[3], 0);
    assert_eq!(decoded.get_pixel(3, 3)[3], 255);
}

#[test]
fn test_flat_model_output_keeps_whole_image() {
    let output = Array4::from_elem((1, 1, 8, 8), 0.42_f32);
    let mask = MaskPostprocessor::new().postprocess(&output, 6, 4).unwrap();

    let stats = mask.statistics();
    assert!((stats.foreground_ratio - 1.0).abs() < f32::EPSILON);
    assert_eq!(stats.min_alpha, 255);

    let composited = mask.apply_to_image(&create_test_image(6, 4)).unwrap();
    assert!(composited.pixels().all(|p| p[3] == 255));
}

#[test]
fn test_mask_rejects_mismatched_image() {
    let mask = AlphaMask::opaque(10, 10);
    let err = mask.apply_to_image(&create_test_image(8, 8)).unwrap_err();
    assert!(err.to_string().contains("do not match"));
}

#[test]
fn test_configuration_limits_enforced() {
    assert!(RemovalConfig::builder().workers(64).build().is_ok());
    assert!(RemovalConfig::builder().workers(65).build().is_err());

    let no_sources = ModelSpec {
        sources: Vec::new(),
        ..ModelSpec::rmbg14()
    };
    assert!(RemovalConfig::builder()
        .model_spec(no_sources)
        .build()
        .is_err());

    let auto = RemovalConfig::builder().workers(0).build().unwrap();
    assert!(auto.effective_workers() >= 1);
}

#[cfg(feature = "tract")]
#[tokio::test(flavor = "multi_thread")]
async fn test_missing_model_surfaces_acquisition_error() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let spec = ModelSpec::from_path(temp_dir.path().join("missing.onnx"));
    let pool = hermetic_pool(spec, &temp_dir);

    let image_data = png_bytes(&create_test_image(8, 8));
    let err = pool.process_bytes(image_data.clone()).await.unwrap_err();
    assert!(err.to_string().contains("model sources failed"));

    // The session retries on the next request rather than wedging
    assert!(pool.process_bytes(image_data).await.is_err());

    pool.shutdown();
}

#[cfg(feature = "tract")]
#[tokio::test(flavor = "multi_thread")]
async fn test_corrupt_model_fails_session_build() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let model_file = temp_dir.path().join("bad.onnx");
    std::fs::write(&model_file, b"this is not an onnx graph").unwrap();

    let pool = hermetic_pool(ModelSpec::from_path(&model_file), &temp_dir);
    let err = pool
        .process_bytes(png_bytes(&create_test_image(8, 8)))
        .await
        .unwrap_err();

    // The file was acquired but the backend could not build a session from it
    assert!(!err.to_string().contains("model sources failed"));

    pool.shutdown();
}

#[tokio::test]
async fn test_one_call_helper_rejects_missing_input() {
    let temp_dir = TempDir::new().unwrap();
    // Decode runs before model acquisition, so a missing input fails fast
    // without any network or model work
    std::env::set_var("RMBG_CACHE_DIR", temp_dir.path());
    let config = RemovalConfig::builder().build().unwrap();

    let missing = temp_dir.path().join("not-there.jpg");
    let result = rmbg::remove_background_from_file(&missing, &config).await;
    assert!(result.is_err());
}
