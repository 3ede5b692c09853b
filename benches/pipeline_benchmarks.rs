use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, Rgba, RgbaImage};
use ndarray::Array4;
use rmbg::{
    preprocess::resample_rgba, MaskPostprocessor, ModelSpec, OutputFormat, OutputFormatHandler,
    PixelBuffer, TensorPreprocessor,
};

fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let r = (x % 256) as u8;
        let g = (y % 256) as u8;
        let b = ((x + y) % 256) as u8;
        Rgba([r, g, b, 255])
    });
    DynamicImage::ImageRgba8(image)
}

fn synthetic_model_output(size: usize) -> Array4<f32> {
    Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
        ((x * 31 + y * 17) % 97) as f32 / 96.0
    })
}

fn benchmark_preprocessing(c: &mut Criterion) {
    let preprocessor = TensorPreprocessor::for_spec(&ModelSpec::rmbg14());

    let mut group = c.benchmark_group("preprocessing");
    group.sample_size(10);

    for (width, height) in [(512, 512), (1024, 1024), (1920, 1080)] {
        let pixels = PixelBuffer::from_image(&gradient_image(width, height));

        group.bench_function(format!("{width}x{height}_to_tensor"), |b| {
            b.iter(|| preprocessor.preprocess(black_box(&pixels)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_resampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("resampling");
    group.sample_size(10);

    for (width, height) in [(640, 480), (1920, 1080)] {
        let pixels = PixelBuffer::from_image(&gradient_image(width, height));

        group.bench_function(format!("{width}x{height}_to_1024"), |b| {
            b.iter(|| {
                resample_rgba(black_box(pixels.data()), width, height, 1024).unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_postprocessing(c: &mut Criterion) {
    let postprocessor = MaskPostprocessor::new();
    let output = synthetic_model_output(1024);

    let mut group = c.benchmark_group("postprocessing");
    group.sample_size(10);

    for (width, height) in [(512, 512), (1920, 1080), (3000, 2000)] {
        group.bench_function(format!("mask_to_{width}x{height}"), |b| {
            b.iter(|| {
                postprocessor
                    .postprocess(black_box(&output), width, height)
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_compositing(c: &mut Criterion) {
    let postprocessor = MaskPostprocessor::new();
    let output = synthetic_model_output(1024);

    let mut group = c.benchmark_group("compositing");
    group.sample_size(10);

    for (width, height) in [(1024, 1024), (1920, 1080)] {
        let image = gradient_image(width, height);
        let mask = postprocessor.postprocess(&output, width, height).unwrap();

        group.bench_function(format!("apply_mask_{width}x{height}"), |b| {
            b.iter(|| mask.apply_to_image(black_box(&image)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_encoding(c: &mut Criterion) {
    let image = gradient_image(1024, 1024).to_rgba8();

    let mut group = c.benchmark_group("encoding");
    group.sample_size(10);

    for format in [OutputFormat::Png, OutputFormat::Rgba8] {
        group.bench_function(format!("1024x1024_{format}"), |b| {
            b.iter(|| OutputFormatHandler::encode(black_box(&image), format).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    pipeline_benches,
    benchmark_preprocessing,
    benchmark_resampling,
    benchmark_postprocessing,
    benchmark_compositing,
    benchmark_encoding
);
criterion_main!(pipeline_benches);
