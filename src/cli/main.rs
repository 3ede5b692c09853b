//! The `rmbg` command
//!
//! Command-line interface wrapping the worker pool: batch and single-image
//! processing, stdin/stdout piping, and model cache management.

use super::config::{model_spec_from_arg, CliConfigBuilder};
use crate::{
    cache::{format_size, ModelCache},
    config::{OutputFormat, RemovalConfig},
    download::ModelFetcher,
    inference::BackendKind,
    models::ModelSpec,
    services::{ImageIOService, OutputFormatHandler},
    tracing_config::spans,
    types::ProcessingTimings,
    worker::WorkerPool,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Instrument;

/// Remove image backgrounds from the command line
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "rmbg")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required_unless_present_any = &["only_download", "list_models", "clear_cache", "show_cache_dir"])]
    pub input: Vec<String>,

    /// Output file (single input) or directory (batch processing). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Inference backend (tract = pure Rust, onnx = ONNX Runtime)
    #[arg(short, long, default_value = "tract")]
    pub backend: String,

    /// Number of parallel workers, each with its own model session
    /// (0 = one per hardware thread)
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// Number of intra-op inference threads (0 = runtime default)
    #[arg(short, long, default_value_t = 2)]
    pub threads: usize,

    /// Enable verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Filename pattern for batch processing (e.g. "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Model file path, download URL, or cached model ID
    /// [default: bundled RMBG-1.4 source chain]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Also write the grayscale alpha mask next to each output image
    #[arg(long)]
    pub save_mask: bool,

    /// Download the model into the cache and exit
    #[arg(long)]
    pub only_download: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Clear cached models (combine with --model to clear a specific one) and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Show the current cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Use a custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<String>,

    /// Bypass the on-disk model cache (forces fresh acquisition)
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Webp,
    Tiff,
    Rgba8,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    crate::tracing_config::init_cli_tracing(cli.verbose)
        .context("Failed to initialize tracing")?;

    if let Some(cache_dir) = &cli.cache_dir {
        // Honored by every cache consumer, including worker sessions
        std::env::set_var("RMBG_CACHE_DIR", cache_dir);
    }

    // Cache management flags short-circuit before any model work
    if cli.list_models {
        return list_cached_models();
    }
    if cli.clear_cache {
        return clear_cached_models(&cli);
    }
    if cli.show_cache_dir {
        return show_current_cache_dir();
    }
    if cli.only_download {
        return download_model_only(&cli).await;
    }

    if cli.input.is_empty() {
        anyhow::bail!("Provide at least one input file, directory, or \"-\"");
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid command-line arguments")?;
    let (config, backend) =
        CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    info!(
        "Backend: {backend}, model: {}, workers: {}",
        config.model_spec.name,
        config.effective_workers()
    );

    let pool = WorkerPool::new(config.clone(), backend)
        .context("Failed to start background removal workers")?;

    let start_time = Instant::now();
    let outcome = process_inputs(&cli, &pool, &config, backend).await;

    // Join worker threads even when processing failed
    pool.shutdown();

    let processed_count = outcome?;
    info!(
        "Processed {} image(s) in {:.2}s",
        processed_count,
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// One unit of batch work: an input file plus where its output goes.
#[derive(Debug)]
struct Job {
    input: PathBuf,
    /// Output path below the chosen output root
    rel_output: PathBuf,
    /// Root used when no explicit output directory is given
    default_root: PathBuf,
}

/// Where outputs are written, resolved from `--output` and the job count.
#[derive(Debug)]
enum OutputTarget {
    /// Encoded bytes to stdout (single input only)
    Stdout,
    /// Explicit output file (single input only)
    File(PathBuf),
    /// Explicit output directory re-rooting every job
    Directory(PathBuf),
    /// Per-job defaults: `<stem>_no_bg.<ext>` beside files,
    /// `<dir>_no_bg/` beside directories
    Default,
}

async fn process_inputs(
    cli: &Cli,
    pool: &WorkerPool,
    config: &RemovalConfig,
    backend: BackendKind,
) -> Result<usize> {
    let output_format = config.output_format;

    // stdin is a single-image pipe, no file scanning involved
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        load_model_with_progress(pool, config, backend).await?;
        return process_stdin(cli.output.as_deref(), pool, output_format, cli.save_mask).await;
    }

    let jobs = collect_jobs(cli, output_format)?;
    if jobs.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }

    info!("Found {} image file(s) to process", jobs.len());
    let target = resolve_output_target(cli, jobs.len())?;

    // Warm every worker up front so download milestones are not interleaved
    // with per-file progress output
    load_model_with_progress(pool, config, backend).await?;

    match jobs.as_slice() {
        [job] => process_single_job(pool, job, &target, output_format, cli.save_mask).await,
        _ => {
            let output_dir = match &target {
                OutputTarget::Directory(dir) => Some(dir.as_path()),
                _ => None,
            };
            process_batch(pool, &jobs, output_dir, output_format, cli.save_mask).await
        },
    }
}

/// Expand CLI inputs into jobs with their default output locations.
fn collect_jobs(cli: &Cli, format: OutputFormat) -> Result<Vec<Job>> {
    let extension = OutputFormatHandler::extension(format);
    let mut jobs = Vec::new();

    for input in &cli.input {
        let path = PathBuf::from(input);

        if path.is_file() {
            if !ImageIOService::is_supported_format(&path) {
                warn!("Skipping unsupported file: {}", path.display());
                continue;
            }
            jobs.push(Job {
                rel_output: PathBuf::from(output_file_name(&path, extension)),
                default_root: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
                input: path,
            });
        } else if path.is_dir() {
            let default_root = sibling_no_bg_dir(&path);
            for file in find_image_files(&path, cli.recursive, cli.pattern.as_deref())? {
                // Keep the directory structure below the input root
                let rel_parent = file
                    .strip_prefix(&path)
                    .ok()
                    .and_then(Path::parent)
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                jobs.push(Job {
                    rel_output: rel_parent.join(output_file_name(&file, extension)),
                    default_root: default_root.clone(),
                    input: file,
                });
            }
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    // Deterministic processing order
    jobs.sort_by(|a, b| a.input.cmp(&b.input));
    Ok(jobs)
}

fn resolve_output_target(cli: &Cli, job_count: usize) -> Result<OutputTarget> {
    match cli.output.as_deref() {
        None => Ok(OutputTarget::Default),
        Some("-") => {
            if job_count != 1 {
                anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
            }
            Ok(OutputTarget::Stdout)
        },
        Some(target) => {
            let path = PathBuf::from(target);
            if job_count == 1 && !path.is_dir() {
                return Ok(OutputTarget::File(path));
            }
            if path.is_file() {
                anyhow::bail!(
                    "Output path exists and is a file, not a directory: {}",
                    path.display()
                );
            }
            Ok(OutputTarget::Directory(path))
        },
    }
}

fn job_output_path(job: &Job, target: &OutputTarget) -> Option<PathBuf> {
    match target {
        OutputTarget::Stdout => None,
        OutputTarget::File(path) => Some(path.clone()),
        OutputTarget::Directory(dir) => Some(dir.join(&job.rel_output)),
        OutputTarget::Default => Some(job.default_root.join(&job.rel_output)),
    }
}

/// Load the model on every worker, drawing download milestones as a bar.
async fn load_model_with_progress(
    pool: &WorkerPool,
    config: &RemovalConfig,
    backend: BackendKind,
) -> Result<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Loading model [{bar:40.cyan/blue}] {pos}%")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let bar_handle = bar.clone();
    let on_progress = move |percent: u8| bar_handle.set_position(u64::from(percent));

    let span = spans::model_loading(&config.model_spec.name, &backend.to_string());
    pool.ensure_loaded(Some(&on_progress))
        .instrument(span)
        .await
        .context("Failed to load model")?;

    bar.finish_and_clear();
    Ok(())
}

async fn process_single_job(
    pool: &WorkerPool,
    job: &Job,
    target: &OutputTarget,
    format: OutputFormat,
    save_mask: bool,
) -> Result<usize> {
    let mut result = pool
        .process_file(&job.input)
        .instrument(spans::file_processing(&job.input))
        .await
        .with_context(|| format!("Failed to remove background from {}", job.input.display()))?;

    match job_output_path(job, target) {
        None => {
            let data = result.to_bytes(format)?;
            write_stdout(&data)?;
            if save_mask {
                warn!("--save-mask is ignored when writing to stdout");
            }
            log_timings(&job.input, &result.timings);
            info!("Image written to stdout");
        },
        Some(output_path) => {
            result
                .save(&output_path, format)
                .with_context(|| format!("Failed to save {}", output_path.display()))?;
            if save_mask {
                let mask_path = mask_output_path(&output_path);
                result
                    .mask
                    .save_png(&mask_path)
                    .with_context(|| format!("Failed to save {}", mask_path.display()))?;
                info!("Mask saved to: {}", mask_path.display());
            }
            log_timings(&job.input, &result.timings);
            info!("Image saved to: {}", output_path.display());
        },
    }

    Ok(1)
}

async fn process_batch(
    pool: &WorkerPool,
    jobs: &[Job],
    output_dir: Option<&Path>,
    format: OutputFormat,
    save_mask: bool,
) -> Result<usize> {
    let file_count = jobs.len();

    let progress = ProgressBar::new(file_count as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let batch_start = Instant::now();

    // Keep every worker busy; each worker serializes its own requests, so
    // in-flight work never usefully exceeds the pool size
    let outcomes: Vec<bool> = stream::iter(jobs.iter())
        .map(|job| {
            let progress = progress.clone();
            let output_path = match output_dir {
                Some(dir) => dir.join(&job.rel_output),
                None => job.default_root.join(&job.rel_output),
            };
            async move {
                progress.set_message(job.input.display().to_string());
                let outcome = process_batch_item(pool, job, &output_path, format, save_mask).await;
                progress.inc(1);
                match outcome {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to process {}: {e:#}", job.input.display());
                        false
                    },
                }
            }
        })
        .buffer_unordered(pool.size())
        .collect::<Vec<_>>()
        .instrument(spans::batch_processing(file_count))
        .await;

    let processed = outcomes.iter().filter(|ok| **ok).count();
    let failed = file_count - processed;

    progress.finish_with_message(format!(
        "Completed! Processed: {processed}, Failed: {failed}"
    ));

    if failed > 0 {
        warn!("Some files failed to process. Processed: {processed}, Failed: {failed}");
    }

    let batch_total = batch_start.elapsed();
    info!("Batch processing summary:");
    info!("  ├─ Files processed: {processed}");
    info!("  ├─ Files failed: {failed}");
    info!("  ├─ Total time: {:.2}s", batch_total.as_secs_f64());
    info!(
        "  └─ Average per file: {:.2}s",
        if processed > 0 {
            batch_total.as_secs_f64() / processed as f64
        } else {
            0.0
        }
    );

    Ok(processed)
}

async fn process_batch_item(
    pool: &WorkerPool,
    job: &Job,
    output_path: &Path,
    format: OutputFormat,
    save_mask: bool,
) -> Result<()> {
    let mut result = pool
        .process_file(&job.input)
        .instrument(spans::file_processing(&job.input))
        .await?;

    result.save(output_path, format)?;
    if save_mask {
        result.mask.save_png(mask_output_path(output_path))?;
    }

    log::debug!(
        "Processed {} in {}ms (inference {}ms)",
        job.input.display(),
        result.timings.total_ms,
        result.timings.inference_ms
    );
    Ok(())
}

/// Process one image from stdin, defaulting the output to stdout.
async fn process_stdin(
    output_target: Option<&str>,
    pool: &WorkerPool,
    format: OutputFormat,
    save_mask: bool,
) -> Result<usize> {
    info!("Reading image from stdin");
    let image_data = read_stdin()?;

    let start = Instant::now();
    let mut result = pool
        .process_bytes(image_data)
        .await
        .context("Failed to remove background from stdin data")?;
    info!(
        "Processed stdin image in {:.2}s",
        start.elapsed().as_secs_f64()
    );

    match output_target {
        Some(target) if target != "-" => {
            let output_path = PathBuf::from(target);
            result
                .save(&output_path, format)
                .context("Failed to save result")?;
            if save_mask {
                let mask_path = mask_output_path(&output_path);
                result
                    .mask
                    .save_png(&mask_path)
                    .context("Failed to save mask")?;
                info!("Mask saved to: {}", mask_path.display());
            }
            info!("Image saved to: {}", output_path.display());
        },
        _ => {
            let data = result.to_bytes(format)?;
            write_stdout(&data)?;
            if save_mask {
                warn!("--save-mask is ignored when writing to stdout");
            }
            info!("Image written to stdout");
        },
    }

    Ok(1)
}

/// List cached models available for processing
fn list_cached_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("📦 Cached models ({})", cache.cache_dir().display());

    if models.is_empty() {
        println!("No cached models found.");
        println!("\n💡 To download the default model:");
        println!("  rmbg --only-download");
        return Ok(());
    }

    for model in models {
        let modified = model.modified.map_or_else(
            || "unknown".to_string(),
            |m| m.format("%Y-%m-%d %H:%M UTC").to_string(),
        );
        println!(
            "  • {} ({}, {})",
            model.model_id,
            format_size(model.size_bytes),
            modified
        );
    }

    println!("\n💡 To use a cached model:");
    println!("  rmbg --model MODEL_ID input.jpg");

    Ok(())
}

/// Clear cached models, limited to `--model` when given
fn clear_cached_models(cli: &Cli) -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;

    if let Some(model_arg) = &cli.model {
        let model_id = model_spec_from_arg(model_arg, &cache).name;
        if cache
            .clear_specific_model(&model_id)
            .with_context(|| format!("Failed to clear model '{model_id}'"))?
        {
            println!("✅ Removed cached model: {model_id}");
        } else {
            println!(
                "Model '{model_id}' not found in cache (use --list-models to see what is cached)"
            );
        }
    } else {
        let removed = cache.clear_all_models().context("Failed to clear cache")?;
        if removed.is_empty() {
            println!("Cache was already empty");
        } else {
            println!("✅ Removed {} cached model(s):", removed.len());
            for model_id in &removed {
                println!("  • {model_id}");
            }
        }
    }

    println!("Cache location: {}", cache.cache_dir().display());
    Ok(())
}

/// Show the current cache directory and where it came from
fn show_current_cache_dir() -> Result<()> {
    let cache = ModelCache::new().context("Failed to access cache directory")?;

    println!("📁 Cache directory: {}", cache.cache_dir().display());
    if std::env::var("RMBG_CACHE_DIR").is_ok() {
        println!("   Source: RMBG_CACHE_DIR environment variable");
    } else {
        println!("   Source: XDG cache directory specification");
    }

    println!("\n💡 To use a custom cache directory:");
    println!("   rmbg --cache-dir /path/to/cache");
    println!("   or set the RMBG_CACHE_DIR environment variable");

    Ok(())
}

/// Download a model into the cache without processing anything
async fn download_model_only(cli: &Cli) -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;

    let spec = match &cli.model {
        Some(arg) if arg.starts_with("http://") || arg.starts_with("https://") => {
            model_spec_from_arg(arg, &cache)
        },
        Some(arg) => {
            anyhow::bail!("--only-download expects a URL, got '{arg}'");
        },
        None => ModelSpec::default(),
    };

    println!("📦 Downloading model '{}'...", spec.name);

    let fetcher = ModelFetcher::with_cache(cache).skip_cache(cli.no_cache);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}%")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    let bar_handle = bar.clone();
    let on_progress = move |percent: u8| bar_handle.set_position(u64::from(percent));

    let path = fetcher
        .fetch(&spec, Some(&on_progress))
        .await
        .context("Failed to download model")?;
    bar.finish_and_clear();

    println!("✅ Model ready: {}", path.display());
    println!("\n💡 To use this model:");
    match &cli.model {
        Some(arg) => println!("   rmbg --model {arg} input.jpg"),
        None => println!("   rmbg input.jpg"),
    }

    Ok(())
}

/// Read image data from stdin
fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    Ok(buffer)
}

/// Write image data to stdout
fn write_stdout(data: &[u8]) -> Result<()> {
    io::stdout()
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    io::stdout().flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Find supported image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if ImageIOService::is_supported_format(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if ImageIOService::is_supported_format(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

/// Check if a file name matches the given glob pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}

fn output_file_name(input: &Path, extension: &str) -> String {
    format!(
        "{}_no_bg.{}",
        input.file_stem().unwrap_or_default().to_string_lossy(),
        extension
    )
}

/// Default output directory for a directory input: a `_no_bg` sibling.
fn sibling_no_bg_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map_or_else(|| "output".to_string(), |n| n.to_string_lossy().into_owned());
    dir.parent()
        .unwrap_or(Path::new(""))
        .join(format!("{name}_no_bg"))
}

/// Where the grayscale mask goes for a given output image path.
fn mask_output_path(output_path: &Path) -> PathBuf {
    output_path.with_extension("mask.png")
}

fn log_timings(input_path: &Path, timings: &ProcessingTimings) {
    info!("Processing breakdown for {}:", input_path.display());
    info!("  ├─ Image Decode: {}ms", timings.image_decode_ms);
    info!("  ├─ Preprocessing: {}ms", timings.preprocessing_ms);
    info!("  ├─ Inference: {}ms", timings.inference_ms);
    info!("  ├─ Mask Postprocessing: {}ms", timings.postprocessing_ms);
    info!("  ├─ Compositing: {}ms", timings.compositing_ms);
    if let Some(encode_ms) = timings.image_encode_ms {
        info!("  ├─ Image Encode: {encode_ms}ms");
    }
    info!(
        "  └─ Total: {}ms ({:.2}s)",
        timings.total_ms,
        timings.total_ms as f64 / 1000.0
    );
}
