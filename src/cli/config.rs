//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliOutputFormat};
use crate::{
    cache::ModelCache,
    config::{OutputFormat, RemovalConfig},
    inference::BackendKind,
    models::{ModelSource, ModelSpec},
};
use anyhow::{Context, Result};
use std::path::Path;

/// Convert CLI arguments to a unified `RemovalConfig` plus backend choice
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated configuration from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<(RemovalConfig, BackendKind)> {
        let backend = cli
            .backend
            .parse::<BackendKind>()
            .context("Invalid --backend value")?;

        let model_spec = match &cli.model {
            Some(arg) => {
                let cache = ModelCache::new().context("Failed to access the model cache")?;
                model_spec_from_arg(arg, &cache)
            },
            None => ModelSpec::default(),
        };

        let output_format = match cli.format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Webp => OutputFormat::WebP,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
            CliOutputFormat::Rgba8 => OutputFormat::Rgba8,
        };

        let config = RemovalConfig::builder()
            .model_spec(model_spec)
            .output_format(output_format)
            .intra_threads(cli.threads)
            .workers(cli.workers)
            .disable_cache(cli.no_cache)
            .debug(cli.verbose >= 2)
            .build()
            .context("Invalid configuration")?;

        Ok((config, backend))
    }

    /// Validate CLI arguments for consistency before any work starts
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        cli.backend
            .parse::<BackendKind>()
            .context("Invalid --backend value")?;

        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid --pattern value '{pattern}'"))?;
        }

        if cli.workers > 64 {
            anyhow::bail!("--workers must be between 0 and 64");
        }

        Ok(())
    }
}

/// Interpret a `--model` argument as a model specification.
///
/// URLs become single-source download specs, anything that looks like a
/// filesystem path is used directly, and a bare identifier refers to a model
/// previously downloaded into `cache`. The RMBG-1.4 tensor contract is kept
/// in all cases since the pipeline only supports that model family.
pub(crate) fn model_spec_from_arg(arg: &str, cache: &ModelCache) -> ModelSpec {
    let stem = Path::new(arg)
        .file_stem()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_string);

    if arg.starts_with("http://") || arg.starts_with("https://") {
        return ModelSpec {
            name: stem.unwrap_or_else(|| "custom-model".to_string()),
            sources: vec![ModelSource::Url(arg.to_string())],
            ..ModelSpec::rmbg14()
        };
    }

    let path = Path::new(arg);
    let looks_like_path = path.extension().is_some()
        || arg.contains('/')
        || arg.contains(std::path::MAIN_SEPARATOR);
    if looks_like_path {
        let mut spec = ModelSpec::from_path(path);
        if let Some(name) = stem {
            spec.name = name;
        }
        return spec;
    }

    // Bare identifier: a model already in the cache
    ModelSpec {
        name: arg.to_string(),
        sources: vec![ModelSource::Path(cache.model_path(arg))],
        ..ModelSpec::rmbg14()
    }
}
