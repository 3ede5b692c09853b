//! Model acquisition with ordered source fallback
//!
//! A [`ModelFetcher`] resolves a [`ModelSpec`](crate::models::ModelSpec) to a
//! usable local file by trying each source in order: local paths are used in
//! place, remote URLs are downloaded once and served from the on-disk cache
//! afterwards. Downloads stream to a `.part` file and are renamed into the
//! cache only when complete, so an interrupted transfer never poisons it.

use crate::cache::ModelCache;
use crate::error::{Result, RmbgError};
use crate::models::{ModelSource, ModelSpec};
use futures_util::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Callback invoked with coarse acquisition progress percentages (0-100).
pub type LoadProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Progress emitted when acquisition begins.
const PROGRESS_STARTED: u8 = 10;

/// Resolves model specifications to local files, downloading when needed.
#[derive(Debug)]
pub struct ModelFetcher {
    client: Client,
    cache: ModelCache,
    skip_cache: bool,
}

impl ModelFetcher {
    /// Create a fetcher backed by the default cache location.
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| RmbgError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            cache: ModelCache::new()?,
            skip_cache: false,
        })
    }

    /// Create a fetcher backed by a specific cache.
    #[must_use]
    pub fn with_cache(cache: ModelCache) -> Self {
        let client = Client::new();
        Self {
            client,
            cache,
            skip_cache: false,
        }
    }

    /// Force remote sources to be re-downloaded even when cached.
    ///
    /// Fresh downloads still land in the cache afterwards.
    #[must_use]
    pub fn skip_cache(mut self, skip: bool) -> Self {
        self.skip_cache = skip;
        self
    }

    /// The cache this fetcher reads from and writes to.
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Resolve a model spec to a local file, trying sources in order.
    ///
    /// Reports coarse progress through `progress`: 10 when acquisition
    /// starts, then an increasing value in the 20-40 band as each source
    /// attempt begins. The caller owns the final 100 once its session is
    /// actually usable.
    ///
    /// # Errors
    /// Returns [`RmbgError::ModelAcquisition`] when every source fails;
    /// the message lists each source with its failure reason.
    pub async fn fetch(
        &self,
        spec: &ModelSpec,
        progress: Option<LoadProgressFn<'_>>,
    ) -> Result<PathBuf> {
        spec.validate()?;
        report(progress, PROGRESS_STARTED);

        let total = spec.sources.len();
        let mut failures: Vec<String> = Vec::new();

        for (index, source) in spec.sources.iter().enumerate() {
            report(progress, source_milestone(index, total));
            log::info!(
                "Trying model source {}/{}: {}",
                index + 1,
                total,
                source.display_name()
            );

            match self.try_source(source, &spec.name).await {
                Ok(path) => {
                    log::info!("Model resolved via {}: {}", source.display_name(), path.display());
                    return Ok(path);
                },
                Err(e) => {
                    log::warn!("Model source {} failed: {e}", source.display_name());
                    failures.push(format!("{}: {e}", source.display_name()));
                },
            }
        }

        Err(RmbgError::acquisition(format!(
            "all {total} model sources failed: [{}]",
            failures.join("; ")
        )))
    }

    /// Attempt a single source, returning the usable local path.
    async fn try_source(&self, source: &ModelSource, model_id: &str) -> Result<PathBuf> {
        match source {
            ModelSource::Path(path) => resolve_local_file(path),
            ModelSource::Url(url) => {
                if !self.skip_cache && self.cache.is_model_cached(model_id) {
                    let cached = self.cache.model_path(model_id);
                    log::debug!("Cache hit for {model_id}: {}", cached.display());
                    return Ok(cached);
                }
                self.download_to_cache(url, model_id).await
            },
        }
    }

    /// Download a model file into the cache, atomically.
    async fn download_to_cache(&self, url: &str, model_id: &str) -> Result<PathBuf> {
        static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

        let final_path = self.cache.model_path(model_id);
        // Same directory as the final path so the rename stays on one
        // filesystem; unique suffix so concurrent workers never share a
        // partial file
        let part_path = final_path.with_extension(format!(
            "onnx.part-{}-{}",
            std::process::id(),
            PART_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let result = self.stream_to_file(url, &part_path).await;

        match result {
            Ok((bytes, digest)) => {
                fs::rename(&part_path, &final_path).map_err(|e| {
                    RmbgError::file_io_error("move downloaded model into cache", &final_path, &e)
                })?;
                log::info!(
                    "Downloaded {model_id} ({}, sha256:{digest})",
                    crate::cache::format_size(bytes)
                );
                Ok(final_path)
            },
            Err(e) => {
                if part_path.exists() {
                    if let Err(cleanup_err) = fs::remove_file(&part_path) {
                        log::warn!("Failed to clean up partial download: {cleanup_err}");
                    }
                }
                Err(e)
            },
        }
    }

    /// Stream an HTTP response body to a file, hashing as it goes.
    async fn stream_to_file(&self, url: &str, dest: &Path) -> Result<(u64, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RmbgError::network(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RmbgError::network(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let expected_len = response.content_length();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| RmbgError::file_io_error("create download file", dest, &e))?;

        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| RmbgError::network(format!("download stream from {url} failed: {e}")))?
        {
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| RmbgError::file_io_error("write download chunk", dest, &e))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| RmbgError::file_io_error("flush download file", dest, &e))?;

        if let Some(expected) = expected_len {
            if expected != downloaded {
                return Err(RmbgError::network(format!(
                    "truncated download from {url}: got {downloaded} of {expected} bytes"
                )));
            }
        }

        Ok((downloaded, format!("{:x}", hasher.finalize())))
    }
}

/// Validate that a local source path points at a usable model file.
fn resolve_local_file(path: &Path) -> Result<PathBuf> {
    let metadata = fs::metadata(path)
        .map_err(|e| RmbgError::file_io_error("read model file metadata", path, &e))?;

    if !metadata.is_file() {
        return Err(RmbgError::acquisition(format!(
            "model path is not a file: {}",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(RmbgError::acquisition(format!(
            "model file is empty: {}",
            path.display()
        )));
    }

    Ok(path.to_path_buf())
}

/// Progress value for the start of source attempt `index` out of `total`.
///
/// Spreads attempts across the 20-40 band so each fallback is visible.
fn source_milestone(index: usize, total: usize) -> u8 {
    let fraction = index as f32 / total.max(1) as f32;
    20u8.saturating_add((fraction * 20.0).round() as u8)
}

fn report(progress: Option<LoadProgressFn<'_>>, percent: u8) {
    if let Some(callback) = progress {
        callback(percent);
    }
}
