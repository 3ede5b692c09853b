//! On-disk cache for downloaded model files
//!
//! Remote model acquisitions land in an XDG-compliant cache directory so a
//! model is only downloaded once per machine. Each cached model is a single
//! ONNX file named after its model ID.

use crate::error::{Result, RmbgError};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Information about a cached model file
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (the file stem)
    pub model_id: String,
    /// Path to the cached model file
    pub path: PathBuf,
    /// Size of the model file in bytes
    pub size_bytes: u64,
    /// Last modification time, when the filesystem reports one
    pub modified: Option<DateTime<Utc>>,
}

/// Handle to the models directory inside the per-user cache.
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the default per-user model cache, creating it if needed.
    ///
    /// Respects `RMBG_CACHE_DIR` when set; otherwise resolves to the
    /// platform cache root:
    /// - Linux/macOS: `~/.cache/rmbg/models/`
    /// - Windows: `%LOCALAPPDATA%/rmbg/models/`
    ///
    /// # Errors
    /// - No cache root could be determined
    /// - The directory could not be created
    pub fn new() -> Result<Self> {
        let cache_dir = Self::resolve_cache_dir()?;
        fs::create_dir_all(&cache_dir)
            .map_err(|e| RmbgError::file_io_error("create cache directory", &cache_dir, &e))?;
        Ok(Self { cache_dir })
    }

    /// Open a cache rooted at a custom directory, for tests and sandboxes.
    ///
    /// # Errors
    /// - The directory could not be created
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let dir = cache_dir.join("models");
        fs::create_dir_all(&dir)
            .map_err(|e| RmbgError::file_io_error("create custom cache directory", &dir, &e))?;
        Ok(Self { cache_dir: dir })
    }

    /// Env override first, then the platform cache root.
    fn resolve_cache_dir() -> Result<PathBuf> {
        if let Ok(override_dir) = std::env::var("RMBG_CACHE_DIR") {
            return Ok(PathBuf::from(override_dir).join("models"));
        }

        let base = dirs::cache_dir().ok_or_else(|| {
            RmbgError::invalid_config(
                "cache directory could not be determined; set RMBG_CACHE_DIR",
            )
        })?;
        Ok(base.join("rmbg").join("models"))
    }

    /// Path where a model with the given ID is (or would be) cached
    #[must_use]
    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{model_id}.onnx"))
    }

    /// Whether a non-empty cached file exists for the given model ID
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        let path = self.model_path(model_id);
        fs::metadata(&path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
    }

    /// Scan the cache directory and return all cached models, sorted by ID
    ///
    /// # Errors
    /// - Failed to read cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| RmbgError::file_io_error("read cache directory", &self.cache_dir, &e))?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                RmbgError::file_io_error("read cache directory entry", &self.cache_dir, &e)
            })?;
            let path = entry.path();

            let is_onnx = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
            if !path.is_file() || !is_onnx {
                continue;
            }

            let Some(model_id) = path.file_stem().and_then(|s| s.to_str()) else {
                log::debug!("Skipping cache entry with non-UTF8 name: {}", path.display());
                continue;
            };

            let metadata = entry
                .metadata()
                .map_err(|e| RmbgError::file_io_error("read cache entry metadata", &path, &e))?;

            models.push(CachedModelInfo {
                model_id: model_id.to_string(),
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                path,
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove all cached models, returning the removed IDs
    ///
    /// # Errors
    /// - Failed to access or remove cache entries
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        for info in self.scan_cached_models()? {
            log::info!("Removing cached model: {}", info.model_id);
            fs::remove_file(&info.path)
                .map_err(|e| RmbgError::file_io_error("remove cached model", &info.path, &e))?;
            removed.push(info.model_id);
        }

        Ok(removed)
    }

    /// Remove a specific cached model
    ///
    /// # Returns
    /// `true` if the model was found and removed, `false` if it was not cached
    ///
    /// # Errors
    /// - Failed to remove the model file
    pub fn clear_specific_model(&self, model_id: &str) -> Result<bool> {
        let path = self.model_path(model_id);

        if !path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {model_id}");
        fs::remove_file(&path)
            .map_err(|e| RmbgError::file_io_error("remove cached model", &path, &e))?;

        Ok(true)
    }

    /// Current cache directory path
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Format a byte count for humans, 1024-based.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return if unit == "B" {
                format!("{bytes} {unit}")
            } else {
                format!("{value:.1} {unit}")
            };
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}
