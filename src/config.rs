//! Pipeline configuration and output format selection

use crate::models::ModelSpec;
use serde::{Deserialize, Serialize};

/// Output image format options.
///
/// Every variant is lossless and carries an alpha channel, since the final
/// artifact must preserve the computed transparency exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// PNG, the universal default
    Png,
    /// Lossless WebP
    WebP,
    /// TIFF with deflate compression
    Tiff,
    /// Raw RGBA bytes, no container
    Rgba8,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::WebP => write!(f, "webp"),
            Self::Tiff => write!(f, "tiff"),
            Self::Rgba8 => write!(f, "rgba8"),
        }
    }
}

/// Settings for one removal pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Encoding for saved or serialized results
    pub output_format: OutputFormat,

    /// Number of intra-op threads for inference (0 = auto).
    ///
    /// The default of 2 matches the fixed thread count the model's
    /// execution context was tuned for.
    pub intra_threads: usize,

    /// Enable graph-level optimization when building the session
    pub graph_optimization: bool,

    /// Log extra diagnostics and keep intermediate artifacts
    pub debug: bool,

    /// Skip the on-disk model cache when acquiring remote artifacts
    pub disable_cache: bool,

    /// Number of isolated execution units to spawn for processing
    /// (0 = one per available hardware thread).
    ///
    /// Each unit loads its own model session; sessions are never shared.
    pub workers: usize,

    /// Model specification: ordered acquisition sources plus tensor
    /// geometry and normalization constants
    pub model_spec: ModelSpec,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            intra_threads: 2,
            graph_optimization: true,
            debug: false,
            disable_cache: false,
            workers: 1,
            model_spec: ModelSpec::default(),
        }
    }
}

impl RemovalConfig {
    /// Start building a configuration.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rmbg::{OutputFormat, RemovalConfig};
    ///
    /// # fn main() -> rmbg::Result<()> {
    /// let config = RemovalConfig::builder()
    ///     .workers(2)
    ///     .output_format(OutputFormat::WebP)
    ///     .build()?;
    /// assert_eq!(config.effective_workers(), 2);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Resolved worker count: explicit value, or one per hardware thread.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        } else {
            self.workers
        }
    }

    /// Check every parameter against its supported range.
    ///
    /// # Errors
    /// - Worker count above the supported maximum (64)
    /// - Model specification with an empty source list
    pub fn validate(&self) -> crate::Result<()> {
        const MAX_WORKERS: usize = 64;

        if self.workers > MAX_WORKERS {
            return Err(crate::error::RmbgError::config_value_error(
                "worker count",
                self.workers,
                "0-64",
                Some(1),
            ));
        }

        self.model_spec.validate()?;

        Ok(())
    }
}

/// Fluent builder returned by [`RemovalConfig::builder`].
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Encoding for saved or serialized results
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Intra-op inference threads (0 = auto)
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Enable or disable graph-level optimization
    #[must_use]
    pub fn graph_optimization(mut self, enabled: bool) -> Self {
        self.config.graph_optimization = enabled;
        self
    }

    /// Toggle debug diagnostics
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Skip the on-disk model cache
    #[must_use]
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.config.disable_cache = disable;
        self
    }

    /// Number of execution units (0 = one per hardware thread)
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Model to run, with its acquisition sources and tensor contract
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    /// Finish, validating the assembled configuration.
    ///
    /// # Errors
    /// Returns [`crate::error::RmbgError::InvalidConfig`] when a parameter
    /// is out of range (see [`RemovalConfig::validate`]).
    pub fn build(self) -> crate::Result<RemovalConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_rmbg14_tuning() {
        let defaults = RemovalConfig::default();
        assert_eq!(defaults.output_format, OutputFormat::Png);
        assert_eq!(defaults.intra_threads, 2);
        assert_eq!(defaults.workers, 1);
        assert!(defaults.graph_optimization);
        assert!(!defaults.debug);
        assert!(!defaults.disable_cache);
    }

    #[test]
    fn test_builder_overrides_every_field() {
        let config = RemovalConfig::builder()
            .output_format(OutputFormat::Tiff)
            .intra_threads(6)
            .graph_optimization(false)
            .debug(true)
            .disable_cache(true)
            .workers(3)
            .build()
            .unwrap();

        assert_eq!(config.output_format, OutputFormat::Tiff);
        assert_eq!(config.intra_threads, 6);
        assert_eq!(config.workers, 3);
        assert!(!config.graph_optimization);
        assert!(config.debug);
        assert!(config.disable_cache);
    }

    #[test]
    fn test_worker_count_validation() {
        assert!(RemovalConfig::builder().workers(64).build().is_ok());
        let result = RemovalConfig::builder().workers(65).build();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("worker count"));
    }

    #[test]
    fn test_effective_workers_auto_detect() {
        let config = RemovalConfig::builder().workers(0).build().unwrap();
        assert!(config.effective_workers() >= 1);

        let config = RemovalConfig::builder().workers(3).build().unwrap();
        assert_eq!(config.effective_workers(), 3);
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Png.to_string(), "png");
        assert_eq!(OutputFormat::WebP.to_string(), "webp");
        assert_eq!(OutputFormat::Tiff.to_string(), "tiff");
        assert_eq!(OutputFormat::Rgba8.to_string(), "rgba8");
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = RemovalConfig::builder().workers(2).build().unwrap();
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: RemovalConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, config);
    }
}
