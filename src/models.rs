//! Model specifications: where to fetch a model from and how to feed it.
//!
//! A [`ModelSpec`] bundles an ordered list of acquisition sources with the
//! tensor geometry and normalization constants the network was trained with.
//! Sources are tried in order until one yields a usable model file, so a spec
//! can prefer a local path and fall back to mirrors.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default model identifier used for cache directory naming.
pub const RMBG_14_MODEL_ID: &str = "rmbg-1.4";

/// Side length of the square input tensor expected by RMBG-1.4.
pub const RMBG_14_INPUT_SIZE: u32 = 1024;

/// A single place a model file can be acquired from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Model file on the local filesystem
    Path(PathBuf),
    /// Model downloadable over HTTP(S)
    Url(String),
}

impl ModelSource {
    /// Short form for tracing and progress messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => format!(
                "local:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
            Self::Url(url) => {
                // Keep the host so logs show which mirror was used
                let host = url
                    .strip_prefix("https://")
                    .or_else(|| url.strip_prefix("http://"))
                    .and_then(|rest| rest.split('/').next())
                    .unwrap_or(url.as_str());
                format!("remote:{host}")
            },
        }
    }

    /// Whether acquiring from this source needs network access.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Per-channel normalization applied after scaling pixels to `[0, 1]`.
///
/// Each channel value becomes `(v - mean) / std`. RMBG-1.4 uses mean 0.5
/// and std 0.5 on all channels, mapping pixels into `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

/// Complete model specification: acquisition sources plus tensor contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Identifier used for cache directory naming and logs
    pub name: String,

    /// Acquisition sources, tried in order until one succeeds
    pub sources: Vec<ModelSource>,

    /// Square side length of the model's input tensor
    pub input_size: u32,

    /// Normalization constants the model was trained with
    pub normalization: NormalizationConfig,

    /// Declared input tensor name
    pub input_name: String,

    /// Declared output tensor name
    pub output_name: String,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::rmbg14()
    }
}

impl ModelSpec {
    /// Specification for BRIA RMBG-1.4 with the standard source chain:
    /// a local file next to the executable, then two public mirrors.
    #[must_use]
    pub fn rmbg14() -> Self {
        Self {
            name: RMBG_14_MODEL_ID.to_string(),
            sources: vec![
                ModelSource::Path(PathBuf::from("models/rmbg-1.4.onnx")),
                ModelSource::Url(
                    "https://cdn.jsdelivr.net/gh/levindong/AI_Background_Remover@v1.0.0-model/public/models/rmbg-1.4.onnx"
                        .to_string(),
                ),
                ModelSource::Url(
                    "https://github.com/levindong/AI_Background_Remover/releases/download/v1.0.0-model/rmbg-1.4.onnx"
                        .to_string(),
                ),
            ],
            input_size: RMBG_14_INPUT_SIZE,
            normalization: NormalizationConfig::default(),
            input_name: "input".to_string(),
            output_name: "output".to_string(),
        }
    }

    /// Specification for a model file already on disk, keeping the
    /// RMBG-1.4 tensor contract.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            sources: vec![ModelSource::Path(path.into())],
            ..Self::rmbg14()
        }
    }

    /// Input tensor shape in NCHW order.
    #[must_use]
    pub fn input_shape(&self) -> [usize; 4] {
        [1, 3, self.input_size as usize, self.input_size as usize]
    }

    /// Validate the specification.
    ///
    /// # Errors
    /// - Empty source list (nothing to acquire from)
    /// - Zero input size
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(crate::error::RmbgError::invalid_config(
                "model specification has no acquisition sources",
            ));
        }
        if self.input_size == 0 {
            return Err(crate::error::RmbgError::invalid_config(
                "model input size must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmbg14_source_order() {
        let spec = ModelSpec::rmbg14();
        assert_eq!(spec.sources.len(), 3);
        assert!(!spec.sources[0].is_remote());
        assert!(spec.sources[1].is_remote());
        assert!(spec.sources[2].is_remote());
        assert!(matches!(
            &spec.sources[0],
            ModelSource::Path(p) if p.ends_with("rmbg-1.4.onnx")
        ));
    }

    #[test]
    fn test_rmbg14_tensor_contract() {
        let spec = ModelSpec::rmbg14();
        assert_eq!(spec.input_shape(), [1, 3, 1024, 1024]);
        assert_eq!(spec.normalization.mean, [0.5, 0.5, 0.5]);
        assert_eq!(spec.normalization.std, [0.5, 0.5, 0.5]);
        assert_eq!(spec.input_name, "input");
        assert_eq!(spec.output_name, "output");
    }

    #[test]
    fn test_display_name_shortens_urls() {
        let source = ModelSource::Url("https://cdn.jsdelivr.net/gh/foo/bar.onnx".to_string());
        assert_eq!(source.display_name(), "remote:cdn.jsdelivr.net");

        let source = ModelSource::Path(PathBuf::from("models/rmbg-1.4.onnx"));
        assert_eq!(source.display_name(), "local:rmbg-1.4.onnx");
    }

    #[test]
    fn test_empty_sources_rejected() {
        let spec = ModelSpec {
            sources: Vec::new(),
            ..ModelSpec::rmbg14()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_from_path_keeps_contract() {
        let spec = ModelSpec::from_path("/tmp/custom.onnx");
        assert_eq!(spec.sources.len(), 1);
        assert_eq!(spec.input_size, RMBG_14_INPUT_SIZE);
    }
}
