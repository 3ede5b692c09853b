//! Inference backend abstraction
//!
//! A backend wraps one loaded model session. Model acquisition happens
//! before a backend ever sees the model: backends receive a resolved local
//! file path inside [`SessionOptions`] and only build and run the session.

use crate::config::RemovalConfig;
use crate::error::Result;
use crate::models::ModelSpec;
use ndarray::Array4;
use std::path::PathBuf;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Everything a backend needs to build a session: the resolved model file
/// plus the tensor contract and execution knobs.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Local path to the model file (already acquired)
    pub model_path: PathBuf,

    /// Declared input tensor name
    pub input_name: String,

    /// Declared output tensor name
    pub output_name: String,

    /// Square side length of the input tensor
    pub input_size: u32,

    /// Intra-op thread count (0 = runtime default)
    pub intra_threads: usize,

    /// Whether to apply graph-level optimization when building the session
    pub graph_optimization: bool,
}

impl SessionOptions {
    /// Options for a resolved model path with a spec's tensor contract and
    /// default execution knobs.
    #[must_use]
    pub fn new(model_path: PathBuf, spec: &ModelSpec) -> Self {
        Self {
            model_path,
            input_name: spec.input_name.clone(),
            output_name: spec.output_name.clone(),
            input_size: spec.input_size,
            intra_threads: 2,
            graph_optimization: true,
        }
    }

    /// Options combining a resolved model path with a removal configuration.
    #[must_use]
    pub fn from_config(model_path: PathBuf, config: &RemovalConfig) -> Self {
        Self {
            intra_threads: config.intra_threads,
            graph_optimization: config.graph_optimization,
            ..Self::new(model_path, &config.model_spec)
        }
    }

    /// Expected input tensor shape in NCHW order.
    #[must_use]
    pub fn input_shape(&self) -> [usize; 4] {
        [1, 3, self.input_size as usize, self.input_size as usize]
    }
}

/// Trait for inference backends.
///
/// Backends are `Send` so a session can be built and driven from a dedicated
/// worker thread; they are never shared between threads.
pub trait InferenceBackend: Send {
    /// Build the model session from the resolved model file.
    ///
    /// Returns the session build time, or `None` when the backend was
    /// already initialized (initialization is idempotent).
    ///
    /// # Errors
    /// - Model file unreadable or not a valid model
    /// - Session construction failures
    fn initialize(&mut self, options: &SessionOptions) -> Result<Option<Duration>>;

    /// Run one forward pass.
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Input shape does not match the session's declared input
    /// - Runtime inference failures
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Expected input tensor shape in NCHW order
    fn input_shape(&self) -> [usize; 4];

    /// Whether a session has been built
    fn is_initialized(&self) -> bool;
}

/// Which inference runtime to execute the model with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Pure Rust inference via tract (portable, no native dependencies)
    #[default]
    Tract,
    /// ONNX Runtime via ort (faster, needs the native runtime)
    Onnx,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = crate::error::RmbgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tract" => Ok(Self::Tract),
            "onnx" => Ok(Self::Onnx),
            other => Err(crate::error::RmbgError::invalid_config(format!(
                "Unknown backend '{other}' (expected 'tract' or 'onnx')"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_options_carry_spec_contract() {
        let spec = ModelSpec::rmbg14();
        let options = SessionOptions::new(PathBuf::from("/tmp/model.onnx"), &spec);

        assert_eq!(options.input_name, "input");
        assert_eq!(options.output_name, "output");
        assert_eq!(options.input_shape(), [1, 3, 1024, 1024]);
        assert_eq!(options.intra_threads, 2);
        assert!(options.graph_optimization);
    }

    #[test]
    fn test_session_options_from_config() {
        let config = RemovalConfig::builder()
            .intra_threads(4)
            .graph_optimization(false)
            .build()
            .unwrap();
        let options = SessionOptions::from_config(PathBuf::from("/tmp/model.onnx"), &config);

        assert_eq!(options.intra_threads, 4);
        assert!(!options.graph_optimization);
        assert_eq!(options.input_size, 1024);
    }

    #[test]
    fn test_backend_kind_round_trip() {
        assert_eq!("tract".parse::<BackendKind>().unwrap(), BackendKind::Tract);
        assert_eq!("ONNX".parse::<BackendKind>().unwrap(), BackendKind::Onnx);
        assert!("cuda".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Tract.to_string(), "tract");
        assert_eq!(BackendKind::default(), BackendKind::Tract);
    }
}
