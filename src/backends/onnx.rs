//! ONNX Runtime backend
//!
//! Executes the model through ort. CPU execution only; the tensors are
//! addressed by the names declared in the model specification rather than
//! by position, so a model with extra inputs or reordered outputs fails
//! loudly instead of silently producing garbage.

use crate::error::{Result, RmbgError};
use crate::inference::{InferenceBackend, SessionOptions};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// ONNX Runtime inference backend.
pub struct OnnxBackend {
    session: Option<Session>,
    input_name: String,
    output_name: String,
    input_shape: [usize; 4],
}

impl std::fmt::Debug for OnnxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackend")
            .field("initialized", &self.session.is_some())
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("input_shape", &self.input_shape)
            .finish()
    }
}

impl OnnxBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            input_shape: [1, 3, 1024, 1024],
        }
    }

    fn build_session(&mut self, options: &SessionOptions) -> Result<Duration> {
        let build_start = Instant::now();

        log::info!(
            "Building ONNX Runtime session from {} (threads: {}, graph optimization: {})",
            options.model_path.display(),
            options.intra_threads,
            options.graph_optimization
        );

        let optimization_level = if options.graph_optimization {
            GraphOptimizationLevel::Level3
        } else {
            GraphOptimizationLevel::Disable
        };

        let mut builder = Session::builder()
            .map_err(|e| {
                RmbgError::execution_context(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(optimization_level)
            .map_err(|e| {
                RmbgError::execution_context(format!("Failed to set optimization level: {e}"))
            })?;

        if options.intra_threads > 0 {
            builder = builder.with_intra_threads(options.intra_threads).map_err(|e| {
                RmbgError::execution_context(format!("Failed to set thread count: {e}"))
            })?;
        }

        let session = builder.commit_from_file(&options.model_path).map_err(|e| {
            RmbgError::execution_context(format!(
                "Failed to load model from {}: {e}",
                options.model_path.display()
            ))
        })?;

        self.session = Some(session);
        self.input_name = options.input_name.clone();
        self.output_name = options.output_name.clone();
        self.input_shape = options.input_shape();

        let build_time = build_start.elapsed();
        log::info!(
            "ONNX Runtime session ready in {:.2}ms",
            build_time.as_millis()
        );
        Ok(build_time)
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, options: &SessionOptions) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        Ok(Some(self.build_session(options)?))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let expected_shape = self.input_shape;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| RmbgError::inference("ONNX session not initialized"))?;

        if input.shape() != expected_shape {
            return Err(RmbgError::inference(format!(
                "Input tensor shape {:?} does not match session input {expected_shape:?}",
                input.shape()
            )));
        }

        let inference_start = Instant::now();

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            RmbgError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| RmbgError::inference(format!("ONNX inference failed: {e}")))?;

        let output_view = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                RmbgError::inference(format!(
                    "Model produced no output named '{}'",
                    self.output_name
                ))
            })?
            .try_extract_array::<f32>()
            .map_err(|e| RmbgError::inference(format!("Failed to extract output tensor: {e}")))?;

        let output = output_view
            .to_owned()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| RmbgError::inference(format!("Expected a 4D output tensor: {e}")))?;

        log::debug!(
            "ONNX inference completed in {:.2}ms (output {:?})",
            inference_start.elapsed().as_millis(),
            output.shape()
        );

        Ok(output)
    }

    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}
