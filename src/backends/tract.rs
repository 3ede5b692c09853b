//! Tract backend: pure Rust inference
//!
//! Runs the segmentation model through tract, so the whole pipeline works
//! without any native runtime on the machine. CPU only, which is exactly
//! the environment this model was tuned for.

use crate::error::{Result, RmbgError};
use crate::inference::{InferenceBackend, SessionOptions};
use ndarray::Array4;
use tract_onnx::prelude::*;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Type alias for the runnable Tract model type
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Pure Rust inference backend built on tract.
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    input_shape: [usize; 4],
}

impl TractBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            input_shape: [1, 3, 1024, 1024],
        }
    }

    fn build_session(&mut self, options: &SessionOptions) -> Result<Duration> {
        let build_start = Instant::now();
        let shape = options.input_shape();
        let side = options.input_size as usize;

        log::info!(
            "Building tract session from {} (input {}x{})",
            options.model_path.display(),
            options.input_size,
            options.input_size
        );

        let model_data = std::fs::read(&options.model_path).map_err(|e| {
            RmbgError::file_io_error("read model file", &options.model_path, &e)
        })?;

        let mut inference_model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| {
                RmbgError::execution_context(format!("Failed to parse ONNX model: {e}"))
            })?;

        // Pin the declared input geometry so tract can fully type the graph
        inference_model
            .set_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .map_err(|e| {
                RmbgError::execution_context(format!("Failed to declare input shape: {e}"))
            })?;

        let model = if options.graph_optimization {
            inference_model
                .into_optimized()
                .map_err(|e| {
                    RmbgError::execution_context(format!("Failed to optimize model graph: {e}"))
                })?
                .into_runnable()
        } else {
            inference_model
                .into_typed()
                .map_err(|e| {
                    RmbgError::execution_context(format!("Failed to type model graph: {e}"))
                })?
                .into_runnable()
        }
        .map_err(|e| {
            RmbgError::execution_context(format!("Failed to build runnable model: {e}"))
        })?;

        self.model = Some(model);
        self.input_shape = shape;

        let build_time = build_start.elapsed();
        log::info!(
            "Tract session ready in {:.2}ms (graph optimization: {})",
            build_time.as_millis(),
            options.graph_optimization
        );
        Ok(build_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, options: &SessionOptions) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }
        Ok(Some(self.build_session(options)?))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| RmbgError::inference("Tract session not initialized"))?;

        if input.shape() != self.input_shape {
            return Err(RmbgError::inference(format!(
                "Input tensor shape {:?} does not match session input {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| RmbgError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| RmbgError::inference("Model produced no output tensor"))?
            .into_arc_tensor();

        let output = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| RmbgError::inference(format!("Failed to read output tensor: {e}")))?
            .to_owned()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| {
                RmbgError::inference(format!("Expected a 4D output tensor: {e}"))
            })?;

        log::debug!(
            "Tract inference completed in {:.2}ms (output {:?})",
            inference_start.elapsed().as_millis(),
            output.shape()
        );

        Ok(output)
    }

    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_backend_starts_uninitialized() {
        let backend = TractBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.input_shape(), [1, 3, 1024, 1024]);
    }

    #[test]
    fn test_infer_without_session_fails() {
        let mut backend = TractBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 8, 8));
        let err = backend.infer(&input).unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[test]
    fn test_initialize_with_missing_file_fails() {
        let mut backend = TractBackend::new();
        let options = SessionOptions::new(
            PathBuf::from("/nonexistent/model.onnx"),
            &crate::models::ModelSpec::rmbg14(),
        );
        assert!(backend.initialize(&options).is_err());
        assert!(!backend.is_initialized());
    }
}
