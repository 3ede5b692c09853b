//! Mock inference backend for exercising the pipeline without a model file.
//!
//! The mock mirrors the real backends' contract: `initialize` must come
//! before `infer`, initialization is idempotent, and every call is recorded
//! so tests can assert on ordering and counts.

use crate::error::{Result, RmbgError};
use crate::inference::{BackendKind, InferenceBackend, SessionOptions};
use crate::processor::BackendFactory;
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// What the mock model "predicts" for any input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockResponse {
    /// Every output value identical (exercises the opaque-mask fallback)
    Flat(f32),
    /// Horizontal ramp from 0 to 1 across the output width
    Ramp,
    /// High-confidence center square on a low-confidence border
    CenterSquare,
}

/// Configurable mock backend with recorded call history.
#[derive(Debug)]
pub struct MockBackend {
    initialized: bool,
    response: MockResponse,
    fail_initialize: bool,
    fail_infer: bool,
    infer_delay: Option<Duration>,
    input_shape: [usize; 4],
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            response: MockResponse::Ramp,
            fail_initialize: false,
            fail_infer: false,
            infer_delay: None,
            input_shape: [1, 3, 1024, 1024],
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_response(mut self, response: MockResponse) -> Self {
        self.response = response;
        self
    }

    #[must_use]
    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    #[must_use]
    pub fn failing_infer(mut self) -> Self {
        self.fail_infer = true;
        self
    }

    /// Sleep this long inside every `infer` call, to make queueing visible.
    #[must_use]
    pub fn with_infer_delay(mut self, delay: Duration) -> Self {
        self.infer_delay = Some(delay);
        self
    }

    /// Share a call history with another mock (or a test assertion site).
    #[must_use]
    pub fn with_shared_history(mut self, history: Arc<Mutex<Vec<String>>>) -> Self {
        self.call_history = history;
        self
    }

    /// Recorded calls, in order.
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Number of `initialize` calls that actually built a session.
    #[must_use]
    pub fn builds(&self) -> usize {
        self.call_history()
            .iter()
            .filter(|c| c.as_str() == "initialize")
            .count()
    }

    fn record(&self, call: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call.to_string());
        }
    }

    fn synthesize_output(&self, height: usize, width: usize) -> Array4<f32> {
        match self.response {
            MockResponse::Flat(value) => Array4::from_elem((1, 1, height, width), value),
            MockResponse::Ramp => Array4::from_shape_fn((1, 1, height, width), |(_, _, _, x)| {
                if width <= 1 {
                    0.0
                } else {
                    x as f32 / (width - 1) as f32
                }
            }),
            MockResponse::CenterSquare => {
                Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
                    let inside_x = x >= width / 4 && x < width * 3 / 4;
                    let inside_y = y >= height / 4 && y < height * 3 / 4;
                    if inside_x && inside_y {
                        5.0
                    } else {
                        -5.0
                    }
                })
            },
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, options: &SessionOptions) -> Result<Option<Duration>> {
        if self.initialized {
            self.record("initialize (already ready)");
            return Ok(None);
        }

        self.record("initialize");
        if self.fail_initialize {
            return Err(RmbgError::execution_context("mock initialization failure"));
        }

        self.input_shape = options.input_shape();
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record("infer");

        if !self.initialized {
            return Err(RmbgError::inference("mock backend not initialized"));
        }
        if self.fail_infer {
            return Err(RmbgError::inference("mock inference failure"));
        }
        if let Some(delay) = self.infer_delay {
            std::thread::sleep(delay);
        }

        let height = input.shape()[2];
        let width = input.shape()[3];
        Ok(self.synthesize_output(height, width))
    }

    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out configured mocks; counts and shares history across
/// every backend it creates.
#[derive(Debug)]
pub struct MockBackendFactory {
    response: MockResponse,
    fail_initialize: bool,
    fail_infer: bool,
    infer_delay: Option<Duration>,
    history: Arc<Mutex<Vec<String>>>,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            response: MockResponse::Ramp,
            fail_initialize: false,
            fail_infer: false,
            infer_delay: None,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_response(mut self, response: MockResponse) -> Self {
        self.response = response;
        self
    }

    #[must_use]
    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    #[must_use]
    pub fn failing_infer(mut self) -> Self {
        self.fail_infer = true;
        self
    }

    #[must_use]
    pub fn with_infer_delay(mut self, delay: Duration) -> Self {
        self.infer_delay = Some(delay);
        self
    }

    /// Calls recorded by every backend this factory created.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Number of sessions actually built across all created backends.
    #[must_use]
    pub fn session_builds(&self) -> usize {
        self.history()
            .iter()
            .filter(|c| c.as_str() == "initialize")
            .count()
    }
}

impl Default for MockBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self, _kind: BackendKind) -> Result<Box<dyn InferenceBackend>> {
        let mut backend = MockBackend::new().with_shared_history(Arc::clone(&self.history));
        backend.response = self.response;
        backend.fail_initialize = self.fail_initialize;
        backend.fail_infer = self.fail_infer;
        backend.infer_delay = self.infer_delay;
        Ok(Box::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> SessionOptions {
        SessionOptions::new(
            PathBuf::from("/tmp/mock.onnx"),
            &crate::models::ModelSpec::rmbg14(),
        )
    }

    #[test]
    fn test_mock_requires_initialization() {
        let mut mock = MockBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(mock.infer(&input).is_err());

        mock.initialize(&options()).unwrap();
        assert!(mock.infer(&input).is_ok());
        assert_eq!(mock.call_history(), vec!["infer", "initialize", "infer"]);
    }

    #[test]
    fn test_mock_initialization_is_idempotent() {
        let mut mock = MockBackend::new();
        assert!(mock.initialize(&options()).unwrap().is_some());
        assert!(mock.initialize(&options()).unwrap().is_none());
        assert_eq!(mock.builds(), 1);
    }

    #[test]
    fn test_flat_response_is_uniform() {
        let mut mock = MockBackend::new().with_response(MockResponse::Flat(2.5));
        mock.initialize(&options()).unwrap();

        let output = mock.infer(&Array4::<f32>::zeros((1, 3, 4, 4))).unwrap();
        assert_eq!(output.shape(), &[1, 1, 4, 4]);
        assert!(output.iter().all(|&v| (v - 2.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_ramp_response_spans_zero_to_one() {
        let mut mock = MockBackend::new().with_response(MockResponse::Ramp);
        mock.initialize(&options()).unwrap();

        let output = mock.infer(&Array4::<f32>::zeros((1, 3, 2, 5))).unwrap();
        assert!((output[[0, 0, 0, 0]] - 0.0).abs() < f32::EPSILON);
        assert!((output[[0, 0, 0, 4]] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_factory_shares_history_across_backends() {
        let factory = MockBackendFactory::new();

        let mut a = factory.create_backend(BackendKind::Tract).unwrap();
        let mut b = factory.create_backend(BackendKind::Tract).unwrap();
        a.initialize(&options()).unwrap();
        b.initialize(&options()).unwrap();

        assert_eq!(factory.session_builds(), 2);
    }
}
