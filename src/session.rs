//! Inference session lifecycle management
//!
//! An [`InferenceSession`] is an explicit handle over one loaded model: it
//! acquires the model file through the ordered source chain, builds the
//! backend session, runs forward passes, and can be disposed and reloaded.
//! There is no process-wide singleton; every session is owned by exactly one
//! caller (in practice, one worker thread).
//!
//! Lifecycle: `Unloaded -> Loading -> Ready`, with failures parking the
//! session in `Failed` until the next load attempt resets it. `ensure_ready`
//! is idempotent; callers that arrive while a load is in flight are
//! serialized behind the exclusive borrow, observe `Ready`, and share the
//! first attempt's outcome instead of starting their own.

use crate::config::RemovalConfig;
use crate::download::{LoadProgressFn, ModelFetcher};
use crate::error::{Result, RmbgError};
use crate::inference::{BackendKind, InferenceBackend, SessionOptions};
use crate::processor::BackendFactory;
use instant::Duration;
use ndarray::Array4;
use std::sync::Arc;

/// Progress emitted once the session is usable.
const PROGRESS_READY: u8 = 100;

/// Lifecycle state of an inference session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No model loaded; loading has not been attempted (or was disposed)
    Unloaded,
    /// A load attempt is in flight
    Loading,
    /// Model loaded; `run` is available
    Ready,
    /// The last load attempt failed; the next one resets to `Unloaded`
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Explicit handle over one loaded model session.
pub struct InferenceSession {
    config: RemovalConfig,
    kind: BackendKind,
    factory: Arc<dyn BackendFactory>,
    fetcher: ModelFetcher,
    backend: Option<Box<dyn InferenceBackend>>,
    state: SessionState,
    last_error: Option<String>,
    build_time: Option<Duration>,
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("state", &self.state)
            .field("kind", &self.kind)
            .field("model", &self.config.model_spec.name)
            .finish()
    }
}

impl InferenceSession {
    /// Create an unloaded session handle.
    ///
    /// No I/O happens here; the model is acquired and the backend built on
    /// the first [`ensure_ready`](Self::ensure_ready).
    ///
    /// # Errors
    /// - Model cache or HTTP client initialization failures
    pub fn new(
        config: RemovalConfig,
        kind: BackendKind,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<Self> {
        let fetcher = ModelFetcher::new()?.skip_cache(config.disable_cache);
        Ok(Self::with_fetcher(config, kind, factory, fetcher))
    }

    /// Create a session with a specific fetcher (custom cache location).
    #[must_use]
    pub fn with_fetcher(
        config: RemovalConfig,
        kind: BackendKind,
        factory: Arc<dyn BackendFactory>,
        fetcher: ModelFetcher,
    ) -> Self {
        Self {
            config,
            kind,
            factory,
            fetcher,
            backend: None,
            state: SessionState::Unloaded,
            last_error: None,
            build_time: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether `run` is currently available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Message from the most recent failed load attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Backend session build time from the most recent load, if any.
    #[must_use]
    pub fn build_time(&self) -> Option<Duration> {
        self.build_time
    }

    /// Load the model if it is not loaded yet.
    ///
    /// Reports coarse progress: 10 when acquisition starts, 20-40 as source
    /// attempts begin, 100 once the session is usable. An already-ready
    /// session reports 100 immediately and returns. A session in `Failed`
    /// is reset and retried from scratch.
    ///
    /// # Errors
    /// - Every model source failed ([`RmbgError::ModelAcquisition`])
    /// - Backend session construction failed
    pub async fn ensure_ready(&mut self, progress: Option<LoadProgressFn<'_>>) -> Result<()> {
        match self.state {
            SessionState::Ready => {
                if let Some(callback) = progress {
                    callback(PROGRESS_READY);
                }
                return Ok(());
            },
            SessionState::Failed => {
                log::info!(
                    "Retrying model load after previous failure: {}",
                    self.last_error.as_deref().unwrap_or("unknown")
                );
                self.state = SessionState::Unloaded;
            },
            SessionState::Loading => {
                // A previous attempt was interrupted mid-flight
                log::warn!("Session left in loading state; restarting load");
                self.state = SessionState::Unloaded;
            },
            SessionState::Unloaded => {},
        }

        self.state = SessionState::Loading;
        match self.load(progress).await {
            Ok(()) => {
                self.state = SessionState::Ready;
                self.last_error = None;
                if let Some(callback) = progress {
                    callback(PROGRESS_READY);
                }
                Ok(())
            },
            Err(e) => {
                self.state = SessionState::Failed;
                self.last_error = Some(e.to_string());
                self.backend = None;
                Err(e)
            },
        }
    }

    async fn load(&mut self, progress: Option<LoadProgressFn<'_>>) -> Result<()> {
        let model_path = self
            .fetcher
            .fetch(&self.config.model_spec, progress)
            .await?;

        let options = SessionOptions::from_config(model_path, &self.config);

        if self.backend.is_none() {
            self.backend = Some(self.factory.create_backend(self.kind)?);
        }
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| RmbgError::internal("backend vanished during load"))?;

        self.build_time = backend.initialize(&options)?;
        log::info!(
            "Inference session ready ({} backend, model '{}')",
            self.kind,
            self.config.model_spec.name
        );
        Ok(())
    }

    /// Run one forward pass through the loaded model.
    ///
    /// # Errors
    /// - Session not in the `Ready` state
    /// - Backend inference failures
    pub fn run(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if self.state != SessionState::Ready {
            return Err(RmbgError::execution_context(format!(
                "session is not ready (state: {})",
                self.state
            )));
        }
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| RmbgError::execution_context("session has no backend"))?;
        backend.infer(input)
    }

    /// Release the backend session and return to `Unloaded`.
    ///
    /// A later [`ensure_ready`](Self::ensure_ready) rebuilds from scratch.
    pub fn dispose(&mut self) {
        if self.backend.is_some() {
            log::debug!("Disposing inference session for '{}'", self.config.model_spec.name);
        }
        self.backend = None;
        self.build_time = None;
        self.state = SessionState::Unloaded;
    }
}
