//! Worker threads for off-main-thread processing
//!
//! A [`RemovalWorker`] owns one [`BackgroundRemovalProcessor`] on a dedicated
//! OS thread and serializes requests through a channel, so heavy inference
//! never runs on the caller's thread and concurrent submissions queue instead
//! of racing a shared session. A [`WorkerPool`] spreads independent sessions
//! over several workers and hands requests out round-robin.
//!
//! Every request carries a [`RequestId`] and every reply names the request it
//! answers, so callers can correlate progress and results even when several
//! jobs are in flight.

use crate::config::RemovalConfig;
use crate::download::LoadProgressFn;
use crate::error::{Result, RmbgError};
use crate::inference::BackendKind;
use crate::processor::{BackendFactory, BackgroundRemovalProcessor};
use crate::types::{PixelBuffer, RemovalResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{span, Level};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier correlating replies with their request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Input payload for a processing request.
#[derive(Debug)]
pub enum ProcessInput {
    /// Encoded image bytes (PNG, JPEG, WebP, ...)
    Bytes(Vec<u8>),
    /// Raw RGBA pixels
    Pixels(PixelBuffer),
    /// Path to an image file
    File(PathBuf),
}

enum WorkerRequest {
    Load {
        id: RequestId,
        reply: UnboundedSender<WorkerReply>,
    },
    Process {
        id: RequestId,
        input: ProcessInput,
        reply: UnboundedSender<WorkerReply>,
    },
}

enum WorkerReply {
    Progress { id: RequestId, percent: u8 },
    Loaded { id: RequestId },
    Result { id: RequestId, result: Box<RemovalResult> },
    Error { id: RequestId, error: RmbgError },
}

/// Handle to a background removal worker thread.
///
/// The worker owns its processor exclusively; requests submitted while an
/// earlier one is running wait in the channel. Dropping the handle closes the
/// channel and lets the thread exit after the current request; use
/// [`shutdown`](Self::shutdown) to also join it.
pub struct RemovalWorker {
    sender: Option<UnboundedSender<WorkerRequest>>,
    thread: Option<JoinHandle<()>>,
    worker_id: usize,
}

impl RemovalWorker {
    /// Spawn a worker thread around a processor.
    ///
    /// Must be called from within a tokio runtime; the worker borrows the
    /// runtime's handle to drive model downloads.
    ///
    /// # Errors
    /// - OS thread spawn failures
    pub fn spawn(processor: BackgroundRemovalProcessor) -> Result<Self> {
        Self::spawn_indexed(processor, 0)
    }

    pub(crate) fn spawn_indexed(
        processor: BackgroundRemovalProcessor,
        worker_id: usize,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::current();
        let (sender, receiver) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name(format!("rmbg-worker-{worker_id}"))
            .spawn(move || worker_loop(processor, receiver, runtime, worker_id))
            .map_err(|e| {
                RmbgError::execution_context(format!("failed to spawn worker thread: {e}"))
            })?;

        log::debug!("Spawned removal worker {worker_id}");
        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            worker_id,
        })
    }

    /// Index assigned at spawn time (position within a pool).
    #[must_use]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Load the model on the worker if it is not loaded yet.
    ///
    /// Safe to call repeatedly and from several tasks at once; calls that
    /// arrive while a load is running queue behind it and observe the loaded
    /// session. Load milestones (10-40 acquisition, 100 ready) flow through
    /// `progress`.
    ///
    /// # Errors
    /// - Model acquisition or session build failures
    /// - Worker thread has shut down
    pub async fn ensure_loaded(&self, progress: Option<LoadProgressFn<'_>>) -> Result<()> {
        let id = RequestId::next();
        let mut replies = self.submit(|reply| WorkerRequest::Load { id, reply })?;

        while let Some(reply) = replies.recv().await {
            match reply {
                WorkerReply::Progress { id: reply_id, percent } => {
                    debug_assert_eq!(reply_id, id);
                    if let Some(callback) = progress {
                        callback(percent);
                    }
                },
                WorkerReply::Loaded { id: reply_id } => {
                    debug_assert_eq!(reply_id, id);
                    return Ok(());
                },
                WorkerReply::Error { id: reply_id, error } => {
                    debug_assert_eq!(reply_id, id);
                    return Err(error);
                },
                WorkerReply::Result { .. } => {},
            }
        }
        Err(Self::worker_gone())
    }

    /// Process one input, loading the model first if necessary.
    ///
    /// # Errors
    /// - Decode, inference, or model loading failures
    /// - Worker thread has shut down
    pub async fn process(
        &self,
        input: ProcessInput,
        progress: Option<LoadProgressFn<'_>>,
    ) -> Result<RemovalResult> {
        let id = RequestId::next();
        let mut replies = self.submit(|reply| WorkerRequest::Process { id, input, reply })?;

        while let Some(reply) = replies.recv().await {
            match reply {
                WorkerReply::Progress { id: reply_id, percent } => {
                    debug_assert_eq!(reply_id, id);
                    if let Some(callback) = progress {
                        callback(percent);
                    }
                },
                WorkerReply::Result { id: reply_id, result } => {
                    debug_assert_eq!(reply_id, id);
                    return Ok(*result);
                },
                WorkerReply::Error { id: reply_id, error } => {
                    debug_assert_eq!(reply_id, id);
                    return Err(error);
                },
                WorkerReply::Loaded { .. } => {},
            }
        }
        Err(Self::worker_gone())
    }

    /// Process encoded image bytes.
    ///
    /// # Errors
    /// - Decode, inference, or model loading failures
    pub async fn process_bytes(&self, bytes: Vec<u8>) -> Result<RemovalResult> {
        self.process(ProcessInput::Bytes(bytes), None).await
    }

    /// Process a raw RGBA pixel buffer.
    ///
    /// # Errors
    /// - Inference or model loading failures
    pub async fn process_pixels(&self, pixels: PixelBuffer) -> Result<RemovalResult> {
        self.process(ProcessInput::Pixels(pixels), None).await
    }

    /// Process an image file.
    ///
    /// # Errors
    /// - File read, decode, inference, or model loading failures
    pub async fn process_file<P: Into<PathBuf>>(&self, path: P) -> Result<RemovalResult> {
        self.process(ProcessInput::File(path.into()), None).await
    }

    /// Stop accepting requests and wait for the thread to finish.
    ///
    /// In-flight requests complete before the thread exits.
    pub fn shutdown(mut self) {
        self.sender = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Removal worker {} panicked during shutdown", self.worker_id);
            }
        }
    }

    fn submit<F>(&self, build: F) -> Result<UnboundedReceiver<WorkerReply>>
    where
        F: FnOnce(UnboundedSender<WorkerReply>) -> WorkerRequest,
    {
        let sender = self.sender.as_ref().ok_or_else(Self::worker_gone)?;
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        sender
            .send(build(reply_tx))
            .map_err(|_| Self::worker_gone())?;
        Ok(reply_rx)
    }

    fn worker_gone() -> RmbgError {
        RmbgError::execution_context("worker thread has shut down")
    }
}

impl std::fmt::Debug for RemovalWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalWorker")
            .field("worker_id", &self.worker_id)
            .field("running", &self.sender.is_some())
            .finish()
    }
}

fn worker_loop(
    mut processor: BackgroundRemovalProcessor,
    mut requests: UnboundedReceiver<WorkerRequest>,
    runtime: tokio::runtime::Handle,
    worker_id: usize,
) {
    while let Some(request) = requests.blocking_recv() {
        match request {
            WorkerRequest::Load { id, reply } => {
                let _span =
                    span!(Level::DEBUG, "worker_load", worker = worker_id, request = %id)
                        .entered();
                log::debug!("Worker {worker_id} loading model for {id}");
                let progress_reply = reply.clone();
                let forward = move |percent: u8| {
                    let _ = progress_reply.send(WorkerReply::Progress { id, percent });
                };

                let outcome = runtime.block_on(processor.ensure_ready_with(Some(&forward)));
                let _ = match outcome {
                    Ok(()) => reply.send(WorkerReply::Loaded { id }),
                    Err(error) => {
                        log::warn!("Worker {worker_id} load failed for {id}: {error}");
                        reply.send(WorkerReply::Error { id, error })
                    },
                };
            },
            WorkerRequest::Process { id, input, reply } => {
                let _span =
                    span!(Level::DEBUG, "worker_process", worker = worker_id, request = %id)
                        .entered();
                log::debug!("Worker {worker_id} processing {id}");
                let progress_reply = reply.clone();
                let forward = move |percent: u8| {
                    let _ = progress_reply.send(WorkerReply::Progress { id, percent });
                };

                let outcome = runtime.block_on(async {
                    processor.ensure_ready_with(Some(&forward)).await?;
                    match input {
                        ProcessInput::Bytes(bytes) => processor.process_bytes(&bytes).await,
                        ProcessInput::Pixels(pixels) => processor.process_pixels(&pixels).await,
                        ProcessInput::File(path) => processor.process_file(&path).await,
                    }
                });
                let _ = match outcome {
                    Ok(result) => reply.send(WorkerReply::Result {
                        id,
                        result: Box::new(result),
                    }),
                    Err(error) => {
                        log::warn!("Worker {worker_id} processing failed for {id}: {error}");
                        reply.send(WorkerReply::Error { id, error })
                    },
                };
            },
        }
    }
    log::debug!("Removal worker {worker_id} exiting");
}

/// Pool of workers, each holding an independent model session.
///
/// Requests are handed out round-robin; two requests submitted back to back
/// land on different workers and run in parallel.
pub struct WorkerPool {
    workers: Vec<RemovalWorker>,
    next: AtomicUsize,
}

impl WorkerPool {
    /// Build a pool sized by [`RemovalConfig::effective_workers`].
    ///
    /// # Errors
    /// - Worker spawn or processor construction failures
    pub fn new(config: RemovalConfig, kind: BackendKind) -> Result<Self> {
        Self::with_factory(config, kind, Arc::new(crate::processor::DefaultBackendFactory))
    }

    /// Build a pool whose sessions come from a custom backend factory.
    ///
    /// # Errors
    /// - Worker spawn or processor construction failures
    pub fn with_factory(
        config: RemovalConfig,
        kind: BackendKind,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<Self> {
        let size = config.effective_workers();
        let mut workers = Vec::with_capacity(size);
        for worker_id in 0..size {
            let processor = BackgroundRemovalProcessor::with_factory(
                config.clone(),
                kind,
                Arc::clone(&factory),
            )?;
            workers.push(RemovalWorker::spawn_indexed(processor, worker_id)?);
        }
        log::info!("Started worker pool with {size} workers");
        Self::from_workers(workers)
    }

    /// Build a pool from already-spawned workers.
    ///
    /// # Errors
    /// - The worker list is empty
    pub fn from_workers(workers: Vec<RemovalWorker>) -> Result<Self> {
        if workers.is_empty() {
            return Err(RmbgError::invalid_config(
                "worker pool requires at least one worker",
            ));
        }
        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Load the model on every worker.
    ///
    /// Workers load one after another so a cold cache is downloaded once and
    /// the rest hit it. Milestones from the first worker flow through
    /// `progress`.
    ///
    /// # Errors
    /// - Model acquisition or session build failures on any worker
    pub async fn ensure_loaded(&self, progress: Option<LoadProgressFn<'_>>) -> Result<()> {
        for (index, worker) in self.workers.iter().enumerate() {
            let forward = if index == 0 { progress } else { None };
            worker.ensure_loaded(forward).await?;
        }
        Ok(())
    }

    /// Process one input on the next worker in round-robin order.
    ///
    /// # Errors
    /// - Decode, inference, or model loading failures
    pub async fn process(
        &self,
        input: ProcessInput,
        progress: Option<LoadProgressFn<'_>>,
    ) -> Result<RemovalResult> {
        self.next_worker().process(input, progress).await
    }

    /// Process encoded image bytes on the next worker.
    ///
    /// # Errors
    /// - Decode, inference, or model loading failures
    pub async fn process_bytes(&self, bytes: Vec<u8>) -> Result<RemovalResult> {
        self.process(ProcessInput::Bytes(bytes), None).await
    }

    /// Process a raw RGBA pixel buffer on the next worker.
    ///
    /// # Errors
    /// - Inference or model loading failures
    pub async fn process_pixels(&self, pixels: PixelBuffer) -> Result<RemovalResult> {
        self.process(ProcessInput::Pixels(pixels), None).await
    }

    /// Process an image file on the next worker.
    ///
    /// # Errors
    /// - File read, decode, inference, or model loading failures
    pub async fn process_file<P: Into<PathBuf>>(&self, path: P) -> Result<RemovalResult> {
        self.process(ProcessInput::File(path.into()), None).await
    }

    /// Shut down all workers, waiting for in-flight requests to finish.
    pub fn shutdown(self) {
        for worker in self.workers {
            worker.shutdown();
        }
    }

    fn next_worker(&self) -> &RemovalWorker {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[index]
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.workers.len())
            .finish()
    }
}
