//! Stage-level progress announcements
//!
//! The pipeline announces each stage it enters through a [`ProgressReporter`];
//! the CLI, worker pool, and embedding applications each decide what to do
//! with those announcements. Stages mirror the fields of
//! [`ProcessingTimings`], so a frontend can line live progress up with the
//! timing breakdown it receives at the end.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::time::Duration;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessingStage {
    /// Model acquisition and session construction
    ModelLoading,
    /// Decoding input bytes into pixels
    Decoding,
    /// Resampling and normalizing pixels into the input tensor
    Preprocessing,
    /// Model forward pass
    Inference,
    /// Turning the raw output tensor into an alpha mask
    Postprocessing,
    /// Applying the mask to the source pixels
    Compositing,
    /// Encoding the composited result for output
    Encoding,
    /// Pipeline finished
    Completed,
}

impl ProcessingStage {
    /// Short label for logs and progress lines.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ModelLoading => "loading model",
            Self::Decoding => "decoding input",
            Self::Preprocessing => "preparing tensor",
            Self::Inference => "running inference",
            Self::Postprocessing => "building alpha mask",
            Self::Compositing => "compositing output",
            Self::Encoding => "encoding output",
            Self::Completed => "done",
        }
    }

    /// Nominal overall completion when the pipeline enters this stage.
    ///
    /// The jump from `Inference` to `Postprocessing` is deliberately wide;
    /// the forward pass dominates a warmed-up run.
    #[must_use]
    pub fn percent(self) -> u8 {
        match self {
            Self::ModelLoading => 2,
            Self::Decoding => 8,
            Self::Preprocessing => 15,
            Self::Inference => 30,
            Self::Postprocessing => 80,
            Self::Compositing => 90,
            Self::Encoding => 96,
            Self::Completed => 100,
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A stage announcement plus where the run stands overall.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Stage the pipeline just entered
    pub stage: ProcessingStage,
    /// Overall completion, 0-100
    pub percent: u8,
    /// Extra context beyond the stage label, such as the source currently
    /// being tried during model acquisition
    pub detail: Option<String>,
    /// Time since the run started
    pub elapsed: Duration,
}

impl ProgressUpdate {
    /// Display text: the detail when present, the stage label otherwise.
    #[must_use]
    pub fn text(&self) -> &str {
        self.detail.as_deref().unwrap_or_else(|| self.stage.label())
    }
}

impl std::fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:>3}%] {}", self.percent, self.text())
    }
}

/// Receives stage announcements from a pipeline run.
///
/// Implementations are called from whichever thread runs the pipeline,
/// including pool worker threads.
pub trait ProgressReporter: Send + Sync {
    /// The pipeline entered a stage.
    fn progress(&self, update: ProgressUpdate);

    /// The run finished and the full timing breakdown is available.
    fn finished(&self, timings: &ProcessingTimings);

    /// The run failed during the given stage.
    fn failed(&self, stage: ProcessingStage, message: &str);
}

/// Reporter that drops every announcement.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn progress(&self, _update: ProgressUpdate) {}

    fn finished(&self, _timings: &ProcessingTimings) {}

    fn failed(&self, _stage: ProcessingStage, _message: &str) {}
}

/// Reporter that writes announcements to the log.
pub struct ConsoleProgressReporter {
    show_elapsed: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(show_elapsed: bool) -> Self {
        Self { show_elapsed }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn progress(&self, update: ProgressUpdate) {
        if self.show_elapsed {
            log::info!("{update} +{}ms", update.elapsed.as_millis());
        } else {
            log::info!("{update}");
        }
    }

    fn finished(&self, timings: &ProcessingTimings) {
        log::info!("{}", timings.summary());
    }

    fn failed(&self, stage: ProcessingStage, message: &str) {
        log::error!("failed while {stage}: {message}");
    }
}

/// Stamps announcements with elapsed time and fans them out to a reporter.
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    started: Instant,
    stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            started: Instant::now(),
            stage: None,
        }
    }

    /// Tracker that discards everything, for embedders that poll instead.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(Box::new(SilentReporter))
    }

    /// Tracker that logs each stage.
    #[must_use]
    pub fn console(show_elapsed: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(show_elapsed)))
    }

    /// Announce entry into a stage at its nominal percent.
    pub fn enter(&mut self, stage: ProcessingStage) {
        self.announce(stage, stage.percent(), None);
    }

    /// Announce a sub-stage step with an explicit percent and extra context,
    /// such as a model download milestone.
    pub fn enter_detailed(&mut self, stage: ProcessingStage, percent: u8, detail: String) {
        self.announce(stage, percent.min(100), Some(detail));
    }

    fn announce(&mut self, stage: ProcessingStage, percent: u8, detail: Option<String>) {
        self.stage = Some(stage);
        self.reporter.progress(ProgressUpdate {
            stage,
            percent,
            detail,
            elapsed: self.started.elapsed(),
        });
    }

    /// Forward the final timing breakdown.
    pub fn complete(&self, timings: &ProcessingTimings) {
        self.reporter.finished(timings);
    }

    /// Attribute a failure to the most recently entered stage.
    pub fn fail(&self, message: &str) {
        let stage = self.stage.unwrap_or(ProcessingStage::ModelLoading);
        self.reporter.failed(stage, message);
    }

    /// Time since this tracker was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The stage most recently announced.
    #[must_use]
    pub fn stage(&self) -> Option<ProcessingStage> {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        stages: Arc<Mutex<Vec<ProgressUpdate>>>,
        summaries: Arc<Mutex<Vec<ProcessingTimings>>>,
        failures: Arc<Mutex<Vec<(ProcessingStage, String)>>>,
    }

    impl ProgressReporter for Recorder {
        fn progress(&self, update: ProgressUpdate) {
            self.stages.lock().unwrap().push(update);
        }

        fn finished(&self, timings: &ProcessingTimings) {
            self.summaries.lock().unwrap().push(timings.clone());
        }

        fn failed(&self, stage: ProcessingStage, message: &str) {
            self.failures
                .lock()
                .unwrap()
                .push((stage, message.to_owned()));
        }
    }

    const PIPELINE: [ProcessingStage; 8] = [
        ProcessingStage::ModelLoading,
        ProcessingStage::Decoding,
        ProcessingStage::Preprocessing,
        ProcessingStage::Inference,
        ProcessingStage::Postprocessing,
        ProcessingStage::Compositing,
        ProcessingStage::Encoding,
        ProcessingStage::Completed,
    ];

    #[test]
    fn test_percent_ascends_with_stage_order() {
        for pair in PIPELINE.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(
                pair[0].percent() < pair[1].percent(),
                "{} must precede {}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(ProcessingStage::Completed.percent(), 100);
    }

    #[test]
    fn test_update_text_prefers_detail() {
        let update = ProgressUpdate {
            stage: ProcessingStage::ModelLoading,
            percent: 25,
            detail: Some("trying source hf:briaai/RMBG-1.4".to_owned()),
            elapsed: Duration::from_millis(40),
        };
        assert_eq!(update.text(), "trying source hf:briaai/RMBG-1.4");
        assert_eq!(update.to_string(), "[ 25%] trying source hf:briaai/RMBG-1.4");

        let bare = ProgressUpdate {
            detail: None,
            ..update
        };
        assert_eq!(bare.text(), "loading model");
    }

    #[test]
    fn test_tracker_stamps_stage_and_percent() {
        let recorder = Recorder::default();
        let stages = Arc::clone(&recorder.stages);

        let mut tracker = ProgressTracker::new(Box::new(recorder));
        tracker.enter(ProcessingStage::Preprocessing);
        tracker.enter(ProcessingStage::Inference);

        let stages = stages.lock().unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].stage, ProcessingStage::Preprocessing);
        assert_eq!(stages[0].percent, ProcessingStage::Preprocessing.percent());
        assert_eq!(stages[1].stage, ProcessingStage::Inference);
        assert_eq!(tracker.stage(), Some(ProcessingStage::Inference));
    }

    #[test]
    fn test_detailed_percent_caps_at_100() {
        let recorder = Recorder::default();
        let stages = Arc::clone(&recorder.stages);

        let mut tracker = ProgressTracker::new(Box::new(recorder));
        tracker.enter_detailed(ProcessingStage::ModelLoading, 250, "overshoot".to_owned());

        let stages = stages.lock().unwrap();
        assert_eq!(stages[0].percent, 100);
        assert_eq!(stages[0].text(), "overshoot");
    }

    #[test]
    fn test_failure_lands_on_current_stage() {
        let recorder = Recorder::default();
        let failures = Arc::clone(&recorder.failures);

        let mut tracker = ProgressTracker::new(Box::new(recorder));
        tracker.enter(ProcessingStage::Compositing);
        tracker.fail("mask dimensions mismatch");

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, ProcessingStage::Compositing);
        assert_eq!(failures[0].1, "mask dimensions mismatch");
    }

    #[test]
    fn test_failure_before_any_stage_blames_model_loading() {
        let recorder = Recorder::default();
        let failures = Arc::clone(&recorder.failures);

        let tracker = ProgressTracker::new(Box::new(recorder));
        tracker.fail("no sources configured");

        assert_eq!(
            failures.lock().unwrap()[0].0,
            ProcessingStage::ModelLoading
        );
    }

    #[test]
    fn test_completion_passes_timings_through() {
        let recorder = Recorder::default();
        let summaries = Arc::clone(&recorder.summaries);

        let tracker = ProgressTracker::new(Box::new(recorder));
        let timings = ProcessingTimings {
            total_ms: 1500,
            inference_ms: 800,
            ..ProcessingTimings::default()
        };
        tracker.complete(&timings);

        let summaries = summaries.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_ms, 1500);
        assert_eq!(summaries[0].inference_ms, 800);
    }

    #[test]
    fn test_silent_tracker_swallows_everything() {
        let mut tracker = ProgressTracker::silent();
        tracker.enter(ProcessingStage::Inference);
        tracker.complete(&ProcessingTimings::default());
        tracker.fail("ignored");
        assert_eq!(tracker.stage(), Some(ProcessingStage::Inference));
    }
}
