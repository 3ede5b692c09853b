//! Support services for the processing pipeline
//!
//! Keeps I/O, output encoding, and progress reporting out of the pipeline
//! logic so each can be tested and replaced independently.

mod format;
mod io;
mod progress;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
    SilentReporter,
};
