//! Tracing subscriber setup for binaries
//!
//! The library only emits events and spans; whichever binary embeds it
//! decides how they are rendered. [`TracingConfig`] covers the combinations
//! the CLI needs: a filter derived from repeated `-v` flags (or explicit
//! `RUST_LOG`-style directives), console or JSON rendering, and an optional
//! session identifier tagged onto the first event so one invocation's events
//! can be grouped later.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// How trace events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Compact colored console output
    #[default]
    Console,
    /// Colorless console output for logs that end up in files or CI
    Plain,
    /// One JSON object per event, for machine consumption
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Subscriber settings assembled by the embedding binary.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    format: TracingFormat,
    directives: String,
    session: Option<String>,
}

impl TracingConfig {
    /// Derive filter directives from a repeated `-v` flag count:
    /// `info` by default, `debug` for `-v`, `trace` from `-vv` up.
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        let directives = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        Self {
            format: TracingFormat::default(),
            directives: directives.to_owned(),
            session: None,
        }
    }

    /// Replace the filter with explicit `RUST_LOG`-style directives.
    #[must_use]
    pub fn directives<S: Into<String>>(mut self, directives: S) -> Self {
        self.directives = directives.into();
        self
    }

    /// Render events in the given format.
    #[must_use]
    pub fn format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Tag the first emitted event with a session identifier.
    #[must_use]
    pub fn session<S: Into<String>>(mut self, id: S) -> Self {
        self.session = Some(id.into());
        self
    }

    /// Filter directives `install` will hand to the subscriber.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.directives
    }

    /// Install the global subscriber described by this configuration.
    ///
    /// # Errors
    /// - The filter directives do not parse
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn install(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let registry = Registry::default().with(EnvFilter::try_new(&self.directives)?);

        match self.format {
            TracingFormat::Console | TracingFormat::Plain => {
                let layer = fmt::layer()
                    .with_ansi(self.format == TracingFormat::Console)
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact();
                registry.with(layer).try_init()?;
            }
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            }
        }

        if let Some(session) = &self.session {
            tracing::info!(session = %session, "Background removal session started");
        }

        Ok(())
    }
}

/// Install a console subscriber with a fresh session id, as the CLI does.
///
/// # Errors
/// Returns an error when a global subscriber is already installed.
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<()> {
    TracingConfig::from_verbosity(verbosity)
        .session(uuid::Uuid::new_v4().to_string())
        .install()
}

/// Span constructors for the operations worth correlating events under.
pub mod spans {
    use tracing::{Level, Span};

    /// One input image, from decode to saved output.
    pub fn file_processing(path: &std::path::Path) -> Span {
        tracing::span!(Level::INFO, "process_file", path = %path.display())
    }

    /// A whole batch run.
    pub fn batch_processing(files: usize) -> Span {
        tracing::span!(Level::INFO, "process_batch", files)
    }

    /// Model acquisition plus session construction.
    pub fn model_loading(model: &str, backend: &str) -> Span {
        tracing::span!(Level::INFO, "load_model", model, backend)
    }
}
