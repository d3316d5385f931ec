//! Structured logging for qnet simulations
//!
//! Builds a `tracing` subscriber from a [`LogConfig`]: console output as
//! pretty text or JSONL (on stderr unless configured otherwise), and optional JSONL file output with rotation via
//! `tracing-appender`. `RUST_LOG` overrides the configured default level.
//!
//! The simulator wraps every trial in a `trial` span and every agent in an
//! `agent` span, so JSONL events carry both without any extra context layer.
//!
//! # Quick Start
//!
//! ```ignore
//! use qnet_logging::{LogConfig, QnetSubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = QnetSubscriberBuilder::new().init()?;
//!
//! // Pretty, verbose console output
//! let _guard = QnetSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```

pub mod config;

pub use config::{ConsoleConfig, ConsoleTarget, FileConfig, JsonlConfig, LogConfig, RotationStrategy};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to set up log rotation: {0}")]
    Appender(String),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Keeps background log writers alive; drop it last
#[must_use = "file output stops when the guard is dropped"]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builder for configuring and installing the qnet logging subscriber
pub struct QnetSubscriberBuilder {
    config: LogConfig,
}

impl QnetSubscriberBuilder {
    /// Builder with the default configuration (JSONL to console)
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn filter(&self, level: Option<&str>) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(&self.config.default_level)))
    }

    fn file_writer(file: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
        fs::create_dir_all(&file.directory)?;
        let rotation = match file.rotation {
            RotationStrategy::Never => {
                let path = file.directory.join(format!("{}.jsonl", file.prefix));
                return Ok(tracing_appender::non_blocking(File::create(path)?));
            }
            RotationStrategy::Daily => Rotation::DAILY,
            RotationStrategy::Hourly => Rotation::HOURLY,
        };
        let mut builder = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(file.prefix.as_str())
            .filename_suffix("jsonl");
        if let Some(max) = file.max_files {
            builder = builder.max_log_files(max);
        }
        let appender = builder
            .build(&file.directory)
            .map_err(|e| LoggingError::Appender(e.to_string()))?;
        Ok(tracing_appender::non_blocking(appender))
    }

    fn console_writer(target: ConsoleTarget) -> BoxMakeWriter {
        match target {
            ConsoleTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
            ConsoleTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }

    fn layers(&self) -> Result<(Vec<BoxedLayer>, Vec<WorkerGuard>), LoggingError> {
        let jsonl = &self.config.jsonl;
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guards = Vec::new();

        let console = &self.config.console;
        if console.enabled {
            let filter = self.filter(console.level.as_deref());
            let layer: BoxedLayer = if console.pretty {
                tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true)
                    .with_writer(Self::console_writer(console.target))
                    .with_filter(filter)
                    .boxed()
            } else {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(jsonl.include_spans)
                    .flatten_event(jsonl.flatten_events)
                    .with_file(jsonl.include_location)
                    .with_line_number(jsonl.include_location)
                    .with_writer(Self::console_writer(console.target))
                    .with_filter(filter)
                    .boxed()
            };
            layers.push(layer);
        }

        if let Some(file) = &self.config.file {
            let (writer, guard) = Self::file_writer(file)?;
            guards.push(guard);
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_span_list(jsonl.include_spans)
                    .flatten_event(jsonl.flatten_events)
                    .with_file(jsonl.include_location)
                    .with_line_number(jsonl.include_location)
                    .with_writer(writer)
                    .with_filter(self.filter(None))
                    .boxed(),
            );
        }

        Ok((layers, guards))
    }

    /// Install the subscriber globally
    ///
    /// Fails if a global subscriber is already installed or a log file cannot
    /// be created.
    pub fn init(self) -> Result<LogGuard, LoggingError> {
        let (layers, guards) = self.layers()?;
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        Ok(LogGuard { _guards: guards })
    }
}

impl Default for QnetSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Install logging with default settings (JSONL to console)
pub fn init_default() -> Result<LogGuard, LoggingError> {
    QnetSubscriberBuilder::new().init()
}

/// Install verbose, pretty console logging
pub fn init_development() -> Result<LogGuard, LoggingError> {
    QnetSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Install minimal logging for tests; repeated calls are no-ops
pub fn init_testing() {
    let _ = QnetSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_jsonl() {
        let builder = QnetSubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
        assert!(!builder.config().console.pretty);
    }

    #[test]
    fn test_builder_overrides() {
        let builder = QnetSubscriberBuilder::new()
            .with_config(LogConfig::development())
            .with_level("trace")
            .with_console(false);
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.enabled);
    }

    #[test]
    fn test_presets_build_console_layers() {
        let (layers, _) = QnetSubscriberBuilder::new()
            .with_config(LogConfig::development())
            .layers()
            .unwrap();
        assert_eq!(layers.len(), 1);

        let dir = std::env::temp_dir().join(format!("qnet-batch-{}", std::process::id()));
        let (layers, guards) = QnetSubscriberBuilder::new()
            .with_config(LogConfig::batch(dir.clone()))
            .layers()
            .unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(guards.len(), 1);
        drop(guards);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_init_testing_is_repeatable() {
        init_testing();
        init_testing();
        assert!(init_default().is_err());
        assert!(init_development().is_err());
    }

    #[test]
    fn test_disabled_outputs_build_no_layers() {
        let builder = QnetSubscriberBuilder::new().with_console(false);
        let (layers, guards) = builder.layers().unwrap();
        assert!(layers.is_empty());
        assert!(guards.is_empty());
    }
}
