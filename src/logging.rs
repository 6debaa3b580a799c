//! Structured logging setup
//!
//! Provides JSON-formatted and human-readable logging with optional file
//! output. All pipeline components log through `tracing`; this module only
//! installs the subscriber.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::PipelineError;

/// Initialize logging based on configuration.
///
/// `RUST_LOG` takes precedence over the configured level. When a file path is
/// configured, every line is written to both stdout and the file.
///
/// # Errors
///
/// Returns [`PipelineError::Logging`] if the filter is invalid, the log file
/// cannot be opened or a global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use sales_pipeline::config::LoggingConfig;
/// use sales_pipeline::logging::init_logging;
///
/// init_logging(&LoggingConfig::default()).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<(), PipelineError> {
    let env_filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    PipelineError::Logging(format!("cannot open {}: {e}", path.display()))
                })?,
        )),
        None => None,
    };

    let result = if config.json_format {
        let stdout_layer = fmt::layer().json().with_current_span(true);
        match file {
            Some(file) => registry
                .with(stdout_layer)
                .with(fmt::layer().json().with_current_span(true).with_writer(file))
                .try_init(),
            None => registry.with(stdout_layer).try_init(),
        }
    } else {
        let stdout_layer = fmt::layer().with_target(true).with_level(true);
        match file {
            Some(file) => registry
                .with(stdout_layer)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(file),
                )
                .try_init(),
            None => registry.with(stdout_layer).try_init(),
        }
    };

    result.map_err(|e| PipelineError::Logging(e.to_string()))
}

/// Installs logging for `config`, falling back to the defaults when the
/// configured setup is rejected.
///
/// The rejection is reported as a warning through the fallback subscriber.
///
/// # Errors
///
/// Returns [`PipelineError::Logging`] only when the defaults cannot be
/// installed either, which happens once a global subscriber exists.
pub fn init_logging_with_fallback(config: &LoggingConfig) -> Result<(), PipelineError> {
    if let Err(rejected) = init_logging(config) {
        init_logging(&LoggingConfig::default())?;
        warn!(error = %rejected, "Logging configuration rejected, using defaults");
    }
    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter, PipelineError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| PipelineError::Logging(format!("invalid log filter '{level}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_build_filter_accepts_level() {
        std::env::remove_var("RUST_LOG");
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("sales_pipeline=trace,rdkafka=warn").is_ok());
    }

    #[test]
    #[serial]
    fn test_build_filter_rejects_garbage() {
        std::env::remove_var("RUST_LOG");
        let result = build_filter("sales_pipeline=loud");
        assert!(matches!(result, Err(PipelineError::Logging(_))));
    }

    #[test]
    #[serial]
    fn test_unwritable_log_file_reported() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "info".to_string(),
            json_format: true,
            file_path: Some("/nonexistent-dir/pipeline.log".into()),
        };

        let result = init_logging(&config);
        match result {
            Err(PipelineError::Logging(message)) => {
                assert!(message.contains("/nonexistent-dir/pipeline.log"))
            }
            other => panic!("expected logging error, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_rejected_config_falls_back_to_defaults() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "sales_pipeline=loud".to_string(),
            json_format: false,
            file_path: None,
        };

        assert!(init_logging_with_fallback(&config).is_ok());
        assert!(tracing::dispatcher::has_been_set());
        // The defaults now own the global slot.
        assert!(matches!(
            init_logging(&LoggingConfig::default()),
            Err(PipelineError::Logging(_))
        ));
    }
}
