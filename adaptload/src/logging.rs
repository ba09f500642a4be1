//! Tracing subscriber setup.
//!
//! Logs go to stderr, or to a non-blocking file writer when a directory is
//! configured. The filter comes from `ADAPTLOAD_LOG` if set, otherwise from
//! the configured level.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::ConfigError;

/// Environment variable overriding the configured filter.
pub const LOG_ENV_VAR: &str = "ADAPTLOAD_LOG";

/// Default filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log file name when logging to a directory.
pub const DEFAULT_LOG_FILE: &str = "adaptload.log";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `adaptload::loader=debug`.
    pub level: String,
    /// Write to `<directory>/<file_name>` instead of stderr.
    pub directory: Option<PathBuf>,
    pub file_name: String,
    /// Colored output (stderr only).
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
            file_name: DEFAULT_LOG_FILE.to_string(),
            ansi: true,
        }
    }
}

/// Build the filter for `config`, honoring [`LOG_ENV_VAR`].
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV_VAR) {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| ConfigError::Logging(format!("invalid level '{}': {}", config.level, e)))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when logging to a file; keep it alive for
/// the lifetime of the program or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = env_filter(config)?;

    match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|source| ConfigError::Io {
                path: directory.clone(),
                source,
            })?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(&config.file_name)
                .build(directory)
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                )
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(config.ansi)
                        .with_target(true),
                )
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.directory.is_none());
        assert_eq!(config.file_name, DEFAULT_LOG_FILE);
    }

    #[test]
    fn test_env_filter_accepts_directives() {
        let config = LoggingConfig {
            level: "warn,adaptload::loader=debug".into(),
            ..Default::default()
        };
        assert!(env_filter(&config).is_ok());
    }
}
