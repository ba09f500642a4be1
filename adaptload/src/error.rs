//! Error types for the adaptive loading core.
//!
//! Load failures are classified as *transient* (timeouts, network errors,
//! content errors reported by the host) or *programmer* errors (invalid state
//! transitions, loading a handle twice). Transient failures are retried by the
//! [`AdaptiveLoader`](crate::loader::AdaptiveLoader); they never escape the
//! loading path as panics and are surfaced to the host as
//! [`LoadState::Failed`](crate::loader::LoadState::Failed).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::loader::LoadState;

/// Errors produced while loading a resource.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    /// The attempt did not complete within the per-attempt timeout.
    #[error("load attempt timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Network-level failure reported by the host's load function.
    #[error("network error: {0}")]
    Network(String),

    /// The content was fetched but could not be used.
    #[error("content error: {0}")]
    Content(String),

    /// The registration was disposed while work was pending.
    #[error("load cancelled")]
    Cancelled,

    /// `load` was invoked twice on the same registration.
    #[error("resource '{id}' has already started loading")]
    AlreadyStarted { id: String },

    /// `load` was invoked outside of a Tokio runtime.
    #[error("no async runtime available to load '{id}'")]
    NoRuntime { id: String },

    /// A state transition outside the loader state machine was attempted.
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: LoadState, to: LoadState },
}

impl LoadError {
    /// Returns true for failures the retry policy applies to.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LoadError::Timeout(_) | LoadError::Network(_) | LoadError::Content(_)
        )
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid INI.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A key holds a value that cannot be used.
    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Logging could not be initialized.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display() {
        let err = LoadError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "load attempt timed out after 10000ms");

        let err = LoadError::AlreadyStarted {
            id: "hero".to_string(),
        };
        assert_eq!(err.to_string(), "resource 'hero' has already started loading");
    }

    #[test]
    fn test_transient_classification() {
        assert!(LoadError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(LoadError::Network("reset".into()).is_transient());
        assert!(LoadError::Content("bad".into()).is_transient());
        assert!(!LoadError::Cancelled.is_transient());
        assert!(!LoadError::NoRuntime { id: "a".into() }.is_transient());
        assert!(!LoadError::InvalidTransition {
            from: LoadState::Loaded,
            to: LoadState::Loading,
        }
        .is_transient());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            section: "loader".into(),
            key: "retry_ceiling".into(),
            value: "many".into(),
            reason: "expected an integer".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value 'many' for [loader] retry_ceiling: expected an integer"
        );
    }
}
