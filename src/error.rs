//! Error types used by the thunkvisor runtime and handlers.
//!
//! This module defines two main error enums:
//!
//! - [`ConfigError`] — fatal setup/lifecycle errors raised by the runtime itself.
//! - [`ThunkError`] — errors raised while executing a thunk's middleware pipeline.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics
//! and additional utilities such as [`ThunkError::is_retryable`].

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by runtime setup and lifecycle.
///
/// These represent failures in the coordination layer itself,
/// such as a shutdown sequence exceeding its grace period or a
/// store composed from two schemas claiming the same subtree.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Two schemas were registered under the same top-level name.
    #[error("schema {name:?} is already registered; each schema must own a disjoint subtree")]
    DuplicateSchema {
        /// The conflicting schema name.
        name: String,
    },

    /// Shutdown grace period was exceeded; some supervisor tasks remained stuck.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Labels of supervisor/resource tasks that did not stop in time.
        stuck: Vec<String>,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use thunkvisor::ConfigError;
    ///
    /// let err = ConfigError::DuplicateSchema { name: "todos".into() };
    /// assert_eq!(err.as_label(), "config_duplicate_schema");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::DuplicateSchema { .. } => "config_duplicate_schema",
            ConfigError::GraceExceeded { .. } => "config_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ConfigError::DuplicateSchema { name } => format!("duplicate schema: {name}"),
            ConfigError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck tasks={stuck:?}")
            }
        }
    }
}

/// # Errors produced by thunk execution.
///
/// These represent failures inside a thunk's middleware pipeline or while
/// reading a managed resource. `Fail` is retryable, the rest are not:
/// `NextCalledTwice` is a programming error and must surface loudly rather
/// than be swallowed by a catch-all stage.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ThunkError {
    /// A middleware stage failed; the pipeline is abandoned from that stage down.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The instance was halted by its supervisor (latest-wins preemption or shutdown).
    #[error("instance canceled")]
    Canceled,

    /// A middleware stage invoked its continuation more than once.
    #[error("next() called twice at pipeline stage {index}")]
    NextCalledTwice {
        /// Zero-based index of the offending stage.
        index: usize,
    },

    /// A managed resource has not provided a value yet.
    #[error("resource {resource:?} has not provided a value yet")]
    Unavailable {
        /// Name the resource was managed under.
        resource: String,
    },
}

impl ThunkError {
    /// Shorthand for [`ThunkError::Fail`] from any displayable error.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        ThunkError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use thunkvisor::ThunkError;
    ///
    /// let err = ThunkError::fail("boom");
    /// assert_eq!(err.as_label(), "thunk_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ThunkError::Fail { .. } => "thunk_failed",
            ThunkError::Canceled => "thunk_canceled",
            ThunkError::NextCalledTwice { .. } => "thunk_double_next",
            ThunkError::Unavailable { .. } => "resource_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ThunkError::Fail { error } => format!("error: {error}"),
            ThunkError::Canceled => "instance canceled".to_string(),
            ThunkError::NextCalledTwice { index } => {
                format!("next() called twice at stage {index}")
            }
            ThunkError::Unavailable { resource } => format!("resource not ready: {resource}"),
        }
    }

    /// Indicates whether the error is safe to retry.
    ///
    /// Returns `true` only for [`ThunkError::Fail`]; cancellation, double-`next`
    /// and resource misses are not transient handler failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ThunkError::Fail { .. })
    }
}
