//! Error types for changeprobe.
//!
//! All errors are strongly typed using thiserror. A query that simply
//! never sees the events it waits for is *not* an error: it ends in the
//! `Failed` status. Errors are reserved for broken tests (usage errors),
//! unreadable configuration, refused subscriptions and failed assertions.

use thiserror::Error;

/// Programming errors in the way a test drives the engine.
///
/// These indicate a broken test, never a runtime condition to tolerate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Evaluation already started. A query can only be evaluated once")]
    AlreadyEvaluated,

    #[error("Cannot change the timeout after the evaluation started")]
    TimeoutLocked,

    #[error("'{name}' must be a positive integer >= 1, got {value}")]
    InvalidEventCount {
        name: &'static str,
        value: usize,
    },

    #[error("{field} cannot be empty")]
    EmptyIdentifier {
        field: &'static str,
    },

    #[error("Invalid value pattern: {reason}")]
    InvalidPattern {
        reason: String,
    },
}

/// Errors loading a tracer configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read {
        path: String,
        message: String,
    },

    #[error("Failed to parse config: {message}")]
    Parse {
        message: String,
    },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Errors reported by an event source while wiring subscriptions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Subscription to {source_id}/{attribute} failed: {reason}")]
    SubscriptionFailed {
        source_id: String,
        attribute: String,
        reason: String,
    },
}

/// A failed event assertion.
///
/// The message is self-contained: it carries the expectation, the
/// failure reason, every captured event and the query description, so a
/// timing-sensitive failure can be diagnosed without re-running the test.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AssertionFailure {
    message: String,
}

impl AssertionFailure {
    /// Wraps an already rendered failure message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The full rendered failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Top-level error type for changeprobe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Assertion failed: {0}")]
    Assertion(#[from] AssertionFailure),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ProbeError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a usage error.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a source error.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if this is a failed assertion.
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(self, Self::Assertion(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// The assertion failure, if this error is one.
    #[must_use]
    pub const fn as_assertion(&self) -> Option<&AssertionFailure> {
        match self {
            Self::Assertion(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result type alias for changeprobe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;
