//! Error types for riskclause.
//!
//! Library crates use [`RiskClauseError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all riskclause operations.
#[derive(Debug, thiserror::Error)]
pub enum RiskClauseError {
    /// The risk table is missing, empty, or lacks required columns/values.
    #[error("data error: {message}")]
    Data { message: String },

    /// A numeric column of the risk table holds a non-numeric value.
    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    /// The input document cannot be opened or segmented.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The completion service answered with something that is not a JSON object.
    #[error("classification parse error: {message}")]
    ClassificationParse { message: String },

    /// The completion service kept rate limiting until the attempt budget ran out.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Any other completion service failure (HTTP error, bad envelope).
    #[error("service error: {0}")]
    Service(String),

    /// Network/transport error talking to the completion service.
    #[error("network error: {0}")]
    Network(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Persisted run state is unreadable or inconsistent.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Caller-supplied input rejected before any pipeline stage ran.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RiskClauseError>;

impl RiskClauseError {
    /// Create a data error from any displayable message.
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data {
            message: msg.into(),
        }
    }

    /// Create a malformed-input error from any displayable message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: msg.into(),
        }
    }

    /// Create a document parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a classification parse error from any displayable message.
    pub fn classification_parse(msg: impl Into<String>) -> Self {
        Self::ClassificationParse {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this failure is scoped to a single page.
    ///
    /// Page-local errors are logged and the page is skipped; everything else
    /// aborts the run.
    pub fn is_page_local(&self) -> bool {
        matches!(
            self,
            Self::ClassificationParse { .. }
                | Self::RateLimited { .. }
                | Self::Service(_)
                | Self::Network(_)
        )
    }
}
