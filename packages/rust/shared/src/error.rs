//! Error types for TenderWatch.
//!
//! Library crates use [`TenderError`] for run-level failures and the stage
//! errors below for per-notice outcomes. The CLI wraps these with
//! `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for run-level TenderWatch operations.
///
/// Any of these aborts the run; per-notice problems are reported through
/// [`PipelineError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum TenderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside the per-notice fetch cascade.
    #[error("network error: {0}")]
    Network(String),

    /// Markup or payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid record, invariant violation, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TenderError>;

impl TenderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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
}

// ---------------------------------------------------------------------------
// Stage errors
// ---------------------------------------------------------------------------

/// Whether a fetch failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    /// Network error, timeout, or 5xx.
    Transient,
    /// 4xx, structure mismatch, or content below threshold.
    Permanent,
}

/// A failed fetch attempt, or the exhausted cascade for one notice.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} fetch failure ({tier}): {message}")]
pub struct FetchError {
    pub kind: FetchFailureKind,
    /// Name of the strategy that produced the failure, or `cascade`.
    pub tier: String,
    pub message: String,
}

impl FetchError {
    pub fn transient(tier: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            kind: FetchFailureKind::Transient,
            tier: tier.into(),
            message: msg.into(),
        }
    }

    pub fn permanent(tier: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            kind: FetchFailureKind::Permanent,
            tier: tier.into(),
            message: msg.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FetchFailureKind::Transient
    }
}

/// Content could not be turned into usable text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("extraction failure: {0}")]
pub struct ExtractionError(pub String);

/// The completion service could not produce a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    /// Connection refused, DNS failure, body read error.
    #[error("completion transport error: {0}")]
    Transport(String),

    /// No response within the configured timeout.
    #[error("completion timed out after {0}s")]
    Timeout(u64),

    /// Non-success HTTP status.
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl CompletionError {
    /// Timeouts, transport errors and 5xx are retried; 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
        }
    }
}

/// Failures inside the decision engine's model consultation.
///
/// Every variant degrades to a REVIEW decision; none escapes the engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecisionError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Model output is not a JSON object.
    #[error("response parse failure: {0}")]
    ResponseParse(String),

    /// Model output is JSON but fields have the wrong shape.
    #[error("validation failure: {0}")]
    Validation(String),
}

/// Per-notice failure reported by the pipeline. Never aborts the run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl PipelineError {
    /// Short machine-readable failure kind for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(e) if e.is_transient() => "fetch_transient",
            Self::Fetch(_) => "fetch_permanent",
            Self::Extraction(_) => "extraction",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TenderError::config("missing base_url");
        assert_eq!(err.to_string(), "config error: missing base_url");

        let err = TenderError::validation("fit_label does not match decision_state");
        assert!(err.to_string().contains("fit_label"));
    }

    #[test]
    fn completion_retryability() {
        assert!(CompletionError::Timeout(60).is_retryable());
        assert!(CompletionError::Transport("refused".into()).is_retryable());
        assert!(
            CompletionError::Status {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !CompletionError::Status {
                status: 404,
                body: "model not found".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn pipeline_error_kind() {
        let err: PipelineError = FetchError::transient("direct", "timeout").into();
        assert_eq!(err.kind(), "fetch_transient");
        let err: PipelineError = FetchError::permanent("cascade", "all tiers failed").into();
        assert_eq!(err.kind(), "fetch_permanent");
        let err: PipelineError = ExtractionError("empty text".into()).into();
        assert_eq!(err.kind(), "extraction");
    }
}
