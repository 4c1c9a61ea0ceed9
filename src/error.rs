//! Error types for the evaluation harness

use thiserror::Error;

/// Result type alias for evaluation operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur during evaluation
#[derive(Error, Debug)]
pub enum EvalError {
    /// A scorer returned a score outside `[0, 1]` or NaN
    #[error("invalid score from scorer '{scorer}': {value}")]
    InvalidScore { scorer: String, value: f64 },

    /// A single scorer failed or timed out
    #[error("scorer '{0}' failed: {1}")]
    ScorerFailed(String, String),

    /// Every scorer in a dispatcher run failed
    #[error("all scorers failed: {0}")]
    DispatcherFailed(#[source] anyhow::Error),

    /// An observability hook (logger, exporter, span) failed
    #[error("observability hook failed: {0}")]
    ObservabilityFailed(String),

    /// `require_score` found a result under its threshold
    #[error("score {actual:.3} below required threshold {threshold:.3}")]
    ThresholdFailed { actual: f64, threshold: f64 },

    /// Bad dispatcher/runner configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// Failed to load an eval set or test file
    #[error("failed to load eval set: {0}")]
    LoadError(String),

    /// Failed to parse an eval set or test file
    #[error("failed to parse eval set: {0}")]
    ParseError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
