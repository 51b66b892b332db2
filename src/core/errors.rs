// Custom error types for the recognition/translation pipeline
//
// Collaborator failures never cross the core's public operations; they are
// logged and replaced by a neutral value. These types exist so the engine
// adapters, configuration loading and the HTTP edge can say what went wrong.

use std::time::Duration;
use thiserror::Error;

use crate::core::types::LanguagePair;

/// Failure reported by (or while talking to) an external engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine call failed: {0}")]
    Failed(String),

    #[error("Engine call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Translator for {0} is closed")]
    Closed(LanguagePair),

    #[error("Circuit breaker is open, {0} is unavailable")]
    CircuitOpen(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Network policy {0:?} not satisfied")]
    NetworkPolicy(crate::core::types::NetworkPolicy),
}

impl EngineError {
    /// Rate-limit and overload responses are worth waiting out
    pub fn is_retryable_status(&self) -> bool {
        matches!(self, EngineError::Status { status: 429 | 503, .. })
    }
}

/// Raised when a string is not one of the supported language codes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown language code: {0}")]
pub struct UnknownLanguage(pub String);

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid language for {variable}: {source}")]
    InvalidLanguage {
        variable: &'static str,
        #[source]
        source: UnknownLanguage,
    },

    #[error("Target language cannot be 'auto'")]
    AutoTarget,

    #[error("Font size must be in [8, 30], got {0}")]
    InvalidFontSize(f32),

    #[error("Invalid engine URL for {variable}: {value}")]
    InvalidUrl { variable: &'static str, value: String },

    #[error("Cache max entries must be > 0")]
    InvalidCacheSize,

    #[error("Engine timeout must be > 0 seconds")]
    InvalidTimeout,

    #[error("Environment variable parsing failed: {0}")]
    EnvVarError(String),
}

/// Errors surfaced at the service edge
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image probing failed: {0}")]
    ImageLoadFailed(#[from] image::ImageError),

    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] ConfigError),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let rate_limited = EngineError::Status { status: 429, body: String::new() };
        let overloaded = EngineError::Status { status: 503, body: String::new() };
        let bad_request = EngineError::Status { status: 400, body: String::new() };

        assert!(rate_limited.is_retryable_status());
        assert!(overloaded.is_retryable_status());
        assert!(!bad_request.is_retryable_status());
        assert!(!EngineError::Failed("boom".into()).is_retryable_status());
    }
}
