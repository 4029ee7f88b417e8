//! LLM error taxonomy

use thiserror::Error;

/// Errors from the LLM backend
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transient backend failure (overload, 5xx, timeout); retried with
    /// bounded exponential backoff before surfacing
    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// Content-policy block; fatal for this call, never retried
    #[error("backend refused request: {message}")]
    BackendRefused { message: String },

    /// Malformed, non-JSON, or schema-invalid response; not retried
    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::BackendUnavailable { .. } | LlmError::Network(_))
    }
}
