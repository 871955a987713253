//! Typed errors for model requests
//!
//! Callers branch on the variant to pick a user-facing message instead of
//! matching on error text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Model server could not be reached at all
    #[error("Model server unreachable: {0}")]
    Unreachable(String),

    /// Request did not finish in time
    #[error("Model request timed out: {0}")]
    Timeout(String),

    /// Requested model is not installed (HTTP 404)
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Malformed request (HTTP 400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server-side failure (HTTP 5xx)
    #[error("Service error: {0}")]
    ServiceError(String),

    /// The body could not be understood
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    /// Convert HTTP status code and error text into typed LlmError
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            404 => LlmError::ModelNotFound(error_text),
            400 => LlmError::BadRequest(error_text),
            500..=599 => LlmError::ServiceError(error_text),
            _ => LlmError::Other(anyhow::anyhow!("HTTP {}: {}", status, error_text)),
        }
    }

    /// Convert network/connection errors into typed LlmError
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout(e.to_string())
        } else if e.is_connect() {
            LlmError::Unreachable(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else if e.is_decode() {
            LlmError::InvalidResponse(e.to_string())
        } else {
            LlmError::Other(e.into())
        }
    }

    /// Short explanation suitable for showing in the chat window
    pub fn user_message(&self) -> String {
        match self {
            LlmError::Unreachable(_) => {
                "The language model server is not reachable. Is Ollama running?".to_string()
            }
            LlmError::Timeout(_) => "The language model took too long to answer.".to_string(),
            LlmError::ModelNotFound(detail) => format!(
                "The configured model is not available ({}). Pull it with `ollama pull`.",
                detail.trim()
            ),
            LlmError::BadRequest(detail) => {
                format!("The model rejected the request: {}", detail.trim())
            }
            LlmError::ServiceError(_) => "The language model server failed.".to_string(),
            LlmError::InvalidResponse(_) => {
                "The language model returned a response that could not be read.".to_string()
            }
            LlmError::Other(e) => e.to_string(),
        }
    }
}
