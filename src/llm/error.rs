use std::time::Duration;

use thiserror::Error;

/// Token usage reported by the backend for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Call-level failure taxonomy for the LLM client.
///
/// `Status` and `Timeout` are transient and subject to retry; `NonJson`
/// carries the raw backend text so callers can recover or archive it;
/// `Config` is raised at construction time and never retried.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend output is not valid JSON: {raw}")]
    NonJson { raw: String, usage: Usage },

    #[error("backend response carried no usable content")]
    EmptyResponse,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether this failure class should be retried with backoff
    pub fn is_retriable(&self) -> bool {
        match self {
            LlmError::Status { status, .. } => matches!(status, 408 | 429 | 500 | 503),
            LlmError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LlmError::Timeout(_) => true,
            LlmError::NonJson { .. } | LlmError::EmptyResponse | LlmError::Config(_) => false,
        }
    }
}
