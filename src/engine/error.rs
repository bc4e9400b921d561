//! Engine error types

use thiserror::Error;

/// Engine error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Network, message)
    }

    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::ModelUnavailable, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::InvalidRequest, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::MalformedResponse, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Unknown, message)
    }
}

/// Where an engine call went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Local runtime unreachable or the connection dropped
    Network,
    /// Model id unknown to the runtime, or the pull failed
    ModelUnavailable,
    /// Runtime rejected the request (4xx)
    InvalidRequest,
    /// Body could not be decoded
    MalformedResponse,
    Unknown,
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            EngineError::network(format!("Connection failed: {e}"))
        } else if e.is_decode() {
            EngineError::malformed(format!("Invalid response body: {e}"))
        } else {
            EngineError::unknown(format!("Request failed: {e}"))
        }
    }
}
