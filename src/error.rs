//! Error taxonomy for tool execution.
//!
//! Authorization prompts are not errors; see [`crate::engine::ExecOutcome`].

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ContractViolation,
    InvalidArgument,
    NotFound,
    Transport,
    InvalidResponse,
    Credential,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The tool contract forbids the requested shape.
    #[error("contract violation: {0}")]
    Contract(String),

    /// Arguments are missing, malformed or cannot be coerced.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A plugin or tool record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The outbound call failed or returned a non-success status.
    #[error("http request failed, tool={tool_id}, status={}\nresp={body}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".into()))]
    Transport {
        tool_id: i64,
        status: Option<u16>,
        body: String,
    },

    /// The response body does not satisfy the declared response schema.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// OAuth exchange, refresh or state handling failed.
    #[error("credential error: {0}")]
    Credential(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Contract(_) => ErrorKind::ContractViolation,
            Self::Argument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Self::Credential(_) => ErrorKind::Credential,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Nothing is retried at this layer; callers may rerun the whole tool call.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
