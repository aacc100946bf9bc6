//! Error taxonomy for agentichat.
//!
//! A single error value carries a kind tag, a human-readable message, and an
//! optional HTTP status. Retryability is derived from the kind so that the
//! backend retry executor and the host agree on classification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categorized error kinds, serialized with their wire-format tags
/// (e.g. `USER_REJECTED`) when embedded in tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RateLimit,
    ContextTooLong,
    ModelNotFound,
    Timeout,
    ServerError,
    AuthError,
    PathOutsideSandbox,
    PathBlocked,
    FileNotFound,
    FileTooLarge,
    PermissionDenied,
    UserRejected,
    ToolNotAvailable,
    CommandFailed,
    MaxIterations,
    Unknown,
}

impl ErrorKind {
    /// The wire tag for this kind (the same string serde produces).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::ContextTooLong => "CONTEXT_TOO_LONG",
            Self::ModelNotFound => "MODEL_NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::ServerError => "SERVER_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::PathOutsideSandbox => "PATH_OUTSIDE_SANDBOX",
            Self::PathBlocked => "PATH_BLOCKED",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::UserRejected => "USER_REJECTED",
            Self::ToolNotAvailable => "TOOL_NOT_AVAILABLE",
            Self::CommandFailed => "COMMAND_FAILED",
            Self::MaxIterations => "MAX_ITERATIONS",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type used throughout the workspace.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    /// Category tag.
    pub kind: ErrorKind,

    /// Human-readable description.
    pub message: String,

    /// HTTP status when the error originated from a backend response.
    pub status: Option<u16>,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether the backend retry executor may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::RateLimit | ErrorKind::ServerError | ErrorKind::Timeout
        )
    }

    /// Classify a non-200 HTTP response from an LLM provider.
    ///
    /// 429 is a rate limit, 401/403 are auth failures, 404 is a missing
    /// model, 5xx are server errors. A 4xx body mentioning the context
    /// window maps to `CONTEXT_TOO_LONG` so the host can suggest
    /// compression instead of a blind retry.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimit,
            401 | 403 => ErrorKind::AuthError,
            404 => ErrorKind::ModelNotFound,
            s if s >= 500 => ErrorKind::ServerError,
            _ => {
                let lower = body.to_lowercase();
                if lower.contains("context length")
                    || lower.contains("maximum context")
                    || lower.contains("context_length_exceeded")
                {
                    ErrorKind::ContextTooLong
                } else {
                    ErrorKind::Unknown
                }
            }
        };

        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };

        Self {
            kind,
            message,
            status: Some(status),
        }
    }
}
