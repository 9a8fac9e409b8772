//! Error types for the completion pipeline.
//!
//! None of these escape to the editor integration: [`crate::completion`]
//! folds every variant into "no suggestion". They exist so the dispatcher can
//! classify failures and log them at the right level.

use thiserror::Error;

/// Errors raised while talking to the completion backend or loading config.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The caller's cancellation token fired.
    #[error("completion cancelled")]
    Cancelled,

    /// The backend did not answer within the request timeout.
    #[error("completion request timed out")]
    Timeout,

    /// Nothing is listening at the configured server URL.
    #[error("connection refused by completion server")]
    ConnectionRefused,

    /// The backend answered with a body missing the expected fields.
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    /// The backend answered with a non-success status.
    #[error("HTTP {status} from completion server: {body}")]
    Http { status: u16, body: String },

    /// Any other transport failure.
    #[error("completion request failed: {0}")]
    Unknown(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CompletionError {
    /// Stable short label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Http { .. } => "http",
            Self::Unknown(_) => "unknown",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_decode() {
            return Self::MalformedResponse(err.to_string());
        }
        if is_connection_refused(&err) {
            return Self::ConnectionRefused;
        }
        Self::Unknown(err.to_string())
    }
}

/// Walk the source chain looking for an `ECONNREFUSED`.
///
/// reqwest wraps the hyper/io error a few levels deep, so fall back to the
/// rendered message when no `io::Error` surfaces.
fn is_connection_refused(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    let message = format!("{:?}", err).to_lowercase();
    message.contains("connection refused") || message.contains("econnrefused")
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CompletionError>;
