use crate::client::evaluator::EvaluationError;
use crate::transport::TransportError;
use serde::Serialize;
use thiserror::Error;

/// Structured error context for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Component that raised the error (e.g., "token_cache", "script_template").
    pub source: Option<String>,
    /// Free-form detail (e.g., the file path or upstream status).
    pub details: Option<String>,
    /// 1-based attempt number when the error was raised inside the retry loop.
    pub attempt: Option<u32>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// Unified error type for the relay.
///
/// Only final classifications reach callers; retryable classes are consumed by the
/// orchestrator's attempt loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Token acquisition failed: {message}{}", format_context(.context))]
    TokenAcquisition {
        message: String,
        context: ErrorContext,
    },

    #[error("Script evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Access denied by upstream: {message}")]
    AccessDenied { message: String },

    #[error("Upstream error: HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream stream failure: {message}")]
    Stream { message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Failed after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

const STREAM_FAILURE_PREFIX: &str = "Upstream stream failure: ";

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(attempt) = ctx.attempt {
        parts.push(format!("attempt: {}", attempt));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

/// Caller-facing error shape: a status-like code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

impl Error {
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn token_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::TokenAcquisition {
            message: msg.into(),
            context,
        }
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream {
            message: msg.into(),
        }
    }

    /// Rebuild the error carried by a terminal `StreamEvent::Error`.
    pub fn from_stream_event(resp: ErrorResponse) -> Self {
        let message = match resp.message.strip_prefix(STREAM_FAILURE_PREFIX) {
            Some(rest) => rest.to_string(),
            None => resp.message.clone(),
        };
        Error::Stream { message }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::TokenAcquisition { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// Whether the orchestrator treats this class as retryable within its attempt budget.
    ///
    /// 403 is handled separately: it is retryable only while attempts remain.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::TokenAcquisition { .. } | Error::Evaluation(_)
        )
    }

    /// Status-like code for the caller boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::AccessDenied { .. } => 403,
            Error::Upstream { status, .. } => *status,
            Error::Cancelled => 499,
            Error::Configuration { .. } | Error::Io(_) | Error::Serialization(_) => 500,
            Error::Transport(_)
            | Error::TokenAcquisition { .. }
            | Error::Evaluation(_)
            | Error::Stream { .. }
            | Error::Exhausted { .. } => 502,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            Error::AccessDenied { message } | Error::Upstream { message, .. } => message.clone(),
            Error::Transport(e) => format!("upstream unreachable: {}", e),
            other => other.to_string(),
        };
        ErrorResponse {
            status: self.status_code(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_keep_their_status() {
        let err = Error::Upstream {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(
            err.to_response(),
            ErrorResponse {
                status: 429,
                message: "slow down".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn stream_event_keeps_stream_class() {
        let resp = Error::stream("Serialization error: eof").to_response();
        let err = Error::from_stream_event(resp);
        assert!(matches!(err, Error::Stream { ref message } if message == "Serialization error: eof"));
        assert_eq!(err.status_code(), 502);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Upstream stream failure: Serialization error: eof");
    }

    #[test]
    fn access_denied_maps_to_403() {
        let err = Error::AccessDenied {
            message: "Cloudflare 403".into(),
        };
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.to_response().message, "Cloudflare 403");
    }

    #[test]
    fn token_errors_are_retryable_gateway_failures() {
        let err = Error::token_with_context(
            "script timed out",
            ErrorContext::new().with_source("token_cache").with_attempt(1),
        );
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 502);
        let text = err.to_string();
        assert!(text.contains("source: token_cache"));
        assert!(text.contains("attempt: 1"));
    }

    #[test]
    fn exhausted_reports_attempt_count() {
        let err = Error::Exhausted { attempts: 2 };
        assert_eq!(err.to_string(), "Failed after 2 attempts");
        assert_eq!(err.status_code(), 502);
    }
}
