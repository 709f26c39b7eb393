//! Error types for write-back operations
//!
//! Every failure the write path can raise is one of a small, closed set of
//! kinds so callers can branch on [`ErrorKind`] instead of matching messages.

use thiserror::Error;

/// Coarse classification of a [`WriteError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Protocol,
    Transport,
    Validation,
    PartialBatchFailure,
    Configuration,
}

#[derive(Debug, Error)]
pub enum WriteError {
    /// Credentials rejected by the platform (HTTP 401/403)
    #[error("authentication rejected by planning platform (HTTP {status})")]
    Authentication { status: u16 },

    /// Platform answered but broke the expected contract
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Network failure, timeout or non-2xx response
    #[error("transport error: {detail}{}", fmt_body(.body))]
    Transport {
        detail: String,
        status: Option<u16>,
        body: Option<String>,
    },

    /// Malformed caller input, rejected before any network call
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// One or more parallel batches failed; nothing was committed
    #[error("{} of {total_batches} batches failed: {failed_batches:?}", .failed_batches.len())]
    PartialBatchFailure {
        failed_batches: Vec<usize>,
        total_batches: usize,
        details: Vec<String>,
    },

    /// Missing settings or write operations disabled
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn fmt_body(body: &Option<String>) -> String {
    match body {
        Some(body) if !body.trim().is_empty() => format!(" (response body: {})", body.trim()),
        _ => String::new(),
    }
}

impl WriteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WriteError::Authentication { .. } => ErrorKind::Authentication,
            WriteError::Protocol(_) => ErrorKind::Protocol,
            WriteError::Transport { .. } => ErrorKind::Transport,
            WriteError::Validation(_) => ErrorKind::Validation,
            WriteError::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            WriteError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Transport failure with no HTTP response attached
    pub fn transport(detail: impl Into<String>) -> Self {
        WriteError::Transport {
            detail: detail.into(),
            status: None,
            body: None,
        }
    }

    /// Transport failure for a non-2xx response
    pub fn http_status(context: &str, status: u16, body: impl Into<String>) -> Self {
        WriteError::Transport {
            detail: format!("{} failed with HTTP status {}", context, status),
            status: Some(status),
            body: Some(body.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        WriteError::Validation(vec![message.into()])
    }
}

pub type Result<T, E = WriteError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_body() {
        let err = WriteError::http_status("Batch 2", 500, "key figure XYZID unknown");
        assert_eq!(err.kind(), ErrorKind::Transport);
        let text = err.to_string();
        assert!(text.contains("HTTP status 500"));
        assert!(text.contains("key figure XYZID unknown"));
    }

    #[test]
    fn test_transport_display_without_body() {
        let err = WriteError::transport("request timed out");
        assert_eq!(err.to_string(), "transport error: request timed out");
    }

    #[test]
    fn test_validation_joins_messages() {
        let err = WriteError::Validation(vec!["row 1: a".to_string(), "row 4: b".to_string()]);
        assert_eq!(err.to_string(), "validation failed: row 1: a; row 4: b");
    }

    #[test]
    fn test_partial_batch_failure_display() {
        let err = WriteError::PartialBatchFailure {
            failed_batches: vec![3],
            total_batches: 5,
            details: vec![],
        };
        assert_eq!(err.kind(), ErrorKind::PartialBatchFailure);
        assert_eq!(err.to_string(), "1 of 5 batches failed: [3]");
    }
}
