// Error taxonomy for the chapter pipeline
//
// Transport failures are fatal to the stage that raised them. Parse failures are
// not errors at all (see `parsing::Parsed`). Store failures propagate to the
// caller. Every variant maps onto an `ErrorKind` that is persisted alongside a
// failed ChapterUnit so terminal states always carry an explanation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse error category recorded on a failed chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Store,
    InvalidState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Store => "store",
            ErrorKind::InvalidState => "invalid_state",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a Generator call after the transport layer's own retries
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("generator call timed out after {0}s")]
    Timeout(u64),

    #[error("generator unreachable: {0}")]
    Unreachable(String),

    #[error("generator returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed generator response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout(_) | TransportError::Unreachable(_) => true,
            TransportError::Http { status, .. } => *status == 429 || *status >= 500,
            TransportError::Malformed(_) => false,
        }
    }
}

/// Failure of a Store operation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    #[error("version conflict for chapter {chapter_id}: expected {expected}, got {actual}")]
    VersionConflict {
        chapter_id: String,
        expected: u32,
        actual: u32,
    },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Error surfaced by pipeline and compression operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid chapter state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Transport(_) => ErrorKind::Transport,
            PipelineError::Store(_) => ErrorKind::Store,
            PipelineError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_retryable_classification() {
        assert!(TransportError::Timeout(5).is_retryable());
        assert!(TransportError::Unreachable("refused".into()).is_retryable());
        assert!(TransportError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(TransportError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(!TransportError::Http { status: 404, body: String::new() }.is_retryable());
        assert!(!TransportError::Malformed("bad json".into()).is_retryable());
    }

    #[test]
    fn test_pipeline_error_kinds() {
        let e: PipelineError = TransportError::Timeout(1).into();
        assert_eq!(e.kind(), ErrorKind::Transport);

        let e: PipelineError = StoreError::Backend("disk full".into()).into();
        assert_eq!(e.kind(), ErrorKind::Store);

        assert_eq!(
            PipelineError::InvalidState("x".into()).kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_missing_chapter_is_a_store_error() {
        let e: PipelineError = StoreError::NotFound {
            entity: "chapter",
            key: "book/3".into(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Store);
        assert_eq!(e.to_string(), "chapter not found: book/3");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidState).unwrap();
        assert_eq!(json, "\"invalid_state\"");
    }
}
