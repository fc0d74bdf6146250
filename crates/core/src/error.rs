use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unreadable document: {0}")]
    UnreadableDocument(String),

    #[error("document has no extractable text after normalization")]
    EmptyDocument,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no grounding found in document {document_id} for query: {query}")]
    NoGroundingFound { document_id: String, query: String },

    #[error(
        "generation unavailable for document {document_id} after {attempts} attempt(s): {message}"
    )]
    GenerationUnavailable {
        document_id: String,
        query: String,
        attempts: u32,
        retryable: bool,
        message: String,
    },

    #[error("narration failed: {0}")]
    NarrationFailed(String),
}

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("collaborator call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure classes the generation boundary coerces collaborator errors into.
/// `RateLimited`, `Unavailable` and `Timeout` are retryable; `InvalidRequest`
/// is surfaced immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    InvalidRequest,
    Unavailable,
    Timeout,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::InvalidRequest)
    }
}

/// Cloneable failure record, so cache waiters coalesced onto one in-flight
/// generation all observe the same outcome.
#[derive(Debug, Clone)]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
