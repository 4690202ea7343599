//! Error taxonomy for Lexspace core.
//!
//! Every failure the engine can produce maps to exactly one [`Error`]
//! variant. Only [`Error::StoreUnavailable`] is eligible for a retry by the
//! caller; everything else points at a caller or configuration bug and is
//! surfaced as-is.

use thiserror::Error;

/// Result type alias for Lexspace core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by composition, indexing, querying and storage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A source record is missing a required field or carries an invalid value.
    #[error("validation error on field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// Invalid `(chunk_size, overlap)` configuration.
    #[error("chunking config error: {0}")]
    ChunkingConfig(String),

    /// An index definition is inconsistent (no spaces, unknown fields, ...).
    #[error("index config error: {0}")]
    IndexConfig(String),

    /// A query references a space or field the target index does not have,
    /// or carries invalid parameters.
    #[error("query composition error: {0}")]
    QueryComposition(String),

    /// The vector store failed or timed out.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A document's chunk batch could not be fully written. The previously
    /// committed version stays visible.
    #[error("partial ingestion of document `{document_id}`: {reason}")]
    PartialIngestion { document_id: String, reason: String },

    /// The text encoder model failed.
    #[error("encoder error: {0}")]
    Encoder(String),
}

impl Error {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the failed operation (with backoff).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// Stable snake_case name of the error kind, used in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation_error",
            Error::ChunkingConfig(_) => "chunking_config_error",
            Error::IndexConfig(_) => "index_config_error",
            Error::QueryComposition(_) => "query_composition_error",
            Error::StoreUnavailable(_) => "store_unavailable_error",
            Error::PartialIngestion { .. } => "partial_ingestion_error",
            Error::Encoder(_) => "encoder_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_errors_are_retryable() {
        assert!(Error::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!Error::QueryComposition("x".into()).is_retryable());
        assert!(!Error::validation("id", "missing").is_retryable());
        assert!(!Error::PartialIngestion {
            document_id: "d".into(),
            reason: "r".into()
        }
        .is_retryable());
    }

    #[test]
    fn validation_message_names_field() {
        let err = Error::validation("jurisdiction", "is required");
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("`jurisdiction`"));
    }
}
