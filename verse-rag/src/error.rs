//! Error types for the `verse-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while indexing or matching verses.
///
/// Variants fall into two groups. Transient infrastructure failures
/// (embedding, vector store, timeouts) are worth retrying; everything else is
/// permanent and retrying would only repeat the failure. See
/// [`VerseError::is_retryable`].
#[derive(Debug, Error)]
pub enum VerseError {
    /// Missing credentials, invalid settings or an unusable backend.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The collection exists with a different vector dimension.
    #[error(
        "Dimension mismatch for collection '{collection}': expected {expected}, found {actual}"
    )]
    DimensionMismatch {
        /// The collection being opened or written.
        collection: String,
        /// The dimension the caller asked for.
        expected: usize,
        /// The dimension the collection was created with.
        actual: usize,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The collection has never been created, so nothing is loaded yet.
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),

    /// A verse record is missing a required field or holds an invalid value.
    #[error("Invalid verse record: {0}")]
    Validation(String),

    /// The corpus source is missing, empty or unparseable.
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// The quote cannot be checked as given.
    #[error("Invalid quote: {0}")]
    InvalidQuote(String),

    /// An embedding or index call did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that was cut off.
        operation: String,
        /// The deadline that expired.
        after: Duration,
    },
}

impl VerseError {
    /// Whether the failure is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding { .. } | Self::VectorStore { .. } | Self::Timeout { .. })
    }

    /// Whether the failure means the system cannot work at all with the
    /// current configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::DimensionMismatch { .. } | Self::Corpus(_))
    }

    pub(crate) fn store(backend: &str, message: impl Into<String>) -> Self {
        Self::VectorStore { backend: backend.to_string(), message: message.into() }
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        Self::Embedding { provider: provider.to_string(), message: message.into() }
    }
}

/// A convenience result type for verse operations.
pub type Result<T> = std::result::Result<T, VerseError>;
