//! Error types for the Palisade library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`PalisadeError`] enum. Index-level corruption is scoped to a single
//! namespace (the namespace fails to load, nothing else is affected), and
//! cache failures are always non-fatal: callers treat them as a miss.
//!
//! # Examples
//!
//! ```
//! use palisade::error::{PalisadeError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(PalisadeError::namespace_not_found("engineering"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use anyhow;
use thiserror::Error;

/// The main error type for Palisade operations.
#[derive(Error, Debug)]
pub enum PalisadeError {
    /// The named namespace does not exist in the registry.
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// A namespace with this name already exists.
    #[error("Namespace already exists: {0}")]
    NamespaceAlreadyExists(String),

    /// An embedding vector had the wrong number of dimensions.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension the index was configured with.
        expected: usize,
        /// The dimension of the offending vector.
        actual: usize,
    },

    /// The referenced chunk id is not present in the namespace.
    #[error("Chunk not found: {0}")]
    ChunkNotFound(u64),

    /// A persisted index failed checksum or deserialization.
    ///
    /// Fatal for the affected namespace only; other namespaces keep working.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// The cache backend failed. Always non-fatal: treated as a miss.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Operation cancelled via a cancellation token.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Analysis-related errors (tokenization).
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Embedding provider failure.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// I/O errors (file operations etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with PalisadeError.
pub type Result<T> = std::result::Result<T, PalisadeError>;

impl PalisadeError {
    /// Create a new namespace-not-found error.
    pub fn namespace_not_found<S: Into<String>>(name: S) -> Self {
        PalisadeError::NamespaceNotFound(name.into())
    }

    /// Create a new namespace-already-exists error.
    pub fn namespace_exists<S: Into<String>>(name: S) -> Self {
        PalisadeError::NamespaceAlreadyExists(name.into())
    }

    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        PalisadeError::DimensionMismatch { expected, actual }
    }

    /// Create a new chunk-not-found error.
    pub fn chunk_not_found(chunk_id: u64) -> Self {
        PalisadeError::ChunkNotFound(chunk_id)
    }

    /// Create a new corrupt-index error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        PalisadeError::CorruptIndex(msg.into())
    }

    /// Create a new cache-unavailable error.
    pub fn cache<S: Into<String>>(msg: S) -> Self {
        PalisadeError::CacheUnavailable(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        PalisadeError::Cancelled(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        PalisadeError::InvalidArgument(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        PalisadeError::Analysis(msg.into())
    }

    /// Create a new embedding error.
    pub fn embedding<S: Into<String>>(msg: S) -> Self {
        PalisadeError::Embedding(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PalisadeError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = PalisadeError::namespace_not_found("legal");
        assert_eq!(error.to_string(), "Namespace not found: legal");

        let error = PalisadeError::namespace_exists("legal");
        assert_eq!(error.to_string(), "Namespace already exists: legal");

        let error = PalisadeError::dimension_mismatch(1024, 768);
        assert_eq!(
            error.to_string(),
            "Dimension mismatch: expected 1024, got 768"
        );

        let error = PalisadeError::chunk_not_found(42);
        assert_eq!(error.to_string(), "Chunk not found: 42");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let palisade_error = PalisadeError::from(io_error);

        match palisade_error {
            PalisadeError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_corrupt_index_is_scoped_message() {
        let error = PalisadeError::corrupt("vector.idx checksum mismatch");
        assert_eq!(
            error.to_string(),
            "Corrupt index: vector.idx checksum mismatch"
        );
    }
}
