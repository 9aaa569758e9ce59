//! Chunk records: the smallest indexed unit of text.

use serde::{Deserialize, Serialize};

/// Namespace-local chunk identifier.
///
/// Ids are assigned monotonically per namespace and never reused within a
/// namespace's lifetime, so an id uniquely names a chunk for as long as the
/// namespace exists.
pub type ChunkId = u64;

/// A chunk of text owned by exactly one namespace.
///
/// Chunks are immutable once indexed: the only way to change one is to remove
/// it and re-index. The text is stored alongside the indexes so query results
/// can carry it without a separate document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Namespace-local monotonic id.
    pub id: ChunkId,

    /// The chunk text as it was indexed.
    pub text: String,

    /// Metadata describing where the chunk came from.
    pub metadata: ChunkMetadata,
}

/// Provenance metadata attached to a chunk by the ingestion collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Name of the source document the chunk was cut from.
    pub source_filename: String,

    /// Position of this chunk within its source document.
    pub chunk_index: u32,
}

impl ChunkMetadata {
    /// Create metadata for a chunk cut from `source_filename` at `chunk_index`.
    pub fn new<S: Into<String>>(source_filename: S, chunk_index: u32) -> Self {
        ChunkMetadata {
            source_filename: source_filename.into(),
            chunk_index,
        }
    }
}
