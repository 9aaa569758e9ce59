//! Per-namespace state: the paired indexes plus the chunk store.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::chunk::{Chunk, ChunkId};
use crate::error::{PalisadeError, Result};
use crate::namespace::{NamespaceMetadata, NamespaceStats};
use crate::sparse::SparseIndex;
use crate::storage;
use crate::vector::VectorIndex;

const CHUNKS_MAGIC: &[u8; 4] = b"PLSC";

/// File names of the three artifacts a persisted namespace consists of.
pub const VECTOR_FILE: &str = "vector.idx";
/// Sparse index artifact name.
pub const SPARSE_FILE: &str = "sparse.idx";
/// Chunk store artifact name.
pub const CHUNKS_FILE: &str = "chunks.idx";
/// Namespace metadata record name.
pub const META_FILE: &str = "meta.json";

#[derive(Serialize, Deserialize)]
struct ChunkStorePayload {
    next_chunk_id: ChunkId,
    chunks: Vec<Chunk>,
}

/// The mutable state of one namespace.
///
/// Invariant: the vector index, sparse index, and chunk store always contain
/// exactly the same set of chunk ids. Every mutation path either updates all
/// three or rolls back the ones it already touched.
#[derive(Debug, Clone)]
pub struct NamespaceState {
    /// Descriptive metadata.
    pub metadata: NamespaceMetadata,
    /// Dense index.
    pub vector: VectorIndex,
    /// Sparse BM25 index.
    pub sparse: SparseIndex,
    /// Chunk id -> chunk text and provenance.
    pub chunks: AHashMap<ChunkId, Chunk>,
    /// Next id to assign; monotonic, never reused.
    pub next_chunk_id: ChunkId,
    /// Set under the entry's write lock when the namespace is deleted. A
    /// writer that resolved the entry before the delete finds this flag and
    /// must not touch the disk again.
    pub(crate) tombstoned: bool,
}

impl NamespaceState {
    /// Create empty state for a fresh namespace.
    pub fn new(
        metadata: NamespaceMetadata,
        dimension: usize,
        params: crate::sparse::Bm25Params,
    ) -> Self {
        NamespaceState {
            metadata,
            vector: VectorIndex::new(dimension),
            sparse: SparseIndex::new(params),
            chunks: AHashMap::new(),
            next_chunk_id: 0,
            tombstoned: false,
        }
    }

    /// Number of indexed chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of distinct source documents among the chunks.
    pub fn doc_count(&self) -> usize {
        self.chunks
            .values()
            .map(|chunk| chunk.metadata.source_filename.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Snapshot stats for this namespace.
    pub fn stats(&self) -> NamespaceStats {
        NamespaceStats {
            metadata: self.metadata.clone(),
            doc_count: self.doc_count(),
            chunk_count: self.chunk_count(),
            term_count: self.sparse.term_count(),
        }
    }

    /// Serialize all three artifacts plus the metadata record into `dir`.
    ///
    /// `dir` must already exist. The caller is responsible for making the
    /// directory swap atomic when that matters (backups write to a temp
    /// directory and rename).
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        self.vector.save(&dir.join(VECTOR_FILE))?;
        self.sparse.save(&dir.join(SPARSE_FILE))?;

        let mut chunks: Vec<Chunk> = self.chunks.values().cloned().collect();
        chunks.sort_by_key(|chunk| chunk.id);
        let payload = ChunkStorePayload {
            next_chunk_id: self.next_chunk_id,
            chunks,
        };
        let bytes = bincode::serialize(&payload)
            .map_err(|e| PalisadeError::other(format!("chunk store encode failed: {e}")))?;
        storage::write_artifact(&dir.join(CHUNKS_FILE), CHUNKS_MAGIC, &bytes)?;

        let meta_json = serde_json::to_string_pretty(&self.metadata)?;
        std::fs::write(dir.join(META_FILE), meta_json)?;
        Ok(())
    }

    /// Load a namespace's state back from `dir`.
    ///
    /// Any missing, truncated, or mismatched artifact yields `CorruptIndex`:
    /// a namespace either loads whole or not at all.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let meta_json = std::fs::read_to_string(dir.join(META_FILE)).map_err(|e| {
            PalisadeError::corrupt(format!("{}: missing metadata: {e}", dir.display()))
        })?;
        let metadata: NamespaceMetadata = serde_json::from_str(&meta_json).map_err(|e| {
            PalisadeError::corrupt(format!("{}: bad metadata: {e}", dir.display()))
        })?;

        let vector = VectorIndex::load(&dir.join(VECTOR_FILE))?;
        let sparse = SparseIndex::load(&dir.join(SPARSE_FILE))?;

        let bytes = storage::read_artifact(&dir.join(CHUNKS_FILE), CHUNKS_MAGIC)?;
        let payload: ChunkStorePayload = bincode::deserialize(&bytes).map_err(|e| {
            PalisadeError::corrupt(format!("{}: chunk store decode failed: {e}", dir.display()))
        })?;

        let mut chunks = AHashMap::new();
        for chunk in payload.chunks {
            chunks.insert(chunk.id, chunk);
        }

        let state = NamespaceState {
            metadata,
            vector,
            sparse,
            chunks,
            next_chunk_id: payload.next_chunk_id,
            tombstoned: false,
        };
        state.verify_integrity(dir)?;
        Ok(state)
    }

    /// Check the dual-index invariant after a load.
    fn verify_integrity(&self, dir: &Path) -> Result<()> {
        if self.vector.len() != self.chunks.len() || self.sparse.len() != self.chunks.len() {
            return Err(PalisadeError::corrupt(format!(
                "{}: index cardinality mismatch (vector {}, sparse {}, chunks {})",
                dir.display(),
                self.vector.len(),
                self.sparse.len(),
                self.chunks.len()
            )));
        }
        for chunk_id in self.chunks.keys() {
            if self.vector.get(*chunk_id).is_none() || !self.sparse.contains(*chunk_id) {
                return Err(PalisadeError::corrupt(format!(
                    "{}: chunk {chunk_id} missing from an index",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}
