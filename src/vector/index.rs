//! Flat (exact) vector index.
//!
//! Stores every vector in memory and scans them all on search. Exact
//! nearest-neighbor results with deterministic ordering matter more here than
//! sublinear search: namespaces hold document chunks, not web-scale corpora,
//! and the hybrid scorer depends on stable, reproducible rankings.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::chunk::ChunkId;
use crate::error::{PalisadeError, Result};
use crate::storage;
use crate::vector::Vector;

const MAGIC: &[u8; 4] = b"PLSV";

/// Serialized form of the index.
#[derive(Serialize, Deserialize)]
struct VectorIndexPayload {
    dimension: usize,
    entries: Vec<(ChunkId, Vec<f32>)>,
}

/// An exact nearest-neighbor index over fixed-dimension vectors.
///
/// `Search` returns `(chunk id, squared-L2 distance)` pairs ascending by
/// distance, ties broken by ascending chunk id. Results never depend on
/// insertion order; only the on-disk layout does.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    /// Insertion-ordered storage; layout only, never affects rankings.
    entries: Vec<(ChunkId, Vector)>,
    /// Chunk id -> position in `entries`.
    positions: AHashMap<ChunkId, usize>,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        VectorIndex {
            dimension,
            entries: Vec::new(),
            positions: AHashMap::new(),
        }
    }

    /// The dimension this index accepts.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the chunk ids present in the index, in insertion order.
    pub fn chunk_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Get the vector stored for a chunk, if present.
    pub fn get(&self, chunk_id: ChunkId) -> Option<&Vector> {
        self.positions.get(&chunk_id).map(|&pos| &self.entries[pos].1)
    }

    /// Add a vector for a chunk, replacing any previous vector for that id.
    ///
    /// Fails with `DimensionMismatch` if the vector has the wrong length and
    /// `InvalidArgument` if it contains NaN or infinite components.
    pub fn add(&mut self, chunk_id: ChunkId, vector: Vector) -> Result<()> {
        if vector.dimension() != self.dimension {
            return Err(PalisadeError::dimension_mismatch(
                self.dimension,
                vector.dimension(),
            ));
        }
        if !vector.is_valid() {
            return Err(PalisadeError::invalid_argument(format!(
                "vector for chunk {chunk_id} contains NaN or infinite values"
            )));
        }

        match self.positions.get(&chunk_id) {
            Some(&pos) => self.entries[pos].1 = vector,
            None => {
                self.positions.insert(chunk_id, self.entries.len());
                self.entries.push((chunk_id, vector));
            }
        }
        Ok(())
    }

    /// Remove a chunk's vector. Fails with `ChunkNotFound` if absent.
    pub fn remove(&mut self, chunk_id: ChunkId) -> Result<()> {
        let pos = self
            .positions
            .remove(&chunk_id)
            .ok_or(PalisadeError::ChunkNotFound(chunk_id))?;

        self.entries.swap_remove(pos);
        if pos < self.entries.len() {
            // The formerly-last entry moved into `pos`.
            let moved_id = self.entries[pos].0;
            self.positions.insert(moved_id, pos);
        }
        Ok(())
    }

    /// Find the `k` nearest vectors to `query`.
    ///
    /// Returns `(chunk id, squared-L2 distance)` ascending by distance, ties
    /// broken by ascending chunk id. An empty index yields an empty list.
    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<(ChunkId, f32)>> {
        if query.dimension() != self.dimension {
            return Err(PalisadeError::dimension_mismatch(
                self.dimension,
                query.dimension(),
            ));
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(ChunkId, f32)> = self
            .entries
            .iter()
            .map(|(id, vector)| (*id, query.squared_euclidean(vector)))
            .collect();

        hits.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Serialize the index to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let payload = VectorIndexPayload {
            dimension: self.dimension,
            entries: self
                .entries
                .iter()
                .map(|(id, vector)| (*id, vector.as_slice().to_vec()))
                .collect(),
        };
        let bytes = bincode::serialize(&payload)
            .map_err(|e| PalisadeError::other(format!("vector index encode failed: {e}")))?;
        storage::write_artifact(path, MAGIC, &bytes)
    }

    /// Deserialize an index from `path`.
    ///
    /// A checksum or decode failure surfaces as `CorruptIndex`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = storage::read_artifact(path, MAGIC)?;
        let payload: VectorIndexPayload = bincode::deserialize(&bytes).map_err(|e| {
            PalisadeError::corrupt(format!("{}: vector index decode failed: {e}", path.display()))
        })?;

        let mut index = VectorIndex::new(payload.dimension);
        for (chunk_id, values) in payload.entries {
            index.add(chunk_id, Vector::new(values))?;
        }
        Ok(index)
    }
}
