//! Hybrid scoring: merging sparse and dense candidates into one ranking.
//!
//! Each component's candidate scores are min-max normalized to `[0, 1]`
//! independently, then combined as a weighted sum. A chunk that only one
//! component retrieved contributes 0 for the missing signal. Ordering is
//! descending combined score with ascending chunk id breaking ties, which
//! keeps rankings fully deterministic.

use ahash::AHashMap;

use crate::chunk::ChunkId;
use crate::error::{PalisadeError, Result};
use crate::vector::similarity_from_distance;

/// Relative weights for the two ranking signals.
///
/// The weights need not sum to one; normalization happens per component
/// before they are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    /// Weight of the BM25 (sparse) signal, in `[0, 1]`.
    pub bm25: f32,
    /// Weight of the vector (dense) signal, in `[0, 1]`.
    pub vector: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        HybridWeights {
            bm25: 0.3,
            vector: 0.7,
        }
    }
}

impl HybridWeights {
    /// Create a weight pair, validating both values are in `[0, 1]`.
    pub fn new(bm25: f32, vector: f32) -> Result<Self> {
        let weights = HybridWeights { bm25, vector };
        weights.validate()?;
        Ok(weights)
    }

    /// Check both weights are finite and in `[0, 1]`.
    ///
    /// The fields are writable, so anything consuming a caller-supplied pair
    /// should validate it before scoring with it.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("bm25", self.bm25), ("vector", self.vector)] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(PalisadeError::invalid_argument(format!(
                    "{name} weight must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// A chunk ranked by the hybrid scorer, with its component scores retained.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// The ranked chunk.
    pub chunk_id: ChunkId,
    /// Weighted combination of the normalized component scores, in `[0, 1]`.
    pub combined: f32,
    /// Normalized BM25 score; 0.0 when the sparse index did not retrieve it.
    pub bm25: f32,
    /// Normalized vector similarity; 0.0 when the vector index did not retrieve it.
    pub vector: f32,
}

/// Candidate pool size to request from each component for a top-`k` query.
///
/// Retrieving more than `k` from each side keeps one signal from starving the
/// other before the merge.
pub fn candidate_pool_size(k: usize) -> usize {
    (4 * k).max(50)
}

/// Merge sparse and dense candidates into a single top-`k` ranking.
///
/// `bm25_candidates` are raw BM25 scores; `vector_candidates` are
/// `(chunk id, squared-L2 distance)` pairs straight from the vector index.
pub fn merge_candidates(
    bm25_candidates: &AHashMap<ChunkId, f32>,
    vector_candidates: &[(ChunkId, f32)],
    weights: HybridWeights,
    k: usize,
) -> Vec<ScoredChunk> {
    let bm25_norm = normalize_min_max(bm25_candidates.iter().map(|(&id, &s)| (id, s)));

    let vector_norm = normalize_min_max(
        vector_candidates
            .iter()
            .map(|&(id, distance)| (id, similarity_from_distance(distance))),
    );

    let mut combined: AHashMap<ChunkId, ScoredChunk> = AHashMap::new();
    for (&chunk_id, &score) in &bm25_norm {
        combined
            .entry(chunk_id)
            .or_insert_with(|| ScoredChunk {
                chunk_id,
                combined: 0.0,
                bm25: 0.0,
                vector: 0.0,
            })
            .bm25 = score;
    }
    for (&chunk_id, &score) in &vector_norm {
        combined
            .entry(chunk_id)
            .or_insert_with(|| ScoredChunk {
                chunk_id,
                combined: 0.0,
                bm25: 0.0,
                vector: 0.0,
            })
            .vector = score;
    }

    let mut ranked: Vec<ScoredChunk> = combined
        .into_values()
        .map(|mut scored| {
            scored.combined = weights.bm25 * scored.bm25 + weights.vector * scored.vector;
            scored
        })
        .collect();

    sort_scored(&mut ranked);
    ranked.truncate(k);
    ranked
}

/// Sort descending by combined score, ascending chunk id on ties.
pub fn sort_scored(ranked: &mut [ScoredChunk]) {
    ranked.sort_unstable_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

/// Min-max normalize a candidate set to `[0, 1]`.
///
/// A pool whose scores are all equal normalizes to 1.0 for every member, so a
/// single-candidate pool still registers as a full-strength signal.
fn normalize_min_max(scores: impl Iterator<Item = (ChunkId, f32)>) -> AHashMap<ChunkId, f32> {
    let collected: Vec<(ChunkId, f32)> = scores.collect();
    if collected.is_empty() {
        return AHashMap::new();
    }

    let min = collected.iter().map(|&(_, s)| s).fold(f32::INFINITY, f32::min);
    let max = collected
        .iter()
        .map(|&(_, s)| s)
        .fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    collected
        .into_iter()
        .map(|(id, score)| {
            let normalized = if range > 0.0 { (score - min) / range } else { 1.0 };
            (id, normalized)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let weights = HybridWeights::default();
        assert_eq!(weights.bm25, 0.3);
        assert_eq!(weights.vector, 0.7);
    }

    #[test]
    fn test_weights_validation() {
        assert!(HybridWeights::new(0.0, 1.0).is_ok());
        assert!(HybridWeights::new(1.0, 0.0).is_ok());
        assert!(HybridWeights::new(1.5, 0.5).is_err());
        assert!(HybridWeights::new(0.5, -0.1).is_err());
        assert!(HybridWeights::new(f32::NAN, 0.5).is_err());
    }

    #[test]
    fn test_validate_catches_raw_field_writes() {
        let weights = HybridWeights {
            bm25: 5.0,
            vector: 0.7,
        };
        assert!(weights.validate().is_err());
        assert!(HybridWeights::default().validate().is_ok());
    }

    #[test]
    fn test_candidate_pool_size() {
        assert_eq!(candidate_pool_size(1), 50);
        assert_eq!(candidate_pool_size(10), 50);
        assert_eq!(candidate_pool_size(20), 80);
    }

    #[test]
    fn test_merge_combines_both_signals() {
        let mut bm25 = AHashMap::new();
        bm25.insert(1u64, 2.0);
        bm25.insert(2u64, 1.0);
        // Chunk 2 is closest by vector, chunk 3 only has a vector signal.
        let vector = vec![(2u64, 0.1), (3u64, 0.5)];

        let ranked = merge_candidates(&bm25, &vector, HybridWeights::new(0.5, 0.5).unwrap(), 10);

        assert_eq!(ranked.len(), 3);
        // Chunk 2: bm25 norm 0.0, vector norm 1.0 -> 0.5
        // Chunk 1: bm25 norm 1.0, no vector      -> 0.5
        // Chunk 3: no bm25, vector norm 0.0      -> 0.0
        assert_eq!(ranked[0].chunk_id, 1); // tie at 0.5, lower id first
        assert_eq!(ranked[1].chunk_id, 2);
        assert_eq!(ranked[2].chunk_id, 3);
        assert_eq!(ranked[0].combined, ranked[1].combined);
    }

    #[test]
    fn test_pure_vector_matches_index_ordering() {
        let bm25 = AHashMap::new();
        let vector = vec![(5u64, 0.1), (2u64, 0.4), (9u64, 0.9)];

        let ranked = merge_candidates(&bm25, &vector, HybridWeights::new(0.0, 1.0).unwrap(), 10);
        let ids: Vec<_> = ranked.iter().map(|s| s.chunk_id).collect();
        assert_eq!(ids, vec![5, 2, 9]);
    }

    #[test]
    fn test_pure_bm25_matches_score_ordering() {
        let mut bm25 = AHashMap::new();
        bm25.insert(7u64, 3.0);
        bm25.insert(3u64, 5.0);
        bm25.insert(8u64, 1.0);
        let vector = vec![(8u64, 0.01)];

        let ranked = merge_candidates(&bm25, &vector, HybridWeights::new(1.0, 0.0).unwrap(), 10);
        let ids: Vec<_> = ranked.iter().map(|s| s.chunk_id).collect();
        assert_eq!(ids, vec![3, 7, 8]);
    }

    #[test]
    fn test_truncates_to_k() {
        let mut bm25 = AHashMap::new();
        for id in 0..20u64 {
            bm25.insert(id, id as f32);
        }
        let ranked = merge_candidates(&bm25, &[], HybridWeights::default(), 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].chunk_id, 19);
    }

    #[test]
    fn test_combined_scores_within_unit_interval() {
        let mut bm25 = AHashMap::new();
        bm25.insert(1u64, 10.0);
        bm25.insert(2u64, 4.0);
        let vector = vec![(1u64, 0.2), (2u64, 0.8)];

        let ranked = merge_candidates(&bm25, &vector, HybridWeights::default(), 10);
        for scored in &ranked {
            assert!((0.0..=1.0).contains(&scored.combined));
        }
    }

    #[test]
    fn test_single_candidate_normalizes_to_one() {
        let mut bm25 = AHashMap::new();
        bm25.insert(1u64, 0.42);

        let ranked = merge_candidates(&bm25, &[], HybridWeights::new(1.0, 0.0).unwrap(), 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].combined, 1.0);
    }

    #[test]
    fn test_empty_candidates() {
        let ranked = merge_candidates(&AHashMap::new(), &[], HybridWeights::default(), 10);
        assert!(ranked.is_empty());
    }
}
