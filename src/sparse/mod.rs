//! Sparse keyword index with BM25 scoring.
//!
//! Postings map each term to the chunks containing it plus a term frequency;
//! per-chunk lengths and corpus statistics feed the BM25 length
//! normalization. Scores are only produced for chunks sharing at least one
//! query term: absent chunks are implicitly zero and never appear in the
//! output mapping.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::chunk::ChunkId;
use crate::error::{PalisadeError, Result};
use crate::storage;

const MAGIC: &[u8; 4] = b"PLSS";

/// BM25 tuning parameters.
///
/// `k1` controls term-frequency saturation, `b` the strength of document
/// length normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation, typically 1.2 to 1.5.
    pub k1: f32,
    /// Length normalization strength, typically 0.75.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params { k1: 1.2, b: 0.75 }
    }
}

/// One posting entry: a chunk containing the term and how often.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Posting {
    chunk_id: ChunkId,
    term_freq: u32,
}

/// Serialized form of the index. Terms and ids are sorted so the bytes on
/// disk do not depend on hash-map iteration order.
#[derive(Serialize, Deserialize)]
struct SparseIndexPayload {
    params: Bm25Params,
    postings: Vec<(String, Vec<Posting>)>,
    doc_lengths: Vec<(ChunkId, u32)>,
}

/// A BM25 term-frequency index over tokenized chunks.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    params: Bm25Params,
    /// term -> postings sorted by chunk id.
    postings: AHashMap<String, Vec<Posting>>,
    /// chunk id -> token count.
    doc_lengths: AHashMap<ChunkId, u32>,
    /// Sum of all token counts, for the average-length statistic.
    total_length: u64,
}

impl SparseIndex {
    /// Create an empty index with the given BM25 parameters.
    pub fn new(params: Bm25Params) -> Self {
        SparseIndex {
            params,
            postings: AHashMap::new(),
            doc_lengths: AHashMap::new(),
            total_length: 0,
        }
    }

    /// The BM25 parameters this index scores with.
    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    /// Number of distinct terms in the index.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Whether a chunk is present in the index.
    pub fn contains(&self, chunk_id: ChunkId) -> bool {
        self.doc_lengths.contains_key(&chunk_id)
    }

    /// Average indexed chunk length in tokens.
    pub fn average_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.doc_lengths.len() as f32
        }
    }

    /// Add a tokenized chunk, replacing any previous entry for the same id.
    pub fn add(&mut self, chunk_id: ChunkId, terms: &[String]) -> Result<()> {
        if self.contains(chunk_id) {
            self.remove(chunk_id)?;
        }

        let mut freqs: AHashMap<&str, u32> = AHashMap::new();
        for term in terms {
            *freqs.entry(term.as_str()).or_insert(0) += 1;
        }

        for (term, term_freq) in freqs {
            let list = self.postings.entry(term.to_string()).or_default();
            let pos = list
                .binary_search_by_key(&chunk_id, |p| p.chunk_id)
                .unwrap_err();
            list.insert(pos, Posting { chunk_id, term_freq });
        }

        self.doc_lengths.insert(chunk_id, terms.len() as u32);
        self.total_length += terms.len() as u64;
        Ok(())
    }

    /// Remove a chunk from the index. Fails with `ChunkNotFound` if absent.
    pub fn remove(&mut self, chunk_id: ChunkId) -> Result<()> {
        let length = self
            .doc_lengths
            .remove(&chunk_id)
            .ok_or(PalisadeError::ChunkNotFound(chunk_id))?;
        self.total_length -= length as u64;

        self.postings.retain(|_, list| {
            if let Ok(pos) = list.binary_search_by_key(&chunk_id, |p| p.chunk_id) {
                list.remove(pos);
            }
            !list.is_empty()
        });
        Ok(())
    }

    /// Score the indexed chunks against a tokenized query.
    ///
    /// Returns only chunks sharing at least one query term. Every returned
    /// score is positive.
    pub fn score(&self, query_terms: &[String]) -> AHashMap<ChunkId, f32> {
        let mut scores: AHashMap<ChunkId, f32> = AHashMap::new();
        let doc_count = self.doc_lengths.len();
        if doc_count == 0 {
            return scores;
        }
        let avg_length = self.average_length();

        for term in query_terms {
            let Some(list) = self.postings.get(term) else {
                continue;
            };

            // Smoothed IDF; the +1 inside the log keeps it positive even for
            // terms present in more than half the corpus.
            let df = list.len() as f32;
            let idf = ((doc_count as f32 - df + 0.5) / (df + 0.5) + 1.0).ln();

            for posting in list {
                let tf = posting.term_freq as f32;
                let doc_length = self.doc_lengths[&posting.chunk_id] as f32;
                let norm =
                    tf + self.params.k1 * (1.0 - self.params.b + self.params.b * doc_length / avg_length);
                let contribution = idf * tf * (self.params.k1 + 1.0) / norm;
                *scores.entry(posting.chunk_id).or_insert(0.0) += contribution;
            }
        }

        scores
    }

    /// Serialize the index to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut postings: Vec<(String, Vec<Posting>)> = self
            .postings
            .iter()
            .map(|(term, list)| (term.clone(), list.clone()))
            .collect();
        postings.sort_by(|a, b| a.0.cmp(&b.0));

        let mut doc_lengths: Vec<(ChunkId, u32)> =
            self.doc_lengths.iter().map(|(&id, &len)| (id, len)).collect();
        doc_lengths.sort_by_key(|&(id, _)| id);

        let payload = SparseIndexPayload {
            params: self.params,
            postings,
            doc_lengths,
        };
        let bytes = bincode::serialize(&payload)
            .map_err(|e| PalisadeError::other(format!("sparse index encode failed: {e}")))?;
        storage::write_artifact(path, MAGIC, &bytes)
    }

    /// Deserialize an index from `path`.
    ///
    /// A checksum or decode failure surfaces as `CorruptIndex`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = storage::read_artifact(path, MAGIC)?;
        let payload: SparseIndexPayload = bincode::deserialize(&bytes).map_err(|e| {
            PalisadeError::corrupt(format!("{}: sparse index decode failed: {e}", path.display()))
        })?;

        let mut index = SparseIndex::new(payload.params);
        for (term, list) in payload.postings {
            index.postings.insert(term, list);
        }
        for (chunk_id, length) in payload.doc_lengths {
            index.doc_lengths.insert(chunk_id, length);
            index.total_length += length as u64;
        }
        Ok(index)
    }
}
