//! The retrieval engine: namespace registry, ingestion, and hybrid query.
//!
//! The engine owns a registry of namespaces, each an isolated pair of indexes
//! behind its own reader-writer lock. Mutations on one namespace are
//! serialized against each other; distinct namespaces never block each other.
//! Queries flow through the process-wide [`QueryCache`] and, on a miss, fan
//! out to the namespaces in scope.

mod admin;
mod state;

pub use admin::{BackupManifest, OverlapReport};
pub use state::NamespaceState;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::analysis::{SimpleTokenizer, Tokenizer};
use crate::cache::{CacheConfig, CacheKey, CacheStats, QueryCache};
use crate::chunk::{Chunk, ChunkId, ChunkMetadata};
use crate::embedding::EmbeddingProvider;
use crate::error::{PalisadeError, Result};
use crate::hybrid::{self, HybridWeights};
use crate::namespace::{NamespaceMetadata, NamespaceStats, SystemOverview};
use crate::sparse::Bm25Params;
use crate::vector::Vector;

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Embedding dimension every namespace's vector index is built for.
    pub dimension: usize,

    /// BM25 parameters applied to every namespace's sparse index.
    pub bm25: Bm25Params,

    /// Query cache tuning.
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            dimension: 1024,
            bm25: Bm25Params::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Cooperative cancellation signal.
///
/// Cloning is cheap; all clones observe the same flag. The engine checks the
/// token between units of work and stops promptly once it is set. In-flight
/// mutations still complete or roll back whole; cancellation never leaves an
/// index half-applied.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PalisadeError::cancelled("query cancelled"))
        } else {
            Ok(())
        }
    }
}

/// A hybrid query over one or more namespaces.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Namespaces in scope. Multi-namespace requests merge results across
    /// all of them; visibility rules belong to the caller.
    pub namespaces: Vec<String>,

    /// The query text.
    pub text: String,

    /// Maximum number of results, at least 1.
    pub top_k: usize,

    /// Component weights for the hybrid merge.
    pub weights: HybridWeights,

    /// Whether to consult and fill the query cache.
    pub use_cache: bool,

    /// Cancellation signal.
    pub cancel: CancelToken,
}

impl QueryRequest {
    /// Query a single namespace.
    pub fn new<N: Into<String>, T: Into<String>>(namespace: N, text: T) -> Self {
        QueryRequest {
            namespaces: vec![namespace.into()],
            text: text.into(),
            top_k: 10,
            weights: HybridWeights::default(),
            use_cache: true,
            cancel: CancelToken::new(),
        }
    }

    /// Query across an ordered set of permitted namespaces.
    pub fn across<T: Into<String>>(namespaces: Vec<String>, text: T) -> Self {
        QueryRequest {
            namespaces,
            text: text.into(),
            top_k: 10,
            weights: HybridWeights::default(),
            use_cache: true,
            cancel: CancelToken::new(),
        }
    }

    /// Set the number of results to return.
    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Set the hybrid weights.
    pub fn weights(mut self, weights: HybridWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Skip the query cache for this request.
    pub fn bypass_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Attach a cancellation token.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One ranked result from a hybrid query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Namespace the chunk belongs to.
    pub namespace: String,

    /// The chunk's namespace-local id.
    pub chunk_id: ChunkId,

    /// Combined hybrid score in `[0, 1]`.
    pub score: f32,

    /// Normalized BM25 component.
    pub bm25_score: f32,

    /// Normalized vector-similarity component.
    pub vector_score: f32,

    /// The chunk text.
    pub text: String,

    /// Source document the chunk was cut from.
    pub source_filename: String,

    /// Chunk position within its source document.
    pub chunk_index: u32,

    /// Query terms that literally appear in the chunk.
    pub keyword_matches: Vec<String>,
}

type NamespaceEntry = Arc<RwLock<NamespaceState>>;

/// The namespace-isolated hybrid retrieval engine.
pub struct RetrievalEngine {
    config: EngineConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    tokenizer: Arc<dyn Tokenizer>,
    namespaces: RwLock<AHashMap<String, NamespaceEntry>>,
    cache: QueryCache<Vec<QueryHit>>,
    root: Option<PathBuf>,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("config", &self.config)
            .field("embedder", &self.embedder.name())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl RetrievalEngine {
    /// Create an in-memory engine.
    pub fn new(config: EngineConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if embedder.dimension() != config.dimension {
            return Err(PalisadeError::dimension_mismatch(
                config.dimension,
                embedder.dimension(),
            ));
        }
        let cache = QueryCache::new(config.cache.clone());
        Ok(RetrievalEngine {
            config,
            embedder,
            tokenizer: Arc::new(SimpleTokenizer::new()),
            namespaces: RwLock::new(AHashMap::new()),
            cache,
            root: None,
        })
    }

    /// Open (or initialize) an engine persisted under `root`.
    ///
    /// Each subdirectory of `root` is loaded as one namespace. A namespace
    /// that fails to load is skipped and left absent from the registry; the
    /// rest of the engine keeps working.
    pub fn open<P: AsRef<Path>>(
        root: P,
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let mut engine = Self::new(config, embedder)?;
        engine.root = Some(root.clone());

        let mut registry = AHashMap::new();
        for dir_entry in std::fs::read_dir(&root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            match NamespaceState::load_from_dir(&dir_entry.path()) {
                Ok(loaded) => {
                    registry.insert(name.clone(), Arc::new(RwLock::new(loaded)));
                    info!(namespace = %name, "loaded namespace");
                }
                Err(e) => {
                    error!(namespace = %name, error = %e, "failed to load namespace, skipping");
                }
            }
        }
        *engine.namespaces.write() = registry;
        Ok(engine)
    }

    /// Replace the default tokenizer.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Query cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached query result and reset the bloom filter.
    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    // ---- namespace registry ----------------------------------------------

    /// Create a namespace. Fails with `NamespaceAlreadyExists` if the name is
    /// taken.
    pub fn create_namespace(&self, metadata: NamespaceMetadata) -> Result<()> {
        validate_namespace_name(&metadata.name)?;
        let name = metadata.name.clone();

        let mut registry = self.namespaces.write();
        if registry.contains_key(&name) {
            return Err(PalisadeError::namespace_exists(&name));
        }

        let state = NamespaceState::new(metadata, self.config.dimension, self.config.bm25);
        if let Some(root) = &self.root {
            let dir = root.join(&name);
            std::fs::create_dir_all(&dir)?;
            state.save_to_dir(&dir)?;
        }
        registry.insert(name.clone(), Arc::new(RwLock::new(state)));
        info!(namespace = %name, "created namespace");
        Ok(())
    }

    /// Delete a namespace, its indexes, and every cache entry scoped to it.
    pub fn delete_namespace(&self, name: &str) -> Result<()> {
        let Some(entry) = self.namespaces.write().remove(name) else {
            return Err(PalisadeError::namespace_not_found(name));
        };
        // Waits for any in-flight writer on this entry, then marks the state
        // so a writer that resolved the entry before the delete cannot
        // recreate the directory we are about to remove.
        entry.write().tombstoned = true;

        self.cache.invalidate_namespace(name);
        if let Some(root) = &self.root {
            let dir = root.join(name);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
        }
        info!(namespace = %name, "deleted namespace");
        Ok(())
    }

    /// All namespace names, sorted.
    pub fn list_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Namespace names owned by `department`, sorted.
    pub fn list_namespaces_by_department(&self, department: &str) -> Vec<String> {
        let registry = self.namespaces.read();
        let mut names: Vec<String> = registry
            .iter()
            .filter(|(_, entry)| {
                entry
                    .read()
                    .metadata
                    .department
                    .eq_ignore_ascii_case(department)
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// A namespace's metadata record.
    pub fn get_namespace(&self, name: &str) -> Result<NamespaceMetadata> {
        Ok(self.entry(name)?.read().metadata.clone())
    }

    /// A point-in-time snapshot of a namespace's contents.
    pub fn namespace_stats(&self, name: &str) -> Result<NamespaceStats> {
        Ok(self.entry(name)?.read().stats())
    }

    /// Aggregate statistics across every namespace.
    pub fn system_overview(&self) -> SystemOverview {
        let mut stats: Vec<NamespaceStats> = Vec::new();
        for name in self.list_namespaces() {
            if let Ok(snapshot) = self.namespace_stats(&name) {
                stats.push(snapshot);
            }
        }

        let mut departments: Vec<String> = stats
            .iter()
            .map(|s| s.metadata.department.clone())
            .filter(|d| !d.is_empty())
            .collect();
        departments.sort();
        departments.dedup();

        SystemOverview {
            namespace_count: stats.len(),
            total_docs: stats.iter().map(|s| s.doc_count).sum(),
            total_chunks: stats.iter().map(|s| s.chunk_count).sum(),
            departments,
            namespaces: stats,
        }
    }

    // ---- ingestion -------------------------------------------------------

    /// Index a chunk into a namespace, returning the assigned chunk id.
    ///
    /// The vector and sparse indexes are updated together: if the second
    /// write fails, the first is compensated so the dual-index invariant
    /// holds. The namespace's cache entries are invalidated on success.
    pub fn index_chunk(
        &self,
        namespace: &str,
        text: &str,
        embedding: Vector,
        metadata: ChunkMetadata,
    ) -> Result<ChunkId> {
        let entry = self.entry(namespace)?;
        let terms = self.tokenizer.tokenize(text)?;

        let mut state = entry.write();
        if state.tombstoned {
            return Err(PalisadeError::namespace_not_found(namespace));
        }
        let chunk_id = state.next_chunk_id;

        state.vector.add(chunk_id, embedding)?;
        if let Err(e) = state.sparse.add(chunk_id, &terms) {
            // Compensating removal keeps both indexes in step.
            error!(namespace, chunk_id, error = %e, "sparse write failed, rolling back vector write");
            let _ = state.vector.remove(chunk_id);
            return Err(e);
        }

        state.chunks.insert(
            chunk_id,
            Chunk {
                id: chunk_id,
                text: text.to_string(),
                metadata,
            },
        );
        state.next_chunk_id += 1;
        let last_updated = state.metadata.last_updated;
        state.metadata.touch();

        if let Err(e) = self.persist(&state) {
            // Undo the in-memory write so a retry does not duplicate the
            // chunk under a fresh id.
            error!(namespace, chunk_id, error = %e, "persist failed, rolling back ingest");
            let _ = state.vector.remove(chunk_id);
            let _ = state.sparse.remove(chunk_id);
            state.chunks.remove(&chunk_id);
            state.next_chunk_id = chunk_id;
            state.metadata.last_updated = last_updated;
            return Err(e);
        }
        drop(state);

        self.cache.invalidate_namespace(namespace);
        Ok(chunk_id)
    }

    /// Remove a chunk from a namespace.
    pub fn remove_chunk(&self, namespace: &str, chunk_id: ChunkId) -> Result<()> {
        let entry = self.entry(namespace)?;
        let mut state = entry.write();
        if state.tombstoned {
            return Err(PalisadeError::namespace_not_found(namespace));
        }

        let Some(chunk_backup) = state.chunks.get(&chunk_id).cloned() else {
            return Err(PalisadeError::ChunkNotFound(chunk_id));
        };

        let embedding_backup = state.vector.get(chunk_id).cloned();
        state.vector.remove(chunk_id)?;
        if let Err(e) = state.sparse.remove(chunk_id) {
            error!(namespace, chunk_id, error = %e, "sparse removal failed, restoring vector entry");
            if let Some(embedding) = embedding_backup {
                let _ = state.vector.add(chunk_id, embedding);
            }
            return Err(e);
        }

        state.chunks.remove(&chunk_id);
        let last_updated = state.metadata.last_updated;
        state.metadata.touch();

        if let Err(e) = self.persist(&state) {
            error!(namespace, chunk_id, error = %e, "persist failed, reinstating chunk");
            if let Some(embedding) = embedding_backup {
                let _ = state.vector.add(chunk_id, embedding);
            }
            if let Ok(terms) = self.tokenizer.tokenize(&chunk_backup.text) {
                let _ = state.sparse.add(chunk_id, &terms);
            }
            state.chunks.insert(chunk_id, chunk_backup);
            state.metadata.last_updated = last_updated;
            return Err(e);
        }
        drop(state);

        self.cache.invalidate_namespace(namespace);
        Ok(())
    }

    // ---- query -----------------------------------------------------------

    /// Run a hybrid query.
    ///
    /// Results are ordered by descending combined score with deterministic
    /// tie-breaks, truncated to `top_k`, and cached unless the request opted
    /// out. Cache problems never fail the query.
    pub async fn search(&self, request: QueryRequest) -> Result<Vec<QueryHit>> {
        if request.top_k == 0 {
            return Err(PalisadeError::invalid_argument("top_k must be at least 1"));
        }
        if request.namespaces.is_empty() {
            return Err(PalisadeError::invalid_argument(
                "at least one namespace is required",
            ));
        }
        // The weights field is writable, so re-check it here rather than
        // trusting that it came through the validating constructor.
        request.weights.validate()?;

        let mut scope: Vec<String> = request.namespaces.clone();
        scope.sort();
        scope.dedup();

        // Resolve every namespace up front so an unknown one fails fast.
        let entries: Vec<(String, NamespaceEntry)> = {
            let registry = self.namespaces.read();
            scope
                .iter()
                .map(|name| {
                    registry
                        .get(name)
                        .cloned()
                        .map(|entry| (name.clone(), entry))
                        .ok_or_else(|| PalisadeError::namespace_not_found(name))
                })
                .collect::<Result<_>>()?
        };

        let scope_refs: Vec<&str> = scope.iter().map(String::as_str).collect();
        let key = CacheKey::compute(&scope_refs, &request.text, request.top_k, request.weights);
        if request.use_cache
            && let Some(hits) = self.cache.lookup(key)
        {
            return Ok(hits);
        }

        request.cancel.check()?;
        let query_vector = self.embedder.embed(&request.text).await?;
        if query_vector.dimension() != self.config.dimension {
            return Err(PalisadeError::dimension_mismatch(
                self.config.dimension,
                query_vector.dimension(),
            ));
        }
        let query_terms = self.tokenizer.tokenize(&request.text)?;

        let search_one = |(name, entry): &(String, NamespaceEntry)| -> Result<Vec<QueryHit>> {
            request.cancel.check()?;
            self.search_namespace(name, entry, &query_terms, &query_vector, &request)
        };

        let mut hits: Vec<QueryHit> = if entries.len() > 1 {
            let per_namespace: Vec<Vec<QueryHit>> = entries
                .par_iter()
                .map(search_one)
                .collect::<Result<Vec<_>>>()?;
            per_namespace.into_iter().flatten().collect()
        } else {
            entries.iter().map(search_one).collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect()
        };

        hits.sort_unstable_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
                .then_with(|| a.namespace.cmp(&b.namespace))
        });
        hits.truncate(request.top_k);

        if request.use_cache {
            self.cache.store(key, scope, hits.clone());
        }
        Ok(hits)
    }

    /// Convenience single-namespace query matching the external interface:
    /// `(namespace, text, top_k, bm25_weight, vector_weight)`.
    pub async fn query(
        &self,
        namespace: &str,
        text: &str,
        top_k: usize,
        bm25_weight: f32,
        vector_weight: f32,
    ) -> Result<Vec<QueryHit>> {
        let request = QueryRequest::new(namespace, text)
            .top_k(top_k)
            .weights(HybridWeights::new(bm25_weight, vector_weight)?);
        self.search(request).await
    }

    fn search_namespace(
        &self,
        name: &str,
        entry: &NamespaceEntry,
        query_terms: &[String],
        query_vector: &Vector,
        request: &QueryRequest,
    ) -> Result<Vec<QueryHit>> {
        let state = entry.read();
        let pool = hybrid::candidate_pool_size(request.top_k);

        let mut bm25_candidates = state.sparse.score(query_terms);
        if bm25_candidates.len() > pool {
            let mut ranked: Vec<(ChunkId, f32)> = bm25_candidates.into_iter().collect();
            ranked.sort_unstable_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            ranked.truncate(pool);
            bm25_candidates = ranked.into_iter().collect();
        }

        let vector_candidates = state.vector.search(query_vector, pool)?;

        let ranked = hybrid::merge_candidates(
            &bm25_candidates,
            &vector_candidates,
            request.weights,
            request.top_k,
        );

        let mut hits = Vec::with_capacity(ranked.len());
        for scored in ranked {
            let Some(chunk) = state.chunks.get(&scored.chunk_id) else {
                warn!(namespace = name, chunk_id = scored.chunk_id, "ranked chunk missing from store");
                continue;
            };
            hits.push(QueryHit {
                namespace: name.to_string(),
                chunk_id: scored.chunk_id,
                score: scored.combined,
                bm25_score: scored.bm25,
                vector_score: scored.vector,
                text: chunk.text.clone(),
                source_filename: chunk.metadata.source_filename.clone(),
                chunk_index: chunk.metadata.chunk_index,
                keyword_matches: self.keyword_matches(query_terms, &chunk.text)?,
            });
        }
        Ok(hits)
    }

    /// Query terms that literally occur in the chunk text, in query order.
    fn keyword_matches(&self, query_terms: &[String], text: &str) -> Result<Vec<String>> {
        let chunk_terms = self.tokenizer.tokenize(text)?;
        let chunk_set: std::collections::HashSet<&str> =
            chunk_terms.iter().map(String::as_str).collect();

        let mut matches = Vec::new();
        for term in query_terms {
            if chunk_set.contains(term.as_str()) && !matches.contains(term) {
                matches.push(term.clone());
            }
        }
        Ok(matches)
    }

    // ---- shared internals ------------------------------------------------

    pub(crate) fn entry(&self, name: &str) -> Result<NamespaceEntry> {
        self.namespaces
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PalisadeError::namespace_not_found(name))
    }

    pub(crate) fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Write a namespace's state to disk under its metadata name.
    ///
    /// A tombstoned state is never written: the namespace was deleted out
    /// from under the caller and its directory must stay gone.
    pub(crate) fn persist(&self, state: &NamespaceState) -> Result<()> {
        if state.tombstoned {
            return Ok(());
        }
        if let Some(root) = &self.root {
            let dir = root.join(&state.metadata.name);
            std::fs::create_dir_all(&dir)?;
            state.save_to_dir(&dir)?;
        }
        Ok(())
    }
}

fn validate_namespace_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PalisadeError::invalid_argument(format!(
            "invalid namespace name {name:?}: use ASCII letters, digits, '-' or '_'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    const DIM: usize = 64;

    fn test_engine() -> RetrievalEngine {
        let config = EngineConfig {
            dimension: DIM,
            ..Default::default()
        };
        RetrievalEngine::new(config, Arc::new(HashingEmbedder::new(DIM))).unwrap()
    }

    async fn index_text(engine: &RetrievalEngine, namespace: &str, text: &str, file: &str) -> ChunkId {
        let embedding = HashingEmbedder::new(DIM).embed(text).await.unwrap();
        engine
            .index_chunk(namespace, text, embedding, ChunkMetadata::new(file, 0))
            .unwrap()
    }

    #[test]
    fn test_create_and_delete_namespace() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("engineering"))
            .unwrap();

        assert_eq!(engine.list_namespaces(), vec!["engineering"]);
        let err = engine
            .create_namespace(NamespaceMetadata::new("engineering"))
            .unwrap_err();
        assert!(matches!(err, PalisadeError::NamespaceAlreadyExists(_)));

        engine.delete_namespace("engineering").unwrap();
        assert!(engine.list_namespaces().is_empty());
        let err = engine.delete_namespace("engineering").unwrap_err();
        assert!(matches!(err, PalisadeError::NamespaceNotFound(_)));
    }

    #[test]
    fn test_namespace_name_validation() {
        let engine = test_engine();
        for bad in ["", "../escape", "has space", ".hidden", "a/b"] {
            let err = engine
                .create_namespace(NamespaceMetadata::new(bad))
                .unwrap_err();
            assert!(matches!(err, PalisadeError::InvalidArgument(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_index_and_remove_chunk_keeps_indexes_paired() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();

        let id = index_text(&engine, "eng", "rust is fast", "a.txt").await;
        {
            let entry = engine.entry("eng").unwrap();
            let state = entry.read();
            assert!(state.vector.get(id).is_some());
            assert!(state.sparse.contains(id));
            assert!(state.chunks.contains_key(&id));
        }

        engine.remove_chunk("eng", id).unwrap();
        {
            let entry = engine.entry("eng").unwrap();
            let state = entry.read();
            assert!(state.vector.get(id).is_none());
            assert!(!state.sparse.contains(id));
            assert!(!state.chunks.contains_key(&id));
        }

        let err = engine.remove_chunk("eng", id).unwrap_err();
        assert!(matches!(err, PalisadeError::ChunkNotFound(_)));
    }

    #[tokio::test]
    async fn test_chunk_ids_are_monotonic_and_not_reused() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();

        let a = index_text(&engine, "eng", "first chunk", "a.txt").await;
        let b = index_text(&engine, "eng", "second chunk", "a.txt").await;
        engine.remove_chunk("eng", b).unwrap();
        let c = index_text(&engine, "eng", "third chunk", "a.txt").await;

        assert!(b > a);
        assert!(c > b, "removed ids must not be reused");
    }

    #[tokio::test]
    async fn test_index_rejects_wrong_dimension() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();

        let err = engine
            .index_chunk(
                "eng",
                "text",
                Vector::new(vec![1.0; DIM + 1]),
                ChunkMetadata::default(),
            )
            .unwrap_err();
        assert!(matches!(err, PalisadeError::DimensionMismatch { .. }));

        // Nothing was left behind in either index.
        let entry = engine.entry("eng").unwrap();
        let state = entry.read();
        assert_eq!(state.vector.len(), 0);
        assert_eq!(state.sparse.len(), 0);
    }

    fn persistent_engine(root: &Path) -> RetrievalEngine {
        let config = EngineConfig {
            dimension: DIM,
            ..Default::default()
        };
        RetrievalEngine::open(root, config, Arc::new(HashingEmbedder::new(DIM))).unwrap()
    }

    #[tokio::test]
    async fn test_delete_tombstones_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let engine = persistent_engine(dir.path());
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();
        index_text(&engine, "eng", "some text", "a.txt").await;

        // A writer that resolved the entry before the delete.
        let stale = engine.entry("eng").unwrap();

        engine.delete_namespace("eng").unwrap();
        assert!(!dir.path().join("eng").exists());

        // The stale entry's persist is a no-op; the directory stays gone.
        engine.persist(&stale.read()).unwrap();
        assert!(!dir.path().join("eng").exists());
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let engine = persistent_engine(dir.path());
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();
        index_text(&engine, "eng", "first chunk", "a.txt").await;

        // Replace the namespace directory with a file so persist fails.
        let ns_dir = dir.path().join("eng");
        std::fs::remove_dir_all(&ns_dir).unwrap();
        std::fs::write(&ns_dir, b"").unwrap();

        let embedding = HashingEmbedder::new(DIM).embed("second chunk").await.unwrap();
        let err = engine
            .index_chunk("eng", "second chunk", embedding, ChunkMetadata::new("a.txt", 1))
            .unwrap_err();
        assert!(matches!(err, PalisadeError::Io(_)));

        {
            let entry = engine.entry("eng").unwrap();
            let state = entry.read();
            assert_eq!(state.chunk_count(), 1);
            assert_eq!(state.next_chunk_id, 1);
            assert!(state.vector.get(1).is_none());
            assert!(!state.sparse.contains(1));
        }

        // Once persistence works again, a retry reuses the rolled-back id.
        std::fs::remove_file(&ns_dir).unwrap();
        let retried = index_text(&engine, "eng", "second chunk", "a.txt").await;
        assert_eq!(retried, 1);
        assert_eq!(engine.namespace_stats("eng").unwrap().chunk_count, 2);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_removal() {
        let dir = tempfile::tempdir().unwrap();
        let engine = persistent_engine(dir.path());
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();
        let id = index_text(&engine, "eng", "keep this chunk", "a.txt").await;

        let ns_dir = dir.path().join("eng");
        std::fs::remove_dir_all(&ns_dir).unwrap();
        std::fs::write(&ns_dir, b"").unwrap();

        let err = engine.remove_chunk("eng", id).unwrap_err();
        assert!(matches!(err, PalisadeError::Io(_)));

        // The chunk is still present in all three structures.
        {
            let entry = engine.entry("eng").unwrap();
            let state = entry.read();
            assert!(state.vector.get(id).is_some());
            assert!(state.sparse.contains(id));
            assert!(state.chunks.contains_key(&id));
        }

        std::fs::remove_file(&ns_dir).unwrap();
        engine.remove_chunk("eng", id).unwrap();
        assert_eq!(engine.namespace_stats("eng").unwrap().chunk_count, 0);
    }

    #[tokio::test]
    async fn test_search_rejects_out_of_range_weight_fields() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();

        let mut request = QueryRequest::new("eng", "anything");
        request.weights = HybridWeights {
            bm25: 5.0,
            vector: 0.7,
        };
        let err = engine.search(request).await.unwrap_err();
        assert!(matches!(err, PalisadeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_query_unknown_namespace() {
        let engine = test_engine();
        let err = engine.query("missing", "anything", 5, 0.3, 0.7).await.unwrap_err();
        assert!(matches!(err, PalisadeError::NamespaceNotFound(_)));
    }

    #[tokio::test]
    async fn test_query_empty_namespace_returns_empty() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();
        let hits = engine.query("eng", "anything", 5, 0.3, 0.7).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_query_rejects_zero_top_k() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();
        let err = engine.query("eng", "q", 0, 0.3, 0.7).await.unwrap_err();
        assert!(matches!(err, PalisadeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_cancelled_query_stops() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();
        index_text(&engine, "eng", "some text", "a.txt").await;

        let cancel = CancelToken::new();
        cancel.cancel();
        let request = QueryRequest::new("eng", "some text").cancel_token(cancel);
        let err = engine.search(request).await.unwrap_err();
        assert!(matches!(err, PalisadeError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_keyword_matches_reported() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng"))
            .unwrap();
        index_text(&engine, "eng", "BM25 ranks keyword overlap", "a.txt").await;

        let hits = engine.query("eng", "keyword search", 1, 1.0, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].keyword_matches, vec!["keyword"]);
    }

    #[tokio::test]
    async fn test_department_filtered_listing() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("eng-docs").with_department("Engineering"))
            .unwrap();
        engine
            .create_namespace(NamespaceMetadata::new("legal-docs").with_department("Legal"))
            .unwrap();

        assert_eq!(
            engine.list_namespaces_by_department("engineering"),
            vec!["eng-docs"]
        );
    }

    #[tokio::test]
    async fn test_system_overview_aggregates() {
        let engine = test_engine();
        engine
            .create_namespace(NamespaceMetadata::new("a").with_department("eng"))
            .unwrap();
        engine
            .create_namespace(NamespaceMetadata::new("b").with_department("eng"))
            .unwrap();
        index_text(&engine, "a", "one chunk", "x.txt").await;
        index_text(&engine, "b", "another chunk", "y.txt").await;
        index_text(&engine, "b", "a second chunk", "y.txt").await;

        let overview = engine.system_overview();
        assert_eq!(overview.namespace_count, 2);
        assert_eq!(overview.total_chunks, 3);
        assert_eq!(overview.total_docs, 2);
        assert_eq!(overview.departments, vec!["eng"]);
    }
}
