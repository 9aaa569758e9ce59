//! End-to-end scenarios for the retrieval engine: isolation, hybrid ranking,
//! caching, and persistence.

use std::sync::Arc;

use palisade::chunk::ChunkMetadata;
use palisade::embedding::{EmbeddingProvider, HashingEmbedder};
use palisade::engine::{EngineConfig, QueryRequest, RetrievalEngine};
use palisade::hybrid::HybridWeights;
use palisade::namespace::NamespaceMetadata;

const DIM: usize = 64;

fn engine_config() -> EngineConfig {
    EngineConfig {
        dimension: DIM,
        ..Default::default()
    }
}

fn in_memory_engine() -> RetrievalEngine {
    RetrievalEngine::new(engine_config(), Arc::new(HashingEmbedder::new(DIM))).unwrap()
}

async fn seed(engine: &RetrievalEngine, namespace: &str, texts: &[&str]) {
    engine
        .create_namespace(NamespaceMetadata::new(namespace))
        .unwrap();
    let embedder = HashingEmbedder::new(DIM);
    for (i, text) in texts.iter().enumerate() {
        let embedding = embedder.embed(text).await.unwrap();
        engine
            .index_chunk(namespace, text, embedding, ChunkMetadata::new("seed.txt", i as u32))
            .unwrap();
    }
}

#[tokio::test]
async fn namespaces_never_leak_into_each_other() {
    let engine = in_memory_engine();
    seed(&engine, "engineering", &["rust borrow checker", "async runtimes"]).await;
    seed(&engine, "legal", &["contract termination clauses"]).await;

    let hits = engine
        .query("legal", "rust borrow checker", 10, 0.3, 0.7)
        .await
        .unwrap();
    for hit in &hits {
        assert_eq!(hit.namespace, "legal");
        assert_ne!(hit.text, "rust borrow checker");
    }

    let hits = engine
        .query("engineering", "rust borrow checker", 10, 0.3, 0.7)
        .await
        .unwrap();
    assert!(hits.iter().all(|hit| hit.namespace == "engineering"));
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn multi_namespace_query_tags_every_hit() {
    let engine = in_memory_engine();
    seed(&engine, "a", &["shared topic one"]).await;
    seed(&engine, "b", &["shared topic two"]).await;

    let request = QueryRequest::across(vec!["a".to_string(), "b".to_string()], "shared topic");
    let hits = engine.search(request).await.unwrap();
    assert_eq!(hits.len(), 2);

    let mut namespaces: Vec<&str> = hits.iter().map(|hit| hit.namespace.as_str()).collect();
    namespaces.sort();
    assert_eq!(namespaces, vec!["a", "b"]);
}

#[tokio::test]
async fn keyword_and_semantic_chunks_are_both_ranked() {
    let engine = in_memory_engine();
    seed(
        &engine,
        "engineering",
        &["BM25 ranks keyword overlap", "Vector search uses embeddings"],
    )
    .await;

    let hits = engine
        .query("engineering", "keyword search", 2, 0.3, 0.7)
        .await
        .unwrap();

    // Both chunks come back: one through the keyword signal, one through
    // the embedding signal, ordered by combined score.
    assert_eq!(hits.len(), 2);
    let texts: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();
    assert!(texts.contains(&"BM25 ranks keyword overlap"));
    assert!(texts.contains(&"Vector search uses embeddings"));
    assert!(hits[0].score >= hits[1].score);
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.score), "score {}", hit.score);
        assert!((0.0..=1.0).contains(&hit.bm25_score));
        assert!((0.0..=1.0).contains(&hit.vector_score));
    }
}

#[tokio::test]
async fn hybrid_scores_stay_in_unit_interval() {
    let engine = in_memory_engine();
    seed(
        &engine,
        "engineering",
        &[
            "Rust is a systems programming language",
            "The borrow checker prevents data races",
        ],
    )
    .await;

    let hits = engine
        .query("engineering", "rust borrow checker", 2, 0.3, 0.7)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.score), "score {}", hit.score);
        assert!((0.0..=1.0).contains(&hit.bm25_score));
        assert!((0.0..=1.0).contains(&hit.vector_score));
    }
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn pure_bm25_weighting_follows_the_sparse_signal() {
    let engine = in_memory_engine();
    seed(
        &engine,
        "docs",
        &[
            "kubernetes deployment rollout strategies",
            "incident response playbook for outages",
            "quarterly budget review spreadsheet",
        ],
    )
    .await;

    let hits = engine
        .query("docs", "incident response playbook", 3, 1.0, 0.0)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    // With the vector weight at zero the combined score is the bm25
    // component alone, so the ordering must track it exactly.
    for pair in hits.windows(2) {
        assert!(pair[0].bm25_score >= pair[1].bm25_score);
    }
    assert!((hits[0].score - hits[0].bm25_score).abs() < 1e-6);
    assert_eq!(hits[0].text, "incident response playbook for outages");
}

#[tokio::test]
async fn pure_vector_weighting_follows_the_dense_signal() {
    let engine = in_memory_engine();
    seed(
        &engine,
        "docs",
        &[
            "kubernetes deployment rollout strategies",
            "incident response playbook for outages",
            "quarterly budget review spreadsheet",
        ],
    )
    .await;

    let hits = engine
        .query("docs", "incident response playbook", 3, 0.0, 1.0)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    for pair in hits.windows(2) {
        assert!(pair[0].vector_score >= pair[1].vector_score);
    }
    assert!((hits[0].score - hits[0].vector_score).abs() < 1e-6);
}

#[tokio::test]
async fn repeated_queries_are_idempotent_and_cached() {
    let engine = in_memory_engine();
    seed(&engine, "docs", &["alpha text", "beta text", "gamma text"]).await;

    let first = engine.query("docs", "alpha text", 3, 0.3, 0.7).await.unwrap();
    let second = engine.query("docs", "alpha text", 3, 0.3, 0.7).await.unwrap();
    assert_eq!(first, second);

    let stats = engine.cache_stats();
    assert!(stats.hits >= 1, "second query should be served from cache");
}

#[tokio::test]
async fn indexing_invalidates_cached_results() {
    let engine = in_memory_engine();
    seed(&engine, "docs", &["unrelated filler text"]).await;

    let before = engine
        .query("docs", "zanzibar ferry schedule", 5, 1.0, 0.0)
        .await
        .unwrap();
    assert!(before.iter().all(|hit| hit.text != "zanzibar ferry schedule"));

    let embedding = HashingEmbedder::new(DIM)
        .embed("zanzibar ferry schedule")
        .await
        .unwrap();
    engine
        .index_chunk(
            "docs",
            "zanzibar ferry schedule",
            embedding,
            ChunkMetadata::new("ferry.txt", 0),
        )
        .unwrap();

    let after = engine
        .query("docs", "zanzibar ferry schedule", 5, 1.0, 0.0)
        .await
        .unwrap();
    assert!(!after.is_empty());
    assert_eq!(after[0].text, "zanzibar ferry schedule");
}

#[tokio::test]
async fn bypassing_the_cache_still_returns_identical_results() {
    let engine = in_memory_engine();
    seed(&engine, "docs", &["alpha text", "beta text"]).await;

    let cached = engine.query("docs", "alpha", 2, 0.3, 0.7).await.unwrap();
    let uncached = engine
        .search(
            QueryRequest::new("docs", "alpha")
                .top_k(2)
                .weights(HybridWeights::new(0.3, 0.7).unwrap())
                .bypass_cache(),
        )
        .await
        .unwrap();
    assert_eq!(cached, uncached);
}

#[tokio::test]
async fn reopened_engine_answers_the_same_queries() {
    let dir = tempfile::tempdir().unwrap();
    let texts = &["rust borrow checker", "async runtimes", "error handling"];

    let before = {
        let engine = RetrievalEngine::open(
            dir.path(),
            engine_config(),
            Arc::new(HashingEmbedder::new(DIM)),
        )
        .unwrap();
        seed(&engine, "engineering", texts).await;
        engine
            .query("engineering", "borrow checker", 3, 0.3, 0.7)
            .await
            .unwrap()
    };
    assert!(!before.is_empty());

    let engine = RetrievalEngine::open(
        dir.path(),
        engine_config(),
        Arc::new(HashingEmbedder::new(DIM)),
    )
    .unwrap();
    assert_eq!(engine.list_namespaces(), vec!["engineering"]);

    let stats = engine.namespace_stats("engineering").unwrap();
    assert_eq!(stats.chunk_count, texts.len());

    let after = engine
        .query("engineering", "borrow checker", 3, 0.3, 0.7)
        .await
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn corrupt_namespace_is_skipped_on_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = RetrievalEngine::open(
            dir.path(),
            engine_config(),
            Arc::new(HashingEmbedder::new(DIM)),
        )
        .unwrap();
        seed(&engine, "healthy", &["fine text"]).await;
        seed(&engine, "doomed", &["soon to be corrupted"]).await;
    }

    // Truncate one artifact so the namespace fails its load.
    std::fs::write(dir.path().join("doomed").join("vector.idx"), b"garbage").unwrap();

    let engine = RetrievalEngine::open(
        dir.path(),
        engine_config(),
        Arc::new(HashingEmbedder::new(DIM)),
    )
    .unwrap();
    assert_eq!(engine.list_namespaces(), vec!["healthy"]);
    let hits = engine.query("healthy", "fine text", 5, 0.3, 0.7).await.unwrap();
    assert!(!hits.is_empty());
}
