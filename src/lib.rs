//! # Palisade
//!
//! A namespace-isolated hybrid retrieval engine.
//!
//! ## Features
//!
//! - Hard isolation between namespaces, each with its own vector and BM25 index
//! - Hybrid ranking: weighted combination of min-max normalized BM25 and vector similarity
//! - Bloom-gated query cache with LRU eviction and TTL expiry
//! - Checksummed binary persistence, one directory per namespace
//! - Namespace administration: backup, restore, clone, migrate, overlap analysis
//! - Pluggable embedding providers and tokenizers

pub mod analysis;
pub mod cache;
pub mod chunk;
pub mod cli;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod hybrid;
pub mod namespace;
pub mod sparse;
pub mod storage;
pub mod vector;

pub use engine::{CancelToken, EngineConfig, QueryHit, QueryRequest, RetrievalEngine};
pub use error::{PalisadeError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
