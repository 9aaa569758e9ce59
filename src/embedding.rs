//! Embedding provider interface.
//!
//! Palisade never manages embedding models itself. The provider is an opaque
//! collaborator injected explicitly into the ingestion and query paths, which
//! keeps the retrieval core focused on search and leaves the model lifecycle
//! (local inference, remote APIs, batching) to the caller. There is no
//! implicit global model instance.
//!
//! # Examples
//!
//! ```
//! use async_trait::async_trait;
//! use palisade::embedding::EmbeddingProvider;
//! use palisade::error::Result;
//! use palisade::vector::Vector;
//!
//! #[derive(Debug)]
//! struct MyEmbedder {
//!     dimension: usize,
//! }
//!
//! #[async_trait]
//! impl EmbeddingProvider for MyEmbedder {
//!     async fn embed(&self, _text: &str) -> Result<Vector> {
//!         // Your model call here.
//!         Ok(Vector::new(vec![0.0; self.dimension]))
//!     }
//!
//!     fn dimension(&self) -> usize {
//!         self.dimension
//!     }
//!
//!     fn name(&self) -> &str {
//!         "my-embedder"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::vector::Vector;

/// Converts text into a fixed-length embedding vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Embed a piece of text.
    ///
    /// The returned vector must have exactly [`dimension`](Self::dimension)
    /// components.
    async fn embed(&self, text: &str) -> Result<Vector>;

    /// The dimension of vectors this provider produces.
    fn dimension(&self) -> usize;

    /// A short name identifying the provider (for diagnostics).
    fn name(&self) -> &str;
}

/// A deterministic, model-free provider.
///
/// Hashes token trigrams into a fixed number of buckets and L2-normalizes the
/// result. Nearby texts share buckets, so rankings behave sensibly without
/// any model. Intended for tests, benchmarks, and the CLI; production callers
/// plug in a real model.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create a hashing embedder producing vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        HashingEmbedder {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, gram: &str) -> usize {
        // FNV-1a over the gram bytes; stable across runs.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in gram.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
        }
        (hash % self.dimension as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vector> {
        let mut values = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        for word in lowered.split_whitespace() {
            values[self.bucket(word)] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                values[self.bucket(&gram)] += 0.5;
            }
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }

        Ok(Vector::new(values))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
