//! Dense vector types and distance functions.

mod index;

pub use index::VectorIndex;

use serde::{Deserialize, Serialize};

/// A fixed-length dense embedding vector.
///
/// Produced externally by an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider);
/// the retrieval core only consumes fixed-length `f32` vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector(Vec<f32>);

impl Vector {
    /// Create a new vector from raw components.
    pub fn new(values: Vec<f32>) -> Self {
        Vector(values)
    }

    /// Number of dimensions.
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// The raw components.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Whether every component is a finite number.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Squared Euclidean (L2) distance to another vector.
    ///
    /// Panics in debug builds if dimensions differ; callers validate
    /// dimensions before reaching this point.
    pub fn squared_euclidean(&self, other: &Vector) -> f32 {
        debug_assert_eq!(self.dimension(), other.dimension());
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum()
    }
}

impl From<Vec<f32>> for Vector {
    fn from(values: Vec<f32>) -> Self {
        Vector::new(values)
    }
}

/// Convert a squared-L2 distance into a presentation similarity in `(0, 1]`.
///
/// `1 / (1 + d)` is strictly decreasing in `d`, so ranking by ascending
/// distance and ranking by descending similarity always agree.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_euclidean() {
        let a = Vector::new(vec![1.0, 0.0, 0.0]);
        let b = Vector::new(vec![0.0, 1.0, 0.0]);
        assert_eq!(a.squared_euclidean(&b), 2.0);
        assert_eq!(a.squared_euclidean(&a), 0.0);
    }

    #[test]
    fn test_similarity_is_monotonic() {
        let sims: Vec<f32> = [0.0, 0.5, 1.0, 2.0, 10.0]
            .iter()
            .map(|&d| similarity_from_distance(d))
            .collect();
        for pair in sims.windows(2) {
            assert!(pair[0] > pair[1]);
        }
        assert_eq!(similarity_from_distance(0.0), 1.0);
    }

    #[test]
    fn test_vector_validity() {
        assert!(Vector::new(vec![1.0, -2.5]).is_valid());
        assert!(!Vector::new(vec![1.0, f32::NAN]).is_valid());
        assert!(!Vector::new(vec![f32::INFINITY]).is_valid());
    }
}
