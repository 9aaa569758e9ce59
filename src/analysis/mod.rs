//! Text analysis for the sparse index.
//!
//! Tokenization is a pluggable collaborator: the sparse index only consumes
//! the terms a [`Tokenizer`] produces, so swapping in a different analysis
//! pipeline never requires touching the index itself.

mod simple;
mod whitespace;

pub use simple::SimpleTokenizer;
pub use whitespace::WhitespaceTokenizer;

use crate::error::Result;

/// Trait for tokenizers that convert text into index terms.
pub trait Tokenizer: Send + Sync + std::fmt::Debug {
    /// Tokenize the given text into terms, in document order.
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;

    /// Get the name of this tokenizer (for debugging and configuration).
    fn name(&self) -> &'static str;
}
