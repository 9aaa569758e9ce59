//! Default tokenizer: Unicode word boundaries plus lowercasing.
//!
//! This is the analyzer both indexing and querying use unless the caller
//! plugs in their own. It splits on Unicode word boundary rules (UAX #29),
//! which drops punctuation and whitespace, and lowercases every term so that
//! query terms and document terms agree.
//!
//! # Examples
//!
//! ```
//! use palisade::analysis::{SimpleTokenizer, Tokenizer};
//!
//! let tokenizer = SimpleTokenizer::new();
//! let terms = tokenizer.tokenize("BM25 ranks keyword-overlap!").unwrap();
//! assert_eq!(terms, vec!["bm25", "ranks", "keyword", "overlap"]);
//! ```

use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::Tokenizer;
use crate::error::Result;

/// A tokenizer that splits on Unicode word boundaries and lowercases terms.
#[derive(Clone, Debug, Default)]
pub struct SimpleTokenizer;

impl SimpleTokenizer {
    /// Create a new simple tokenizer.
    pub fn new() -> Self {
        SimpleTokenizer
    }
}

impl Tokenizer for SimpleTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let terms = text
            .unicode_words()
            .map(|word| word.to_lowercase())
            .collect();
        Ok(terms)
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}
