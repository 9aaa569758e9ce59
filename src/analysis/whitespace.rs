//! Whitespace tokenizer implementation.

use crate::analysis::Tokenizer;
use crate::error::Result;

/// A tokenizer that splits text on whitespace, preserving case.
///
/// Useful when the caller has already normalized the text or needs exact,
/// case-sensitive term matching.
#[derive(Clone, Debug, Default)]
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    /// Create a new whitespace tokenizer.
    pub fn new() -> Self {
        WhitespaceTokenizer
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_tokenizer() {
        let tokenizer = WhitespaceTokenizer::new();
        let terms = tokenizer.tokenize("hello  world\ttest").unwrap();
        assert_eq!(terms, vec!["hello", "world", "test"]);
    }

    #[test]
    fn test_whitespace_tokenizer_keeps_case() {
        let tokenizer = WhitespaceTokenizer::new();
        let terms = tokenizer.tokenize("Hello World").unwrap();
        assert_eq!(terms, vec!["Hello", "World"]);
    }

    #[test]
    fn test_tokenizer_name() {
        assert_eq!(WhitespaceTokenizer::new().name(), "whitespace");
    }
}
