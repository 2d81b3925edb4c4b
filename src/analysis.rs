//! Analysis interface and default analyzers
//!
//! Tokenization is an external collaborator: the indexer consumes already
//! analyzed tokens. This module defines the `Analyzer` trait plus the two
//! analyzers the crate ships with (`StandardAnalyzer` for text fields,
//! `KeywordAnalyzer` for exact-match fields).

use std::fmt::Debug;

use unicode_segmentation::UnicodeSegmentation;

/// A single token produced by analysis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// Term bytes as indexed
    pub term: Vec<u8>,
    /// Position within the field, for phrase matching
    pub position: u32,
    /// Byte offset range in the source text, for highlighting hooks
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(term: impl Into<Vec<u8>>, position: u32, start: usize, end: usize) -> Self {
        Self {
            term: term.into(),
            position,
            start,
            end,
        }
    }
}

/// Converts field text into a token stream
pub trait Analyzer: Send + Sync + Debug {
    fn analyze(&self, text: &str) -> Vec<Token>;
}

/// Unicode word segmentation with lowercasing
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardAnalyzer;

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Vec<Token> {
        text.unicode_word_indices()
            .enumerate()
            .map(|(position, (start, word))| Token {
                term: word.to_lowercase().into_bytes(),
                position: position as u32,
                start,
                end: start + word.len(),
            })
            .collect()
    }
}

/// Emits the whole input as one token, unchanged
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordAnalyzer;

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        vec![Token {
            term: text.as_bytes().to_vec(),
            position: 0,
            start: 0,
            end: text.len(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_analyzer() {
        let tokens = StandardAnalyzer.analyze("Hello World! This is a test.");
        let terms: Vec<&[u8]> = tokens.iter().map(|t| t.term.as_slice()).collect();
        assert!(terms.contains(&b"hello".as_slice()));
        assert!(terms.contains(&b"world".as_slice()));
        assert!(terms.contains(&b"test".as_slice()));
    }

    #[test]
    fn test_standard_analyzer_positions() {
        let tokens = StandardAnalyzer.analyze("quick brown fox");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 1);
        assert_eq!(tokens[2].position, 2);
        assert_eq!(&tokens[1].term, b"brown");
        assert_eq!(tokens[1].start, 6);
        assert_eq!(tokens[1].end, 11);
    }

    #[test]
    fn test_keyword_analyzer() {
        let tokens = KeywordAnalyzer.analyze("New York");
        assert_eq!(tokens.len(), 1);
        assert_eq!(&tokens[0].term, b"New York");

        assert!(KeywordAnalyzer.analyze("").is_empty());
    }
}
