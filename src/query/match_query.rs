//! Analyzed match, match-phrase and phrase queries

use std::sync::Arc;

use super::Query;
use crate::analysis::Analyzer;
use crate::error::{CuttleError, Result};
use crate::reader::Reader;
use crate::search::searcher::{
    DisjunctionSearcher, PhraseSearcher, Searcher, SearcherOptions, TermSearcher,
};

/// Analyzes the input and matches any resulting term (a term disjunction)
#[derive(Clone, Debug)]
pub struct MatchQuery {
    pub field: String,
    pub text: String,
    /// Overrides the reader's default analyzer
    pub analyzer: Option<Arc<dyn Analyzer>>,
}

impl MatchQuery {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
            analyzer: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    fn terms(&self, reader: &Reader) -> Vec<Vec<u8>> {
        let analyzer = self
            .analyzer
            .clone()
            .unwrap_or_else(|| reader.default_analyzer());
        let mut terms: Vec<Vec<u8>> = analyzer
            .analyze(&self.text)
            .into_iter()
            .map(|t| t.term)
            .collect();
        terms.sort_unstable();
        terms.dedup();
        terms
    }
}

impl Query for MatchQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        let terms = self.terms(reader);
        if terms.is_empty() {
            return Err(CuttleError::InvalidQuery(format!(
                "match query on {:?} analyzed to no terms",
                self.field
            )));
        }
        let children = terms
            .iter()
            .map(|term| {
                TermSearcher::new(reader.snapshot(), &self.field, term, options)
                    .map(|s| Box::new(s) as Box<dyn Searcher>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(DisjunctionSearcher::new(children, 1)))
    }
}

/// Analyzes the input and matches it as a consecutive phrase
#[derive(Clone, Debug)]
pub struct MatchPhraseQuery {
    pub field: String,
    pub text: String,
    pub analyzer: Option<Arc<dyn Analyzer>>,
}

impl MatchPhraseQuery {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
            analyzer: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }
}

impl Query for MatchPhraseQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        let analyzer = self
            .analyzer
            .clone()
            .unwrap_or_else(|| reader.default_analyzer());
        let terms: Vec<Vec<u8>> = analyzer
            .analyze(&self.text)
            .into_iter()
            .map(|t| t.term)
            .collect();
        if terms.is_empty() {
            return Err(CuttleError::InvalidQuery(format!(
                "match phrase query on {:?} analyzed to no terms",
                self.field
            )));
        }
        Ok(Box::new(PhraseSearcher::new(
            reader.snapshot(),
            &self.field,
            &terms,
            0,
            options,
        )?))
    }
}

/// Pre-tokenized phrase with slop tolerance
#[derive(Clone, Debug)]
pub struct PhraseQuery {
    pub field: String,
    pub terms: Vec<Vec<u8>>,
    pub slop: u32,
}

impl PhraseQuery {
    pub fn new(field: impl Into<String>, terms: Vec<Vec<u8>>) -> Self {
        Self {
            field: field.into(),
            terms,
            slop: 0,
        }
    }

    pub fn with_slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }
}

impl Query for PhraseQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        if self.terms.is_empty() {
            return Err(CuttleError::InvalidQuery(
                "phrase query requires at least one term".to_string(),
            ));
        }
        Ok(Box::new(PhraseSearcher::new(
            reader.snapshot(),
            &self.field,
            &self.terms,
            self.slop,
            options,
        )?))
    }
}
