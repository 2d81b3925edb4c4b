//! Term and prefix queries

use super::Query;
use crate::error::Result;
use crate::reader::Reader;
use crate::search::searcher::{PrefixSearcher, Searcher, SearcherOptions, TermSearcher};

/// Exact term match on one field
#[derive(Clone, Debug)]
pub struct TermQuery {
    pub field: String,
    pub term: Vec<u8>,
}

impl TermQuery {
    pub fn new(field: impl Into<String>, term: impl Into<Vec<u8>>) -> Self {
        Self {
            field: field.into(),
            term: term.into(),
        }
    }
}

impl Query for TermQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        Ok(Box::new(TermSearcher::new(
            reader.snapshot(),
            &self.field,
            &self.term,
            options,
        )?))
    }

    fn as_term(&self) -> Option<(&str, &[u8])> {
        Some((&self.field, &self.term))
    }
}

/// Dictionary expansion of a term prefix
#[derive(Clone, Debug)]
pub struct PrefixQuery {
    pub field: String,
    pub prefix: Vec<u8>,
}

impl PrefixQuery {
    pub fn new(field: impl Into<String>, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            field: field.into(),
            prefix: prefix.into(),
        }
    }
}

impl Query for PrefixQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        Ok(Box::new(PrefixSearcher::new(
            reader.snapshot(),
            &self.field,
            &self.prefix,
            options,
        )?))
    }
}
