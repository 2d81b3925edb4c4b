//! Query algebra
//!
//! Queries are a description of what to match; building a `Searcher` against
//! a reader's snapshot is where analysis, dictionary expansion and the
//! optimized bitmap paths happen.

mod match_query;
mod range;
mod term;

pub use match_query::{MatchPhraseQuery, MatchQuery, PhraseQuery};
pub use range::{DateRangeQuery, NumericRangeQuery};
pub use term::{PrefixQuery, TermQuery};

use std::fmt::Debug;

use crate::error::{CuttleError, Result};
use crate::reader::Reader;
use crate::search::searcher::{
    BitmapSearcher, BooleanSearcher, ConjunctionSearcher, DisjunctionSearcher, MatchAllSearcher,
    Searcher, SearcherOptions,
};

/// A node in the query tree
pub trait Query: Send + Sync + Debug {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>>;

    /// `(field, term)` when this query is a plain term lookup; lets parents
    /// take the unadorned bitmap paths
    fn as_term(&self) -> Option<(&str, &[u8])> {
        None
    }
}

/// Matches every live document
#[derive(Clone, Copy, Debug, Default)]
pub struct MatchAllQuery;

impl MatchAllQuery {
    pub fn new() -> Self {
        Self
    }
}

impl Query for MatchAllQuery {
    fn searcher(&self, reader: &Reader, _options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        Ok(Box::new(MatchAllSearcher::new(reader.snapshot())))
    }
}

/// Returns `Some((field, terms))` when every child is a term query on one field
fn unadorned_terms<'a>(children: &'a [Box<dyn Query>]) -> Option<(&'a str, Vec<Vec<u8>>)> {
    let mut field: Option<&str> = None;
    let mut terms = Vec::with_capacity(children.len());
    for child in children {
        let (child_field, term) = child.as_term()?;
        match field {
            None => field = Some(child_field),
            Some(f) if f == child_field => {}
            Some(_) => return None,
        }
        terms.push(term.to_vec());
    }
    field.map(|f| (f, terms))
}

/// Intersection of child queries
#[derive(Debug, Default)]
pub struct ConjunctionQuery {
    children: Vec<Box<dyn Query>>,
}

impl ConjunctionQuery {
    pub fn new(children: Vec<Box<dyn Query>>) -> Self {
        Self { children }
    }

    pub fn and(mut self, query: impl Query + 'static) -> Self {
        self.children.push(Box::new(query));
        self
    }
}

impl Query for ConjunctionQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        if self.children.is_empty() {
            return Err(CuttleError::InvalidQuery(
                "conjunction requires at least one child".to_string(),
            ));
        }

        if options.optimize_conjunction
            && options.optimize_conjunction_unadorned
            && !options.needs_scores
        {
            if let Some((field, terms)) = unadorned_terms(&self.children) {
                return Ok(Box::new(BitmapSearcher::intersection(
                    reader.snapshot(),
                    field,
                    &terms,
                )?));
            }
        }

        let children = self
            .children
            .iter()
            .map(|c| c.searcher(reader, options))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(ConjunctionSearcher::new(children)))
    }
}

/// Union of child queries
#[derive(Debug, Default)]
pub struct DisjunctionQuery {
    children: Vec<Box<dyn Query>>,
    min_matching: usize,
}

impl DisjunctionQuery {
    pub fn new(children: Vec<Box<dyn Query>>) -> Self {
        Self {
            children,
            min_matching: 1,
        }
    }

    pub fn or(mut self, query: impl Query + 'static) -> Self {
        self.children.push(Box::new(query));
        self
    }

    pub fn with_min_matching(mut self, min: usize) -> Self {
        self.min_matching = min.max(1);
        self
    }
}

impl Query for DisjunctionQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        if self.children.is_empty() {
            return Err(CuttleError::InvalidQuery(
                "disjunction requires at least one child".to_string(),
            ));
        }

        if options.optimize_disjunction_unadorned
            && !options.needs_scores
            && self.min_matching <= 1
        {
            if let Some((field, terms)) = unadorned_terms(&self.children) {
                let mut cardinality = 0u64;
                for term in &terms {
                    cardinality += reader.snapshot().doc_frequency(field, term)?;
                }
                if cardinality >= options.optimize_disjunction_unadorned_min_child_cardinality {
                    return Ok(Box::new(BitmapSearcher::union(
                        reader.snapshot(),
                        field,
                        &terms,
                    )?));
                }
            }
        }

        let children = self
            .children
            .iter()
            .map(|c| c.searcher(reader, options))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(DisjunctionSearcher::new(children, self.min_matching)))
    }
}

/// must / should / must-not composition
#[derive(Debug, Default)]
pub struct BooleanQuery {
    musts: Vec<Box<dyn Query>>,
    shoulds: Vec<Box<dyn Query>>,
    must_nots: Vec<Box<dyn Query>>,
    min_should_match: usize,
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_must(mut self, query: impl Query + 'static) -> Self {
        self.musts.push(Box::new(query));
        self
    }

    pub fn with_should(mut self, query: impl Query + 'static) -> Self {
        self.shoulds.push(Box::new(query));
        self
    }

    pub fn with_must_not(mut self, query: impl Query + 'static) -> Self {
        self.must_nots.push(Box::new(query));
        self
    }

    pub fn with_min_should_match(mut self, min: usize) -> Self {
        self.min_should_match = min;
        self
    }
}

impl Query for BooleanQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        if self.musts.is_empty() && self.shoulds.is_empty() {
            return Err(CuttleError::InvalidQuery(
                "boolean query requires a must or should clause".to_string(),
            ));
        }

        let must = if self.musts.is_empty() {
            None
        } else {
            let children = self
                .musts
                .iter()
                .map(|q| q.searcher(reader, options))
                .collect::<Result<Vec<_>>>()?;
            Some(if children.len() == 1 {
                children.into_iter().next().expect("len checked")
            } else {
                Box::new(ConjunctionSearcher::new(children)) as Box<dyn Searcher>
            })
        };

        let should = if self.shoulds.is_empty() {
            None
        } else {
            let children = self
                .shoulds
                .iter()
                .map(|q| q.searcher(reader, options))
                .collect::<Result<Vec<_>>>()?;
            Some(Box::new(DisjunctionSearcher::new(
                children,
                self.min_should_match.max(1),
            )) as Box<dyn Searcher>)
        };

        let must_not = if self.must_nots.is_empty() {
            None
        } else {
            let unscored = options.without_scores();
            let children = self
                .must_nots
                .iter()
                .map(|q| q.searcher(reader, &unscored))
                .collect::<Result<Vec<_>>>()?;
            Some(Box::new(DisjunctionSearcher::new(children, 1)) as Box<dyn Searcher>)
        };

        match (must, should) {
            (Some(must), should) => Ok(Box::new(BooleanSearcher::new(
                must,
                should,
                self.min_should_match > 0,
                must_not,
            ))),
            (None, Some(should)) => Ok(Box::new(BooleanSearcher::new(
                should, None, false, must_not,
            ))),
            (None, None) => unreachable!("validated above"),
        }
    }
}
