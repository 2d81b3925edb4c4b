//! Prefix searcher: disjunction over dictionary expansion

use std::collections::BTreeSet;

use super::{
    BitmapSearcher, DisjunctionSearcher, Searcher, SearcherOptions, TermSearcher,
};
use crate::error::{CuttleError, Result};
use crate::index::Snapshot;
use crate::search::{DocumentMatch, SearchContext};
use crate::segment::GlobalDocNum;

/// Hard cap on dictionary expansion before the query is rejected
pub const MAX_EXPANSION: usize = 1024;

pub struct PrefixSearcher {
    inner: Box<dyn Searcher>,
}

impl PrefixSearcher {
    pub fn new(
        snapshot: &Snapshot,
        field: &str,
        prefix: &[u8],
        options: &SearcherOptions,
    ) -> Result<Self> {
        let terms = expand_prefix(snapshot, field, prefix)?;
        Ok(Self {
            inner: searcher_over_terms(snapshot, field, terms, options)?,
        })
    }
}

/// Every dictionary term starting with `prefix`, across all segments
fn expand_prefix(snapshot: &Snapshot, field: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut terms = BTreeSet::new();
    for seg in snapshot.segments() {
        for (term, _) in seg.segment.dict_iter(field, Some(prefix), None) {
            if !term.starts_with(prefix) {
                // dictionary is sorted, the prefix region has ended
                break;
            }
            terms.insert(term);
            if terms.len() > MAX_EXPANSION {
                return Err(CuttleError::InvalidQuery(format!(
                    "prefix expands past {} terms",
                    MAX_EXPANSION
                )));
            }
        }
    }
    Ok(terms.into_iter().collect())
}

/// Build the cheapest searcher for a set of same-field terms
pub(super) fn searcher_over_terms(
    snapshot: &Snapshot,
    field: &str,
    terms: Vec<Vec<u8>>,
    options: &SearcherOptions,
) -> Result<Box<dyn Searcher>> {
    if terms.is_empty() {
        return Ok(Box::new(BitmapSearcher::new(Default::default())));
    }

    if !options.needs_scores && options.optimize_disjunction_unadorned {
        let mut cardinality = 0u64;
        for term in &terms {
            cardinality += snapshot.doc_frequency(field, term)?;
        }
        if cardinality >= options.optimize_disjunction_unadorned_min_child_cardinality {
            return Ok(Box::new(BitmapSearcher::union(snapshot, field, &terms)?));
        }
    }

    let children: Vec<Box<dyn Searcher>> = terms
        .iter()
        .map(|term| {
            TermSearcher::new(snapshot, field, term, options)
                .map(|s| Box::new(s) as Box<dyn Searcher>)
        })
        .collect::<Result<_>>()?;
    Ok(Box::new(DisjunctionSearcher::new(children, 1)))
}

impl Searcher for PrefixSearcher {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        self.inner.next(ctx)
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        self.inner.advance(ctx, target)
    }

    fn count(&self) -> u64 {
        self.inner.count()
    }

    fn doc_match_pool_size(&self) -> usize {
        self.inner.doc_match_pool_size()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
