//! Numeric and datetime range searcher
//!
//! The sortable range decomposes into covering trie term ranges; actual
//! index terms inside each range come from the dictionary, and their union
//! is searched. Every indexed value falls in exactly one covering range, so
//! the disjunction never double-counts a doc.

use std::collections::BTreeSet;

use super::prefix::searcher_over_terms;
use super::{Searcher, SearcherOptions};
use crate::error::Result;
use crate::index::Snapshot;
use crate::numeric;
use crate::search::{DocumentMatch, SearchContext};
use crate::segment::GlobalDocNum;

pub struct RangeSearcher {
    inner: Box<dyn Searcher>,
}

impl RangeSearcher {
    /// `[min_sortable, max_sortable]` inclusive, in sortable-u64 space
    pub fn new(
        snapshot: &Snapshot,
        field: &str,
        min_sortable: u64,
        max_sortable: u64,
        options: &SearcherOptions,
    ) -> Result<Self> {
        let mut terms = BTreeSet::new();
        for range in numeric::split_range(min_sortable, max_sortable) {
            for seg in snapshot.segments() {
                for (term, _) in
                    seg.segment
                        .dict_iter(field, Some(&range.lo), Some(&range.hi))
                {
                    terms.insert(term);
                }
            }
        }
        Ok(Self {
            inner: searcher_over_terms(snapshot, field, terms.into_iter().collect(), options)?,
        })
    }
}

impl Searcher for RangeSearcher {
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
