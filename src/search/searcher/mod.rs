//! Searcher tree: pull-based match iterators
//!
//! Every searcher yields matches in increasing global doc number order and
//! supports skipping via `advance`. Composite searchers recycle their
//! children's match objects through the context pool.

mod boolean;
mod conjunction;
mod disjunction;
mod match_all;
mod optimized;
mod phrase;
mod prefix;
mod range;
mod term;

pub use boolean::BooleanSearcher;
pub use conjunction::ConjunctionSearcher;
pub use disjunction::DisjunctionSearcher;
pub use match_all::MatchAllSearcher;
pub use optimized::{term_doc_id_set, BitmapSearcher};
pub use phrase::PhraseSearcher;
pub use prefix::PrefixSearcher;
pub use range::RangeSearcher;
pub use term::TermSearcher;

use std::sync::Arc;

use super::{DocumentMatch, SearchContext, Similarity};
use crate::error::Result;
use crate::segment::GlobalDocNum;

/// Construction-time options threaded down the searcher tree
#[derive(Clone)]
pub struct SearcherOptions {
    /// When false, searchers may take unadorned (constant-score) paths
    pub needs_scores: bool,
    pub similarity: Arc<dyn Similarity>,
    pub optimize_conjunction: bool,
    pub optimize_conjunction_unadorned: bool,
    pub optimize_disjunction_unadorned: bool,
    pub optimize_disjunction_unadorned_min_child_cardinality: u64,
}

impl SearcherOptions {
    pub fn scoring(similarity: Arc<dyn Similarity>) -> Self {
        Self {
            needs_scores: true,
            similarity,
            optimize_conjunction: true,
            optimize_conjunction_unadorned: true,
            optimize_disjunction_unadorned: true,
            optimize_disjunction_unadorned_min_child_cardinality: 256,
        }
    }

    pub fn without_scores(&self) -> Self {
        let mut options = self.clone();
        options.needs_scores = false;
        options
    }
}

/// Pull iterator over matching documents
pub trait Searcher: Send {
    /// Next match in ascending global doc number order
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>>;

    /// First match with `number >= target`
    fn advance(&mut self, ctx: &mut SearchContext, target: GlobalDocNum)
        -> Result<Option<DocumentMatch>>;

    /// Upper-bound estimate of matches produced
    fn count(&self) -> u64;

    /// Hint for sizing the context's match pool
    fn doc_match_pool_size(&self) -> usize {
        1
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Searcher for Box<dyn Searcher> {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        (**self).next(ctx)
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        (**self).advance(ctx, target)
    }

    fn count(&self) -> u64 {
        (**self).count()
    }

    fn doc_match_pool_size(&self) -> usize {
        (**self).doc_match_pool_size()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
