//! Composed must / should / must-not searcher
//!
//! The base stream is the must conjunction when present, otherwise the
//! should disjunction. Should clauses add score to must-matched docs; with a
//! min-should-match they also gate them. Must-not docs are collected into a
//! set once and filtered out.

use roaring::RoaringTreemap;

use super::Searcher;
use crate::error::Result;
use crate::search::{DocumentMatch, SearchContext};
use crate::segment::GlobalDocNum;

pub struct BooleanSearcher {
    /// Base stream: must conjunction, or should disjunction when no must
    base: Box<dyn Searcher>,
    /// Present only when must and should coexist
    should: Option<Box<dyn Searcher>>,
    should_required: bool,
    should_pending: Option<DocumentMatch>,
    must_not: Option<Box<dyn Searcher>>,
    must_not_set: Option<RoaringTreemap>,
}

impl BooleanSearcher {
    /// `should` must already enforce its own min-should-match; pass
    /// `should_required` when that minimum is greater than zero
    pub fn new(
        base: Box<dyn Searcher>,
        should: Option<Box<dyn Searcher>>,
        should_required: bool,
        must_not: Option<Box<dyn Searcher>>,
    ) -> Self {
        Self {
            base,
            should,
            should_required,
            should_pending: None,
            must_not,
            must_not_set: None,
        }
    }

    fn excluded(&mut self, ctx: &mut SearchContext, number: GlobalDocNum) -> Result<bool> {
        if self.must_not_set.is_none() {
            let mut set = RoaringTreemap::new();
            if let Some(searcher) = &mut self.must_not {
                while let Some(doc_match) = searcher.next(ctx)? {
                    set.insert(doc_match.number);
                    ctx.pool.put(doc_match);
                }
            }
            self.must_not_set = Some(set);
        }
        Ok(self
            .must_not_set
            .as_ref()
            .map(|set| set.contains(number))
            .unwrap_or(false))
    }

    /// Fold the optional should clause into a base match; returns `None`
    /// when a required should clause misses the doc
    fn apply_should(
        &mut self,
        ctx: &mut SearchContext,
        mut base_match: DocumentMatch,
    ) -> Result<Option<DocumentMatch>> {
        let Some(should) = &mut self.should else {
            return Ok(Some(base_match));
        };

        let pending_covers = self
            .should_pending
            .as_ref()
            .map(|p| p.number >= base_match.number)
            .unwrap_or(false);
        if !pending_covers {
            if let Some(old) = self.should_pending.take() {
                ctx.pool.put(old);
            }
            self.should_pending = should.advance(ctx, base_match.number)?;
        }

        let should_matches = self
            .should_pending
            .as_ref()
            .map(|pending| pending.number == base_match.number)
            .unwrap_or(false);
        if should_matches {
            if let Some(spent) = self.should_pending.take() {
                base_match.score += spent.score;
                ctx.pool.put(spent);
            }
            Ok(Some(base_match))
        } else if self.should_required {
            ctx.pool.put(base_match);
            Ok(None)
        } else {
            Ok(Some(base_match))
        }
    }
}

impl Searcher for BooleanSearcher {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        loop {
            let Some(base_match) = self.base.next(ctx)? else {
                return Ok(None);
            };
            if self.excluded(ctx, base_match.number)? {
                ctx.pool.put(base_match);
                continue;
            }
            if let Some(result) = self.apply_should(ctx, base_match)? {
                return Ok(Some(result));
            }
        }
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        let Some(base_match) = self.base.advance(ctx, target)? else {
            return Ok(None);
        };
        if self.excluded(ctx, base_match.number)? {
            ctx.pool.put(base_match);
            return self.next(ctx);
        }
        match self.apply_should(ctx, base_match)? {
            Some(result) => Ok(Some(result)),
            None => self.next(ctx),
        }
    }

    fn count(&self) -> u64 {
        self.base.count()
    }

    fn doc_match_pool_size(&self) -> usize {
        let should = self
            .should
            .as_ref()
            .map(|s| s.doc_match_pool_size())
            .unwrap_or(0);
        self.base.doc_match_pool_size() + should + 1
    }

    fn close(&mut self) -> Result<()> {
        self.base.close()?;
        if let Some(should) = &mut self.should {
            should.close()?;
        }
        if let Some(must_not) = &mut self.must_not {
            must_not.close()?;
        }
        Ok(())
    }
}
