//! Intersection of child searchers
//!
//! Lead-by-smallest advance: each candidate doc from the first child is
//! offered to the rest; any child landing past it restarts the round at the
//! larger doc number. Score is the sum of child scores.

use super::Searcher;
use crate::error::Result;
use crate::search::{DocumentMatch, SearchContext};
use crate::segment::GlobalDocNum;

pub struct ConjunctionSearcher {
    children: Vec<Box<dyn Searcher>>,
}

impl ConjunctionSearcher {
    pub fn new(children: Vec<Box<dyn Searcher>>) -> Self {
        // leading with the rarest child minimizes advance work
        let mut children = children;
        children.sort_by_key(|c| c.count());
        Self { children }
    }

    /// Align all children on one doc at or past `target`
    fn align(
        &mut self,
        ctx: &mut SearchContext,
        mut candidate: DocumentMatch,
    ) -> Result<Option<DocumentMatch>> {
        'outer: loop {
            let mut score = candidate.score;
            for i in 1..self.children.len() {
                match self.children[i].advance(ctx, candidate.number)? {
                    Some(other) => {
                        if other.number > candidate.number {
                            // candidate missed; restart from the larger doc
                            let target = other.number;
                            ctx.pool.put(other);
                            ctx.pool.put(candidate);
                            match self.children[0].advance(ctx, target)? {
                                Some(next) => {
                                    candidate = next;
                                    continue 'outer;
                                }
                                None => return Ok(None),
                            }
                        }
                        score += other.score;
                        ctx.pool.put(other);
                    }
                    None => {
                        ctx.pool.put(candidate);
                        return Ok(None);
                    }
                }
            }
            candidate.score = score;
            return Ok(Some(candidate));
        }
    }
}

impl Searcher for ConjunctionSearcher {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        if self.children.is_empty() {
            return Ok(None);
        }
        match self.children[0].next(ctx)? {
            Some(candidate) => self.align(ctx, candidate),
            None => Ok(None),
        }
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        if self.children.is_empty() {
            return Ok(None);
        }
        match self.children[0].advance(ctx, target)? {
            Some(candidate) => self.align(ctx, candidate),
            None => Ok(None),
        }
    }

    fn count(&self) -> u64 {
        self.children.iter().map(|c| c.count()).min().unwrap_or(0)
    }

    fn doc_match_pool_size(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.doc_match_pool_size())
            .sum::<usize>()
            + 1
    }

    fn close(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.close()?;
        }
        Ok(())
    }
}
