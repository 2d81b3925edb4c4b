//! Union of child searchers
//!
//! A min-heap over child current matches yields the smallest doc; all
//! children sitting on that doc contribute score, with a coordination
//! factor rewarding docs matched by more children. `min_matching` supports
//! boolean min-should-match semantics.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::Searcher;
use crate::error::Result;
use crate::search::{DocumentMatch, SearchContext};
use crate::segment::GlobalDocNum;

pub struct DisjunctionSearcher {
    children: Vec<Box<dyn Searcher>>,
    /// (doc, child index) heap of each child's current head
    heap: BinaryHeap<Reverse<(GlobalDocNum, usize)>>,
    /// Current head match per child, parallel to `children`
    heads: Vec<Option<DocumentMatch>>,
    primed: bool,
    min_matching: usize,
}

impl DisjunctionSearcher {
    pub fn new(children: Vec<Box<dyn Searcher>>, min_matching: usize) -> Self {
        let heads = (0..children.len()).map(|_| None).collect();
        Self {
            children,
            heap: BinaryHeap::new(),
            heads,
            primed: false,
            min_matching: min_matching.max(1),
        }
    }

    fn prime(&mut self, ctx: &mut SearchContext) -> Result<()> {
        for i in 0..self.children.len() {
            if let Some(head) = self.children[i].next(ctx)? {
                self.heap.push(Reverse((head.number, i)));
                self.heads[i] = Some(head);
            }
        }
        self.primed = true;
        Ok(())
    }

    fn refill(&mut self, ctx: &mut SearchContext, child: usize) -> Result<()> {
        if let Some(head) = self.children[child].next(ctx)? {
            self.heap.push(Reverse((head.number, child)));
            self.heads[child] = Some(head);
        }
        Ok(())
    }

    fn emit_round(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        loop {
            let Some(Reverse((doc, first_child))) = self.heap.pop() else {
                return Ok(None);
            };

            let mut matching = 0usize;
            let mut score = 0.0f64;

            let head = self.heads[first_child].take().expect("head tracked by heap");
            score += head.score;
            matching += 1;
            ctx.pool.put(head);
            self.refill(ctx, first_child)?;

            while let Some(&Reverse((next_doc, child))) = self.heap.peek() {
                if next_doc != doc {
                    break;
                }
                self.heap.pop();
                let head = self.heads[child].take().expect("head tracked by heap");
                score += head.score;
                matching += 1;
                ctx.pool.put(head);
                self.refill(ctx, child)?;
            }

            if matching < self.min_matching {
                continue;
            }

            let coord = matching as f64 / self.children.len() as f64;
            let mut doc_match = ctx.pool.get();
            doc_match.number = doc;
            doc_match.score = score * coord;
            return Ok(Some(doc_match));
        }
    }
}

impl Searcher for DisjunctionSearcher {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        if !self.primed {
            self.prime(ctx)?;
        }
        self.emit_round(ctx)
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        if !self.primed {
            self.prime(ctx)?;
        }
        // re-seat children whose head sits below the target
        while let Some(&Reverse((doc, child))) = self.heap.peek() {
            if doc >= target {
                break;
            }
            self.heap.pop();
            if let Some(head) = self.heads[child].take() {
                ctx.pool.put(head);
            }
            if let Some(head) = self.children[child].advance(ctx, target)? {
                self.heap.push(Reverse((head.number, child)));
                self.heads[child] = Some(head);
            }
        }
        self.emit_round(ctx)
    }

    fn count(&self) -> u64 {
        self.children.iter().map(|c| c.count()).sum()
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
