//! Matches every live document with a constant score

use std::sync::Arc;

use roaring::RoaringBitmap;

use super::Searcher;
use crate::error::Result;
use crate::index::Snapshot;
use crate::search::{DocumentMatch, SearchContext};
use crate::segment::GlobalDocNum;

struct SegmentRange {
    base: GlobalDocNum,
    limit: GlobalDocNum,
    deletions: Option<Arc<RoaringBitmap>>,
}

pub struct MatchAllSearcher {
    segments: Vec<SegmentRange>,
    cursor: GlobalDocNum,
    current: usize,
    live: u64,
}

impl MatchAllSearcher {
    pub fn new(snapshot: &Snapshot) -> Self {
        let segments: Vec<SegmentRange> = snapshot
            .segments()
            .iter()
            .enumerate()
            .map(|(i, seg)| SegmentRange {
                base: snapshot.base(i),
                limit: snapshot.base(i) + seg.doc_count(),
                deletions: seg.deletions.clone(),
            })
            .collect();
        Self {
            segments,
            cursor: 0,
            current: 0,
            live: snapshot.live_doc_count(),
        }
    }
}

impl Searcher for MatchAllSearcher {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        while self.current < self.segments.len() {
            let seg = &self.segments[self.current];
            if self.cursor < seg.base {
                self.cursor = seg.base;
            }
            while self.cursor < seg.limit {
                let local = (self.cursor - seg.base) as u32;
                self.cursor += 1;
                if seg
                    .deletions
                    .as_ref()
                    .map(|d| d.contains(local))
                    .unwrap_or(false)
                {
                    continue;
                }
                let mut doc_match = ctx.pool.get();
                doc_match.number = self.cursor - 1;
                return Ok(Some(doc_match));
            }
            self.current += 1;
        }
        Ok(None)
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        if target > self.cursor {
            self.cursor = target;
            while self.current < self.segments.len()
                && self.segments[self.current].limit <= target
            {
                self.current += 1;
            }
        }
        self.next(ctx)
    }

    fn count(&self) -> u64 {
        self.live
    }
}
