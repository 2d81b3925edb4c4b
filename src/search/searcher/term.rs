//! Single-term searcher with BM25 scoring

use std::sync::Arc;

use roaring::RoaringBitmap;

use super::{Searcher, SearcherOptions};
use crate::error::Result;
use crate::index::Snapshot;
use crate::search::{CollectionStats, DocumentMatch, SearchContext, Similarity};
use crate::segment::{GlobalDocNum, PostingEntry, PostingIterator};

struct SegmentPostings {
    base: GlobalDocNum,
    limit: GlobalDocNum,
    deletions: Option<Arc<RoaringBitmap>>,
    iter: Box<dyn PostingIterator>,
}

impl SegmentPostings {
    fn is_deleted(&self, doc: u32) -> bool {
        self.deletions.as_ref().map(|d| d.contains(doc)).unwrap_or(false)
    }
}

pub struct TermSearcher {
    segments: Vec<SegmentPostings>,
    current: usize,
    similarity: Arc<dyn Similarity>,
    idf: f64,
    stats: CollectionStats,
    needs_scores: bool,
    count: u64,
}

impl TermSearcher {
    pub fn new(
        snapshot: &Snapshot,
        field: &str,
        term: &[u8],
        options: &SearcherOptions,
    ) -> Result<Self> {
        let mut segments = Vec::new();
        let mut doc_frequency = 0u64;
        for (i, seg) in snapshot.segments().iter().enumerate() {
            if let Some(iter) = seg.segment.postings(field, term, false)? {
                doc_frequency += iter.doc_frequency() as u64;
                let base = snapshot.base(i);
                segments.push(SegmentPostings {
                    base,
                    limit: base + seg.doc_count(),
                    deletions: seg.deletions.clone(),
                    iter,
                });
            }
        }

        let stats = CollectionStats {
            doc_count: snapshot.doc_count(),
            doc_frequency,
            average_field_length: snapshot.average_field_length(field),
        };
        let idf = options.similarity.idf(&stats);

        Ok(Self {
            segments,
            current: 0,
            similarity: options.similarity.clone(),
            idf,
            stats,
            needs_scores: options.needs_scores,
            count: doc_frequency,
        })
    }

    fn emit(&self, ctx: &mut SearchContext, base: GlobalDocNum, entry: &PostingEntry) -> DocumentMatch {
        let mut doc_match = ctx.pool.get();
        doc_match.number = base + entry.doc as GlobalDocNum;
        if self.needs_scores {
            doc_match.score =
                self.similarity
                    .score(entry.term_frequency, entry.norm, self.idf, &self.stats);
        }
        doc_match
    }
}

impl Searcher for TermSearcher {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        while self.current < self.segments.len() {
            let seg = &mut self.segments[self.current];
            match seg.iter.next()? {
                Some(entry) => {
                    if seg.is_deleted(entry.doc) {
                        continue;
                    }
                    let base = seg.base;
                    return Ok(Some(self.emit(ctx, base, &entry)));
                }
                None => self.current += 1,
            }
        }
        Ok(None)
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        // skip segments wholly below the target
        while self.current < self.segments.len() && self.segments[self.current].limit <= target {
            self.current += 1;
        }
        if self.current >= self.segments.len() {
            return Ok(None);
        }

        let seg = &mut self.segments[self.current];
        if target > seg.base {
            let local_target = (target - seg.base) as u32;
            match seg.iter.advance(local_target)? {
                Some(entry) => {
                    if !seg.is_deleted(entry.doc) {
                        let base = seg.base;
                        return Ok(Some(self.emit(ctx, base, &entry)));
                    }
                    // the iterator already sits past the deleted entry;
                    // fall through to sequential scanning
                }
                None => self.current += 1,
            }
        }
        self.next(ctx)
    }

    fn count(&self) -> u64 {
        self.count
    }
}
