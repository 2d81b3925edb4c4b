//! Phrase searcher: conjunction with positional post-filtering
//!
//! Terms must appear in order; `slop` bounds the total number of extra
//! position gaps tolerated across the whole phrase, so slop 0 means strictly
//! consecutive positions.

use std::sync::Arc;

use roaring::RoaringBitmap;

use super::{Searcher, SearcherOptions};
use crate::error::Result;
use crate::index::Snapshot;
use crate::search::{CollectionStats, DocumentMatch, SearchContext, Similarity};
use crate::segment::{GlobalDocNum, PostingEntry, PostingIterator};

struct SegmentPhrase {
    base: GlobalDocNum,
    deletions: Option<Arc<RoaringBitmap>>,
    iters: Vec<Box<dyn PostingIterator>>,
    exhausted: bool,
}

pub struct PhraseSearcher {
    segments: Vec<SegmentPhrase>,
    current: usize,
    similarity: Arc<dyn Similarity>,
    /// Per-term `(idf, stats)`, parallel to the phrase terms
    term_weights: Vec<(f64, CollectionStats)>,
    needs_scores: bool,
    slop: u32,
    count: u64,
}

impl PhraseSearcher {
    pub fn new(
        snapshot: &Snapshot,
        field: &str,
        terms: &[Vec<u8>],
        slop: u32,
        options: &SearcherOptions,
    ) -> Result<Self> {
        let average_field_length = snapshot.average_field_length(field);
        let mut term_weights = Vec::with_capacity(terms.len());
        let mut min_df = u64::MAX;
        for term in terms {
            let df = snapshot.doc_frequency(field, term)?;
            min_df = min_df.min(df);
            let stats = CollectionStats {
                doc_count: snapshot.doc_count(),
                doc_frequency: df,
                average_field_length,
            };
            let idf = options.similarity.idf(&stats);
            term_weights.push((idf, stats));
        }

        // a segment participates only when it contains every phrase term
        let mut segments = Vec::new();
        'segments: for (i, seg) in snapshot.segments().iter().enumerate() {
            let mut iters = Vec::with_capacity(terms.len());
            for term in terms {
                match seg.segment.postings(field, term, true)? {
                    Some(iter) => iters.push(iter),
                    None => continue 'segments,
                }
            }
            segments.push(SegmentPhrase {
                base: snapshot.base(i),
                deletions: seg.deletions.clone(),
                iters,
                exhausted: terms.is_empty(),
            });
        }

        Ok(Self {
            segments,
            current: 0,
            similarity: options.similarity.clone(),
            term_weights,
            needs_scores: options.needs_scores,
            slop,
            count: if min_df == u64::MAX { 0 } else { min_df },
        })
    }

    /// Advance one segment to its next aligned, position-verified doc
    fn next_in_segment(&mut self, idx: usize) -> Result<Option<(u32, Vec<PostingEntry>)>> {
        let slop = self.slop;
        let seg = &mut self.segments[idx];
        if seg.exhausted {
            return Ok(None);
        }

        let mut lead = match seg.iters[0].next()? {
            Some(entry) => entry,
            None => {
                seg.exhausted = true;
                return Ok(None);
            }
        };

        'outer: loop {
            let target = lead.doc;
            let mut entries = vec![lead.clone()];

            for i in 1..seg.iters.len() {
                match seg.iters[i].advance(target)? {
                    None => {
                        seg.exhausted = true;
                        return Ok(None);
                    }
                    Some(entry) if entry.doc == target => entries.push(entry),
                    Some(entry) => {
                        // overshoot: restart the round at the larger doc
                        match seg.iters[0].advance(entry.doc)? {
                            Some(new_lead) => {
                                lead = new_lead;
                                continue 'outer;
                            }
                            None => {
                                seg.exhausted = true;
                                return Ok(None);
                            }
                        }
                    }
                }
            }

            let deleted = seg
                .deletions
                .as_ref()
                .map(|d| d.contains(target))
                .unwrap_or(false);
            if !deleted {
                let positions: Vec<&[u32]> =
                    entries.iter().map(|e| e.positions.as_slice()).collect();
                if phrase_aligns(&positions, slop) {
                    return Ok(Some((target, entries)));
                }
            }

            lead = match seg.iters[0].next()? {
                Some(entry) => entry,
                None => {
                    seg.exhausted = true;
                    return Ok(None);
                }
            };
        }
    }

    fn score(&self, entries: &[PostingEntry]) -> f64 {
        if !self.needs_scores {
            return 0.0;
        }
        entries
            .iter()
            .zip(&self.term_weights)
            .map(|(entry, (idf, stats))| {
                self.similarity
                    .score(entry.term_frequency, entry.norm, *idf, stats)
            })
            .sum()
    }
}

/// True when the terms appear in order with total gap slack within `slop`
fn phrase_aligns(positions: &[&[u32]], slop: u32) -> bool {
    if positions.is_empty() {
        return false;
    }
    positions[0]
        .iter()
        .any(|&start| aligns_from(positions, 1, start, slop))
}

fn aligns_from(positions: &[&[u32]], term: usize, prev: u32, budget: u32) -> bool {
    if term == positions.len() {
        return true;
    }
    for &pos in positions[term] {
        if pos <= prev {
            continue;
        }
        let gap = pos - prev - 1;
        if gap > budget {
            // positions ascend, later candidates only widen the gap
            break;
        }
        if aligns_from(positions, term + 1, pos, budget - gap) {
            return true;
        }
    }
    false
}

impl Searcher for PhraseSearcher {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        while self.current < self.segments.len() {
            match self.next_in_segment(self.current)? {
                Some((doc, entries)) => {
                    let base = self.segments[self.current].base;
                    let mut doc_match = ctx.pool.get();
                    doc_match.number = base + doc as GlobalDocNum;
                    doc_match.score = self.score(&entries);
                    return Ok(Some(doc_match));
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
        // positional state makes fine-grained skipping fiddly; scan forward
        loop {
            match self.next(ctx)? {
                Some(doc_match) if doc_match.number >= target => return Ok(Some(doc_match)),
                Some(doc_match) => ctx.pool.put(doc_match),
                None => return Ok(None),
            }
        }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_aligns_consecutive() {
        let p0: &[u32] = &[0, 10];
        let p1: &[u32] = &[1, 20];
        assert!(phrase_aligns(&[p0, p1], 0));
    }

    #[test]
    fn test_phrase_rejects_wrong_order() {
        let p0: &[u32] = &[5];
        let p1: &[u32] = &[3];
        assert!(!phrase_aligns(&[p0, p1], 0));
        assert!(!phrase_aligns(&[p0, p1], 10));
    }

    #[test]
    fn test_phrase_slop_budget_is_shared() {
        // gaps of 1 and 1 need slop 2
        let p0: &[u32] = &[0];
        let p1: &[u32] = &[2];
        let p2: &[u32] = &[4];
        assert!(!phrase_aligns(&[p0, p1, p2], 1));
        assert!(phrase_aligns(&[p0, p1, p2], 2));
    }

    #[test]
    fn test_phrase_single_term() {
        let p0: &[u32] = &[7];
        assert!(phrase_aligns(&[p0], 0));
    }
}
