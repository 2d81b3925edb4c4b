//! Unadorned bitmap fast paths
//!
//! When scores and positions are not needed, term intersections and large
//! unions collapse to roaring set operations over global doc numbers. The
//! resulting searcher yields constant-score matches.

use roaring::RoaringTreemap;

use super::Searcher;
use crate::error::Result;
use crate::index::Snapshot;
use crate::search::{DocumentMatch, SearchContext};
use crate::segment::GlobalDocNum;

/// Collect the live global doc numbers matching `(field, term)`
pub fn term_doc_id_set(snapshot: &Snapshot, field: &str, term: &[u8]) -> Result<RoaringTreemap> {
    let mut set = RoaringTreemap::new();
    for (i, seg) in snapshot.segments().iter().enumerate() {
        let base = snapshot.base(i);
        if let Some(mut iter) = seg.segment.postings(field, term, false)? {
            while let Some(entry) = iter.next()? {
                if !seg.is_deleted(entry.doc) {
                    set.insert(base + entry.doc as GlobalDocNum);
                }
            }
        }
    }
    Ok(set)
}

/// Constant-score searcher over a precomputed doc id set
pub struct BitmapSearcher {
    docs: std::vec::IntoIter<GlobalDocNum>,
    peeked: Option<GlobalDocNum>,
    count: u64,
}

impl BitmapSearcher {
    pub fn new(set: RoaringTreemap) -> Self {
        let count = set.len();
        Self {
            docs: set.into_iter().collect::<Vec<_>>().into_iter(),
            peeked: None,
            count,
        }
    }

    /// Intersection of term sets, the conjunction-unadorned path
    pub fn intersection(
        snapshot: &Snapshot,
        field: &str,
        terms: &[Vec<u8>],
    ) -> Result<Self> {
        let mut result: Option<RoaringTreemap> = None;
        for term in terms {
            let set = term_doc_id_set(snapshot, field, term)?;
            result = Some(match result {
                Some(acc) => acc & set,
                None => set,
            });
            if result.as_ref().map(|r| r.is_empty()).unwrap_or(false) {
                break;
            }
        }
        Ok(Self::new(result.unwrap_or_default()))
    }

    /// Union of term sets, the disjunction-unadorned path
    pub fn union(snapshot: &Snapshot, field: &str, terms: &[Vec<u8>]) -> Result<Self> {
        let mut result = RoaringTreemap::new();
        for term in terms {
            result |= term_doc_id_set(snapshot, field, term)?;
        }
        Ok(Self::new(result))
    }

    fn pull(&mut self) -> Option<GlobalDocNum> {
        self.peeked.take().or_else(|| self.docs.next())
    }
}

impl Searcher for BitmapSearcher {
    fn next(&mut self, ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        Ok(self.pull().map(|number| {
            let mut doc_match = ctx.pool.get();
            doc_match.number = number;
            doc_match
        }))
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        while let Some(number) = self.pull() {
            if number >= target {
                let mut doc_match = ctx.pool.get();
                doc_match.number = number;
                return Ok(Some(doc_match));
            }
        }
        Ok(None)
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_searcher_iterates_in_order() {
        let mut set = RoaringTreemap::new();
        for doc in [9u64, 2, 5, 40] {
            set.insert(doc);
        }
        let mut searcher = BitmapSearcher::new(set);
        let snapshot = std::sync::Arc::new(crate::index::Snapshot::new(0, Vec::new()));
        let mut ctx = SearchContext::new(snapshot, 4);

        let mut seen = Vec::new();
        while let Some(m) = searcher.next(&mut ctx).unwrap() {
            seen.push(m.number);
            ctx.pool.put(m);
        }
        assert_eq!(seen, vec![2, 5, 9, 40]);
    }

    #[test]
    fn test_bitmap_searcher_advance() {
        let mut set = RoaringTreemap::new();
        for doc in [1u64, 4, 8, 16] {
            set.insert(doc);
        }
        let mut searcher = BitmapSearcher::new(set);
        let snapshot = std::sync::Arc::new(crate::index::Snapshot::new(0, Vec::new()));
        let mut ctx = SearchContext::new(snapshot, 4);

        let m = searcher.advance(&mut ctx, 5).unwrap().unwrap();
        assert_eq!(m.number, 8);
        ctx.pool.put(m);
        let m = searcher.next(&mut ctx).unwrap().unwrap();
        assert_eq!(m.number, 16);
    }
}
