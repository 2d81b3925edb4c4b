//! Top-N collection over a streaming searcher
//!
//! Every match flows through four stages: load doc values, compute the sort
//! key, fold aggregations, then compare-and-store into a bounded store of
//! `size + skip` entries. A search-after cursor and the lowest-evicted
//! short-circuit keep store traffic minimal. Aggregations see every match,
//! including ones the cursor or the store reject.

use super::aggregations::{AggregationResults, Aggregations};
use super::searcher::Searcher;
use super::{DocumentMatch, SearchContext, SortOrder, CHECK_DONE_EVERY};
use crate::document::ID_FIELD;
use crate::error::{CuttleError, Result};

/// Backing store preallocation cap when `size + skip` is very large
pub const PRE_ALLOC_SIZE_SKIP_CAP: usize = 1000;

/// Store sizes at or below this use the sorted-vector store
const SWITCH_FROM_SLICE_TO_HEAP: usize = 10;

trait CollectorStore {
    /// Add the match; when the store exceeds `size`, the worst entry is
    /// removed and returned
    fn add_not_exceeding_size(
        &mut self,
        doc_match: DocumentMatch,
        size: usize,
        sort: &SortOrder,
    ) -> Option<DocumentMatch>;

    /// Drain best-first
    fn into_sorted(self: Box<Self>, sort: &SortOrder) -> Vec<DocumentMatch>;
}

/// Sorted vector with linear insertion, for small result sets
struct StoreSlice {
    docs: Vec<DocumentMatch>,
}

impl StoreSlice {
    fn new(backing: usize) -> Self {
        Self {
            docs: Vec::with_capacity(backing),
        }
    }
}

impl CollectorStore for StoreSlice {
    fn add_not_exceeding_size(
        &mut self,
        doc_match: DocumentMatch,
        size: usize,
        sort: &SortOrder,
    ) -> Option<DocumentMatch> {
        let position = self
            .docs
            .partition_point(|existing| sort.compare(existing, &doc_match).is_lt());
        self.docs.insert(position, doc_match);
        if self.docs.len() > size {
            self.docs.pop()
        } else {
            None
        }
    }

    fn into_sorted(self: Box<Self>, _sort: &SortOrder) -> Vec<DocumentMatch> {
        self.docs
    }
}

/// Bounded heap keeping the worst entry at the root, for larger result sets
struct StoreHeap {
    docs: Vec<DocumentMatch>,
}

impl StoreHeap {
    fn new(backing: usize) -> Self {
        Self {
            docs: Vec::with_capacity(backing),
        }
    }

    /// Root holds the worst entry: parent ranks worse than children
    fn sift_up(&mut self, mut index: usize, sort: &SortOrder) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if sort.compare(&self.docs[index], &self.docs[parent]).is_gt() {
                self.docs.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize, sort: &SortOrder) {
        loop {
            let left = index * 2 + 1;
            let right = left + 1;
            let mut worst = index;
            if left < self.docs.len()
                && sort.compare(&self.docs[left], &self.docs[worst]).is_gt()
            {
                worst = left;
            }
            if right < self.docs.len()
                && sort.compare(&self.docs[right], &self.docs[worst]).is_gt()
            {
                worst = right;
            }
            if worst == index {
                return;
            }
            self.docs.swap(index, worst);
            index = worst;
        }
    }

    fn pop_worst(&mut self, sort: &SortOrder) -> Option<DocumentMatch> {
        if self.docs.is_empty() {
            return None;
        }
        let last = self.docs.len() - 1;
        self.docs.swap(0, last);
        let worst = self.docs.pop();
        if !self.docs.is_empty() {
            self.sift_down(0, sort);
        }
        worst
    }
}

impl CollectorStore for StoreHeap {
    fn add_not_exceeding_size(
        &mut self,
        doc_match: DocumentMatch,
        size: usize,
        sort: &SortOrder,
    ) -> Option<DocumentMatch> {
        self.docs.push(doc_match);
        let last = self.docs.len() - 1;
        self.sift_up(last, sort);
        if self.docs.len() > size {
            self.pop_worst(sort)
        } else {
            None
        }
    }

    fn into_sorted(mut self: Box<Self>, sort: &SortOrder) -> Vec<DocumentMatch> {
        let mut worst_first = Vec::with_capacity(self.docs.len());
        while let Some(doc_match) = self.pop_worst(sort) {
            worst_first.push(doc_match);
        }
        worst_first.reverse();
        worst_first
    }
}

/// Collects the top `size` hits after `skip`, ordered by `sort`
pub struct TopNCollector {
    size: usize,
    skip: usize,
    sort: SortOrder,
    reverse: bool,
    search_after: Option<Vec<Vec<u8>>>,
    backing_size: usize,
    /// Extra doc value fields to load per match (e.g. for highlighting)
    extra_fields: Vec<String>,
}

impl TopNCollector {
    pub fn new(size: usize, skip: usize, sort: SortOrder) -> Self {
        let mut backing_size = size + skip + 1;
        if size + skip > PRE_ALLOC_SIZE_SKIP_CAP {
            backing_size = PRE_ALLOC_SIZE_SKIP_CAP + 1;
        }
        Self {
            size,
            skip,
            sort,
            reverse: false,
            search_after: None,
            backing_size,
            extra_fields: Vec::new(),
        }
    }

    /// Cursor pagination: keep only hits ranking strictly after `after`
    pub fn new_after(size: usize, sort: SortOrder, after: Vec<Vec<u8>>) -> Self {
        let mut collector = Self::new(size, 0, sort);
        collector.search_after = Some(after);
        collector
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.extra_fields = fields;
        self
    }

    pub fn backing_size(&self) -> usize {
        self.backing_size
    }

    fn make_store(&self) -> Box<dyn CollectorStore> {
        if self.size + self.skip > SWITCH_FROM_SLICE_TO_HEAP {
            Box::new(StoreHeap::new(self.backing_size))
        } else {
            Box::new(StoreSlice::new(self.backing_size))
        }
    }

    /// Drain the searcher, returning the ranked iterator
    pub fn collect(
        &self,
        ctx: &mut SearchContext,
        mut aggregations: Aggregations,
        searcher: &mut dyn Searcher,
    ) -> Result<TopNIterator> {
        let result = self.collect_inner(ctx, &mut aggregations, searcher);
        let close_result = searcher.close();
        let mut results = result?;
        close_result?;

        // final doc id lookup for retained hits only
        for doc_match in &mut results {
            load_id(ctx, doc_match)?;
        }

        Ok(TopNIterator {
            results: results.into_iter(),
            aggregations: aggregations.finish(),
        })
    }

    fn collect_inner(
        &self,
        ctx: &mut SearchContext,
        aggregations: &mut Aggregations,
        searcher: &mut dyn Searcher,
    ) -> Result<Vec<DocumentMatch>> {
        let mut needed_fields = self.sort.fields();
        needed_fields.extend(aggregations.fields());
        needed_fields.extend(self.extra_fields.iter().cloned());
        needed_fields.sort_unstable();
        needed_fields.dedup();

        let mut store = self.make_store();
        let mut lowest_outside: Option<DocumentMatch> = None;
        let mut search_after = self.search_after.as_ref().map(|after| DocumentMatch {
            sort_values: after.clone(),
            ..Default::default()
        });

        let mut hit_number: u64 = 0;
        while let Some(mut doc_match) = searcher.next(ctx)? {
            if hit_number % CHECK_DONE_EVERY == 0 && ctx.cancel.is_cancelled() {
                return Err(CuttleError::Cancelled);
            }
            hit_number += 1;
            doc_match.hit_number = hit_number;

            // stage 1: load doc values
            if !needed_fields.is_empty() && !doc_match.fields_loaded {
                load_fields(ctx, &mut doc_match, &needed_fields)?;
            }

            // stage 2: compute the sort key
            self.sort.compute(&mut doc_match);

            // stage 3: aggregations see every match
            aggregations.consume(&doc_match);

            // stage 4: compare and store
            if let Some(after) = &mut search_after {
                // equal keys break ties by hit number; mirroring the
                // candidate's lets an exact cursor match compare equal
                after.hit_number = doc_match.hit_number;
                if self.sort.compare(&doc_match, after).is_le() {
                    ctx.pool.put(doc_match);
                    continue;
                }
            }

            if let Some(lowest) = &lowest_outside {
                if self.sort.compare(&doc_match, lowest).is_ge() {
                    // cannot enter the result set; skip the store entirely
                    ctx.pool.put(doc_match);
                    continue;
                }
            }

            if let Some(removed) =
                store.add_not_exceeding_size(doc_match, self.size + self.skip, &self.sort)
            {
                match &lowest_outside {
                    Some(lowest) if self.sort.compare(&removed, lowest).is_ge() => {
                        ctx.pool.put(removed);
                    }
                    _ => {
                        if let Some(previous) = lowest_outside.replace(removed) {
                            ctx.pool.put(previous);
                        }
                    }
                }
            }
        }

        let mut results = store.into_sorted(&self.sort);
        // discard the skipped ranks
        if self.skip > 0 {
            results.drain(..self.skip.min(results.len()));
        }
        results.truncate(self.size);
        if self.reverse {
            results.reverse();
        }
        Ok(results)
    }
}

fn load_fields(
    ctx: &mut SearchContext,
    doc_match: &mut DocumentMatch,
    fields: &[String],
) -> Result<()> {
    let Some((segment_idx, local)) = ctx.snapshot.resolve(doc_match.number) else {
        return Ok(());
    };
    let segment = &ctx.snapshot.segments()[segment_idx].segment;
    for field in fields {
        if let Some(bytes) = segment.doc_value(field, local) {
            doc_match.fields.insert(field.clone(), bytes.to_vec());
        }
    }
    Ok(())
}

fn load_id(ctx: &mut SearchContext, doc_match: &mut DocumentMatch) -> Result<()> {
    if doc_match.fields.contains_key(ID_FIELD) {
        return Ok(());
    }
    let Some((segment_idx, local)) = ctx.snapshot.resolve(doc_match.number) else {
        return Ok(());
    };
    let segment = &ctx.snapshot.segments()[segment_idx].segment;
    let mut id: Option<Vec<u8>> = None;
    segment.stored_fields(local, &mut |name, bytes| {
        if name == ID_FIELD {
            id = Some(bytes.to_vec());
            false
        } else {
            true
        }
    })?;
    if let Some(id) = id {
        doc_match.fields.insert(ID_FIELD.to_string(), id);
    }
    Ok(())
}

/// Ranked results plus finalized aggregations
pub struct TopNIterator {
    results: std::vec::IntoIter<DocumentMatch>,
    aggregations: AggregationResults,
}

impl TopNIterator {
    pub fn aggregations(&self) -> &AggregationResults {
        &self.aggregations
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.len() == 0
    }
}

impl Iterator for TopNIterator {
    type Item = DocumentMatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.results.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(score: f64, hit_number: u64) -> DocumentMatch {
        let mut doc_match = DocumentMatch {
            score,
            hit_number,
            ..Default::default()
        };
        SortOrder::default().compute(&mut doc_match);
        doc_match
    }

    #[test]
    fn test_store_slice_keeps_best() {
        let sort = SortOrder::default();
        let mut store = StoreSlice::new(4);
        let mut evicted = Vec::new();
        for (i, score) in [1.0, 5.0, 3.0, 9.0, 2.0].iter().enumerate() {
            if let Some(out) = store.add_not_exceeding_size(scored(*score, i as u64 + 1), 3, &sort)
            {
                evicted.push(out.score);
            }
        }
        let results = Box::new(store).into_sorted(&sort);
        let scores: Vec<f64> = results.iter().map(|m| m.score).collect();
        assert_eq!(scores, vec![9.0, 5.0, 3.0]);
        assert_eq!(evicted, vec![1.0, 2.0]);
    }

    #[test]
    fn test_store_heap_keeps_best() {
        let sort = SortOrder::default();
        let mut store = StoreHeap::new(16);
        for (i, score) in (0..40).map(|i| (i, (i * 7 % 40) as f64)) {
            let _ = store.add_not_exceeding_size(scored(score, i as u64 + 1), 12, &sort);
        }
        let results = Box::new(store).into_sorted(&sort);
        assert_eq!(results.len(), 12);
        let scores: Vec<f64> = results.iter().map(|m| m.score).collect();
        let mut expected: Vec<f64> = (0..40).map(|i| (i * 7 % 40) as f64).collect();
        expected.sort_by(|a, b| b.partial_cmp(a).unwrap());
        expected.truncate(12);
        assert_eq!(scores, expected);
    }

    #[test]
    fn test_heap_ties_keep_arrival_order() {
        let sort = SortOrder::default();
        let mut store = StoreHeap::new(8);
        for hit in 1..=20u64 {
            let _ = store.add_not_exceeding_size(scored(1.0, hit), 4, &sort);
        }
        let results = Box::new(store).into_sorted(&sort);
        let hits: Vec<u64> = results.iter().map(|m| m.hit_number).collect();
        assert_eq!(hits, vec![1, 2, 3, 4]);
    }
}
