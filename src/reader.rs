//! Point-in-time index reader
//!
//! A reader pins one snapshot for its whole lifetime: concurrent writes,
//! merges and persists never change what it sees. Dropping the reader
//! releases the snapshot, which may let the deletion policy reclaim files.

use std::sync::Arc;

use crate::analysis::Analyzer;
use crate::config::Config;
use crate::error::Result;
use crate::index::Snapshot;
use crate::query::Query;
use crate::search::searcher::{Searcher, SearcherOptions};
use crate::search::{
    Aggregations, CancellationToken, SearchContext, SortBy, SortOrder, TopNCollector, TopNIterator,
};
use crate::segment::{GlobalDocNum, PostingIterator};

/// How the top-N collector pages through results
pub enum CollectorSpec {
    TopN { size: usize, skip: usize },
    TopNAfter { size: usize, after: Vec<Vec<u8>> },
}

/// A query plus everything the collector needs to rank its matches
pub struct SearchRequest {
    pub query: Box<dyn Query>,
    pub collector: CollectorSpec,
    pub sort: SortOrder,
    pub reverse: bool,
    pub aggregations: Aggregations,
    /// Fields surfaced to highlighting hooks; loaded like sort fields
    pub highlight_fields: Vec<String>,
    pub cancellation: CancellationToken,
}

impl SearchRequest {
    pub fn top_n(size: usize, skip: usize, query: impl Query + 'static) -> Self {
        Self {
            query: Box::new(query),
            collector: CollectorSpec::TopN { size, skip },
            sort: SortOrder::default(),
            reverse: false,
            aggregations: Aggregations::new(),
            highlight_fields: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Cursor pagination from the previous page's last sort key
    pub fn top_n_after(size: usize, after: Vec<Vec<u8>>, query: impl Query + 'static) -> Self {
        Self {
            query: Box::new(query),
            collector: CollectorSpec::TopNAfter { size, after },
            sort: SortOrder::default(),
            reverse: false,
            aggregations: Aggregations::new(),
            highlight_fields: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_aggregations(mut self, aggregations: Aggregations) -> Self {
        self.aggregations = aggregations;
        self
    }

    pub fn with_highlight_fields(mut self, fields: Vec<String>) -> Self {
        self.highlight_fields = fields;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub(crate) fn searcher_options(&self, config: &Config) -> SearcherOptions {
        SearcherOptions {
            // scores are only computed when the sort consults them
            needs_scores: self.sort.0.iter().any(|f| f.by == SortBy::Score),
            similarity: config.similarity.clone(),
            optimize_conjunction: config.optimize_conjunction,
            optimize_conjunction_unadorned: config.optimize_conjunction_unadorned,
            optimize_disjunction_unadorned: config.optimize_disjunction_unadorned,
            optimize_disjunction_unadorned_min_child_cardinality: config
                .optimize_disjunction_unadorned_min_child_cardinality,
        }
    }

    pub(crate) fn make_collector(&self) -> TopNCollector {
        let collector = match &self.collector {
            CollectorSpec::TopN { size, skip } => {
                TopNCollector::new(*size, *skip, self.sort.clone())
            }
            CollectorSpec::TopNAfter { size, after } => {
                TopNCollector::new_after(*size, self.sort.clone(), after.clone())
            }
        };
        collector
            .with_reverse(self.reverse)
            .with_fields(self.highlight_fields.clone())
    }
}

pub struct Reader {
    snapshot: Arc<Snapshot>,
    config: Arc<Config>,
}

impl Reader {
    pub(crate) fn new(snapshot: Arc<Snapshot>, config: Arc<Config>) -> Self {
        Self { snapshot, config }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub(crate) fn snapshot_arc(&self) -> Arc<Snapshot> {
        self.snapshot.clone()
    }

    pub(crate) fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn default_analyzer(&self) -> Arc<dyn Analyzer> {
        self.config.default_analyzer.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.snapshot.epoch()
    }

    pub fn doc_count(&self) -> u64 {
        self.snapshot.doc_count()
    }

    pub fn live_doc_count(&self) -> u64 {
        self.snapshot.live_doc_count()
    }

    /// Lazy merged dictionary over `[lo, hi]`, doc frequencies summed
    /// across segments
    pub fn dict_iterator<'a>(
        &'a self,
        field: &str,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> impl Iterator<Item = (Vec<u8>, u64)> + 'a {
        let mut iters: Vec<std::iter::Peekable<_>> = self
            .snapshot
            .segments()
            .iter()
            .map(|seg| seg.segment.dict_iter(field, lo, hi).peekable())
            .collect();

        std::iter::from_fn(move || {
            // k-way merge on the smallest current term
            let mut smallest: Option<Vec<u8>> = None;
            for iter in iters.iter_mut() {
                if let Some((term, _)) = iter.peek() {
                    match &smallest {
                        Some(s) if term >= s => {}
                        _ => smallest = Some(term.clone()),
                    }
                }
            }
            let term = smallest?;
            let mut doc_frequency = 0u64;
            for iter in iters.iter_mut() {
                if let Some((_, df)) = iter.next_if(|(t, _)| *t == term) {
                    doc_frequency += df as u64;
                }
            }
            Some((term, doc_frequency))
        })
    }

    /// Postings for `(field, term)` across the snapshot, as
    /// `(global_doc_num, term_frequency, positions)`
    pub fn postings(
        &self,
        field: &str,
        term: &[u8],
        with_positions: bool,
    ) -> Result<ReaderPostings> {
        let mut segments = Vec::new();
        for (i, seg) in self.snapshot.segments().iter().enumerate() {
            if let Some(iter) = seg.segment.postings(field, term, with_positions)? {
                segments.push((self.snapshot.base(i), seg.deletions.clone(), iter));
            }
        }
        Ok(ReaderPostings {
            segments,
            current: 0,
        })
    }

    /// Visit the stored fields of one document
    pub fn stored_fields(
        &self,
        global: GlobalDocNum,
        visitor: &mut dyn FnMut(&str, &[u8]) -> bool,
    ) -> Result<()> {
        if let Some((idx, local)) = self.snapshot.resolve(global) {
            self.snapshot.segments()[idx]
                .segment
                .stored_fields(local, visitor)?;
        }
        Ok(())
    }

    /// Doc value bytes for one `(doc, field)` pair
    pub fn doc_values(&self, global: GlobalDocNum, field: &str) -> Option<Vec<u8>> {
        let (idx, local) = self.snapshot.resolve(global)?;
        self.snapshot.segments()[idx]
            .segment
            .doc_value(field, local)
            .map(|bytes| bytes.to_vec())
    }

    /// Execute a search over this reader's snapshot
    pub fn search(&self, request: SearchRequest) -> Result<TopNIterator> {
        let options = request.searcher_options(&self.config);
        let mut searcher = request.query.searcher(self, &options)?;
        let collector = request.make_collector();

        let pool_size = collector.backing_size() + searcher.doc_match_pool_size();
        let mut ctx = SearchContext::new(self.snapshot.clone(), pool_size)
            .with_cancellation(request.cancellation.clone());

        collector.collect(&mut ctx, request.aggregations, &mut searcher)
    }

    /// Release the snapshot
    pub fn close(self) {}
}

/// Snapshot-wide posting iteration with deletion filtering
pub struct ReaderPostings {
    segments: Vec<(
        GlobalDocNum,
        Option<Arc<roaring::RoaringBitmap>>,
        Box<dyn PostingIterator>,
    )>,
    current: usize,
}

impl ReaderPostings {
    /// Next `(global_doc_num, term_frequency, positions)`
    #[allow(clippy::type_complexity)]
    pub fn next(&mut self) -> Result<Option<(GlobalDocNum, u32, Vec<u32>)>> {
        while self.current < self.segments.len() {
            let (base, deletions, iter) = &mut self.segments[self.current];
            match iter.next()? {
                Some(entry) => {
                    if deletions
                        .as_ref()
                        .map(|d| d.contains(entry.doc))
                        .unwrap_or(false)
                    {
                        continue;
                    }
                    return Ok(Some((
                        *base + entry.doc as GlobalDocNum,
                        entry.term_frequency,
                        entry.positions,
                    )));
                }
                None => self.current += 1,
            }
        }
        Ok(None)
    }
}
