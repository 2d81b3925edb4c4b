//! Search runtime: matches, contexts, sort orders, searchers, collection
//!
//! A `Searcher` streams `DocumentMatch` records in ascending global doc
//! number order; the top-N collector ranks them under a `SortOrder`.
//! Match objects are pooled per search context to limit allocation churn.

pub mod aggregations;
pub mod collector;
pub mod searcher;
mod similarity;

pub use aggregations::{Aggregation, AggregationResult, AggregationResults, Aggregations};
pub use collector::{TopNCollector, TopNIterator};
pub use searcher::Searcher;
pub use similarity::{Bm25Similarity, CollectionStats, Similarity};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::index::Snapshot;
use crate::numeric;
use crate::segment::GlobalDocNum;

/// Cancellation polls happen once per this many matches
pub const CHECK_DONE_EVERY: u64 = 1024;

/// Cooperative cancellation signal shared across a search
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One streaming match
#[derive(Clone, Debug, Default)]
pub struct DocumentMatch {
    /// Snapshot-global doc number
    pub number: GlobalDocNum,
    pub score: f64,
    /// Assigned by the collector in arrival order; breaks sort ties
    pub hit_number: u64,
    /// Sort key vector computed by the collector
    pub sort_values: Vec<Vec<u8>>,
    /// Doc values loaded for sorting/aggregation, keyed by field
    pub fields: HashMap<String, Vec<u8>>,
    /// Set when field values were preloaded (multi-reader fan-out)
    pub fields_loaded: bool,
}

impl DocumentMatch {
    pub fn reset(&mut self) {
        self.number = 0;
        self.score = 0.0;
        self.hit_number = 0;
        self.sort_values.clear();
        self.fields.clear();
        self.fields_loaded = false;
    }

    /// The retained `_id` stored field, when loaded
    pub fn id(&self) -> Option<&[u8]> {
        self.fields.get(crate::document::ID_FIELD).map(|v| v.as_slice())
    }
}

/// Reuse pool for match objects, owned by one search
#[derive(Debug, Default)]
pub struct DocumentMatchPool {
    pool: Vec<DocumentMatch>,
}

impl DocumentMatchPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: Vec::with_capacity(capacity),
        }
    }

    pub fn get(&mut self) -> DocumentMatch {
        self.pool.pop().unwrap_or_default()
    }

    pub fn put(&mut self, mut doc_match: DocumentMatch) {
        doc_match.reset();
        self.pool.push(doc_match);
    }
}

/// Per-search state threaded through searchers and the collector
pub struct SearchContext {
    pub pool: DocumentMatchPool,
    pub cancel: CancellationToken,
    pub snapshot: Arc<Snapshot>,
}

impl SearchContext {
    pub fn new(snapshot: Arc<Snapshot>, pool_size: usize) -> Self {
        Self {
            pool: DocumentMatchPool::with_capacity(pool_size),
            cancel: CancellationToken::new(),
            snapshot,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One sort criterion
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortBy {
    Score,
    /// Sorts by a field's doc value bytes
    Field(String),
    DocNum,
    HitNumber,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortField {
    pub by: SortBy,
    pub descending: bool,
}

impl SortField {
    pub fn score() -> Self {
        // relevance sorts best-first by convention
        Self {
            by: SortBy::Score,
            descending: true,
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self {
            by: SortBy::Field(name.into()),
            descending: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}

/// Ordered list of sort criteria; earlier entries dominate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortOrder(pub Vec<SortField>);

impl Default for SortOrder {
    fn default() -> Self {
        Self(vec![SortField::score()])
    }
}

impl SortOrder {
    /// Parse a compact spec: `-field` descends, `_score` / `_id` are special
    pub fn by(spec: &str) -> Self {
        let (name, descending) = match spec.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (spec, false),
        };
        let by = match name {
            "_score" => SortBy::Score,
            "_docnum" => SortBy::DocNum,
            _ => SortBy::Field(name.to_string()),
        };
        Self(vec![SortField { by, descending }])
    }

    /// Fields whose doc values the collector must load
    pub fn fields(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|f| match &f.by {
                SortBy::Field(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Fill the match's sort key vector
    pub fn compute(&self, doc_match: &mut DocumentMatch) {
        let mut values = Vec::with_capacity(self.0.len());
        for field in &self.0 {
            let value = match &field.by {
                SortBy::Score => numeric::f64_to_sortable_bytes(doc_match.score).to_vec(),
                SortBy::Field(name) => {
                    doc_match.fields.get(name).cloned().unwrap_or_default()
                }
                SortBy::DocNum => doc_match.number.to_be_bytes().to_vec(),
                SortBy::HitNumber => doc_match.hit_number.to_be_bytes().to_vec(),
            };
            values.push(value);
        }
        doc_match.sort_values = values;
    }

    /// Compare two computed sort key vectors under this order.
    /// Negative means `a` ranks ahead of `b`.
    pub fn compare(&self, a: &DocumentMatch, b: &DocumentMatch) -> std::cmp::Ordering {
        for (i, field) in self.0.iter().enumerate() {
            let av = a.sort_values.get(i).map(|v| v.as_slice()).unwrap_or(&[]);
            let bv = b.sort_values.get(i).map(|v| v.as_slice()).unwrap_or(&[]);
            let mut cmp = av.cmp(bv);
            if field.descending {
                cmp = cmp.reverse();
            }
            if cmp != std::cmp::Ordering::Equal {
                return cmp;
            }
        }
        // earlier arrivals rank ahead on full ties
        a.hit_number.cmp(&b.hit_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_with(score: f64, hit: u64) -> DocumentMatch {
        DocumentMatch {
            score,
            hit_number: hit,
            ..Default::default()
        }
    }

    #[test]
    fn test_pool_reuses_matches() {
        let mut pool = DocumentMatchPool::with_capacity(2);
        let mut m = pool.get();
        m.number = 42;
        m.score = 1.5;
        pool.put(m);
        let m = pool.get();
        assert_eq!(m.number, 0);
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn test_score_sort_descends_by_default() {
        let order = SortOrder::default();
        let mut high = match_with(2.0, 2);
        let mut low = match_with(1.0, 1);
        order.compute(&mut high);
        order.compute(&mut low);
        assert_eq!(order.compare(&high, &low), std::cmp::Ordering::Less);
    }

    #[test]
    fn test_ties_break_by_hit_number() {
        let order = SortOrder::default();
        let mut first = match_with(1.0, 1);
        let mut second = match_with(1.0, 2);
        order.compute(&mut first);
        order.compute(&mut second);
        assert_eq!(order.compare(&first, &second), std::cmp::Ordering::Less);
    }

    #[test]
    fn test_field_sort_spec_parsing() {
        let order = SortOrder::by("-rank");
        assert_eq!(order.0.len(), 1);
        assert_eq!(order.0[0].by, SortBy::Field("rank".to_string()));
        assert!(order.0[0].descending);
        assert_eq!(order.fields(), vec!["rank".to_string()]);

        let order = SortOrder::by("_score");
        assert_eq!(order.0[0].by, SortBy::Score);
    }

    #[test]
    fn test_field_sort_compares_doc_values() {
        let order = SortOrder::by("rank");
        let mut a = DocumentMatch::default();
        a.fields.insert(
            "rank".to_string(),
            numeric::f64_to_sortable_bytes(3.0).to_vec(),
        );
        let mut b = DocumentMatch::default();
        b.fields.insert(
            "rank".to_string(),
            numeric::f64_to_sortable_bytes(9.0).to_vec(),
        );
        order.compute(&mut a);
        order.compute(&mut b);
        assert_eq!(order.compare(&a, &b), std::cmp::Ordering::Less);

        let desc = SortOrder::by("-rank");
        desc.compute(&mut a);
        desc.compute(&mut b);
        assert_eq!(desc.compare(&a, &b), std::cmp::Ordering::Greater);
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
