//! Match-stream aggregations
//!
//! Aggregations fold over every match the collector sees, not just the
//! retained top N. The core ships the metric folds the collector needs;
//! richer bucketing lives outside the engine.

use std::collections::BTreeMap;

use super::DocumentMatch;
use crate::numeric;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggregationResult {
    Count(u64),
    /// `None` when no match carried the field
    Float(Option<f64>),
}

pub type AggregationResults = BTreeMap<String, AggregationResult>;

/// One named fold over the match stream
pub trait Aggregation: Send {
    /// Doc value fields this aggregation needs loaded per match
    fn fields(&self) -> Vec<String> {
        Vec::new()
    }

    fn consume(&mut self, doc_match: &DocumentMatch);

    fn finish(&mut self) -> AggregationResult;
}

/// Named collection of aggregations applied to one search
#[derive(Default)]
pub struct Aggregations {
    aggs: BTreeMap<String, Box<dyn Aggregation>>,
}

impl Aggregations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, agg: Box<dyn Aggregation>) -> &mut Self {
        self.aggs.insert(name.into(), agg);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.aggs.is_empty()
    }

    pub fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.aggs.values().flat_map(|a| a.fields()).collect();
        fields.sort_unstable();
        fields.dedup();
        fields
    }

    pub fn consume(&mut self, doc_match: &DocumentMatch) {
        for agg in self.aggs.values_mut() {
            agg.consume(doc_match);
        }
    }

    pub fn finish(&mut self) -> AggregationResults {
        self.aggs
            .iter_mut()
            .map(|(name, agg)| (name.clone(), agg.finish()))
            .collect()
    }
}

/// Counts every match
#[derive(Debug, Default)]
pub struct CountMatches {
    count: u64,
}

impl CountMatches {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregation for CountMatches {
    fn consume(&mut self, _doc_match: &DocumentMatch) {
        self.count += 1;
    }

    fn finish(&mut self) -> AggregationResult {
        AggregationResult::Count(self.count)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Min,
    Max,
    Sum,
    Avg,
}

/// Min/max/sum/avg over a numeric doc values field
pub struct NumericMetric {
    field: String,
    kind: MetricKind,
    sum: f64,
    min: f64,
    max: f64,
    seen: u64,
}

impl NumericMetric {
    pub fn new(kind: MetricKind, field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            seen: 0,
        }
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self::new(MetricKind::Min, field)
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self::new(MetricKind::Max, field)
    }

    pub fn sum(field: impl Into<String>) -> Self {
        Self::new(MetricKind::Sum, field)
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Self::new(MetricKind::Avg, field)
    }
}

impl Aggregation for NumericMetric {
    fn fields(&self) -> Vec<String> {
        vec![self.field.clone()]
    }

    fn consume(&mut self, doc_match: &DocumentMatch) {
        let Some(bytes) = doc_match.fields.get(&self.field) else {
            return;
        };
        let Ok(array) = <[u8; 8]>::try_from(bytes.as_slice()) else {
            return;
        };
        let value = numeric::sortable_u64_to_f64(u64::from_be_bytes(array));
        self.seen += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn finish(&mut self) -> AggregationResult {
        if self.seen == 0 {
            return AggregationResult::Float(None);
        }
        let value = match self.kind {
            MetricKind::Min => self.min,
            MetricKind::Max => self.max,
            MetricKind::Sum => self.sum,
            MetricKind::Avg => self.sum / self.seen as f64,
        };
        AggregationResult::Float(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_with_rank(rank: f64) -> DocumentMatch {
        let mut doc_match = DocumentMatch::default();
        doc_match.fields.insert(
            "rank".to_string(),
            numeric::f64_to_sortable_bytes(rank).to_vec(),
        );
        doc_match
    }

    #[test]
    fn test_count_matches() {
        let mut aggs = Aggregations::new();
        aggs.add("total", Box::new(CountMatches::new()));
        for _ in 0..3 {
            aggs.consume(&DocumentMatch::default());
        }
        let results = aggs.finish();
        assert_eq!(results["total"], AggregationResult::Count(3));
    }

    #[test]
    fn test_numeric_metrics() {
        let mut aggs = Aggregations::new();
        aggs.add("min_rank", Box::new(NumericMetric::min("rank")));
        aggs.add("max_rank", Box::new(NumericMetric::max("rank")));
        aggs.add("avg_rank", Box::new(NumericMetric::avg("rank")));
        assert_eq!(aggs.fields(), vec!["rank".to_string()]);

        for rank in [2.0, 4.0, 9.0] {
            aggs.consume(&match_with_rank(rank));
        }
        let results = aggs.finish();
        assert_eq!(results["min_rank"], AggregationResult::Float(Some(2.0)));
        assert_eq!(results["max_rank"], AggregationResult::Float(Some(9.0)));
        assert_eq!(results["avg_rank"], AggregationResult::Float(Some(5.0)));
    }

    #[test]
    fn test_metric_without_values() {
        let mut metric = NumericMetric::sum("rank");
        metric.consume(&DocumentMatch::default());
        assert_eq!(metric.finish(), AggregationResult::Float(None));
    }
}
