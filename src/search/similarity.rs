//! Term scoring
//!
//! BM25 with the usual defaults. The stored field-length norm is the
//! indexing-time output of the norm calc (default `1/sqrt(len)`), so the
//! scorer recovers the length as `1/norm^2`.

use std::fmt::Debug;

/// Collection-level statistics a scorer needs, aggregated over a snapshot
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectionStats {
    /// Documents in the snapshot
    pub doc_count: u64,
    /// Documents containing the term
    pub doc_frequency: u64,
    /// Average field length across the snapshot
    pub average_field_length: f64,
}

/// Pluggable per-term scoring function
pub trait Similarity: Send + Sync + Debug {
    /// Query-independent weight for a term (typically IDF)
    fn idf(&self, stats: &CollectionStats) -> f64;

    /// Score one posting given its tf, stored norm, and the term weight
    fn score(&self, term_frequency: u32, norm: f32, idf: f64, stats: &CollectionStats) -> f64;
}

#[derive(Clone, Copy, Debug)]
pub struct Bm25Similarity {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Similarity {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Similarity {
    pub fn new(k1: f64, b: f64) -> Self {
        Self { k1, b }
    }
}

impl Similarity for Bm25Similarity {
    fn idf(&self, stats: &CollectionStats) -> f64 {
        let n = stats.doc_count as f64;
        let df = stats.doc_frequency as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn score(&self, term_frequency: u32, norm: f32, idf: f64, stats: &CollectionStats) -> f64 {
        let tf = term_frequency as f64;
        // invert the default norm calc to recover the field length
        let field_length = if norm > 0.0 {
            1.0 / (norm as f64 * norm as f64)
        } else {
            0.0
        };
        let avg = if stats.average_field_length > 0.0 {
            stats.average_field_length
        } else {
            1.0
        };
        let norm_component = 1.0 - self.b + self.b * (field_length / avg);
        idf * (tf * (self.k1 + 1.0)) / (tf + self.k1 * norm_component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(doc_count: u64, doc_frequency: u64) -> CollectionStats {
        CollectionStats {
            doc_count,
            doc_frequency,
            average_field_length: 10.0,
        }
    }

    #[test]
    fn test_idf_rarer_terms_score_higher() {
        let bm25 = Bm25Similarity::default();
        let rare = bm25.idf(&stats(1000, 5));
        let common = bm25.idf(&stats(1000, 500));
        assert!(rare > common);
        assert!(common > 0.0);
    }

    #[test]
    fn test_tf_saturates() {
        let bm25 = Bm25Similarity::default();
        let s = stats(100, 10);
        let idf = bm25.idf(&s);
        let norm = 1.0 / (10.0f32).sqrt();

        let one = bm25.score(1, norm, idf, &s);
        let five = bm25.score(5, norm, idf, &s);
        let fifty = bm25.score(50, norm, idf, &s);
        assert!(one < five);
        assert!(five < fifty);
        // diminishing returns
        assert!(five - one > fifty - five);
    }

    #[test]
    fn test_longer_docs_score_lower() {
        let bm25 = Bm25Similarity::default();
        let s = stats(100, 10);
        let idf = bm25.idf(&s);

        let short = bm25.score(2, 1.0 / (5.0f32).sqrt(), idf, &s);
        let long = bm25.score(2, 1.0 / (50.0f32).sqrt(), idf, &s);
        assert!(short > long);
    }
}
