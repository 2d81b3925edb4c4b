//! Numeric and datetime range queries

use chrono::{DateTime, Utc};

use super::Query;
use crate::error::{CuttleError, Result};
use crate::numeric;
use crate::reader::Reader;
use crate::search::searcher::{RangeSearcher, Searcher, SearcherOptions};

/// Matches numeric fields with values in the requested interval
#[derive(Clone, Debug)]
pub struct NumericRangeQuery {
    pub field: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub inclusive_min: bool,
    pub inclusive_max: bool,
}

impl NumericRangeQuery {
    /// Inclusive `[min, max]`; open ends via `None`
    pub fn new(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            field: field.into(),
            min,
            max,
            inclusive_min: true,
            inclusive_max: true,
        }
    }

    pub fn with_bounds(mut self, inclusive_min: bool, inclusive_max: bool) -> Self {
        self.inclusive_min = inclusive_min;
        self.inclusive_max = inclusive_max;
        self
    }

    fn sortable_bounds(&self) -> Result<(u64, u64)> {
        let mut lo = self
            .min
            .map(numeric::f64_to_sortable_u64)
            .unwrap_or(numeric::f64_to_sortable_u64(f64::NEG_INFINITY));
        let mut hi = self
            .max
            .map(numeric::f64_to_sortable_u64)
            .unwrap_or(numeric::f64_to_sortable_u64(f64::INFINITY));
        if !self.inclusive_min {
            lo = lo
                .checked_add(1)
                .ok_or_else(|| CuttleError::InvalidQuery("empty numeric range".to_string()))?;
        }
        if !self.inclusive_max {
            hi = hi
                .checked_sub(1)
                .ok_or_else(|| CuttleError::InvalidQuery("empty numeric range".to_string()))?;
        }
        if lo > hi {
            return Err(CuttleError::InvalidQuery(
                "numeric range min exceeds max".to_string(),
            ));
        }
        Ok((lo, hi))
    }
}

impl Query for NumericRangeQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        let (lo, hi) = self.sortable_bounds()?;
        Ok(Box::new(RangeSearcher::new(
            reader.snapshot(),
            &self.field,
            lo,
            hi,
            options,
        )?))
    }
}

/// Matches datetime fields within the requested interval
#[derive(Clone, Debug)]
pub struct DateRangeQuery {
    pub field: String,
    pub min: Option<DateTime<Utc>>,
    pub max: Option<DateTime<Utc>>,
    pub inclusive_min: bool,
    pub inclusive_max: bool,
}

impl DateRangeQuery {
    pub fn new(
        field: impl Into<String>,
        min: Option<DateTime<Utc>>,
        max: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            field: field.into(),
            min,
            max,
            inclusive_min: true,
            inclusive_max: true,
        }
    }

    pub fn with_bounds(mut self, inclusive_min: bool, inclusive_max: bool) -> Self {
        self.inclusive_min = inclusive_min;
        self.inclusive_max = inclusive_max;
        self
    }
}

impl Query for DateRangeQuery {
    fn searcher(&self, reader: &Reader, options: &SearcherOptions) -> Result<Box<dyn Searcher>> {
        let min_nanos = self
            .min
            .map(|t| t.timestamp_nanos_opt().unwrap_or(i64::MIN))
            .unwrap_or(i64::MIN);
        let max_nanos = self
            .max
            .map(|t| t.timestamp_nanos_opt().unwrap_or(i64::MAX))
            .unwrap_or(i64::MAX);

        let mut lo = numeric::i64_to_sortable_u64(min_nanos);
        let mut hi = numeric::i64_to_sortable_u64(max_nanos);
        if !self.inclusive_min {
            lo = lo
                .checked_add(1)
                .ok_or_else(|| CuttleError::InvalidQuery("empty date range".to_string()))?;
        }
        if !self.inclusive_max {
            hi = hi
                .checked_sub(1)
                .ok_or_else(|| CuttleError::InvalidQuery("empty date range".to_string()))?;
        }
        if lo > hi {
            return Err(CuttleError::InvalidQuery(
                "date range min exceeds max".to_string(),
            ));
        }

        Ok(Box::new(RangeSearcher::new(
            reader.snapshot(),
            &self.field,
            lo,
            hi,
            options,
        )?))
    }
}
