//! Index configuration
//!
//! Mirrors the writer's tunables: codec selection, worker pacing, merge
//! planning, optimizations, and the pluggable collaborators (directory,
//! deletion policy, norm calc, similarity, analyzers).

use std::fmt;
use std::sync::Arc;

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::directory::{Directory, FsDirectory, MemDirectory};
use crate::document::Field;
use crate::error::{CuttleError, Result};
use crate::index::{DeletionPolicy, KeepNLatestDeletionPolicy, MergePlanOptions};
use crate::search::{Bm25Similarity, Similarity};
use crate::segment::{default_norm_calc, CodecRegistry, NormCalc, TENTACLE_TYPE, TENTACLE_VERSION};

/// Worker lifecycle notifications delivered via the event callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    BatchIntroduced,
    SnapshotPersisted,
    MergeCompleted,
    MergeRejected,
}

pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// Callback invoked for errors raised by background workers
pub type AsyncErrorCallback = Arc<dyn Fn(&CuttleError) + Send + Sync>;

#[derive(Clone)]
pub struct Config {
    pub segment_type: String,
    pub segment_version: u32,
    pub codecs: CodecRegistry,

    /// Skip the per-batch durability wait
    pub unsafe_batch: bool,
    pub event_callback: Option<EventCallback>,
    pub async_error: Option<AsyncErrorCallback>,
    pub merge_plan_options: MergePlanOptions,
    pub num_analysis_workers: usize,
    pub deletion_policy: Arc<dyn DeletionPolicy>,
    pub directory: Arc<dyn Directory>,
    pub norm_calc: NormCalc,

    pub merge_buffer_size: usize,

    // Optimizations
    pub optimize_conjunction: bool,
    pub optimize_conjunction_unadorned: bool,
    pub optimize_disjunction_unadorned: bool,
    pub optimize_disjunction_unadorned_min_child_cardinality: u64,

    /// In-memory segments required before the persister merges them first
    pub min_segments_for_in_memory_merge: usize,

    /// Wait injected into the persist loop to favor in-memory merging
    pub persister_nap_time_msec: u64,

    /// Nap only while fewer than this many files are on disk
    pub persister_nap_under_num_files: usize,

    /// Upper bound on memory-paused application threads before the
    /// persister skips its nap; the embedder defines the counter
    pub memory_pressure_pause_threshold: usize,

    /// Fields behaving as if present on every document, never persisted
    pub virtual_fields: Vec<Field>,

    pub default_analyzer: Arc<dyn Analyzer>,
    pub similarity: Arc<dyn Similarity>,

    /// Introduction queue bound; ingestion blocks when full
    pub introducer_queue_size: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("segment_type", &self.segment_type)
            .field("segment_version", &self.segment_version)
            .field("unsafe_batch", &self.unsafe_batch)
            .field("num_analysis_workers", &self.num_analysis_workers)
            .field("merge_plan_options", &self.merge_plan_options)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Filesystem-backed index at `path`
    pub fn default_config(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Ok(Self::base(Arc::new(FsDirectory::new(path)?)))
    }

    /// Ephemeral index with no durable storage
    pub fn in_memory_only() -> Self {
        Self::base(Arc::new(MemDirectory::new()))
    }

    fn base(directory: Arc<dyn Directory>) -> Self {
        Self {
            segment_type: TENTACLE_TYPE.to_string(),
            segment_version: TENTACLE_VERSION,
            codecs: CodecRegistry::default(),
            unsafe_batch: false,
            event_callback: None,
            async_error: None,
            merge_plan_options: MergePlanOptions::default(),
            num_analysis_workers: 4,
            deletion_policy: Arc::new(KeepNLatestDeletionPolicy::new(1)),
            directory,
            norm_calc: default_norm_calc(),
            merge_buffer_size: 1024 * 1024,
            optimize_conjunction: true,
            optimize_conjunction_unadorned: true,
            optimize_disjunction_unadorned: true,
            optimize_disjunction_unadorned_min_child_cardinality: 256,
            min_segments_for_in_memory_merge: 2,
            persister_nap_time_msec: 0,
            persister_nap_under_num_files: 1000,
            memory_pressure_pause_threshold: usize::MAX,
            virtual_fields: Vec::new(),
            default_analyzer: Arc::new(StandardAnalyzer),
            similarity: Arc::new(Bm25Similarity::default()),
            introducer_queue_size: 16,
        }
    }

    pub fn with_unsafe_batch(mut self, unsafe_batch: bool) -> Self {
        self.unsafe_batch = unsafe_batch;
        self
    }

    pub fn with_persister_nap_time_msec(mut self, nap_time: u64) -> Self {
        self.persister_nap_time_msec = nap_time;
        self
    }

    pub fn with_virtual_field(mut self, field: Field) -> Self {
        self.virtual_fields.push(field);
        self
    }

    pub fn with_norm_calc(mut self, calc: NormCalc) -> Self {
        self.norm_calc = calc;
        self
    }

    pub fn with_segment_codec(mut self, codec: Arc<dyn crate::segment::SegmentCodec>) -> Self {
        self.codecs.register(codec);
        self
    }

    pub fn with_deletion_policy(mut self, policy: Arc<dyn DeletionPolicy>) -> Self {
        self.deletion_policy = policy;
        self
    }

    pub fn with_merge_plan_options(mut self, options: MergePlanOptions) -> Self {
        self.merge_plan_options = options;
        self
    }

    pub fn with_analysis_workers(mut self, workers: usize) -> Self {
        self.num_analysis_workers = workers.max(1);
        self
    }

    pub fn with_default_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.default_analyzer = analyzer;
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    pub fn with_async_error(mut self, callback: AsyncErrorCallback) -> Self {
        self.async_error = Some(callback);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_analysis_workers == 0 {
            return Err(CuttleError::InvalidConfig(
                "num_analysis_workers must be at least 1".to_string(),
            ));
        }
        if self.merge_plan_options.min_segments_per_merge < 2 {
            return Err(CuttleError::InvalidConfig(
                "min_segments_per_merge must be at least 2".to_string(),
            ));
        }
        if self.merge_plan_options.max_segments_per_merge
            < self.merge_plan_options.min_segments_per_merge
        {
            return Err(CuttleError::InvalidConfig(
                "max_segments_per_merge below min_segments_per_merge".to_string(),
            ));
        }
        // fail fast if the configured codec was never registered
        self.codecs.get(&self.segment_type, self.segment_version)?;
        Ok(())
    }

    pub(crate) fn emit(&self, event: Event) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    pub(crate) fn report_async_error(&self, err: &CuttleError) {
        if let Some(callback) = &self.async_error {
            callback(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::in_memory_only();
        assert!(config.validate().is_ok());
        assert!(!config.unsafe_batch);
        assert_eq!(config.num_analysis_workers, 4);
        assert_eq!(config.min_segments_for_in_memory_merge, 2);
        assert_eq!(config.persister_nap_under_num_files, 1000);
    }

    #[test]
    fn test_invalid_codec_rejected() {
        let mut config = Config::in_memory_only();
        config.segment_type = "nope".to_string();
        assert!(matches!(
            config.validate(),
            Err(CuttleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::in_memory_only()
            .with_unsafe_batch(true)
            .with_persister_nap_time_msec(5)
            .with_analysis_workers(2);
        assert!(config.unsafe_batch);
        assert_eq!(config.persister_nap_time_msec, 5);
        assert_eq!(config.num_analysis_workers, 2);
    }
}
