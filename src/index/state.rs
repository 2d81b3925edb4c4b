//! Shared state and event types for the indexer workers
//!
//! The introducer is the only writer of `current`; everyone else reads it
//! through the atomic swap. Durability progress is published through
//! `last_durable_epoch` plus a condvar so safe batches can block until their
//! epoch is covered by a persisted snapshot file.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use roaring::RoaringBitmap;

use super::snapshot::{Snapshot, SnapshotRegistry};
use crate::config::Config;
use crate::error::Result;
use crate::segment::{DocMap, Segment, SegmentCodec};

/// Record of one persisted snapshot file, for retention decisions
#[derive(Clone, Debug)]
pub(crate) struct SnapshotRecord {
    pub epoch: u64,
    pub segment_ids: Vec<u64>,
}

pub(crate) struct IndexState {
    pub config: Arc<Config>,
    pub codec: Arc<dyn SegmentCodec>,
    pub current: ArcSwap<Snapshot>,
    pub registry: SnapshotRegistry,
    pub next_segment_id: AtomicU64,
    /// Highest epoch covered by a persisted snapshot file
    pub last_durable_epoch: AtomicU64,
    /// Highest epoch produced by a content-changing introduction
    pub last_mutating_epoch: AtomicU64,
    pub durable_mutex: Mutex<()>,
    pub durable_cv: Condvar,
    /// Application threads currently paused on memory pressure; maintained
    /// by the embedder
    pub memory_paused_threads: AtomicU64,
    /// Persisted snapshot records, newest first
    pub persisted_records: Mutex<Vec<SnapshotRecord>>,
    /// Segment ids mid-write by the merger, exempt from cleanup
    pub protected_segments: Mutex<HashSet<u64>>,
    /// Set on corruption or close; workers drain and exit
    pub fatal: AtomicBool,
    pub closed: AtomicBool,
    /// Cloned into published snapshots so their drop wakes the cleanup loop
    pub snapshot_drop_tx: Sender<()>,
}

impl IndexState {
    pub fn allocate_segment_id(&self) -> u64 {
        self.next_segment_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot.with_drop_signal(self.snapshot_drop_tx.clone()));
        self.registry.register(&snapshot);
        self.current.store(snapshot.clone());
        snapshot
    }

    pub fn mark_durable(&self, epoch: u64) {
        let _guard = self.durable_mutex.lock();
        self.last_durable_epoch.fetch_max(epoch, Ordering::SeqCst);
        self.durable_cv.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.fatal.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst)
    }
}

/// A new in-memory segment plus the ids it deletes, from one write batch
pub(crate) struct SegmentIntroduction {
    pub segment_id: u64,
    /// `None` for delete-only batches
    pub segment: Option<Arc<dyn Segment>>,
    pub deleted_ids: Vec<Vec<u8>>,
    /// Completes with the published epoch
    pub applied: Sender<Result<u64>>,
}

/// Replacement of N source segments by one merged segment
pub(crate) struct MergeCompletion {
    pub source_ids: Vec<u64>,
    pub merged_id: u64,
    pub segment: Arc<dyn Segment>,
    /// Source-local -> merged-local translation, parallel to `source_ids`
    pub doc_maps: Vec<DocMap>,
    /// Deletion bitmaps observed when the merge started, parallel to
    /// `source_ids`; deletions beyond these are translated forward
    pub observed_deletions: Vec<Option<Arc<RoaringBitmap>>>,
    pub persisted: bool,
}

/// Swap of an in-memory segment for its durable twin
pub(crate) struct PersistCompletion {
    pub segment_id: u64,
    pub segment: Arc<dyn Segment>,
}

pub(crate) enum IntroducerEvent {
    Introduction(SegmentIntroduction),
    MergeComplete(MergeCompletion),
    PersistComplete(PersistCompletion),
}
