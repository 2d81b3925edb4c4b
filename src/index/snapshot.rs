//! Immutable index snapshots
//!
//! A snapshot is an ordered list of segments plus per-segment deletion
//! bitmaps, versioned by a monotone epoch. Snapshots are never mutated after
//! publication; global doc numbers partition across segments by base
//! intervals computed at construction.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use roaring::RoaringBitmap;

use crate::segment::{GlobalDocNum, LocalDocNum, Segment};

/// One segment's slot in a snapshot
#[derive(Clone)]
pub struct SegmentSnapshot {
    /// Segment id; doubles as the directory item id once persisted
    pub id: u64,
    pub segment: Arc<dyn Segment>,
    pub deletions: Option<Arc<RoaringBitmap>>,
    /// Whether the segment's bytes are durable in the directory
    pub persisted: bool,
}

impl SegmentSnapshot {
    pub fn new(id: u64, segment: Arc<dyn Segment>, persisted: bool) -> Self {
        Self {
            id,
            segment,
            deletions: None,
            persisted,
        }
    }

    pub fn doc_count(&self) -> u64 {
        self.segment.doc_count() as u64
    }

    pub fn live_doc_count(&self) -> u64 {
        self.doc_count() - self.deleted_count()
    }

    pub fn deleted_count(&self) -> u64 {
        self.deletions.as_ref().map(|d| d.len()).unwrap_or(0)
    }

    pub fn delete_ratio(&self) -> f64 {
        if self.doc_count() == 0 {
            0.0
        } else {
            self.deleted_count() as f64 / self.doc_count() as f64
        }
    }

    pub fn is_deleted(&self, doc: LocalDocNum) -> bool {
        self.deletions.as_ref().map(|d| d.contains(doc)).unwrap_or(false)
    }
}

/// An immutable view of the index at one epoch
pub struct Snapshot {
    epoch: u64,
    segments: Vec<SegmentSnapshot>,
    /// Base doc number per segment; parallel to `segments`
    bases: Vec<GlobalDocNum>,
    total_docs: u64,
    /// Signals the cleanup loop when the last reference drops
    drop_tx: Option<crossbeam_channel::Sender<()>>,
}

impl Snapshot {
    pub fn new(epoch: u64, segments: Vec<SegmentSnapshot>) -> Self {
        let mut bases = Vec::with_capacity(segments.len());
        let mut base: GlobalDocNum = 0;
        for seg in &segments {
            bases.push(base);
            base += seg.doc_count();
        }
        Self {
            epoch,
            segments,
            bases,
            total_docs: base,
            drop_tx: None,
        }
    }

    pub(crate) fn with_drop_signal(mut self, tx: crossbeam_channel::Sender<()>) -> Self {
        self.drop_tx = Some(tx);
        self
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn segments(&self) -> &[SegmentSnapshot] {
        &self.segments
    }

    pub fn base(&self, segment_idx: usize) -> GlobalDocNum {
        self.bases[segment_idx]
    }

    /// Total docs including deleted
    pub fn doc_count(&self) -> u64 {
        self.total_docs
    }

    pub fn live_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_doc_count()).sum()
    }

    /// Resolve a global doc number to `(segment index, local doc)`
    pub fn resolve(&self, global: GlobalDocNum) -> Option<(usize, LocalDocNum)> {
        if global >= self.total_docs {
            return None;
        }
        let idx = match self.bases.binary_search(&global) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Some((idx, (global - self.bases[idx]) as LocalDocNum))
    }

    pub fn segment_ids(&self) -> Vec<u64> {
        self.segments.iter().map(|s| s.id).collect()
    }

    pub fn contains_segment(&self, id: u64) -> bool {
        self.segments.iter().any(|s| s.id == id)
    }

    pub fn has_unpersisted(&self) -> bool {
        self.segments.iter().any(|s| !s.persisted)
    }

    /// Snapshot-wide doc frequency for a term
    pub fn doc_frequency(&self, field: &str, term: &[u8]) -> crate::error::Result<u64> {
        let mut df = 0u64;
        for seg in &self.segments {
            if let Some(iter) = seg.segment.postings(field, term, false)? {
                df += iter.doc_frequency() as u64;
            }
        }
        Ok(df)
    }

    /// Average field length across the snapshot, for BM25 normalization
    pub fn average_field_length(&self, field: &str) -> f64 {
        let mut docs = 0u64;
        let mut total = 0u64;
        for seg in &self.segments {
            if let Some(info) = seg.segment.field_info(field) {
                docs += info.doc_count as u64;
                total += info.total_length;
            }
        }
        if docs == 0 {
            0.0
        } else {
            total as f64 / docs as f64
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if let Some(tx) = &self.drop_tx {
            let _ = tx.try_send(());
        }
    }
}

/// Tracks every snapshot still referenced somewhere, by weak pointer.
///
/// The cleanup pass consults this to learn which segment files are pinned by
/// readers that hold superseded snapshots open.
#[derive(Default)]
pub struct SnapshotRegistry {
    inner: Mutex<HashMap<u64, Weak<Snapshot>>>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, snapshot: &Arc<Snapshot>) {
        let mut inner = self.inner.lock();
        inner.retain(|_, weak| weak.strong_count() > 0);
        inner.insert(snapshot.epoch(), Arc::downgrade(snapshot));
    }

    /// Segment ids referenced by any snapshot that is still alive
    pub fn live_segment_ids(&self) -> Vec<u64> {
        let mut inner = self.inner.lock();
        inner.retain(|_, weak| weak.strong_count() > 0);
        let mut ids: Vec<u64> = inner
            .values()
            .filter_map(|weak| weak.upgrade())
            .flat_map(|snapshot| snapshot.segment_ids())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Epochs still held alive by some reference
    pub fn live_epochs(&self) -> Vec<u64> {
        let mut inner = self.inner.lock();
        inner.retain(|_, weak| weak.strong_count() > 0);
        let mut epochs: Vec<u64> = inner.keys().copied().collect();
        epochs.sort_unstable();
        epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analyzer, StandardAnalyzer};
    use crate::segment::{build_segment_data, default_norm_calc};
    use crate::segment::{AnalyzedDocument, AnalyzedField, TentacleSegment};

    fn segment_of(texts: &[&str]) -> Arc<dyn Segment> {
        let docs: Vec<AnalyzedDocument> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let tokens = StandardAnalyzer.analyze(text);
                AnalyzedDocument {
                    id: format!("{}", i).into_bytes(),
                    fields: vec![AnalyzedField {
                        name: "body".to_string(),
                        length: tokens.len() as u32,
                        tokens,
                        stored: None,
                        doc_value: None,
                        index_positions: true,
                    }],
                }
            })
            .collect();
        let data = build_segment_data(&docs, &default_norm_calc()).unwrap();
        Arc::new(TentacleSegment::from_data(data, 0).unwrap())
    }

    fn snapshot_of(counts: &[usize]) -> Snapshot {
        let segments = counts
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let texts: Vec<String> = (0..n).map(|j| format!("doc number {}", j)).collect();
                let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
                SegmentSnapshot::new(i as u64, segment_of(&refs), false)
            })
            .collect();
        Snapshot::new(1, segments)
    }

    #[test]
    fn test_resolve_partitions_by_base() {
        let snapshot = snapshot_of(&[3, 2, 4]);
        assert_eq!(snapshot.doc_count(), 9);
        assert_eq!(snapshot.base(0), 0);
        assert_eq!(snapshot.base(1), 3);
        assert_eq!(snapshot.base(2), 5);

        assert_eq!(snapshot.resolve(0), Some((0, 0)));
        assert_eq!(snapshot.resolve(2), Some((0, 2)));
        assert_eq!(snapshot.resolve(3), Some((1, 0)));
        assert_eq!(snapshot.resolve(4), Some((1, 1)));
        assert_eq!(snapshot.resolve(5), Some((2, 0)));
        assert_eq!(snapshot.resolve(8), Some((2, 3)));
        assert_eq!(snapshot.resolve(9), None);
    }

    #[test]
    fn test_live_doc_count_subtracts_deletions() {
        let mut snapshot = snapshot_of(&[3, 2]);
        let mut deletions = RoaringBitmap::new();
        deletions.insert(1);
        snapshot.segments[0].deletions = Some(Arc::new(deletions));
        assert_eq!(snapshot.doc_count(), 5);
        assert_eq!(snapshot.live_doc_count(), 4);
        assert!(snapshot.segments[0].is_deleted(1));
        assert!(!snapshot.segments[0].is_deleted(0));
    }

    #[test]
    fn test_registry_tracks_live_snapshots() {
        let registry = SnapshotRegistry::new();

        let snapshot = Arc::new(snapshot_of(&[1]));
        registry.register(&snapshot);
        assert_eq!(registry.live_epochs(), vec![1]);
        assert_eq!(registry.live_segment_ids(), vec![0]);

        drop(snapshot);
        assert!(registry.live_epochs().is_empty());
        assert!(registry.live_segment_ids().is_empty());
    }

    #[test]
    fn test_drop_signal_fires() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let snapshot = snapshot_of(&[1]).with_drop_signal(tx);
        drop(snapshot);
        assert!(rx.try_recv().is_ok());
    }
}
