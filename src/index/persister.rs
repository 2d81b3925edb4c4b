//! The persister: makes published snapshots durable
//!
//! Each pass takes the current snapshot, optionally naps to let in-memory
//! merging batch up small segments, writes any in-memory segment bytes to
//! the directory, then records a snapshot file covering the epoch. File
//! reclamation runs here too, after durability advances or a reader drops
//! its snapshot.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, warn};

use super::snapshot::Snapshot;
use super::snapshot_file::{SnapshotFile, SnapshotRow};
use super::state::{IndexState, IntroducerEvent, MergeCompletion, PersistCompletion, SnapshotRecord};
use crate::config::Event;
use crate::directory::Kind;
use crate::error::{CuttleError, Result};

const IDLE_TICK: Duration = Duration::from_millis(200);
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

pub(crate) fn run_persister(
    state: Arc<IndexState>,
    introducer: Sender<IntroducerEvent>,
    notify: Receiver<()>,
    snapshot_drops: Receiver<()>,
    shutdown: Receiver<()>,
) {
    loop {
        crossbeam_channel::select! {
            recv(shutdown) -> _ => {
                // drain remaining bytes; the introducer may be gone, so no
                // replacement events are sent
                let _ = persist_pass(&state, None);
                return;
            }
            recv(notify) -> msg => {
                if msg.is_err() {
                    return;
                }
            }
            recv(snapshot_drops) -> msg => {
                if msg.is_err() {
                    return;
                }
                run_cleanup(&state);
                continue;
            }
            default(IDLE_TICK) => {}
        }

        if state.fatal.load(Ordering::SeqCst) {
            return;
        }

        match persist_pass(&state, Some(&introducer)) {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                warn!(error = %e, "transient persist failure, backing off");
                state.config.report_async_error(&e);
                std::thread::sleep(RETRY_BACKOFF);
            }
            Err(e) => {
                error!(error = %e, "fatal persist failure");
                state.config.report_async_error(&e);
                state.fatal.store(true, Ordering::SeqCst);
                return;
            }
        }
    }
}

fn persist_pass(
    state: &Arc<IndexState>,
    introducer: Option<&Sender<IntroducerEvent>>,
) -> Result<()> {
    let mut snapshot = state.current.load_full();
    if snapshot.epoch() <= state.last_durable_epoch.load(Ordering::SeqCst)
        && !snapshot.has_unpersisted()
    {
        return Ok(());
    }

    if snapshot.has_unpersisted() && maybe_nap(state)? {
        // a nap may have let more segments accumulate
        snapshot = state.current.load_full();
    }

    let unpersisted: Vec<_> = snapshot
        .segments()
        .iter()
        .filter(|s| !s.persisted)
        .cloned()
        .collect();

    // merge small in-memory segments first so fewer, larger files hit disk
    if let Some(introducer) = introducer {
        if unpersisted.len() >= state.config.min_segments_for_in_memory_merge.max(2) {
            return merge_in_memory(state, introducer, &unpersisted);
        }
    }

    for seg in &unpersisted {
        let bytes = state.codec.serialize(seg.segment.as_ref())?;
        state
            .config
            .directory
            .persist(Kind::Segment, seg.id, &bytes)?;
        state.config.directory.sync()?;
        if let Some(introducer) = introducer {
            let reloaded = state.codec.load(seg.id, &bytes)?;
            let _ = introducer.send(IntroducerEvent::PersistComplete(PersistCompletion {
                segment_id: seg.id,
                segment: reloaded,
            }));
        }
        debug!(segment = seg.id, bytes = bytes.len(), "persisted segment");
    }

    // every segment in `snapshot` is durable now; record the epoch
    write_snapshot_file(state, &snapshot)?;
    run_cleanup(state);
    Ok(())
}

/// Nap when configured and the on-disk file count is still low, unless the
/// embedder reports memory pressure. Returns whether a nap happened.
fn maybe_nap(state: &Arc<IndexState>) -> Result<bool> {
    let config = &state.config;
    if config.persister_nap_time_msec == 0 {
        return Ok(false);
    }
    let paused = state.memory_paused_threads.load(Ordering::SeqCst);
    if paused as usize >= config.memory_pressure_pause_threshold {
        return Ok(false);
    }
    let file_count = config.directory.list(Kind::Segment)?.len();
    if file_count >= config.persister_nap_under_num_files {
        return Ok(false);
    }
    std::thread::sleep(Duration::from_millis(config.persister_nap_time_msec));
    Ok(true)
}

fn merge_in_memory(
    state: &Arc<IndexState>,
    introducer: &Sender<IntroducerEvent>,
    unpersisted: &[super::snapshot::SegmentSnapshot],
) -> Result<()> {
    let sources: Vec<_> = unpersisted
        .iter()
        .map(|s| (s.segment.clone(), s.deletions.clone()))
        .collect();
    let source_ids: Vec<u64> = unpersisted.iter().map(|s| s.id).collect();
    let observed: Vec<_> = unpersisted.iter().map(|s| s.deletions.clone()).collect();

    let merged_id = state.allocate_segment_id();
    state.protected_segments.lock().insert(merged_id);

    let result = (|| -> Result<MergeCompletion> {
        let merged = state.codec.merge(&sources)?;
        let bytes = state.codec.serialize(merged.segment.as_ref())?;
        state
            .config
            .directory
            .persist(Kind::Segment, merged_id, &bytes)?;
        state.config.directory.sync()?;
        let reloaded = state.codec.load(merged_id, &bytes)?;
        Ok(MergeCompletion {
            source_ids: source_ids.clone(),
            merged_id,
            segment: reloaded,
            doc_maps: merged.doc_maps,
            observed_deletions: observed,
            persisted: true,
        })
    })();

    match result {
        Ok(completion) => {
            debug!(merged = merged_id, sources = ?source_ids, "in-memory merge persisted");
            let _ = introducer.send(IntroducerEvent::MergeComplete(completion));
            Ok(())
        }
        Err(e) => {
            state.protected_segments.lock().remove(&merged_id);
            Err(e)
        }
    }
}

fn write_snapshot_file(state: &Arc<IndexState>, snapshot: &Snapshot) -> Result<()> {
    let epoch = snapshot.epoch();
    if epoch <= state.last_durable_epoch.load(Ordering::SeqCst) {
        return Ok(());
    }

    let mut rows = Vec::with_capacity(snapshot.segments().len());
    for seg in snapshot.segments() {
        let deletions = match &seg.deletions {
            Some(bitmap) if !bitmap.is_empty() => {
                let mut bytes = Vec::new();
                bitmap.serialize_into(&mut bytes).map_err(CuttleError::Io)?;
                Some(bytes)
            }
            _ => None,
        };
        rows.push(SnapshotRow {
            segment_id: seg.id,
            deletions,
        });
    }

    let file = SnapshotFile { epoch, rows };
    let bytes = file.to_bytes()?;
    state.config.directory.persist(Kind::Snapshot, epoch, &bytes)?;
    state.config.directory.sync()?;

    {
        let mut records = state.persisted_records.lock();
        records.insert(
            0,
            SnapshotRecord {
                epoch,
                segment_ids: file.segment_ids(),
            },
        );
    }
    state.mark_durable(epoch);
    state.config.emit(Event::SnapshotPersisted);
    debug!(epoch, "snapshot file persisted");
    Ok(())
}

/// Remove snapshot files dropped by the deletion policy and any segment
/// files no longer referenced by a kept snapshot, the current snapshot, or
/// a snapshot held open by a reader.
pub(crate) fn run_cleanup(state: &Arc<IndexState>) {
    let directory = &state.config.directory;

    let (kept_records, removable_epochs) = {
        let mut records = state.persisted_records.lock();
        let epochs: Vec<u64> = records.iter().map(|r| r.epoch).collect();
        let keep: HashSet<u64> = state
            .config
            .deletion_policy
            .keep_epochs(&epochs)
            .into_iter()
            .collect();
        let live: HashSet<u64> = state.registry.live_epochs().into_iter().collect();
        let current_epoch = state.current.load().epoch();

        let mut removable = Vec::new();
        records.retain(|record| {
            let retain = keep.contains(&record.epoch)
                || live.contains(&record.epoch)
                || record.epoch == current_epoch;
            if !retain {
                removable.push(record.epoch);
            }
            retain
        });
        (records.clone(), removable)
    };

    for epoch in removable_epochs {
        if let Err(e) = directory.remove(Kind::Snapshot, epoch) {
            state.config.report_async_error(&e);
        }
    }

    let mut referenced: HashSet<u64> = kept_records
        .iter()
        .flat_map(|r| r.segment_ids.iter().copied())
        .collect();
    referenced.extend(state.registry.live_segment_ids());
    referenced.extend(state.current.load().segment_ids());
    referenced.extend(state.protected_segments.lock().iter().copied());

    match directory.list(Kind::Segment) {
        Ok(ids) => {
            for id in ids {
                if !referenced.contains(&id) {
                    debug!(segment = id, "removing unreferenced segment file");
                    if let Err(e) = directory.remove(Kind::Segment, id) {
                        state.config.report_async_error(&e);
                    }
                }
            }
        }
        Err(e) => state.config.report_async_error(&e),
    }
}
