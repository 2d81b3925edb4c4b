//! The merger: compacts persisted segments per the cost-based plan
//!
//! Runs continuously; when the planner has nothing to do the loop parks on
//! the shutdown channel with a quiescent back-off. Merged bytes are written
//! to the directory before the completion event is sent, so a merge's effect
//! is a single snapshot swap of already-durable segments.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use super::mergeplan::{self, SegmentDescription};
use super::state::{IndexState, IntroducerEvent, MergeCompletion};
use crate::directory::Kind;
use crate::error::Result;

const QUIESCENT_BACKOFF: Duration = Duration::from_millis(250);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub(crate) fn run_merger(
    state: Arc<IndexState>,
    introducer: Sender<IntroducerEvent>,
    shutdown: Receiver<()>,
) {
    loop {
        if state.fatal.load(Ordering::SeqCst) {
            return;
        }

        let planned = match merge_pass(&state, &introducer) {
            Ok(planned) => planned,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "transient merge failure, backing off");
                state.config.report_async_error(&e);
                match shutdown.recv_timeout(RETRY_BACKOFF) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => return,
                }
            }
            Err(e) => {
                error!(error = %e, "fatal merge failure");
                state.config.report_async_error(&e);
                state.fatal.store(true, Ordering::SeqCst);
                return;
            }
        };

        if !planned {
            match shutdown.recv_timeout(QUIESCENT_BACKOFF) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => return,
            }
        }
    }
}

/// Plan and execute merges over the current snapshot's persisted segments.
/// Returns whether any merge work was performed.
fn merge_pass(state: &Arc<IndexState>, introducer: &Sender<IntroducerEvent>) -> Result<bool> {
    let snapshot = state.current.load_full();

    let descriptions: Vec<SegmentDescription> = snapshot
        .segments()
        .iter()
        .filter(|s| s.persisted)
        .map(|s| SegmentDescription {
            id: s.id,
            size_bytes: s.segment.size_bytes(),
            delete_ratio: s.delete_ratio(),
        })
        .collect();

    let tasks = mergeplan::plan(&descriptions, &state.config.merge_plan_options);
    if tasks.is_empty() {
        return Ok(false);
    }

    for task in tasks {
        if !execute_merge_task(state, introducer, &snapshot, &task.segment_ids)? {
            return Ok(true);
        }
    }

    // wait for the introducer to apply before replanning, or the same
    // sources would be selected again
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while state.current.load().epoch() == snapshot.epoch()
        && std::time::Instant::now() < deadline
        && !state.is_shutting_down()
    {
        std::thread::sleep(Duration::from_millis(5));
    }
    Ok(true)
}

/// Merge the named segments of `snapshot` and hand the result to the
/// introducer. Returns `false` when the introducer is gone.
pub(crate) fn execute_merge_task(
    state: &Arc<IndexState>,
    introducer: &Sender<IntroducerEvent>,
    snapshot: &crate::index::Snapshot,
    segment_ids: &[u64],
) -> Result<bool> {
    let sources: Vec<_> = snapshot
        .segments()
        .iter()
        .filter(|s| segment_ids.contains(&s.id))
        .collect();
    if sources.len() != segment_ids.len() {
        return Ok(true);
    }

    let inputs: Vec<_> = sources
        .iter()
        .map(|s| (s.segment.clone(), s.deletions.clone()))
        .collect();
    let observed: Vec<_> = sources.iter().map(|s| s.deletions.clone()).collect();
    let source_ids: Vec<u64> = sources.iter().map(|s| s.id).collect();

    let merged_id = state.allocate_segment_id();
    state.protected_segments.lock().insert(merged_id);

    let completion = (|| -> Result<MergeCompletion> {
        let merged = state.codec.merge(&inputs)?;
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

    match completion {
        Ok(completion) => {
            debug!(merged = merged_id, sources = ?source_ids, "merge written");
            Ok(introducer
                .send(IntroducerEvent::MergeComplete(completion))
                .is_ok())
        }
        Err(e) => {
            state.protected_segments.lock().remove(&merged_id);
            let _ = state.config.directory.remove(Kind::Segment, merged_id);
            Err(e)
        }
    }
}
