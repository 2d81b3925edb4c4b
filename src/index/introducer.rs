//! The introducer: serial consumer of index mutations
//!
//! All snapshot transitions happen on this one thread, so publication is a
//! single atomic swap and epochs are strictly increasing. Introductions are
//! processed FIFO; a merge completion whose sources have already left the
//! snapshot is rejected and its output discarded.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use roaring::RoaringBitmap;
use tracing::{debug, warn};

use super::snapshot::{SegmentSnapshot, Snapshot};
use super::state::{
    IndexState, IntroducerEvent, MergeCompletion, PersistCompletion, SegmentIntroduction,
};
use crate::config::Event;
use crate::directory::Kind;
use crate::document::ID_FIELD;
use crate::error::Result;

pub(crate) fn run_introducer(
    state: Arc<IndexState>,
    events: Receiver<IntroducerEvent>,
    shutdown: Receiver<()>,
    persister_notify: Sender<()>,
) {
    loop {
        crossbeam_channel::select! {
            recv(shutdown) -> _ => return,
            recv(events) -> event => match event {
                Ok(IntroducerEvent::Introduction(intro)) => {
                    handle_introduction(&state, intro, &persister_notify);
                }
                Ok(IntroducerEvent::MergeComplete(completion)) => {
                    handle_merge(&state, completion, &persister_notify);
                }
                Ok(IntroducerEvent::PersistComplete(completion)) => {
                    handle_persist(&state, completion, &persister_notify);
                }
                Err(_) => return,
            },
        }
    }
}

fn handle_introduction(
    state: &Arc<IndexState>,
    intro: SegmentIntroduction,
    persister_notify: &Sender<()>,
) {
    let old = state.current.load_full();

    let next = match build_introduced(state, &old, &intro) {
        Ok(next) => next,
        Err(e) => {
            // state unchanged on failure; the caller gets the original error
            let _ = intro.applied.send(Err(e));
            return;
        }
    };

    let epoch = next.epoch();
    state.publish(next);
    state.last_mutating_epoch.fetch_max(epoch, Ordering::SeqCst);
    debug!(epoch, segment = intro.segment_id, "introduced batch");
    state.config.emit(Event::BatchIntroduced);

    let _ = intro.applied.send(Ok(epoch));
    let _ = persister_notify.try_send(());
}

fn build_introduced(
    state: &Arc<IndexState>,
    old: &Snapshot,
    intro: &SegmentIntroduction,
) -> Result<Snapshot> {
    let mut segments = old.segments().to_vec();

    // deletions apply against prior state only; the incoming segment is
    // appended afterwards so a same-batch reindex supersedes its prior doc
    if !intro.deleted_ids.is_empty() {
        for seg in segments.iter_mut().rev() {
            let mut additions: Option<RoaringBitmap> = None;
            for id in &intro.deleted_ids {
                if let Some(mut postings) = seg.segment.postings(ID_FIELD, id, false)? {
                    while let Some(entry) = postings.next()? {
                        if !seg.is_deleted(entry.doc) {
                            additions
                                .get_or_insert_with(RoaringBitmap::new)
                                .insert(entry.doc);
                        }
                    }
                }
            }
            if let Some(additions) = additions {
                let mut merged = seg
                    .deletions
                    .as_ref()
                    .map(|d| d.as_ref().clone())
                    .unwrap_or_default();
                merged |= additions;
                seg.deletions = Some(Arc::new(merged));
            }
        }
    }

    if let Some(segment) = &intro.segment {
        if segment.doc_count() > 0 {
            segments.push(SegmentSnapshot::new(intro.segment_id, segment.clone(), false));
        }
    }

    Ok(Snapshot::new(old.epoch() + 1, segments))
}

fn handle_merge(
    state: &Arc<IndexState>,
    completion: MergeCompletion,
    persister_notify: &Sender<()>,
) {
    let old = state.current.load_full();

    // reject if any source already left the snapshot (a prior merge won)
    let all_present = completion
        .source_ids
        .iter()
        .all(|id| old.contains_segment(*id));
    if !all_present {
        warn!(
            sources = ?completion.source_ids,
            merged = completion.merged_id,
            "merge rejected: sources no longer current"
        );
        state.config.emit(Event::MergeRejected);
        state.protected_segments.lock().remove(&completion.merged_id);
        if completion.persisted {
            if let Err(e) = state
                .config
                .directory
                .remove(Kind::Segment, completion.merged_id)
            {
                state.config.report_async_error(&e);
            }
        }
        return;
    }

    // deletions that landed on the sources during the merge are carried
    // forward through the codec's doc maps
    let mut carried = RoaringBitmap::new();
    for (i, source_id) in completion.source_ids.iter().enumerate() {
        let seg = old
            .segments()
            .iter()
            .find(|s| s.id == *source_id)
            .expect("checked above");
        let Some(current_dels) = seg.deletions.as_ref() else {
            continue;
        };
        let observed = completion.observed_deletions[i].as_deref();
        for doc in current_dels.iter() {
            if observed.map(|o| o.contains(doc)).unwrap_or(false) {
                continue;
            }
            if let Some(Some(new_doc)) = completion.doc_maps[i].get(doc as usize) {
                carried.insert(*new_doc);
            }
        }
    }

    let mut merged = SegmentSnapshot::new(
        completion.merged_id,
        completion.segment.clone(),
        completion.persisted,
    );
    if !carried.is_empty() {
        merged.deletions = Some(Arc::new(carried));
    }

    // substitute the merged segment at the first source's position
    let mut segments = Vec::with_capacity(old.segments().len());
    let mut placed = false;
    for seg in old.segments() {
        if completion.source_ids.contains(&seg.id) {
            if !placed {
                segments.push(merged.clone());
                placed = true;
            }
        } else {
            segments.push(seg.clone());
        }
    }

    let next = Snapshot::new(old.epoch() + 1, segments);
    let epoch = next.epoch();
    state.publish(next);
    state.last_mutating_epoch.fetch_max(epoch, Ordering::SeqCst);
    state.protected_segments.lock().remove(&completion.merged_id);
    debug!(
        epoch,
        merged = completion.merged_id,
        sources = ?completion.source_ids,
        "merge introduced"
    );
    state.config.emit(Event::MergeCompleted);
    let _ = persister_notify.try_send(());
}

fn handle_persist(
    state: &Arc<IndexState>,
    completion: PersistCompletion,
    persister_notify: &Sender<()>,
) {
    let old = state.current.load_full();
    if !old.contains_segment(completion.segment_id) {
        // merged away while its bytes were being written; cleanup reclaims it
        return;
    }

    let segments = old
        .segments()
        .iter()
        .map(|seg| {
            if seg.id == completion.segment_id && !seg.persisted {
                let mut replacement =
                    SegmentSnapshot::new(seg.id, completion.segment.clone(), true);
                replacement.deletions = seg.deletions.clone();
                replacement
            } else {
                seg.clone()
            }
        })
        .collect();

    let next = Snapshot::new(old.epoch() + 1, segments);
    debug!(epoch = next.epoch(), segment = completion.segment_id, "segment persisted");
    state.publish(next);
    let _ = persister_notify.try_send(());
}
