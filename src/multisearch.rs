//! Fan-out search over multiple readers
//!
//! One searcher per reader, executed by a bounded worker pool, funnels
//! matches into a channel sized `2N` that a shared top-N collector drains
//! concurrently. Workers load the collector's needed fields before sending,
//! since doc numbers are only meaningful against their own reader's
//! snapshot. A failing searcher is logged and its siblings run to
//! completion; results returned are correct for their respective readers.

use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver};
use tracing::warn;

use crate::document::ID_FIELD;
use crate::error::Result;
use crate::index::Snapshot;
use crate::reader::{Reader, SearchRequest};
use crate::search::searcher::Searcher;
use crate::search::{DocumentMatch, SearchContext, TopNIterator};
use crate::segment::GlobalDocNum;

/// Upper bound on concurrently executing per-reader searchers
pub const MAX_CONCURRENCY: usize = 1000;

/// Execute `request` against every reader, collecting one ranked result set
pub fn multi_search(request: SearchRequest, readers: &[Reader]) -> Result<TopNIterator> {
    let collector = request.make_collector();

    let mut needed_fields = request.sort.fields();
    needed_fields.extend(request.aggregations.fields());
    needed_fields.extend(request.highlight_fields.iter().cloned());
    needed_fields.sort_unstable();
    needed_fields.dedup();

    // build every searcher up front; a bad query fails the whole call
    let mut work = Vec::with_capacity(readers.len());
    for reader in readers {
        let options = request.searcher_options(reader.config());
        let searcher = request.query.searcher(reader, &options)?;
        work.push((reader.snapshot_arc(), searcher));
    }

    let pool_hint: usize = work
        .iter()
        .map(|(_, s)| s.doc_match_pool_size())
        .max()
        .unwrap_or(1);
    let worker_count = work.len().min(MAX_CONCURRENCY);

    let (funnel_tx, funnel_rx) = bounded::<DocumentMatch>(readers.len().max(1) * 2);
    let (work_tx, work_rx) = unbounded::<(Arc<Snapshot>, Box<dyn Searcher>)>();
    for item in work {
        let _ = work_tx.send(item);
    }
    drop(work_tx);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let work_rx = work_rx.clone();
            let funnel_tx = funnel_tx.clone();
            let needed_fields = &needed_fields;
            let cancel = request.cancellation.clone();
            scope.spawn(move || {
                for (snapshot, mut searcher) in work_rx {
                    let mut ctx = SearchContext::new(snapshot, pool_hint)
                        .with_cancellation(cancel.clone());
                    if let Err(e) =
                        drive_searcher(&mut ctx, searcher.as_mut(), needed_fields, &funnel_tx)
                    {
                        warn!(error = %e, "multi-search reader failed");
                    }
                    if let Err(e) = searcher.close() {
                        warn!(error = %e, "multi-search searcher close failed");
                    }
                }
            });
        }
        drop(funnel_tx);

        // the collector drains the funnel while workers are still producing
        let mut funnel = ChannelSearcher {
            rx: funnel_rx,
            count: readers.len() as u64,
        };
        let empty = Arc::new(Snapshot::new(0, Vec::new()));
        let mut ctx = SearchContext::new(empty, collector.backing_size())
            .with_cancellation(request.cancellation.clone());
        collector.collect(&mut ctx, request.aggregations, &mut funnel)
    })
}

/// Stream one reader's matches into the funnel
fn drive_searcher(
    ctx: &mut SearchContext,
    searcher: &mut dyn Searcher,
    needed_fields: &[String],
    tx: &crossbeam_channel::Sender<DocumentMatch>,
) -> Result<()> {
    while let Some(mut doc_match) = searcher.next(ctx)? {
        if let Some((idx, local)) = ctx.snapshot.resolve(doc_match.number) {
            let segment = &ctx.snapshot.segments()[idx].segment;
            for field in needed_fields {
                if let Some(bytes) = segment.doc_value(field, local) {
                    doc_match.fields.insert(field.clone(), bytes.to_vec());
                }
            }
            let mut id: Option<Vec<u8>> = None;
            segment.stored_fields(local, &mut |name, bytes| {
                if name == ID_FIELD {
                    id = Some(bytes.to_vec());
                    false
                } else {
                    true
                }
            })?;
            if let Some(id) = id {
                doc_match.fields.insert(ID_FIELD.to_string(), id);
            }
        }
        doc_match.fields_loaded = true;
        if tx.send(doc_match).is_err() {
            break;
        }
    }
    Ok(())
}

/// Adapts the funnel channel to the collector's searcher interface
struct ChannelSearcher {
    rx: Receiver<DocumentMatch>,
    count: u64,
}

impl Searcher for ChannelSearcher {
    fn next(&mut self, _ctx: &mut SearchContext) -> Result<Option<DocumentMatch>> {
        Ok(self.rx.recv().ok())
    }

    fn advance(
        &mut self,
        ctx: &mut SearchContext,
        target: GlobalDocNum,
    ) -> Result<Option<DocumentMatch>> {
        while let Some(doc_match) = self.next(ctx)? {
            if doc_match.number >= target {
                return Ok(Some(doc_match));
            }
            ctx.pool.put(doc_match);
        }
        Ok(None)
    }

    fn count(&self) -> u64 {
        self.count
    }
}
