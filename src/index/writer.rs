//! The index writer
//!
//! Owns the three long-running workers plus the analysis pool. `update`,
//! `delete` and `batch` are synchronous: they return once the introducer has
//! published a snapshot containing their effects, and (unless `unsafe_batch`
//! is set) once that epoch is covered by a durable snapshot file.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use roaring::RoaringBitmap;
use tracing::warn;

use super::analyze::analyze_document;
use super::introducer::run_introducer;
use super::merger::run_merger;
use super::persister::{run_cleanup, run_persister};
use super::snapshot::{SegmentSnapshot, Snapshot, SnapshotRegistry};
use super::snapshot_file::SnapshotFile;
use super::state::{IndexState, IntroducerEvent, SegmentIntroduction, SnapshotRecord};
use crate::config::Config;
use crate::directory::Kind;
use crate::document::Document;
use crate::error::{CuttleError, Result};
use crate::reader::Reader;
use crate::segment::AnalyzedDocument;

/// One grouped mutation
pub enum BatchOperation {
    Update { id: Vec<u8>, doc: Document },
    Delete { id: Vec<u8> },
}

/// A group of updates and deletes applied as a single introduction
#[derive(Default)]
pub struct Batch {
    operations: Vec<BatchOperation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, id: impl Into<Vec<u8>>, doc: Document) -> &mut Self {
        self.operations.push(BatchOperation::Update {
            id: id.into(),
            doc,
        });
        self
    }

    pub fn delete(&mut self, id: impl Into<Vec<u8>>) -> &mut Self {
        self.operations.push(BatchOperation::Delete { id: id.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

type AnalysisJob = Box<dyn FnOnce() + Send>;

/// Fixed pool of analysis threads fed by a shared job channel
struct AnalysisPool {
    tx: Option<Sender<AnalysisJob>>,
    handles: Vec<JoinHandle<()>>,
}

impl AnalysisPool {
    fn new(workers: usize) -> Self {
        let (tx, rx) = unbounded::<AnalysisJob>();
        let handles = (0..workers)
            .map(|i| {
                let rx: Receiver<AnalysisJob> = rx.clone();
                std::thread::Builder::new()
                    .name(format!("cuttle-analysis-{}", i))
                    .spawn(move || {
                        for job in rx {
                            job();
                        }
                    })
                    .expect("spawn analysis worker")
            })
            .collect();
        Self {
            tx: Some(tx),
            handles,
        }
    }

    fn execute(&self, job: AnalysisJob) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(job);
        }
    }

    fn shutdown(&mut self) {
        self.tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

pub struct Writer {
    state: Arc<IndexState>,
    intro_tx: Sender<IntroducerEvent>,
    analysis: Mutex<AnalysisPool>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Writer {
    /// Open or create an index backed by the configured directory
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        config.directory.lock()?;

        match Self::open_locked(config) {
            Ok(writer) => Ok(writer),
            Err((config, e)) => {
                let _ = config.directory.unlock();
                Err(e)
            }
        }
    }

    fn open_locked(config: Config) -> std::result::Result<Self, (Config, CuttleError)> {
        let codec = match config.codecs.get(&config.segment_type, config.segment_version) {
            Ok(codec) => codec,
            Err(e) => return Err((config, e)),
        };

        let (initial, records, max_segment_id) = match load_existing(&config) {
            Ok(v) => v,
            Err(e) => return Err((config, e)),
        };

        let config = Arc::new(config);
        let (drop_tx, drop_rx) = bounded(64);
        let epoch = initial.epoch();
        let last_durable = records.first().map(|r| r.epoch).unwrap_or(0);

        let state = Arc::new(IndexState {
            config: config.clone(),
            codec,
            current: ArcSwap::from_pointee(initial),
            registry: SnapshotRegistry::new(),
            next_segment_id: AtomicU64::new(max_segment_id + 1),
            last_durable_epoch: AtomicU64::new(last_durable),
            last_mutating_epoch: AtomicU64::new(epoch),
            durable_mutex: Mutex::new(()),
            durable_cv: Condvar::new(),
            memory_paused_threads: AtomicU64::new(0),
            persisted_records: Mutex::new(records),
            protected_segments: Mutex::new(HashSet::new()),
            fatal: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            snapshot_drop_tx: drop_tx,
        });
        // re-register the initial snapshot now that the registry exists
        let current = state.current.load_full();
        state.registry.register(&current);
        drop(current);

        let (intro_tx, intro_rx) = bounded(config.introducer_queue_size);
        let (notify_tx, notify_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = unbounded::<()>();

        let mut workers = Vec::with_capacity(3);
        {
            let state = state.clone();
            let shutdown = shutdown_rx.clone();
            let notify = notify_tx.clone();
            workers.push(
                std::thread::Builder::new()
                    .name("cuttle-introducer".to_string())
                    .spawn(move || run_introducer(state, intro_rx, shutdown, notify))
                    .expect("spawn introducer"),
            );
        }
        {
            let state = state.clone();
            let intro = intro_tx.clone();
            let shutdown = shutdown_rx.clone();
            workers.push(
                std::thread::Builder::new()
                    .name("cuttle-persister".to_string())
                    .spawn(move || run_persister(state, intro, notify_rx, drop_rx, shutdown))
                    .expect("spawn persister"),
            );
        }
        {
            let state = state.clone();
            let intro = intro_tx.clone();
            let shutdown = shutdown_rx.clone();
            workers.push(
                std::thread::Builder::new()
                    .name("cuttle-merger".to_string())
                    .spawn(move || run_merger(state, intro, shutdown))
                    .expect("spawn merger"),
            );
        }

        Ok(Self {
            analysis: Mutex::new(AnalysisPool::new(config.num_analysis_workers)),
            state,
            intro_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(workers),
        })
    }

    /// Atomic upsert: any prior document with `id` is deleted in the same
    /// introduction
    pub fn update(&self, id: impl Into<Vec<u8>>, doc: Document) -> Result<()> {
        let mut batch = Batch::new();
        batch.update(id, doc);
        self.batch(batch)
    }

    pub fn delete(&self, id: impl Into<Vec<u8>>) -> Result<()> {
        let mut batch = Batch::new();
        batch.delete(id);
        self.batch(batch)
    }

    /// Apply a group of operations as one introduction
    pub fn batch(&self, batch: Batch) -> Result<()> {
        if self.state.is_shutting_down() {
            return Err(CuttleError::Closed);
        }
        if batch.is_empty() {
            return Ok(());
        }

        // last operation per id wins within one batch
        let mut ops: Vec<BatchOperation> = Vec::with_capacity(batch.operations.len());
        for op in batch.operations {
            let id = match &op {
                BatchOperation::Update { id, .. } => id,
                BatchOperation::Delete { id } => id,
            };
            ops.retain(|existing| {
                let existing_id = match existing {
                    BatchOperation::Update { id, .. } => id,
                    BatchOperation::Delete { id } => id,
                };
                existing_id != id
            });
            ops.push(op);
        }

        let mut deleted_ids: Vec<Vec<u8>> = Vec::new();
        let mut docs: Vec<Document> = Vec::new();
        for op in ops {
            match op {
                BatchOperation::Update { id, mut doc } => {
                    doc.id = id.clone();
                    deleted_ids.push(id);
                    docs.push(doc);
                }
                BatchOperation::Delete { id } => deleted_ids.push(id),
            }
        }

        let analyzed = self.analyze_all(docs);
        let segment = if analyzed.is_empty() {
            None
        } else {
            Some(
                self.state
                    .codec
                    .new_segment(&analyzed, &self.state.config.norm_calc)?,
            )
        };

        let segment_id = self.state.allocate_segment_id();
        let (applied_tx, applied_rx) = bounded(1);
        self.intro_tx
            .send(IntroducerEvent::Introduction(SegmentIntroduction {
                segment_id,
                segment,
                deleted_ids,
                applied: applied_tx,
            }))
            .map_err(|_| CuttleError::Closed)?;

        let epoch = applied_rx.recv().map_err(|_| CuttleError::Closed)??;

        if !self.state.config.unsafe_batch {
            self.wait_durable(epoch)?;
        }
        Ok(())
    }

    /// Fan documents out over the analysis pool, preserving batch order
    fn analyze_all(&self, docs: Vec<Document>) -> Vec<AnalyzedDocument> {
        if docs.is_empty() {
            return Vec::new();
        }
        let config = &self.state.config;
        let (tx, rx) = bounded(docs.len());
        let count = docs.len();
        let analysis = self.analysis.lock();
        for (i, doc) in docs.into_iter().enumerate() {
            let tx = tx.clone();
            let analyzer = config.default_analyzer.clone();
            let virtual_fields = config.virtual_fields.clone();
            analysis.execute(Box::new(move || {
                let analyzed = analyze_document(&doc, &analyzer, &virtual_fields);
                let _ = tx.send((i, analyzed));
            }));
        }
        drop(analysis);

        let mut results: Vec<Option<AnalyzedDocument>> = (0..count).map(|_| None).collect();
        for _ in 0..count {
            if let Ok((i, analyzed)) = rx.recv() {
                results[i] = Some(analyzed);
            }
        }
        results.into_iter().flatten().collect()
    }

    fn wait_durable(&self, epoch: u64) -> Result<()> {
        let mut guard = self.state.durable_mutex.lock();
        loop {
            if self.state.last_durable_epoch.load(Ordering::SeqCst) >= epoch {
                return Ok(());
            }
            if self.state.fatal.load(Ordering::SeqCst) {
                return Err(CuttleError::Closed);
            }
            self.state
                .durable_cv
                .wait_for(&mut guard, Duration::from_millis(100));
        }
    }

    /// Open a point-in-time reader over the current snapshot
    pub fn reader(&self) -> Result<Reader> {
        if self.state.is_shutting_down() {
            return Err(CuttleError::Closed);
        }
        Ok(Reader::new(
            self.state.current.load_full(),
            self.state.config.clone(),
        ))
    }

    /// Synchronously compact every persisted segment into one.
    ///
    /// Waits for outstanding persistence first, then drives merge rounds
    /// until the snapshot holds at most one segment.
    pub fn force_merge(&self) -> Result<()> {
        if self.state.is_shutting_down() {
            return Err(CuttleError::Closed);
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(60);
        loop {
            if std::time::Instant::now() >= deadline {
                return Err(CuttleError::Internal("force merge timed out".to_string()));
            }
            let snapshot = self.state.current.load_full();
            if snapshot.has_unpersisted() {
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
            let ids = snapshot.segment_ids();
            if ids.len() <= 1 {
                return Ok(());
            }
            if !super::merger::execute_merge_task(
                &self.state,
                &self.intro_tx,
                &snapshot,
                &ids,
            )? {
                return Err(CuttleError::Closed);
            }
            // sources leaving the snapshot always advances the epoch
            while self.state.current.load().epoch() <= snapshot.epoch() {
                if std::time::Instant::now() >= deadline {
                    return Err(CuttleError::Internal("force merge timed out".to_string()));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    /// Embedder hook backing `MemoryPressurePauseThreshold`
    pub fn note_memory_pause(&self, paused_threads: u64) {
        self.state
            .memory_paused_threads
            .store(paused_threads, Ordering::SeqCst);
    }

    /// Current live document count
    pub fn doc_count(&self) -> u64 {
        self.state.current.load().live_doc_count()
    }

    /// Flush in-memory segments, stop workers, release the directory lock
    pub fn close(&self) -> Result<()> {
        eprintln!("DEBUG close() called");
        if self.state.closed.swap(true, Ordering::SeqCst) {
            eprintln!("DEBUG close() already closed, returning");
            return Ok(());
        }

        // flush: wait until every content mutation is durable
        if !self.state.fatal.load(Ordering::SeqCst) {
            let target = self.state.last_mutating_epoch.load(Ordering::SeqCst);
            eprintln!("DEBUG close() flush target epoch={}", target);
            let deadline = std::time::Instant::now() + Duration::from_secs(30);
            let mut guard = self.state.durable_mutex.lock();
            while self.state.last_durable_epoch.load(Ordering::SeqCst) < target
                && !self.state.fatal.load(Ordering::SeqCst)
            {
                if std::time::Instant::now() >= deadline {
                    warn!("close timed out waiting for durability");
                    break;
                }
                self.state
                    .durable_cv
                    .wait_for(&mut guard, Duration::from_millis(100));
            }
            eprintln!("DEBUG close() flush done, last_durable_epoch={}", self.state.last_durable_epoch.load(Ordering::SeqCst));
        }

        // dropping the shutdown sender disconnects every worker's select
        eprintln!("DEBUG close() dropping shutdown_tx");
        self.shutdown_tx.lock().take();
        eprintln!("DEBUG close() joining workers, count={}", self.workers.lock().len());
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
            eprintln!("DEBUG close() joined one worker");
        }
        eprintln!("DEBUG close() shutting down analysis pool");
        self.analysis.lock().shutdown();

        eprintln!("DEBUG close() running cleanup");
        run_cleanup(&self.state);
        eprintln!("DEBUG close() unlocking directory");
        self.state.config.directory.unlock()
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Load the newest valid snapshot plus retention records from the directory
#[allow(clippy::type_complexity)]
fn load_existing(config: &Config) -> Result<(Snapshot, Vec<SnapshotRecord>, u64)> {
    let directory = &config.directory;
    let codec = config.codecs.get(&config.segment_type, config.segment_version)?;

    let mut records = Vec::new();
    let mut newest: Option<SnapshotFile> = None;
    for epoch in directory.list(Kind::Snapshot)? {
        let bytes = directory.load(Kind::Snapshot, epoch)?;
        let file = SnapshotFile::from_bytes(epoch, &bytes)?;
        records.push(SnapshotRecord {
            epoch: file.epoch,
            segment_ids: file.segment_ids(),
        });
        if newest.is_none() {
            newest = Some(file);
        }
    }

    let mut max_segment_id = directory.list(Kind::Segment)?.first().copied().unwrap_or(0);

    let snapshot = match newest {
        Some(file) => {
            let mut segments = Vec::with_capacity(file.rows.len());
            for row in &file.rows {
                max_segment_id = max_segment_id.max(row.segment_id);
                let bytes = directory.load(Kind::Segment, row.segment_id)?;
                let segment = codec.load(row.segment_id, &bytes)?;
                let mut snapshot_segment = SegmentSnapshot::new(row.segment_id, segment, true);
                if let Some(deletions) = &row.deletions {
                    let bitmap = RoaringBitmap::deserialize_from(&deletions[..])
                        .map_err(CuttleError::Io)?;
                    snapshot_segment.deletions = Some(Arc::new(bitmap));
                }
                segments.push(snapshot_segment);
            }
            Snapshot::new(file.epoch, segments)
        }
        None => Snapshot::new(0, Vec::new()),
    };

    Ok((snapshot, records, max_segment_id))
}
