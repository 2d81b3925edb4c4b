//! The indexer state machine
//!
//! Three cooperating workers own all index mutation: the introducer applies
//! batches, merge results and persist results to the published snapshot; the
//! persister makes snapshots durable and reclaims files; the merger compacts
//! persisted segments per the cost-based plan.

mod analyze;
mod deletion;
mod introducer;
mod merger;
mod mergeplan;
mod persister;
mod snapshot;
mod snapshot_file;
mod state;
mod writer;

pub use deletion::{DeletionPolicy, KeepNLatestDeletionPolicy};
pub use mergeplan::{plan, MergePlanOptions, MergeTask, SegmentDescription};
pub use snapshot::{SegmentSnapshot, Snapshot, SnapshotRegistry};
pub use snapshot_file::{SnapshotFile, SnapshotRow};
pub use writer::{Batch, BatchOperation, Writer};
