//! Byte-level storage abstraction for segments and snapshots
//!
//! A `Directory` persists opaque blobs keyed by `(kind, id)`. The index core
//! never touches the filesystem directly; the filesystem and in-memory
//! implementations share bit-exact semantics apart from fsync.

mod fs;
mod memory;

pub use fs::FsDirectory;
pub use memory::MemDirectory;

use std::fmt::Debug;

use crate::error::Result;

/// Blob namespace within a directory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Segment,
    Snapshot,
}

impl Kind {
    pub fn extension(self) -> &'static str {
        match self {
            Kind::Segment => "seg",
            Kind::Snapshot => "snp",
        }
    }
}

/// Byte storage for index files
pub trait Directory: Send + Sync + Debug {
    /// List item ids of a kind, newest (highest id) first
    fn list(&self, kind: Kind) -> Result<Vec<u64>>;

    /// Load the full contents of an item
    fn load(&self, kind: Kind, id: u64) -> Result<Vec<u8>>;

    /// Durably write an item; visible to `load` only once complete
    fn persist(&self, kind: Kind, id: u64, data: &[u8]) -> Result<()>;

    /// Remove an item
    fn remove(&self, kind: Kind, id: u64) -> Result<()>;

    /// Flush directory metadata
    fn sync(&self) -> Result<()>;

    /// Take the single-writer lock
    fn lock(&self) -> Result<()>;

    /// Release the single-writer lock
    fn unlock(&self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Shared conformance checks run against both implementations
    pub(crate) fn exercise_directory(dir: &dyn Directory) {
        assert!(dir.list(Kind::Segment).unwrap().is_empty());

        dir.persist(Kind::Segment, 1, b"one").unwrap();
        dir.persist(Kind::Segment, 7, b"seven").unwrap();
        dir.persist(Kind::Snapshot, 2, b"snap").unwrap();

        assert_eq!(dir.list(Kind::Segment).unwrap(), vec![7, 1]);
        assert_eq!(dir.list(Kind::Snapshot).unwrap(), vec![2]);
        assert_eq!(dir.load(Kind::Segment, 7).unwrap(), b"seven");

        dir.remove(Kind::Segment, 1).unwrap();
        assert_eq!(dir.list(Kind::Segment).unwrap(), vec![7]);
        assert!(dir.load(Kind::Segment, 1).is_err());

        dir.sync().unwrap();
    }

    /// Lock conformance: second lock fails until unlock
    pub(crate) fn exercise_lock(dir: &dyn Directory) {
        dir.lock().unwrap();
        assert!(dir.lock().is_err());
        dir.unlock().unwrap();
        dir.lock().unwrap();
        dir.unlock().unwrap();
    }
}
