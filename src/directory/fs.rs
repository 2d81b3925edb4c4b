//! Filesystem-backed directory
//!
//! Items are written to a temporary name, fsynced, then renamed into place so
//! a crash never exposes a partial file. The containing directory is fsynced
//! after rename and on `sync`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Directory, Kind};
use crate::error::{CuttleError, Result};

const LOCK_FILE: &str = "cuttle.lock";

#[derive(Debug)]
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, kind: Kind, id: u64) -> PathBuf {
        self.root.join(format!("{:012x}.{}", id, kind.extension()))
    }

    fn fsync_root(&self) -> Result<()> {
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }
}

impl Directory for FsDirectory {
    fn list(&self, kind: Kind) -> Result<Vec<u64>> {
        let ext = kind.extension();
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(&format!(".{}", ext)) {
                if let Ok(id) = u64::from_str_radix(stem, 16) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    fn load(&self, kind: Kind, id: u64) -> Result<Vec<u8>> {
        Ok(fs::read(self.item_path(kind, id))?)
    }

    fn persist(&self, kind: Kind, id: u64, data: &[u8]) -> Result<()> {
        let final_path = self.item_path(kind, id);
        // keep the kind in the temporary name so a segment and a snapshot
        // sharing an id never collide mid-write
        let tmp_path = self
            .root
            .join(format!("{:012x}.{}.tmp", id, kind.extension()));

        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &final_path)?;
        self.fsync_root()?;
        debug!(?final_path, len = data.len(), "persisted item");
        Ok(())
    }

    fn remove(&self, kind: Kind, id: u64) -> Result<()> {
        let path = self.item_path(kind, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn sync(&self) -> Result<()> {
        self.fsync_root()
    }

    fn lock(&self) -> Result<()> {
        let path = self.root.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(CuttleError::IndexLocked)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn unlock(&self) -> Result<()> {
        match fs::remove_file(self.root.join(LOCK_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::tests::{exercise_directory, exercise_lock};

    #[test]
    fn test_fs_directory_conformance() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        exercise_directory(&dir);
    }

    #[test]
    fn test_fs_directory_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        exercise_lock(&dir);
    }

    #[test]
    fn test_no_tmp_files_left_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        dir.persist(Kind::Segment, 3, b"data").unwrap();

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
