//! In-memory directory, primarily for tests and ephemeral indexes

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Directory, Kind};
use crate::error::{CuttleError, Result};

#[derive(Debug, Default)]
pub struct MemDirectory {
    items: Mutex<HashMap<(Kind, u64), Arc<Vec<u8>>>>,
    locked: Mutex<bool>,
}

impl MemDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Directory for MemDirectory {
    fn list(&self, kind: Kind) -> Result<Vec<u64>> {
        let items = self.items.lock();
        let mut ids: Vec<u64> = items
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    fn load(&self, kind: Kind, id: u64) -> Result<Vec<u8>> {
        self.items
            .lock()
            .get(&(kind, id))
            .map(|data| data.as_ref().clone())
            .ok_or_else(|| {
                CuttleError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{:?} {} not found", kind, id),
                ))
            })
    }

    fn persist(&self, kind: Kind, id: u64, data: &[u8]) -> Result<()> {
        self.items
            .lock()
            .insert((kind, id), Arc::new(data.to_vec()));
        Ok(())
    }

    fn remove(&self, kind: Kind, id: u64) -> Result<()> {
        self.items.lock().remove(&(kind, id));
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn lock(&self) -> Result<()> {
        let mut locked = self.locked.lock();
        if *locked {
            return Err(CuttleError::IndexLocked);
        }
        *locked = true;
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        *self.locked.lock() = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::tests::{exercise_directory, exercise_lock};

    #[test]
    fn test_mem_directory_conformance() {
        let dir = MemDirectory::new();
        exercise_directory(&dir);
    }

    #[test]
    fn test_mem_directory_lock() {
        let dir = MemDirectory::new();
        exercise_lock(&dir);
    }
}
