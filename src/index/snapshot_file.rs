//! Persisted snapshot files
//!
//! A snapshot file records the epoch plus one row per segment: the segment
//! id and, when present, the serialized deletion bitmap. Files are published
//! atomically by the directory (tmp write, fsync, rename).

use serde::{Deserialize, Serialize};

use crate::error::{CuttleError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub segment_id: u64,
    /// Roaring-serialized deletion bitmap, when any docs are deleted
    pub deletions: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub epoch: u64,
    pub rows: Vec<SnapshotRow>,
}

impl SnapshotFile {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = bincode::serialize(self)?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    pub fn from_bytes(epoch: u64, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(CuttleError::corruption(
                "snapshot",
                epoch.to_string(),
                "file shorter than checksum footer",
            ));
        }
        let (body, footer) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_le_bytes(footer.try_into().unwrap());
        if expected != crc32fast::hash(body) {
            return Err(CuttleError::corruption(
                "snapshot",
                epoch.to_string(),
                "checksum mismatch",
            ));
        }
        bincode::deserialize(body)
            .map_err(|e| CuttleError::corruption("snapshot", epoch.to_string(), e.to_string()))
    }

    pub fn segment_ids(&self) -> Vec<u64> {
        self.rows.iter().map(|r| r.segment_id).collect()
    }

    /// Human-readable form for diagnostics and tooling
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CuttleError::Internal(format!("snapshot json: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roaring::RoaringBitmap;

    #[test]
    fn test_round_trip() {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(3);
        bitmap.insert(17);
        let mut serialized = Vec::new();
        bitmap.serialize_into(&mut serialized).unwrap();

        let file = SnapshotFile {
            epoch: 42,
            rows: vec![
                SnapshotRow {
                    segment_id: 1,
                    deletions: None,
                },
                SnapshotRow {
                    segment_id: 2,
                    deletions: Some(serialized),
                },
            ],
        };

        let bytes = file.to_bytes().unwrap();
        let restored = SnapshotFile::from_bytes(42, &bytes).unwrap();
        assert_eq!(restored.epoch, 42);
        assert_eq!(restored.segment_ids(), vec![1, 2]);

        let restored_bitmap =
            RoaringBitmap::deserialize_from(&restored.rows[1].deletions.as_ref().unwrap()[..])
                .unwrap();
        assert!(restored_bitmap.contains(17));
    }

    #[test]
    fn test_corruption_detected() {
        let file = SnapshotFile {
            epoch: 7,
            rows: Vec::new(),
        };
        let mut bytes = file.to_bytes().unwrap();
        let last = bytes.len() - 5;
        bytes[last] ^= 0x01;
        assert!(matches!(
            SnapshotFile::from_bytes(7, &bytes),
            Err(CuttleError::Corruption { .. })
        ));
    }
}
