//! Serialized segment representation
//!
//! A segment file is the bincode encoding of [`SegmentData`] followed by a
//! little-endian crc32 of those bytes. Load verifies the checksum before
//! deserializing; a mismatch is a corruption error, not an IO error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::PostingListMeta;
use crate::error::{CuttleError, Result};

/// Codec identity, registered under `(type, version)`
pub const TENTACLE_TYPE: &str = "tentacle";
pub const TENTACLE_VERSION: u32 = 1;

/// Everything persisted for one indexed field
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldData {
    pub name: String,
    /// FST mapping term bytes -> ordinal into `metas`
    pub fst: Vec<u8>,
    pub metas: Vec<PostingListMeta>,
    /// Concatenated encoded posting lists
    pub postings: Arc<Vec<u8>>,
    /// Per-doc field length norm, 0.0 when the doc lacks the field
    pub norms: Arc<Vec<f32>>,
    /// Per-doc token count, 0 when the doc lacks the field
    pub lengths: Arc<Vec<u32>>,
    /// Number of docs carrying this field
    pub field_doc_count: u32,
    /// Sum of token counts over docs carrying this field
    pub total_length: u64,
    /// Whether posting lists encode token positions
    pub has_positions: bool,
}

/// The complete segment image
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SegmentData {
    pub doc_count: u32,
    /// Name table referenced by stored-field ordinals
    pub field_names: Vec<String>,
    /// Indexed fields, sorted by name
    pub fields: Vec<FieldData>,
    /// Per doc: (field name ordinal, stored bytes)
    pub stored: Vec<Vec<(u16, Vec<u8>)>>,
    /// Per doc-values field: dense column of encoded values
    pub doc_values: Vec<(String, Arc<Vec<Option<Vec<u8>>>>)>,
}

impl SegmentData {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = bincode::serialize(self)?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    pub fn from_bytes(id: u64, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(CuttleError::corruption(
                "segment",
                id.to_string(),
                "file shorter than checksum footer",
            ));
        }
        let (body, footer) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_le_bytes(footer.try_into().unwrap());
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(CuttleError::corruption(
                "segment",
                id.to_string(),
                format!("checksum mismatch: expected {:08x}, got {:08x}", expected, actual),
            ));
        }
        bincode::deserialize(body).map_err(|e| {
            CuttleError::corruption("segment", id.to_string(), e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let data = SegmentData {
            doc_count: 2,
            field_names: vec!["name".to_string()],
            fields: Vec::new(),
            stored: vec![vec![(0, b"alpha".to_vec())], vec![(0, b"beta".to_vec())]],
            doc_values: Vec::new(),
        };
        let bytes = data.to_bytes().unwrap();
        let restored = SegmentData::from_bytes(1, &bytes).unwrap();
        assert_eq!(restored.doc_count, 2);
        assert_eq!(restored.stored[1][0].1, b"beta");
    }

    #[test]
    fn test_checksum_detects_flip() {
        let data = SegmentData {
            doc_count: 1,
            ..Default::default()
        };
        let mut bytes = data.to_bytes().unwrap();
        bytes[0] ^= 0xff;
        let err = SegmentData::from_bytes(9, &bytes).unwrap_err();
        assert!(matches!(err, CuttleError::Corruption { .. }));
    }

    #[test]
    fn test_truncated_file() {
        let err = SegmentData::from_bytes(9, &[1, 2]).unwrap_err();
        assert!(matches!(err, CuttleError::Corruption { .. }));
    }
}
