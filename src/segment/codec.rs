//! Pluggable segment codec registry
//!
//! Codecs are registered under `(type, version)` so on-disk segments written
//! by older codec versions keep loading after an upgrade.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use roaring::RoaringBitmap;

use super::builder::{build_segment, NormCalc};
use super::file::{TENTACLE_TYPE, TENTACLE_VERSION};
use super::merge::{merge_segments, DocMap};
use super::reader::{Segment, TentacleSegment};
use super::types::AnalyzedDocument;
use crate::error::{CuttleError, Result};

pub struct CodecMergeResult {
    pub segment: Arc<dyn Segment>,
    pub doc_maps: Vec<DocMap>,
}

/// Creates, loads and merges segments of one format
pub trait SegmentCodec: Send + Sync + Debug {
    fn codec_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Build an in-memory segment from a batch of analyzed documents
    fn new_segment(
        &self,
        docs: &[AnalyzedDocument],
        norm_calc: &NormCalc,
    ) -> Result<Arc<dyn Segment>>;

    /// Load a segment from its persisted bytes
    fn load(&self, id: u64, bytes: &[u8]) -> Result<Arc<dyn Segment>>;

    /// Serialized image of a segment, for persistence
    fn serialize(&self, segment: &dyn Segment) -> Result<Vec<u8>>;

    /// Rewrite the sources (minus their deletions) into one merged segment
    fn merge(
        &self,
        sources: &[(Arc<dyn Segment>, Option<Arc<RoaringBitmap>>)],
    ) -> Result<CodecMergeResult>;
}

/// The default codec
#[derive(Debug, Default)]
pub struct TentacleCodec;

impl SegmentCodec for TentacleCodec {
    fn codec_type(&self) -> &'static str {
        TENTACLE_TYPE
    }

    fn version(&self) -> u32 {
        TENTACLE_VERSION
    }

    fn new_segment(
        &self,
        docs: &[AnalyzedDocument],
        norm_calc: &NormCalc,
    ) -> Result<Arc<dyn Segment>> {
        Ok(Arc::new(build_segment(docs, norm_calc)?))
    }

    fn load(&self, id: u64, bytes: &[u8]) -> Result<Arc<dyn Segment>> {
        Ok(Arc::new(TentacleSegment::load(id, bytes)?))
    }

    fn serialize(&self, segment: &dyn Segment) -> Result<Vec<u8>> {
        segment
            .as_any()
            .downcast_ref::<TentacleSegment>()
            .ok_or_else(|| CuttleError::Internal("foreign segment type".to_string()))?
            .to_bytes()
    }

    fn merge(
        &self,
        sources: &[(Arc<dyn Segment>, Option<Arc<RoaringBitmap>>)],
    ) -> Result<CodecMergeResult> {
        let output = merge_segments(sources)?;
        let size = output.data.to_bytes()?.len() as u64;
        Ok(CodecMergeResult {
            segment: Arc::new(TentacleSegment::from_data(output.data, size)?),
            doc_maps: output.doc_maps,
        })
    }
}

/// `(type, version)` to codec lookup
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<(&'static str, u32), Arc<dyn SegmentCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    pub fn register(&mut self, codec: Arc<dyn SegmentCodec>) {
        self.codecs
            .insert((codec.codec_type(), codec.version()), codec);
    }

    pub fn get(&self, codec_type: &str, version: u32) -> Result<Arc<dyn SegmentCodec>> {
        self.codecs
            .iter()
            .find(|((t, v), _)| *t == codec_type && *v == version)
            .map(|(_, codec)| codec.clone())
            .ok_or_else(|| {
                CuttleError::InvalidConfig(format!(
                    "no segment codec registered for {} v{}",
                    codec_type, version
                ))
            })
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TentacleCodec));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_default() {
        let registry = CodecRegistry::default();
        let codec = registry.get(TENTACLE_TYPE, TENTACLE_VERSION).unwrap();
        assert_eq!(codec.codec_type(), TENTACLE_TYPE);
        assert!(registry.get("unknown", 1).is_err());
        assert!(registry.get(TENTACLE_TYPE, 99).is_err());
    }
}
