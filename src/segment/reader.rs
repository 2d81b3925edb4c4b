//! The `Segment` abstraction and the default codec's reader
//!
//! A segment is an immutable, self-contained postings store. Readers obtain
//! owned posting iterators (backed by `Arc` slices) so a snapshot can hand
//! them across threads without borrowing the segment.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use fst::{IntoStreamer, Streamer};

use super::file::{FieldData, SegmentData};
use super::types::{
    decode_vbyte, LocalDocNum, PostingEntry, PostingIterator, PostingListMeta,
};
use crate::error::{CuttleError, Result};

/// Per-field statistics used for scoring
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldInfo {
    /// Docs carrying this field
    pub doc_count: u32,
    /// Sum of field lengths over those docs
    pub total_length: u64,
    /// Whether postings carry positions
    pub has_positions: bool,
}

/// A term and its document frequency, from the dictionary
pub type DictEntry = (Vec<u8>, u32);

/// Immutable postings store
pub trait Segment: Send + Sync {
    /// Number of documents, deleted or not
    fn doc_count(&self) -> u32;

    /// Approximate on-disk size in bytes
    fn size_bytes(&self) -> u64;

    /// Names of indexed fields
    fn fields(&self) -> Vec<String>;

    fn field_info(&self, field: &str) -> Option<FieldInfo>;

    /// Lazy dictionary iteration over `[lo, hi]` (inclusive, `None` = open)
    fn dict_iter<'a>(
        &'a self,
        field: &str,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Box<dyn Iterator<Item = DictEntry> + 'a>;

    /// Owned posting iterator for a term, or `None` if absent
    fn postings(
        &self,
        field: &str,
        term: &[u8],
        with_positions: bool,
    ) -> Result<Option<Box<dyn PostingIterator>>>;

    /// Field length norm for a document, 0.0 when the doc lacks the field
    fn norm(&self, field: &str, doc: LocalDocNum) -> f32;

    /// Visit stored fields of a document; the visitor returns `false` to stop
    fn stored_fields(
        &self,
        doc: LocalDocNum,
        visitor: &mut dyn FnMut(&str, &[u8]) -> bool,
    ) -> Result<()>;

    /// Doc value bytes for `(field, doc)`, if retained
    fn doc_value(&self, field: &str, doc: LocalDocNum) -> Option<&[u8]>;

    /// Downcast hook for codec-internal operations such as merging
    fn as_any(&self) -> &dyn Any;
}

/// Default codec segment, fully resident in memory
pub struct TentacleSegment {
    data: SegmentData,
    /// Parsed term dictionaries, parallel to `data.fields`
    fsts: Vec<fst::Map<Vec<u8>>>,
    field_index: HashMap<String, usize>,
    doc_value_index: HashMap<String, usize>,
    size_bytes: u64,
}

impl TentacleSegment {
    pub fn from_data(data: SegmentData, size_bytes: u64) -> Result<Self> {
        let mut fsts = Vec::with_capacity(data.fields.len());
        let mut field_index = HashMap::with_capacity(data.fields.len());
        for (i, field) in data.fields.iter().enumerate() {
            let map = fst::Map::new(field.fst.clone()).map_err(|e| {
                CuttleError::corruption("segment", "-", format!("bad term dictionary: {}", e))
            })?;
            fsts.push(map);
            field_index.insert(field.name.clone(), i);
        }
        let doc_value_index = data
            .doc_values
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Ok(Self {
            data,
            fsts,
            field_index,
            doc_value_index,
            size_bytes,
        })
    }

    pub fn load(id: u64, bytes: &[u8]) -> Result<Self> {
        let size = bytes.len() as u64;
        let data = SegmentData::from_bytes(id, bytes)?;
        Self::from_data(data, size)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.data.to_bytes()
    }

    pub(crate) fn data(&self) -> &SegmentData {
        &self.data
    }

    /// Token count of `(field, doc)`, used when merged stats are recomputed
    pub(crate) fn field_length(&self, field: &str, doc: LocalDocNum) -> Option<u32> {
        self.field(field)
            .and_then(|(data, _)| data.lengths.get(doc as usize).copied())
    }

    fn field(&self, name: &str) -> Option<(&FieldData, &fst::Map<Vec<u8>>)> {
        let idx = *self.field_index.get(name)?;
        Some((&self.data.fields[idx], &self.fsts[idx]))
    }
}

impl Segment for TentacleSegment {
    fn doc_count(&self) -> u32 {
        self.data.doc_count
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn fields(&self) -> Vec<String> {
        self.data.fields.iter().map(|f| f.name.clone()).collect()
    }

    fn field_info(&self, field: &str) -> Option<FieldInfo> {
        let (data, _) = self.field(field)?;
        Some(FieldInfo {
            doc_count: data.field_doc_count,
            total_length: data.total_length,
            has_positions: data.has_positions,
        })
    }

    fn dict_iter<'a>(
        &'a self,
        field: &str,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Box<dyn Iterator<Item = DictEntry> + 'a> {
        let Some((data, map)) = self.field(field) else {
            return Box::new(std::iter::empty());
        };
        let mut builder = map.range();
        if let Some(lo) = lo {
            builder = builder.ge(lo);
        }
        if let Some(hi) = hi {
            builder = builder.le(hi);
        }
        Box::new(DictRangeIter {
            stream: builder.into_stream(),
            metas: &data.metas,
        })
    }

    fn postings(
        &self,
        field: &str,
        term: &[u8],
        with_positions: bool,
    ) -> Result<Option<Box<dyn PostingIterator>>> {
        let Some((data, map)) = self.field(field) else {
            return Ok(None);
        };
        let Some(ord) = map.get(term) else {
            return Ok(None);
        };
        let meta = &data.metas[ord as usize];
        Ok(Some(Box::new(TentaclePostingIterator::new(
            data.postings.clone(),
            data.norms.clone(),
            meta.clone(),
            data.has_positions,
            with_positions,
        ))))
    }

    fn norm(&self, field: &str, doc: LocalDocNum) -> f32 {
        self.field(field)
            .and_then(|(data, _)| data.norms.get(doc as usize).copied())
            .unwrap_or(0.0)
    }

    fn stored_fields(
        &self,
        doc: LocalDocNum,
        visitor: &mut dyn FnMut(&str, &[u8]) -> bool,
    ) -> Result<()> {
        let stored = self.data.stored.get(doc as usize).ok_or_else(|| {
            CuttleError::corruption("segment", "-", format!("doc {} out of range", doc))
        })?;
        for (ord, bytes) in stored {
            let name = &self.data.field_names[*ord as usize];
            if !visitor(name, bytes) {
                break;
            }
        }
        Ok(())
    }

    fn doc_value(&self, field: &str, doc: LocalDocNum) -> Option<&[u8]> {
        let idx = *self.doc_value_index.get(field)?;
        self.data.doc_values[idx]
            .1
            .get(doc as usize)?
            .as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct DictRangeIter<'a> {
    stream: fst::map::Stream<'a>,
    metas: &'a [PostingListMeta],
}

impl Iterator for DictRangeIter<'_> {
    type Item = DictEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream
            .next()
            .map(|(term, ord)| (term.to_vec(), self.metas[ord as usize].doc_frequency))
    }
}

/// Owned iterator over one encoded posting list
struct TentaclePostingIterator {
    postings: Arc<Vec<u8>>,
    norms: Arc<Vec<f32>>,
    meta: PostingListMeta,
    pos: usize,
    last_doc: u32,
    remaining: u32,
    encoded_positions: bool,
    keep_positions: bool,
}

impl TentaclePostingIterator {
    fn new(
        postings: Arc<Vec<u8>>,
        norms: Arc<Vec<f32>>,
        meta: PostingListMeta,
        encoded_positions: bool,
        keep_positions: bool,
    ) -> Self {
        let pos = meta.offset as usize;
        Self {
            postings,
            norms,
            remaining: meta.doc_frequency,
            meta,
            pos,
            last_doc: 0,
            encoded_positions,
            keep_positions,
        }
    }
}

impl PostingIterator for TentaclePostingIterator {
    fn next(&mut self) -> Result<Option<PostingEntry>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let end = (self.meta.offset + self.meta.length) as usize;
        let slice = &self.postings[..end];

        let delta = decode_vbyte(slice, &mut self.pos)?;
        let doc = self.last_doc + delta;
        self.last_doc = doc;
        let tf = decode_vbyte(slice, &mut self.pos)?;

        let mut positions = Vec::new();
        if self.encoded_positions {
            let mut last_pos = 0u32;
            if self.keep_positions {
                positions.reserve(tf as usize);
            }
            for _ in 0..tf {
                last_pos += decode_vbyte(slice, &mut self.pos)?;
                if self.keep_positions {
                    positions.push(last_pos);
                }
            }
        }

        let norm = self.norms.get(doc as usize).copied().unwrap_or(0.0);
        Ok(Some(PostingEntry {
            doc,
            term_frequency: tf,
            positions,
            norm,
        }))
    }

    fn doc_frequency(&self) -> u32 {
        self.meta.doc_frequency
    }
}
