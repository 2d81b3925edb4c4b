//! Segment codec: immutable postings stores and the plugin registry
//!
//! # Architecture
//!
//! - `types`: analyzed input, posting encoding, iterator traits
//! - `builder`: analyzed documents -> in-memory segment
//! - `file`: checksummed serialized form
//! - `reader`: the `Segment` trait and the default codec's reader
//! - `merge`: k-way rewrite with doc-number remapping
//! - `codec`: `(type, version)` plugin registry

mod builder;
mod codec;
mod file;
mod merge;
mod reader;
mod types;

pub use builder::{build_segment_data, default_norm_calc, NormCalc};
pub use codec::{CodecMergeResult, CodecRegistry, SegmentCodec, TentacleCodec};
pub use file::{FieldData, SegmentData, TENTACLE_TYPE, TENTACLE_VERSION};
pub use merge::{merge_segments, DocMap, MergeOutput};
pub use reader::{DictEntry, FieldInfo, Segment, TentacleSegment};
pub use types::{
    decode_vbyte, encode_posting_list, encode_vbyte, AnalyzedDocument, AnalyzedField,
    GlobalDocNum, LocalDocNum, PostingDecoder, PostingEntry, PostingIterator, PostingListMeta,
};
