//! K-way segment merge
//!
//! Rewrites N source segments into one, dropping documents deleted at merge
//! start. The returned doc maps let the introducer translate deletions that
//! land on the sources while the merge is running.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use roaring::RoaringBitmap;

use super::file::{FieldData, SegmentData};
use super::reader::{Segment, TentacleSegment};
use super::types::{encode_posting_list, LocalDocNum, PostingListMeta};
use crate::error::{CuttleError, Result};

/// Maps each source's local doc numbers to merged local doc numbers;
/// `None` marks a doc dropped by the merge
pub type DocMap = Vec<Option<LocalDocNum>>;

pub struct MergeOutput {
    pub data: SegmentData,
    pub doc_maps: Vec<DocMap>,
}

pub fn merge_segments(
    sources: &[(Arc<dyn Segment>, Option<Arc<RoaringBitmap>>)],
) -> Result<MergeOutput> {
    let segs: Vec<&TentacleSegment> = sources
        .iter()
        .map(|(seg, _)| {
            seg.as_any()
                .downcast_ref::<TentacleSegment>()
                .ok_or_else(|| {
                    CuttleError::Internal("cannot merge foreign segment type".to_string())
                })
        })
        .collect::<Result<_>>()?;

    // assign merged doc numbers, skipping docs already deleted
    let mut doc_maps: Vec<DocMap> = Vec::with_capacity(sources.len());
    let mut merged_count: u32 = 0;
    for (i, seg) in segs.iter().enumerate() {
        let deletions = sources[i].1.as_deref();
        let mut map = Vec::with_capacity(seg.doc_count() as usize);
        for doc in 0..seg.doc_count() {
            if deletions.map(|d| d.contains(doc)).unwrap_or(false) {
                map.push(None);
            } else {
                map.push(Some(merged_count));
                merged_count += 1;
            }
        }
        doc_maps.push(map);
    }

    // merged inverted index, field by field
    let mut field_names_union: Vec<String> = Vec::new();
    for seg in &segs {
        for name in seg.fields() {
            if !field_names_union.contains(&name) {
                field_names_union.push(name);
            }
        }
    }
    field_names_union.sort_unstable();

    let mut fields = Vec::with_capacity(field_names_union.len());
    for name in &field_names_union {
        if let Some(field) = merge_field(name, &segs, &doc_maps, merged_count)? {
            fields.push(field);
        }
    }

    // stored fields, with a rebuilt name table
    let mut field_names: Vec<String> = Vec::new();
    let mut field_ords: HashMap<String, u16> = HashMap::new();
    let mut stored: Vec<Vec<(u16, Vec<u8>)>> = vec![Vec::new(); merged_count as usize];
    for (i, seg) in segs.iter().enumerate() {
        for doc in 0..seg.doc_count() {
            let Some(new_doc) = doc_maps[i][doc as usize] else {
                continue;
            };
            let mut row = Vec::new();
            let mut visit_err = None;
            seg.stored_fields(doc, &mut |field, bytes| {
                let ord = match field_ords.get(field) {
                    Some(ord) => *ord,
                    None => {
                        if field_names.len() > u16::MAX as usize {
                            visit_err = Some("too many distinct stored fields");
                            return false;
                        }
                        let ord = field_names.len() as u16;
                        field_ords.insert(field.to_string(), ord);
                        field_names.push(field.to_string());
                        ord
                    }
                };
                row.push((ord, bytes.to_vec()));
                true
            })?;
            if let Some(msg) = visit_err {
                return Err(CuttleError::Internal(msg.to_string()));
            }
            stored[new_doc as usize] = row;
        }
    }

    // doc value columns
    let mut doc_value_fields: Vec<String> = Vec::new();
    for seg in &segs {
        for (name, _) in &seg.data().doc_values {
            if !doc_value_fields.contains(name) {
                doc_value_fields.push(name.clone());
            }
        }
    }
    doc_value_fields.sort_unstable();

    let mut doc_values = Vec::with_capacity(doc_value_fields.len());
    for name in doc_value_fields {
        let mut column: Vec<Option<Vec<u8>>> = vec![None; merged_count as usize];
        for (i, seg) in segs.iter().enumerate() {
            for doc in 0..seg.doc_count() {
                let Some(new_doc) = doc_maps[i][doc as usize] else {
                    continue;
                };
                if let Some(bytes) = seg.doc_value(&name, doc) {
                    column[new_doc as usize] = Some(bytes.to_vec());
                }
            }
        }
        doc_values.push((name, Arc::new(column)));
    }

    Ok(MergeOutput {
        data: SegmentData {
            doc_count: merged_count,
            field_names,
            fields,
            stored,
            doc_values,
        },
        doc_maps,
    })
}

fn merge_field(
    name: &str,
    segs: &[&TentacleSegment],
    doc_maps: &[DocMap],
    merged_count: u32,
) -> Result<Option<FieldData>> {
    let has_positions = segs
        .iter()
        .any(|s| s.field_info(name).map(|i| i.has_positions).unwrap_or(false));

    let mut terms: BTreeMap<Vec<u8>, Vec<(LocalDocNum, u32, Vec<u32>)>> = BTreeMap::new();
    let mut norms = vec![0.0f32; merged_count as usize];
    let mut lengths = vec![0u32; merged_count as usize];

    for (i, seg) in segs.iter().enumerate() {
        if seg.field_info(name).is_none() {
            continue;
        }
        let source_terms: Vec<Vec<u8>> =
            seg.dict_iter(name, None, None).map(|(term, _)| term).collect();
        for term in source_terms {
            let Some(mut postings) = seg.postings(name, &term, has_positions)? else {
                continue;
            };
            let list = terms.entry(term).or_default();
            while let Some(entry) = postings.next()? {
                if let Some(new_doc) = doc_maps[i][entry.doc as usize] {
                    list.push((new_doc, entry.term_frequency, entry.positions));
                }
            }
        }
        for doc in 0..seg.doc_count() {
            if let Some(new_doc) = doc_maps[i][doc as usize] {
                norms[new_doc as usize] = seg.norm(name, doc);
                if let Some(len) = seg.field_length(name, doc) {
                    lengths[new_doc as usize] = len;
                }
            }
        }
    }

    terms.retain(|_, list| !list.is_empty());
    if terms.is_empty() {
        return Ok(None);
    }

    let mut fst_builder = fst::MapBuilder::memory();
    let mut metas = Vec::with_capacity(terms.len());
    let mut postings_bytes = Vec::new();
    for (ord, (term, list)) in terms.iter().enumerate() {
        let offset = postings_bytes.len() as u64;
        encode_posting_list(list, has_positions, &mut postings_bytes);
        metas.push(PostingListMeta {
            offset,
            length: postings_bytes.len() as u64 - offset,
            doc_frequency: list.len() as u32,
            total_term_frequency: list.iter().map(|(_, tf, _)| *tf as u64).sum(),
        });
        fst_builder
            .insert(term, ord as u64)
            .map_err(|e| CuttleError::Internal(format!("term dictionary build: {}", e)))?;
    }
    let fst = fst_builder
        .into_inner()
        .map_err(|e| CuttleError::Internal(format!("term dictionary finish: {}", e)))?;

    let field_doc_count = lengths.iter().filter(|&&l| l > 0).count() as u32;
    let total_length = lengths.iter().map(|&l| l as u64).sum();

    Ok(Some(FieldData {
        name: name.to_string(),
        fst,
        metas,
        postings: Arc::new(postings_bytes),
        norms: Arc::new(norms),
        lengths: Arc::new(lengths),
        field_doc_count,
        total_length,
        has_positions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analyzer, StandardAnalyzer};
    use crate::segment::builder::{build_segment, default_norm_calc};
    use crate::segment::types::{AnalyzedDocument, AnalyzedField};

    fn analyzed(id: &str, body: &str) -> AnalyzedDocument {
        let tokens = StandardAnalyzer.analyze(body);
        AnalyzedDocument {
            id: id.as_bytes().to_vec(),
            fields: vec![AnalyzedField {
                name: "body".to_string(),
                length: tokens.len() as u32,
                tokens,
                stored: Some(body.as_bytes().to_vec()),
                doc_value: None,
                index_positions: true,
            }],
        }
    }

    fn seg(docs: &[AnalyzedDocument]) -> Arc<dyn Segment> {
        Arc::new(build_segment(docs, &default_norm_calc()).unwrap())
    }

    #[test]
    fn test_merge_two_segments() {
        let a = seg(&[analyzed("a", "red fish"), analyzed("b", "blue fish")]);
        let b = seg(&[analyzed("c", "one fish two fish")]);

        let out = merge_segments(&[(a, None), (b, None)]).unwrap();
        assert_eq!(out.data.doc_count, 3);
        assert_eq!(out.doc_maps[0], vec![Some(0), Some(1)]);
        assert_eq!(out.doc_maps[1], vec![Some(2)]);

        let merged = TentacleSegment::from_data(out.data, 0).unwrap();
        let mut iter = merged.postings("body", b"fish", true).unwrap().unwrap();
        let docs: Vec<u32> = std::iter::from_fn(|| iter.next().unwrap().map(|e| e.doc)).collect();
        assert_eq!(docs, vec![0, 1, 2]);
    }

    #[test]
    fn test_merge_drops_deleted() {
        let a = seg(&[analyzed("a", "red fish"), analyzed("b", "blue fish")]);
        let b = seg(&[analyzed("c", "green fish")]);

        let mut deletions = RoaringBitmap::new();
        deletions.insert(0); // drop "a"

        let out = merge_segments(&[(a, Some(Arc::new(deletions))), (b, None)]).unwrap();
        assert_eq!(out.data.doc_count, 2);
        assert_eq!(out.doc_maps[0], vec![None, Some(0)]);
        assert_eq!(out.doc_maps[1], vec![Some(1)]);

        let merged = TentacleSegment::from_data(out.data, 0).unwrap();
        // "red" only occurred in the deleted doc
        assert!(merged.postings("body", b"red", false).unwrap().is_none());

        let mut stored = Vec::new();
        merged
            .stored_fields(0, &mut |_, bytes| {
                stored.push(bytes.to_vec());
                true
            })
            .unwrap();
        assert_eq!(stored, vec![b"blue fish".to_vec()]);
    }

    #[test]
    fn test_merge_recomputes_stats() {
        let a = seg(&[analyzed("a", "one two three"), analyzed("b", "four")]);
        let mut deletions = RoaringBitmap::new();
        deletions.insert(0);

        let out = merge_segments(&[(a, Some(Arc::new(deletions)))]).unwrap();
        let merged = TentacleSegment::from_data(out.data, 0).unwrap();
        let info = merged.field_info("body").unwrap();
        assert_eq!(info.doc_count, 1);
        assert_eq!(info.total_length, 1);
    }
}
