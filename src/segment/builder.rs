//! Builds an immutable segment from analyzed documents

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::file::{FieldData, SegmentData};
use super::reader::TentacleSegment;
use super::types::{encode_posting_list, AnalyzedDocument, LocalDocNum, PostingListMeta};
use crate::error::{CuttleError, Result};

/// Computes the stored field-length norm from `(field, token_count)`
pub type NormCalc = Arc<dyn Fn(&str, u32) -> f32 + Send + Sync>;

/// The default norm: `1 / sqrt(term_count)`
pub fn default_norm_calc() -> NormCalc {
    Arc::new(|_field, length| {
        if length == 0 {
            0.0
        } else {
            1.0 / (length as f32).sqrt()
        }
    })
}

#[derive(Default)]
struct FieldAccumulator {
    /// term -> (doc, tf, positions), docs in ascending order
    terms: BTreeMap<Vec<u8>, Vec<(LocalDocNum, u32, Vec<u32>)>>,
    norms: Vec<f32>,
    lengths: Vec<u32>,
    field_doc_count: u32,
    total_length: u64,
    has_positions: bool,
}

/// Build the default codec's segment image from a batch of analyzed docs
pub fn build_segment_data(docs: &[AnalyzedDocument], norm_calc: &NormCalc) -> Result<SegmentData> {
    let doc_count = docs.len() as u32;

    let mut accumulators: BTreeMap<String, FieldAccumulator> = BTreeMap::new();
    let mut field_names: Vec<String> = Vec::new();
    let mut field_ords: HashMap<String, u16> = HashMap::new();
    let mut stored: Vec<Vec<(u16, Vec<u8>)>> = Vec::with_capacity(docs.len());
    let mut doc_value_columns: BTreeMap<String, Vec<Option<Vec<u8>>>> = BTreeMap::new();

    for (local, doc) in docs.iter().enumerate() {
        let local = local as LocalDocNum;
        let mut doc_stored = Vec::new();

        for field in &doc.fields {
            if field.stored.is_some() || field.doc_value.is_some() {
                if !field_ords.contains_key(&field.name) {
                    if field_names.len() > u16::MAX as usize {
                        return Err(CuttleError::Internal(
                            "too many distinct stored fields".to_string(),
                        ));
                    }
                    field_ords.insert(field.name.clone(), field_names.len() as u16);
                    field_names.push(field.name.clone());
                }
            }
            if let Some(bytes) = &field.stored {
                doc_stored.push((field_ords[&field.name], bytes.clone()));
            }
            if let Some(value) = &field.doc_value {
                doc_value_columns
                    .entry(field.name.clone())
                    .or_insert_with(|| vec![None; docs.len()])
                    [local as usize] = Some(value.clone());
            }

            if field.tokens.is_empty() && field.length == 0 {
                continue;
            }

            let acc = accumulators.entry(field.name.clone()).or_default();
            if acc.norms.is_empty() {
                acc.norms = vec![0.0; docs.len()];
                acc.lengths = vec![0; docs.len()];
            }
            acc.has_positions |= field.index_positions;
            acc.field_doc_count += 1;
            acc.total_length += field.length as u64;
            acc.norms[local as usize] = norm_calc(&field.name, field.length);
            acc.lengths[local as usize] = field.length;

            // aggregate tokens into per-term tf/positions for this doc
            let mut per_term: BTreeMap<&[u8], (u32, Vec<u32>)> = BTreeMap::new();
            for token in &field.tokens {
                let entry = per_term.entry(&token.term).or_insert((0, Vec::new()));
                entry.0 += 1;
                if field.index_positions {
                    entry.1.push(token.position);
                }
            }
            for (term, (tf, mut positions)) in per_term {
                positions.sort_unstable();
                acc.terms
                    .entry(term.to_vec())
                    .or_default()
                    .push((local, tf, positions));
            }
        }
        stored.push(doc_stored);
    }

    let mut fields = Vec::with_capacity(accumulators.len());
    for (name, acc) in accumulators {
        fields.push(encode_field(name, acc)?);
    }

    Ok(SegmentData {
        doc_count,
        field_names,
        fields,
        stored,
        doc_values: doc_value_columns
            .into_iter()
            .map(|(name, column)| (name, Arc::new(column)))
            .collect(),
    })
}

fn encode_field(name: String, acc: FieldAccumulator) -> Result<FieldData> {
    let mut fst_builder = fst::MapBuilder::memory();
    let mut metas = Vec::with_capacity(acc.terms.len());
    let mut postings = Vec::new();

    for (ord, (term, list)) in acc.terms.iter().enumerate() {
        let offset = postings.len() as u64;
        encode_posting_list(list, acc.has_positions, &mut postings);
        metas.push(PostingListMeta {
            offset,
            length: postings.len() as u64 - offset,
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

    Ok(FieldData {
        name,
        fst,
        metas,
        postings: Arc::new(postings),
        norms: Arc::new(acc.norms),
        lengths: Arc::new(acc.lengths),
        field_doc_count: acc.field_doc_count,
        total_length: acc.total_length,
        has_positions: acc.has_positions,
    })
}

/// Build a ready-to-search in-memory segment
pub fn build_segment(docs: &[AnalyzedDocument], norm_calc: &NormCalc) -> Result<TentacleSegment> {
    let data = build_segment_data(docs, norm_calc)?;
    // size is the serialized footprint, which is what the merge planner sees
    let size = data.to_bytes()?.len() as u64;
    TentacleSegment::from_data(data, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analyzer, StandardAnalyzer};
    use crate::segment::reader::Segment;
    use crate::segment::types::AnalyzedField;

    fn text_field(name: &str, text: &str) -> AnalyzedField {
        let tokens = StandardAnalyzer.analyze(text);
        AnalyzedField {
            name: name.to_string(),
            length: tokens.len() as u32,
            tokens,
            stored: Some(text.as_bytes().to_vec()),
            doc_value: None,
            index_positions: true,
        }
    }

    fn build_two_doc_segment() -> TentacleSegment {
        let docs = vec![
            AnalyzedDocument {
                id: b"a".to_vec(),
                fields: vec![text_field("body", "the quick brown fox")],
            },
            AnalyzedDocument {
                id: b"b".to_vec(),
                fields: vec![text_field("body", "the lazy dog the end")],
            },
        ];
        build_segment(&docs, &default_norm_calc()).unwrap()
    }

    #[test]
    fn test_build_basic() {
        let segment = build_two_doc_segment();
        assert_eq!(segment.doc_count(), 2);
        assert_eq!(segment.fields(), vec!["body".to_string()]);

        let info = segment.field_info("body").unwrap();
        assert_eq!(info.doc_count, 2);
        assert_eq!(info.total_length, 9);
        assert!(info.has_positions);
    }

    #[test]
    fn test_postings_and_norms() {
        let segment = build_two_doc_segment();

        let mut iter = segment.postings("body", b"the", true).unwrap().unwrap();
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.doc, 0);
        assert_eq!(first.term_frequency, 1);
        assert_eq!(first.positions, vec![0]);
        assert!((first.norm - 1.0 / 2.0).abs() < 1e-6);

        let second = iter.next().unwrap().unwrap();
        assert_eq!(second.doc, 1);
        assert_eq!(second.term_frequency, 2);
        assert_eq!(second.positions, vec![0, 3]);
        assert!(iter.next().unwrap().is_none());

        assert!(segment.postings("body", b"missing", false).unwrap().is_none());
    }

    #[test]
    fn test_dict_iter_range() {
        let segment = build_two_doc_segment();
        let all: Vec<_> = segment.dict_iter("body", None, None).collect();
        let terms: Vec<&[u8]> = all.iter().map(|(t, _)| t.as_slice()).collect();
        // BTreeMap ordering carries through the fst
        assert_eq!(
            terms,
            vec![
                b"brown".as_slice(),
                b"dog",
                b"end",
                b"fox",
                b"lazy",
                b"quick",
                b"the"
            ]
        );

        let ranged: Vec<_> = segment
            .dict_iter("body", Some(b"dog"), Some(b"lazy"))
            .map(|(t, _)| t)
            .collect();
        assert_eq!(ranged, vec![b"dog".to_vec(), b"end".to_vec(), b"fox".to_vec(), b"lazy".to_vec()]);
    }

    #[test]
    fn test_stored_fields_round_trip() {
        let segment = build_two_doc_segment();
        let mut seen = Vec::new();
        segment
            .stored_fields(1, &mut |name, bytes| {
                seen.push((name.to_string(), bytes.to_vec()));
                true
            })
            .unwrap();
        assert_eq!(seen, vec![("body".to_string(), b"the lazy dog the end".to_vec())]);
    }

    #[test]
    fn test_serialized_round_trip() {
        let segment = build_two_doc_segment();
        let bytes = segment.to_bytes().unwrap();
        let reloaded = TentacleSegment::load(1, &bytes).unwrap();
        assert_eq!(reloaded.doc_count(), 2);
        let mut iter = reloaded.postings("body", b"fox", false).unwrap().unwrap();
        assert_eq!(iter.next().unwrap().unwrap().doc, 0);
    }
}
