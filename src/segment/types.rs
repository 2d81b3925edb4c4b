//! Core types shared across the segment codec

use serde::{Deserialize, Serialize};

use crate::analysis::Token;
use crate::error::{CuttleError, Result};

/// Document number local to one segment (0..doc_count)
pub type LocalDocNum = u32;

/// Document number global to a snapshot (`base_doc_num + local`)
pub type GlobalDocNum = u64;

/// One indexed field of one analyzed document, as consumed by the builder
#[derive(Clone, Debug)]
pub struct AnalyzedField {
    pub name: String,
    /// Tokens with positions; empty for fields that are stored only
    pub tokens: Vec<Token>,
    /// Token count used for length normalization
    pub length: u32,
    /// Bytes retained for `stored_fields`, if the field is stored
    pub stored: Option<Vec<u8>>,
    /// Bytes retained for sorting/aggregation, if the field has doc values
    pub doc_value: Option<Vec<u8>>,
    /// Whether postings keep token positions (phrase support)
    pub index_positions: bool,
}

/// A fully analyzed document ready for segment construction
#[derive(Clone, Debug)]
pub struct AnalyzedDocument {
    pub id: Vec<u8>,
    pub fields: Vec<AnalyzedField>,
}

/// Posting list metadata stored in the term dictionary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostingListMeta {
    /// Offset into the field's postings bytes
    pub offset: u64,
    /// Encoded length in bytes
    pub length: u64,
    /// Number of documents containing this term
    pub doc_frequency: u32,
    /// Total term frequency across documents
    pub total_term_frequency: u64,
}

/// A decoded posting
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostingEntry {
    pub doc: LocalDocNum,
    pub term_frequency: u32,
    /// Present only when the list was encoded with positions and the caller
    /// asked for them
    pub positions: Vec<u32>,
    /// Field length norm for the matched document
    pub norm: f32,
}

/// Pull iterator over one posting list, in ascending local doc order
pub trait PostingIterator: Send {
    fn next(&mut self) -> Result<Option<PostingEntry>>;

    /// Skip forward to the first posting with `doc >= target`
    fn advance(&mut self, target: LocalDocNum) -> Result<Option<PostingEntry>> {
        while let Some(entry) = self.next()? {
            if entry.doc >= target {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn doc_frequency(&self) -> u32;
}

/// Variable-byte encoding; high bit marks the final byte
pub fn encode_vbyte(value: u32, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80);
            break;
        } else {
            output.push(byte);
        }
    }
}

pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> Result<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *input.get(*pos).ok_or_else(|| {
            CuttleError::corruption("postings", "-", "unexpected end of vbyte")
        })?;
        *pos += 1;
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 != 0 {
            return Ok(result);
        }
        shift += 7;
        if shift > 28 {
            return Err(CuttleError::corruption("postings", "-", "vbyte value too large"));
        }
    }
}

/// Encode one posting list: per doc `delta(doc), tf, [position deltas x tf]`
pub fn encode_posting_list(
    postings: &[(LocalDocNum, u32, Vec<u32>)],
    with_positions: bool,
    output: &mut Vec<u8>,
) {
    let mut last_doc = 0u32;
    for (doc, tf, positions) in postings {
        encode_vbyte(doc - last_doc, output);
        encode_vbyte(*tf, output);
        if with_positions {
            let mut last_pos = 0u32;
            for &p in positions {
                encode_vbyte(p - last_pos, output);
                last_pos = p;
            }
        }
        last_doc = *doc;
    }
}

/// Streaming decoder over an encoded posting list slice
pub struct PostingDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    last_doc: u32,
    remaining: u32,
    doc_frequency: u32,
    encoded_positions: bool,
}

impl<'a> PostingDecoder<'a> {
    pub fn new(data: &'a [u8], doc_frequency: u32, encoded_positions: bool) -> Self {
        Self {
            data,
            pos: 0,
            last_doc: 0,
            remaining: doc_frequency,
            doc_frequency,
            encoded_positions,
        }
    }

    pub fn doc_frequency(&self) -> u32 {
        self.doc_frequency
    }

    /// Decode the next posting; `keep_positions` controls whether position
    /// deltas are materialized or skipped
    pub fn decode_next(&mut self, keep_positions: bool) -> Result<Option<(LocalDocNum, u32, Vec<u32>)>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let delta = decode_vbyte(self.data, &mut self.pos)?;
        let doc = self.last_doc + delta;
        self.last_doc = doc;
        let tf = decode_vbyte(self.data, &mut self.pos)?;

        let mut positions = Vec::new();
        if self.encoded_positions {
            let mut last_pos = 0u32;
            if keep_positions {
                positions.reserve(tf as usize);
            }
            for _ in 0..tf {
                last_pos += decode_vbyte(self.data, &mut self.pos)?;
                if keep_positions {
                    positions.push(last_pos);
                }
            }
        }
        Ok(Some((doc, tf, positions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vbyte_round_trip() {
        let mut buf = Vec::new();
        let values = [0u32, 1, 127, 128, 300, 16_384, u32::MAX];
        for v in values {
            encode_vbyte(v, &mut buf);
        }
        let mut pos = 0;
        for v in values {
            assert_eq!(decode_vbyte(&buf, &mut pos).unwrap(), v);
        }
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn test_vbyte_truncated() {
        let mut buf = Vec::new();
        encode_vbyte(300, &mut buf);
        buf.pop();
        let mut pos = 0;
        assert!(decode_vbyte(&buf, &mut pos).is_err());
    }

    #[test]
    fn test_posting_list_round_trip_with_positions() {
        let postings = vec![
            (0u32, 2u32, vec![1, 5]),
            (3, 1, vec![0]),
            (10, 3, vec![2, 7, 9]),
        ];
        let mut buf = Vec::new();
        encode_posting_list(&postings, true, &mut buf);

        let mut decoder = PostingDecoder::new(&buf, 3, true);
        for expected in &postings {
            let (doc, tf, positions) = decoder.decode_next(true).unwrap().unwrap();
            assert_eq!(doc, expected.0);
            assert_eq!(tf, expected.1);
            assert_eq!(positions, expected.2);
        }
        assert!(decoder.decode_next(true).unwrap().is_none());
    }

    #[test]
    fn test_posting_list_skip_positions() {
        let postings = vec![(1u32, 2u32, vec![3, 8]), (4, 1, vec![2])];
        let mut buf = Vec::new();
        encode_posting_list(&postings, true, &mut buf);

        let mut decoder = PostingDecoder::new(&buf, 2, true);
        let (doc, tf, positions) = decoder.decode_next(false).unwrap().unwrap();
        assert_eq!((doc, tf), (1, 2));
        assert!(positions.is_empty());
        let (doc, _, _) = decoder.decode_next(false).unwrap().unwrap();
        assert_eq!(doc, 4);
    }

    #[test]
    fn test_posting_list_without_positions() {
        let postings = vec![(2u32, 1u32, vec![]), (9, 4, vec![])];
        let mut buf = Vec::new();
        encode_posting_list(&postings, false, &mut buf);

        let mut decoder = PostingDecoder::new(&buf, 2, false);
        assert_eq!(
            decoder.decode_next(true).unwrap().unwrap(),
            (2, 1, Vec::new())
        );
        assert_eq!(
            decoder.decode_next(true).unwrap().unwrap(),
            (9, 4, Vec::new())
        );
    }
}
