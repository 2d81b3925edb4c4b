//! Documents and typed fields
//!
//! A document is an ordered list of fields plus a logical `_id`. Field flags
//! control what the indexer materializes for each field: postings, stored
//! bytes, term vectors, and doc values.

use chrono::{DateTime, Utc};

use crate::analysis::Analyzer;
use crate::numeric;
use std::sync::Arc;

/// Reserved field holding the external document identifier
pub const ID_FIELD: &str = "_id";

/// Flags controlling how a field is indexed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldFlags(pub u8);

impl FieldFlags {
    pub const INDEXED: u8 = 1;
    pub const STORED: u8 = 1 << 1;
    pub const TERM_VECTORS: u8 = 1 << 2;
    pub const DOC_VALUES: u8 = 1 << 3;

    pub fn indexed(self) -> bool {
        self.0 & Self::INDEXED != 0
    }

    pub fn stored(self) -> bool {
        self.0 & Self::STORED != 0
    }

    pub fn term_vectors(self) -> bool {
        self.0 & Self::TERM_VECTORS != 0
    }

    pub fn doc_values(self) -> bool {
        self.0 & Self::DOC_VALUES != 0
    }
}

/// Typed field value
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Keyword(String),
    /// Float64-encoded numeric
    Numeric(f64),
    /// Epoch nanoseconds
    DateTime(i64),
    GeoPoint {
        lat: f64,
        lon: f64,
    },
}

impl FieldValue {
    /// Bytes stored for retrieval and doc values
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::Text(s) | FieldValue::Keyword(s) => s.as_bytes().to_vec(),
            FieldValue::Numeric(n) => numeric::f64_to_sortable_bytes(*n).to_vec(),
            FieldValue::DateTime(nanos) => numeric::i64_to_sortable_bytes(*nanos).to_vec(),
            FieldValue::GeoPoint { lat, lon } => {
                numeric::geohash_encode(*lat, *lon, numeric::GEOHASH_MAX_PRECISION).into_bytes()
            }
        }
    }
}

/// A named, typed, flagged field
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
    pub flags: FieldFlags,
    /// Analyzer override; `None` uses the writer's default for text fields
    pub analyzer: Option<Arc<dyn Analyzer>>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue, flags: FieldFlags) -> Self {
        Self {
            name: name.into(),
            value,
            flags,
            analyzer: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }
}

/// A document: a logical identifier plus an ordered sequence of fields
#[derive(Clone, Debug, Default)]
pub struct Document {
    pub id: Vec<u8>,
    pub fields: Vec<Field>,
}

impl Document {
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    /// Indexed + stored text field, with term vectors for phrase matching
    /// and highlighting
    pub fn add_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.push(Field::new(
            name,
            FieldValue::Text(text.into()),
            FieldFlags(FieldFlags::INDEXED | FieldFlags::STORED | FieldFlags::TERM_VECTORS),
        ));
        self
    }

    /// Indexed + stored keyword field (not analyzed)
    pub fn add_keyword(mut self, name: impl Into<String>, term: impl Into<String>) -> Self {
        self.fields.push(Field::new(
            name,
            FieldValue::Keyword(term.into()),
            FieldFlags(FieldFlags::INDEXED | FieldFlags::STORED),
        ));
        self
    }

    /// Indexed + stored numeric field with doc values for sorting
    pub fn add_numeric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.push(Field::new(
            name,
            FieldValue::Numeric(value),
            FieldFlags(FieldFlags::INDEXED | FieldFlags::STORED | FieldFlags::DOC_VALUES),
        ));
        self
    }

    /// Indexed + stored datetime field with doc values for sorting
    pub fn add_datetime(mut self, name: impl Into<String>, value: DateTime<Utc>) -> Self {
        let nanos = value.timestamp_nanos_opt().unwrap_or(0);
        self.fields.push(Field::new(
            name,
            FieldValue::DateTime(nanos),
            FieldFlags(FieldFlags::INDEXED | FieldFlags::STORED | FieldFlags::DOC_VALUES),
        ));
        self
    }

    /// Indexed geo point field
    pub fn add_geo_point(mut self, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        self.fields.push(Field::new(
            name,
            FieldValue::GeoPoint { lat, lon },
            FieldFlags(FieldFlags::INDEXED | FieldFlags::STORED),
        ));
        self
    }

    pub fn add_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_flags() {
        let flags = FieldFlags(FieldFlags::INDEXED | FieldFlags::STORED);
        assert!(flags.indexed());
        assert!(flags.stored());
        assert!(!flags.doc_values());
        assert!(!flags.term_vectors());
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new("a")
            .add_text("name", "cuttle")
            .add_numeric("rank", 3.0);
        assert_eq!(doc.id, b"a");
        assert_eq!(doc.fields.len(), 2);
        assert_eq!(doc.fields[0].name, "name");
        assert!(doc.fields[1].flags.doc_values());
    }

    #[test]
    fn test_numeric_bytes_sort_like_values() {
        let a = FieldValue::Numeric(-2.0).to_bytes();
        let b = FieldValue::Numeric(1.0).to_bytes();
        let c = FieldValue::Numeric(10.5).to_bytes();
        assert!(a < b);
        assert!(b < c);
    }
}
