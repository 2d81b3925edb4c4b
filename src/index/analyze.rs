//! Document analysis: typed fields to analyzed postings input
//!
//! Text runs through the field's analyzer (or the writer default); keyword
//! fields index verbatim; numeric and datetime values expand into their trie
//! terms; geo points index their geohash prefix set. The `_id` field is
//! synthesized onto every document for primary-key deletes.

use std::sync::Arc;

use crate::analysis::{Analyzer, Token};
use crate::document::{Document, Field, FieldValue, ID_FIELD};
use crate::numeric;
use crate::segment::{AnalyzedDocument, AnalyzedField};

pub(crate) fn analyze_document(
    doc: &Document,
    default_analyzer: &Arc<dyn Analyzer>,
    virtual_fields: &[Field],
) -> AnalyzedDocument {
    let mut fields = Vec::with_capacity(doc.fields.len() + virtual_fields.len() + 1);

    // synthesized primary key: indexed verbatim, stored for retrieval
    fields.push(AnalyzedField {
        name: ID_FIELD.to_string(),
        tokens: vec![Token::new(doc.id.clone(), 0, 0, doc.id.len())],
        length: 1,
        stored: Some(doc.id.clone()),
        doc_value: None,
        index_positions: false,
    });

    for field in &doc.fields {
        fields.push(analyze_field(field, default_analyzer));
    }
    for field in virtual_fields {
        let mut analyzed = analyze_field(field, default_analyzer);
        // virtual fields are never persisted
        analyzed.stored = None;
        analyzed.doc_value = None;
        fields.push(analyzed);
    }

    AnalyzedDocument {
        id: doc.id.clone(),
        fields,
    }
}

fn analyze_field(field: &Field, default_analyzer: &Arc<dyn Analyzer>) -> AnalyzedField {
    let (tokens, length, index_positions) = if field.flags.indexed() {
        match &field.value {
            FieldValue::Text(text) => {
                let analyzer = field.analyzer.as_ref().unwrap_or(default_analyzer);
                let tokens = analyzer.analyze(text);
                let length = tokens.len() as u32;
                // positions are only encoded when term vectors are retained
                (tokens, length, field.flags.term_vectors())
            }
            FieldValue::Keyword(term) => {
                let tokens = if term.is_empty() {
                    Vec::new()
                } else {
                    vec![Token::new(term.as_bytes().to_vec(), 0, 0, term.len())]
                };
                let length = tokens.len() as u32;
                (tokens, length, false)
            }
            FieldValue::Numeric(value) => {
                let sortable = numeric::f64_to_sortable_u64(*value);
                (trie_tokens(sortable), 1, false)
            }
            FieldValue::DateTime(nanos) => {
                let sortable = numeric::i64_to_sortable_u64(*nanos);
                (trie_tokens(sortable), 1, false)
            }
            FieldValue::GeoPoint { lat, lon } => {
                let terms = numeric::geohash_prefix_terms(*lat, *lon);
                let tokens = terms
                    .into_iter()
                    .map(|term| Token::new(term, 0, 0, 0))
                    .collect();
                (tokens, 1, false)
            }
        }
    } else {
        (Vec::new(), 0, false)
    };

    AnalyzedField {
        name: field.name.clone(),
        tokens,
        length,
        stored: field.flags.stored().then(|| field.value.to_bytes()),
        doc_value: field.flags.doc_values().then(|| field.value.to_bytes()),
        index_positions,
    }
}

fn trie_tokens(sortable: u64) -> Vec<Token> {
    numeric::trie_terms(sortable)
        .into_iter()
        .map(|term| Token::new(term, 0, 0, 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::document::FieldFlags;

    fn default_analyzer() -> Arc<dyn Analyzer> {
        Arc::new(StandardAnalyzer)
    }

    #[test]
    fn test_id_field_synthesized() {
        let doc = Document::new("doc-1").add_text("body", "hello world");
        let analyzed = analyze_document(&doc, &default_analyzer(), &[]);

        let id_field = &analyzed.fields[0];
        assert_eq!(id_field.name, ID_FIELD);
        assert_eq!(id_field.tokens.len(), 1);
        assert_eq!(id_field.tokens[0].term, b"doc-1");
        assert_eq!(id_field.stored.as_deref(), Some(b"doc-1".as_slice()));
    }

    #[test]
    fn test_text_field_analyzed_with_positions() {
        let doc = Document::new("a").add_text("body", "Quick Brown");
        let analyzed = analyze_document(&doc, &default_analyzer(), &[]);

        let body = &analyzed.fields[1];
        assert!(body.index_positions);
        assert_eq!(body.length, 2);
        assert_eq!(body.tokens[0].term, b"quick");
        assert_eq!(body.tokens[1].term, b"brown");
        assert_eq!(body.stored.as_deref(), Some(b"Quick Brown".as_slice()));
    }

    #[test]
    fn test_numeric_field_trie_terms() {
        let doc = Document::new("a").add_numeric("rank", 7.0);
        let analyzed = analyze_document(&doc, &default_analyzer(), &[]);

        let rank = &analyzed.fields[1];
        assert_eq!(rank.length, 1);
        assert_eq!(
            rank.tokens.len(),
            (64 / numeric::PRECISION_STEP) as usize
        );
        assert!(rank.doc_value.is_some());
        assert_eq!(
            rank.doc_value.as_deref(),
            Some(numeric::f64_to_sortable_bytes(7.0).as_slice())
        );
    }

    #[test]
    fn test_geo_field_prefixes() {
        let doc = Document::new("a").add_geo_point("pin", 57.64911, 10.40744);
        let analyzed = analyze_document(&doc, &default_analyzer(), &[]);
        let pin = &analyzed.fields[1];
        assert_eq!(pin.tokens.len(), numeric::GEOHASH_MAX_PRECISION);
        assert_eq!(pin.tokens[0].term, b"u");
    }

    #[test]
    fn test_virtual_fields_not_persisted() {
        let virtual_field = Field::new(
            "tenant",
            FieldValue::Keyword("acme".to_string()),
            FieldFlags(FieldFlags::INDEXED | FieldFlags::STORED),
        );
        let doc = Document::new("a").add_text("body", "hi");
        let analyzed = analyze_document(&doc, &default_analyzer(), &[virtual_field]);

        let tenant = analyzed.fields.last().unwrap();
        assert_eq!(tenant.name, "tenant");
        assert_eq!(tenant.tokens.len(), 1);
        assert!(tenant.stored.is_none());
        assert!(tenant.doc_value.is_none());
    }

    #[test]
    fn test_unindexed_field_has_no_tokens() {
        let field = Field::new(
            "raw",
            FieldValue::Keyword("opaque".to_string()),
            FieldFlags(FieldFlags::STORED),
        );
        let doc = Document::new("a").add_field(field);
        let analyzed = analyze_document(&doc, &default_analyzer(), &[]);
        let raw = &analyzed.fields[1];
        assert!(raw.tokens.is_empty());
        assert_eq!(raw.stored.as_deref(), Some(b"opaque".as_slice()));
    }
}
