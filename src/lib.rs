//! cuttle: an embedded text search engine
//!
//! An on-disk, append-only inverted index with concurrent write ingestion,
//! asynchronous segment persistence, background merging, and a pipelined
//! top-N query collector. Documents are typed fields; matches score under
//! BM25 with pagination, aggregation and highlighting hooks.
//!
//! ```no_run
//! use cuttle::{Config, Document, MatchQuery, SearchRequest, Writer};
//!
//! # fn main() -> cuttle::Result<()> {
//! let writer = Writer::open(Config::default_config("/tmp/index")?)?;
//! writer.update("a", Document::new("a").add_text("name", "cuttle"))?;
//!
//! let reader = writer.reader()?;
//! let hits = reader.search(SearchRequest::top_n(10, 0, MatchQuery::new("name", "cuttle")))?;
//! for hit in hits {
//!     println!("{:?} scored {}", hit.id(), hit.score);
//! }
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod directory;
pub mod document;
pub mod error;
pub mod index;
pub mod multisearch;
pub mod numeric;
pub mod query;
pub mod reader;
pub mod search;
pub mod segment;

pub use config::{Config, Event};
pub use document::{Document, Field, FieldFlags, FieldValue};
pub use error::{CuttleError, Result};
pub use index::{Batch, KeepNLatestDeletionPolicy, Writer};
pub use multisearch::multi_search;
pub use query::{
    BooleanQuery, ConjunctionQuery, DateRangeQuery, DisjunctionQuery, MatchAllQuery,
    MatchPhraseQuery, MatchQuery, NumericRangeQuery, PhraseQuery, PrefixQuery, Query, TermQuery,
};
pub use reader::{CollectorSpec, Reader, SearchRequest};
pub use search::{
    Aggregations, CancellationToken, DocumentMatch, SortBy, SortField, SortOrder, TopNIterator,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
