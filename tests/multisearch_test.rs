//! Fan-out search across multiple readers

use cuttle::{
    multi_search, Config, Document, MatchAllQuery, MatchQuery, SearchRequest, SortOrder, Writer,
};

fn writer_with_docs(prefix: &str, ranks: &[f64]) -> Writer {
    let writer = Writer::open(Config::in_memory_only()).unwrap();
    for (i, rank) in ranks.iter().enumerate() {
        let id = format!("{}-{}", prefix, i);
        writer
            .update(
                id.as_bytes().to_vec(),
                Document::new(id.as_bytes())
                    .add_text("body", "shared corpus text")
                    .add_numeric("rank", *rank),
            )
            .unwrap();
    }
    writer
}

#[test]
fn test_multi_search_merges_readers() {
    let writer_a = writer_with_docs("a", &[1.0, 5.0]);
    let writer_b = writer_with_docs("b", &[3.0, 9.0]);

    let readers = vec![
        writer_a.reader().unwrap(),
        writer_b.reader().unwrap(),
    ];

    let request =
        SearchRequest::top_n(3, 0, MatchAllQuery::new()).with_sort(SortOrder::by("-rank"));
    let ids: Vec<Vec<u8>> = multi_search(request, &readers)
        .unwrap()
        .map(|m| m.id().unwrap().to_vec())
        .collect();

    assert_eq!(
        ids,
        vec![b"b-1".to_vec(), b"a-1".to_vec(), b"b-0".to_vec()]
    );

    writer_a.close().unwrap();
    writer_b.close().unwrap();
}

#[test]
fn test_multi_search_counts_all_matches() {
    let writer_a = writer_with_docs("a", &[1.0, 2.0, 3.0]);
    let writer_b = writer_with_docs("b", &[4.0]);

    let readers = vec![
        writer_a.reader().unwrap(),
        writer_b.reader().unwrap(),
    ];

    let request = SearchRequest::top_n(10, 0, MatchQuery::new("body", "corpus"));
    let hits = multi_search(request, &readers).unwrap();
    assert_eq!(hits.len(), 4);

    writer_a.close().unwrap();
    writer_b.close().unwrap();
}

#[test]
fn test_multi_search_no_readers() {
    let request = SearchRequest::top_n(10, 0, MatchAllQuery::new());
    let hits = multi_search(request, &[]).unwrap();
    assert!(hits.is_empty());
}
