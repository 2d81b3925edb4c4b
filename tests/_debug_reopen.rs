use cuttle::{Config, Document, MatchQuery, SearchRequest, Writer};

#[test]
fn debug_reopen() {
    eprintln!("start");
    let tmp = tempfile::tempdir().unwrap();
    {
        eprintln!("opening writer 1");
        let writer = Writer::open(Config::default_config(tmp.path()).unwrap()).unwrap();
        eprintln!("writer1 opened, updating a");
        writer
            .update("a", Document::new("a").add_text("name", "persisted"))
            .unwrap();
        eprintln!("updated a, updating b");
        writer
            .update("b", Document::new("b").add_text("name", "also persisted"))
            .unwrap();
        eprintln!("updated b, closing writer1");
        writer.close().unwrap();
        eprintln!("writer1 closed");
    }

    eprintln!("opening writer 2");
    let writer = Writer::open(Config::default_config(tmp.path()).unwrap()).unwrap();
    eprintln!("writer2 opened, getting reader");
    let reader = writer.reader().unwrap();
    eprintln!("reader obtained, live_doc_count={}", reader.live_doc_count());
    let hits = reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("name", "persisted")))
        .unwrap();
    eprintln!("hits={}", hits.len());
    writer.close().unwrap();
    eprintln!("writer2 closed, done");
}
