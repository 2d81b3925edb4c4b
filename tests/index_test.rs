//! Writer lifecycle, visibility and durability scenarios

use std::sync::Arc;
use std::time::{Duration, Instant};

use cuttle::directory::{Directory, Kind, MemDirectory};
use cuttle::index::MergePlanOptions;
use cuttle::{
    Batch, Config, CuttleError, Document, MatchQuery, SearchRequest, Writer,
};

fn hit_ids(iter: cuttle::TopNIterator) -> Vec<Vec<u8>> {
    iter.map(|m| m.id().expect("hit carries _id").to_vec())
        .collect()
}

#[test]
fn test_update_visibility() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();
    writer
        .update("a", Document::new("a").add_text("name", "cuttlefish"))
        .unwrap();

    let reader = writer.reader().unwrap();
    let hits = reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("name", "cuttlefish")))
        .unwrap();
    assert_eq!(hit_ids(hits), vec![b"a".to_vec()]);

    writer.close().unwrap();
}

#[test]
fn test_replace_semantics() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();
    writer
        .update("a", Document::new("a").add_text("name", "cuttlefish"))
        .unwrap();
    writer
        .update("a", Document::new("a").add_text("name", "search"))
        .unwrap();

    let reader = writer.reader().unwrap();
    let old = reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("name", "cuttlefish")))
        .unwrap();
    assert_eq!(old.len(), 0);

    let new = reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("name", "search")))
        .unwrap();
    assert_eq!(hit_ids(new), vec![b"a".to_vec()]);

    writer.close().unwrap();
}

#[test]
fn test_delete() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();
    writer
        .update("a", Document::new("a").add_text("name", "cuttlefish"))
        .unwrap();
    writer.delete("a").unwrap();

    let reader = writer.reader().unwrap();
    assert_eq!(reader.live_doc_count(), 0);

    writer.close().unwrap();
}

#[test]
fn test_idempotent_delete() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();
    writer
        .update("a", Document::new("a").add_text("name", "keep"))
        .unwrap();
    writer.delete("missing").unwrap();
    writer.delete("missing").unwrap();

    let reader = writer.reader().unwrap();
    assert_eq!(reader.live_doc_count(), 1);

    writer.close().unwrap();
}

#[test]
fn test_conservation_over_mixed_history() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();

    for i in 0..20 {
        let id = format!("doc-{}", i);
        writer
            .update(
                id.as_bytes().to_vec(),
                Document::new(id.as_bytes()).add_text("body", "some words here"),
            )
            .unwrap();
    }
    // re-index half, delete a quarter
    for i in 0..10 {
        let id = format!("doc-{}", i);
        writer
            .update(
                id.as_bytes().to_vec(),
                Document::new(id.as_bytes()).add_text("body", "revised words"),
            )
            .unwrap();
    }
    for i in 0..5 {
        writer.delete(format!("doc-{}", i).into_bytes()).unwrap();
    }

    let reader = writer.reader().unwrap();
    assert_eq!(reader.live_doc_count(), 15);

    writer.close().unwrap();
}

#[test]
fn test_batch_applies_as_one_introduction() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();

    let mut batch = Batch::new();
    batch.update("a", Document::new("a").add_text("body", "first"));
    batch.update("b", Document::new("b").add_text("body", "second"));
    batch.delete("c");
    // same-batch reindex supersedes the earlier op
    batch.update("a", Document::new("a").add_text("body", "final"));
    writer.batch(batch).unwrap();

    let reader = writer.reader().unwrap();
    assert_eq!(reader.live_doc_count(), 2);
    let hits = reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("body", "final")))
        .unwrap();
    assert_eq!(hit_ids(hits), vec![b"a".to_vec()]);
    let stale = reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("body", "first")))
        .unwrap();
    assert_eq!(stale.len(), 0);

    writer.close().unwrap();
}

#[test]
fn test_reader_isolation() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();
    writer
        .update("a", Document::new("a").add_text("name", "one"))
        .unwrap();

    let early_reader = writer.reader().unwrap();
    let early_epoch = early_reader.epoch();

    writer
        .update("b", Document::new("b").add_text("name", "two"))
        .unwrap();
    writer.delete("a").unwrap();

    // the early reader's view is frozen at its epoch
    assert_eq!(early_reader.epoch(), early_epoch);
    assert_eq!(early_reader.live_doc_count(), 1);
    let hits = early_reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("name", "one")))
        .unwrap();
    assert_eq!(hit_ids(hits), vec![b"a".to_vec()]);

    let late_reader = writer.reader().unwrap();
    assert!(late_reader.epoch() > early_epoch);
    assert_eq!(late_reader.live_doc_count(), 1);

    writer.close().unwrap();
}

#[test]
fn test_epochs_strictly_increase() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();
    let mut last = writer.reader().unwrap().epoch();
    for i in 0..5 {
        writer
            .update(
                format!("doc-{}", i).into_bytes(),
                Document::new(format!("doc-{}", i).into_bytes()).add_text("body", "tick"),
            )
            .unwrap();
        let epoch = writer.reader().unwrap().epoch();
        assert!(epoch > last, "epoch {} should exceed {}", epoch, last);
        last = epoch;
    }
    writer.close().unwrap();
}

#[test]
fn test_closed_writer_rejects_operations() {
    let writer = Writer::open(Config::in_memory_only()).unwrap();
    writer.close().unwrap();

    let result = writer.update("a", Document::new("a").add_text("body", "x"));
    assert!(matches!(result, Err(CuttleError::Closed)));
    assert!(matches!(writer.reader(), Err(CuttleError::Closed)));
}

#[test]
fn test_directory_lock_excludes_second_writer() {
    let config = Config::in_memory_only();
    let second = config.clone();

    let writer = Writer::open(config).unwrap();
    assert!(matches!(
        Writer::open(second),
        Err(CuttleError::IndexLocked)
    ));
    writer.close().unwrap();
}

#[test]
fn test_reopen_from_disk() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let writer = Writer::open(Config::default_config(tmp.path()).unwrap()).unwrap();
        writer
            .update("a", Document::new("a").add_text("name", "persisted"))
            .unwrap();
        writer
            .update("b", Document::new("b").add_text("name", "also persisted"))
            .unwrap();
        writer.close().unwrap();
    }

    let writer = Writer::open(Config::default_config(tmp.path()).unwrap()).unwrap();
    let reader = writer.reader().unwrap();
    assert_eq!(reader.live_doc_count(), 2);
    let hits = reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("name", "persisted")))
        .unwrap();
    assert_eq!(hits.len(), 2);
    writer.close().unwrap();
}

#[test]
fn test_reopen_preserves_deletes() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let writer = Writer::open(Config::default_config(tmp.path()).unwrap()).unwrap();
        writer
            .update("a", Document::new("a").add_text("name", "gone"))
            .unwrap();
        writer
            .update("b", Document::new("b").add_text("name", "kept"))
            .unwrap();
        writer.delete("a").unwrap();
        writer.close().unwrap();
    }

    let writer = Writer::open(Config::default_config(tmp.path()).unwrap()).unwrap();
    let reader = writer.reader().unwrap();
    assert_eq!(reader.live_doc_count(), 1);
    let hits = reader
        .search(SearchRequest::top_n(10, 0, MatchQuery::new("name", "gone")))
        .unwrap();
    assert_eq!(hits.len(), 0);
    writer.close().unwrap();
}

#[test]
fn test_deletion_policy_reclaims_files() {
    let directory = Arc::new(MemDirectory::new());
    let mut config = Config::in_memory_only().with_merge_plan_options(MergePlanOptions {
        // everything is below the floor, so merging is always planned
        floor_segment_size: u64::MAX / 2,
        max_segment_size: u64::MAX,
        ..Default::default()
    });
    config.directory = directory.clone();

    let writer = Writer::open(config).unwrap();
    for i in 0..12 {
        let id = format!("doc-{}", i);
        writer
            .update(
                id.as_bytes().to_vec(),
                Document::new(id.as_bytes()).add_text("body", "fill the index"),
            )
            .unwrap();
    }

    // wait for the merger + deletion policy to settle on a compact file set
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let segment_files = directory.list(Kind::Segment).unwrap().len();
        let reader = writer.reader().unwrap();
        if segment_files <= 2 && reader.snapshot().segments().len() == 1 {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "cleanup never settled: {} files, {} segments",
            segment_files,
            reader.snapshot().segments().len()
        );
        std::thread::sleep(Duration::from_millis(50));
    }

    let reader = writer.reader().unwrap();
    assert_eq!(reader.live_doc_count(), 12);
    writer.close().unwrap();
}
