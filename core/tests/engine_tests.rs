use sift_core::{Engine, EngineConfig, Error, NewDocument, QueryError};
use tempfile::{tempdir, TempDir};

fn open() -> (TempDir, Engine) {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
    (dir, engine)
}

/// cat -> [1,2,3], dog -> [2,3,4], bird -> [5], with distinct hit counts so
/// that postings order equals ascending id.
fn animals() -> (TempDir, Engine) {
    let (dir, engine) = open();
    let docs = [
        ("one", "cat cat cat"),
        ("two", "cat cat dog dog dog"),
        ("three", "cat dog dog"),
        ("four", "dog"),
        ("five", "bird"),
    ];
    let batch: Vec<NewDocument> =
        docs.iter().map(|(src, body)| NewDocument::new("", *src, *body)).collect();
    assert_eq!(engine.ingest_batch(&batch).unwrap(), vec![1, 2, 3, 4, 5]);
    (dir, engine)
}

#[test]
fn search_term_orders_by_hits() {
    let (_dir, engine) = animals();
    assert_eq!(engine.search_term("cat").unwrap(), vec![1, 2, 3]);
    assert_eq!(engine.search_term("dog").unwrap(), vec![2, 3, 4]);
    assert_eq!(engine.search_term("CAT").unwrap(), vec![1, 2, 3]);
}

#[test]
fn ties_break_by_document_id() {
    let (_dir, engine) = open();
    for src in ["x", "y", "z"] {
        engine.ingest("", src, "same words").unwrap();
    }
    engine.ingest("", "w", "same same").unwrap();
    assert_eq!(engine.search_term("same").unwrap(), vec![4, 1, 2, 3]);
}

#[test]
fn unknown_term_is_empty() {
    let (_dir, engine) = animals();
    assert!(engine.search_term("unicorn").unwrap().is_empty());
    assert!(engine.search("unicorn").unwrap().is_empty());
}

#[test]
fn boolean_algebra() {
    let (_dir, engine) = animals();
    assert_eq!(engine.search("cat and dog").unwrap(), vec![2, 3]);
    assert_eq!(engine.search("cat or dog").unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(engine.search("cat not dog").unwrap(), vec![1]);
    assert_eq!(engine.search("(cat and dog) or bird").unwrap(), vec![2, 3, 5]);
}

#[test]
fn malformed_query_is_distinct_from_no_matches() {
    let (_dir, engine) = animals();
    let err = engine.search("cat and").unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(QueryError::ExpectedOperand { .. })));
    assert!(matches!(
        engine.search("cat and dog or bird"),
        Err(Error::InvalidQuery(QueryError::Chained { .. }))
    ));
    assert_eq!(engine.search("cat and bird").unwrap(), Vec::<u32>::new());
}

#[test]
fn blacklist_hides_bare_words_only() {
    let (_dir, engine) = open();
    engine.ingest("", "a", "the cat").unwrap();
    engine.ingest("", "b", "the the dog").unwrap();
    assert!(engine.blacklist_add("the").unwrap());
    assert!(!engine.blacklist_add("the").unwrap());
    assert!(engine.blacklist_contains("the").unwrap());

    assert!(engine.search_term("the").unwrap().is_empty());
    assert!(engine.search("the").unwrap().is_empty());
    assert_eq!(engine.search("\"the\"").unwrap(), vec![2, 1]);
    assert_eq!(engine.search_exact("the").unwrap(), vec![2, 1]);
    assert_eq!(engine.search("\"the\" not dog").unwrap(), vec![1]);
    assert_eq!(engine.blacklist_list().unwrap(), vec!["the".to_string()]);
}

#[test]
fn quoted_search_term_overrides_blacklist() {
    let (_dir, engine) = open();
    engine.ingest("", "a", "the cat").unwrap();
    engine.ingest("", "b", "the the dog").unwrap();
    engine.blacklist_add(" The ").unwrap();
    assert!(engine.blacklist_contains("the ").unwrap());
    assert!(engine.search_term("the").unwrap().is_empty());
    assert_eq!(engine.search_term("\"the\"").unwrap(), vec![2, 1]);
    assert_eq!(engine.search_term("\"THE\"").unwrap(), vec![2, 1]);
    assert!(engine.search_term("\"").unwrap().is_empty());
}

#[test]
fn suggestions_within_distance() {
    let (_dir, engine) = open();
    engine.ingest("", "a", "the quick brown fox").unwrap();
    let near = engine.suggest("teh").unwrap();
    assert!(near.contains(&"the".to_string()));
    assert!(!near.contains(&"quick".to_string()));
    assert!(!near.contains(&"brown".to_string()));
}

#[test]
fn moderation_round_trip() {
    let (_dir, engine) = animals();
    let ids = |v: Vec<(u32, sift_core::DocumentRecord)>| v.into_iter().map(|(id, _)| id).collect::<Vec<_>>();

    engine.deactivate(5).unwrap();
    assert_eq!(ids(engine.list_active().unwrap()), vec![1, 2, 3, 4]);
    assert_eq!(ids(engine.list_inactive().unwrap()), vec![5]);
    assert!(!engine.get_document(5).unwrap().active);

    engine.activate(5).unwrap();
    assert_eq!(ids(engine.list_active().unwrap()), vec![1, 2, 3, 4, 5]);
    assert!(engine.list_inactive().unwrap().is_empty());

    assert!(matches!(engine.deactivate(99), Err(Error::NotFound { .. })));
}

#[test]
fn search_active_filters_deactivated() {
    let (_dir, engine) = animals();
    engine.deactivate(2).unwrap();
    assert_eq!(engine.search("cat").unwrap(), vec![1, 2, 3]);
    assert_eq!(engine.search_active("cat").unwrap(), vec![1, 3]);
}

#[test]
fn reingesting_a_source_is_rejected_atomically() {
    let (_dir, engine) = open();
    engine.ingest("First", "page.html", "hello world").unwrap();
    let before = engine.stats().unwrap();

    let batch = [
        NewDocument::new("Other", "other.html", "fresh words"),
        NewDocument::new("Again", "page.html", "hello again"),
    ];
    assert!(matches!(engine.ingest_batch(&batch), Err(Error::DuplicateSource(ref s)) if s == "page.html"));

    // nothing from the failed batch is visible
    assert_eq!(engine.stats().unwrap(), before);
    assert!(engine.search_term("fresh").unwrap().is_empty());
    assert!(!engine.contains_source("other.html").unwrap());
    assert_eq!(engine.search_term("hello").unwrap(), vec![1]);

    // the rolled back batch consumed no ids
    assert_eq!(engine.ingest("Other", "other.html", "fresh words").unwrap(), 2);
}

#[test]
fn duplicate_source_inside_one_batch_is_rejected() {
    let (_dir, engine) = open();
    let batch = [NewDocument::new("a", "same", "x1"), NewDocument::new("b", "same", "x2")];
    assert!(matches!(engine.ingest_batch(&batch), Err(Error::DuplicateSource(_))));
    assert_eq!(engine.stats().unwrap().documents, 0);
}

#[test]
fn document_metadata_and_content() {
    let (dir, engine) = open();
    let body = "x".repeat(1500);
    let id = engine.ingest("Long", "long.txt", &body).unwrap();
    let doc = engine.get_document(id).unwrap();
    assert_eq!(doc.title, "Long");
    assert_eq!(doc.source_reference, "long.txt");
    assert_eq!(doc.preview.chars().count(), 1000);
    assert!(doc.active);
    assert!(dir.path().join("docs/0000/0001.gz").exists());
    assert_eq!(engine.get_content(id).unwrap(), Some(body));
    assert!(matches!(engine.get_document(42), Err(Error::NotFound { .. })));
}

#[test]
fn content_storage_can_be_disabled() {
    let dir = tempdir().unwrap();
    let cfg = EngineConfig { store_content: false, ..EngineConfig::default() };
    let engine = Engine::open(dir.path(), cfg).unwrap();
    let id = engine.ingest("t", "s", "searchable text").unwrap();
    assert_eq!(engine.get_content(id).unwrap(), None);
    assert_eq!(engine.search_term("searchable").unwrap(), vec![id]);
    assert!(!dir.path().join("docs").exists());
}

#[test]
fn failed_blob_write_keeps_document_without_content() {
    let (dir, engine) = open();
    // a plain file where the blob directory belongs makes every blob write fail
    std::fs::write(dir.path().join("docs"), b"").unwrap();

    let ids = engine
        .ingest_batch(&[
            NewDocument::new("first", "a", "hello world"),
            NewDocument::new("second", "b", "hello again"),
        ])
        .unwrap();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(engine.search_term("hello").unwrap(), vec![1, 2]);
    for id in ids {
        assert_eq!(engine.get_document(id).unwrap().content_path, None);
        assert_eq!(engine.get_content(id).unwrap(), None);
    }
    assert!(matches!(engine.ingest("", "a", "hello"), Err(Error::DuplicateSource(_))));

    // once the obstruction is gone, later documents get their content again
    std::fs::remove_file(dir.path().join("docs")).unwrap();
    let id = engine.ingest("", "c", "hello there").unwrap();
    assert_eq!(engine.get_content(id).unwrap().as_deref(), Some("hello there"));
}

#[test]
fn stats_count_terms_documents_and_postings() {
    let (_dir, engine) = animals();
    engine.deactivate(1).unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.terms, 3);
    assert_eq!(stats.documents, 5);
    assert_eq!(stats.active_documents, 4);
    // cat x3, dog x3, bird x1
    assert_eq!(stats.postings, 7);
}

#[test]
fn highlight_terms_skip_blacklisted_bare_words() {
    let (_dir, engine) = animals();
    engine.blacklist_add("dog").unwrap();
    let q = sift_core::Query::parse("(cat and dog) or \"dog\"").unwrap();
    assert_eq!(engine.highlight_terms(&q).unwrap(), vec!["cat".to_string(), "dog".to_string()]);
}

#[test]
fn index_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        engine.ingest("t", "s1", "persistent data").unwrap();
        engine.blacklist_add("data").unwrap();
        engine.deactivate(1).unwrap();
        engine.flush().unwrap();
    }
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(engine.search_term("persistent").unwrap(), vec![1]);
    assert!(engine.blacklist_contains("data").unwrap());
    assert!(!engine.get_document(1).unwrap().active);
    assert_eq!(engine.ingest("t", "s2", "more").unwrap(), 2);
}
