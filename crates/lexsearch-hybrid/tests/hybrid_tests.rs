use std::sync::Arc;
use std::thread;

use lexsearch_core::config::{ConsistencyPolicy, Settings};
use lexsearch_core::error::Error;
use lexsearch_core::traits::{Embedder, SemanticSearcher};
use lexsearch_core::types::SemanticHit;
use lexsearch_core::ChunkTable;
use lexsearch_embed::HashEmbedder;
use lexsearch_hybrid::{HybridRetriever, IndexBundle};
use lexsearch_text::{Bm25Index, Bm25Params};
use tempfile::TempDir;

const CHUNKS: [&str; 3] = [
    "Section: Redundancy.\nAn employee may claim redundancy pay.",
    "Section: Settlement.\nA settlement agreement ends employment by consent.",
    "Section: Redundancy.\nRedundancy pay depends on length of service.",
];

fn embedder() -> Arc<dyn Embedder> { Arc::new(HashEmbedder::new(64)) }

fn table() -> ChunkTable {
    let mut t = ChunkTable::new();
    for (i, text) in CHUNKS.iter().enumerate() {
        t.push_text(format!("guide.json_chunk_{i}"), "guide.json", *text).unwrap();
    }
    t
}

/// Replays fixed hits regardless of the query.
struct FixedSearcher(Vec<SemanticHit>);

impl SemanticSearcher for FixedSearcher {
    fn query(&self, _text: &str, top_k: usize) -> anyhow::Result<Vec<SemanticHit>> {
        Ok(self.0.iter().take(top_k).cloned().collect())
    }
}

fn hit(id: &str, score: f32) -> SemanticHit { SemanticHit { score, chunk_id: id.to_string() } }

#[test]
fn redundancy_query_prefers_matching_chunks() {
    let bundle = IndexBundle::from_table(table(), embedder(), Bm25Params::default(), 2).unwrap();
    let retriever = bundle.into_retriever(ConsistencyPolicy::Fail);

    let detailed = retriever.retrieve_detailed("redundancy pay", 3, 2).unwrap();
    let mut positions: Vec<usize> = detailed.iter().map(|r| r.position).collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![0, 2]);
    assert!(detailed[0].bm25_score >= detailed[1].bm25_score);

    let texts = retriever.retrieve("redundancy pay", 3, 2).unwrap();
    assert_eq!(texts.len(), 2);
    for t in &texts {
        assert!(!t.is_empty());
        assert!(!t.starts_with("Section:"), "heading not stripped: {t}");
    }
    assert!(texts.contains(&"An employee may claim redundancy pay.".to_string()));
}

#[test]
fn results_never_exceed_final_k() {
    let retriever = IndexBundle::from_table(table(), embedder(), Bm25Params::default(), 8)
        .unwrap()
        .into_retriever(ConsistencyPolicy::Fail);
    assert_eq!(retriever.retrieve("redundancy pay", 3, 1).unwrap().len(), 1);
    assert!(retriever.retrieve("redundancy pay", 3, 0).unwrap().is_empty());
    assert!(retriever.retrieve("redundancy pay", 0, 3).unwrap().is_empty());
}

#[test]
fn empty_corpus_and_empty_query_return_nothing() {
    let retriever = IndexBundle::from_table(ChunkTable::new(), embedder(), Bm25Params::default(), 4)
        .unwrap()
        .into_retriever(ConsistencyPolicy::Fail);
    assert!(retriever.retrieve("redundancy pay", 5, 3).unwrap().is_empty());

    let retriever = IndexBundle::from_table(table(), embedder(), Bm25Params::default(), 4)
        .unwrap()
        .into_retriever(ConsistencyPolicy::Fail);
    assert!(retriever.retrieve("?! ...", 5, 3).unwrap().is_empty());
}

#[test]
fn unknown_semantic_id_fails_by_default() {
    let t = Arc::new(table());
    let lexical = Bm25Index::from_table(&t, Bm25Params::default());
    let semantic = FixedSearcher(vec![hit("guide.json_chunk_0", 0.9), hit("ghost.json_chunk_7", 0.8)]);
    let retriever = HybridRetriever::new(t, lexical, semantic, ConsistencyPolicy::Fail);
    let err = retriever.retrieve("redundancy pay", 3, 2).err().expect("inconsistency");
    match err.downcast_ref::<Error>() {
        Some(Error::IndexInconsistency { chunk_id }) => assert_eq!(chunk_id, "ghost.json_chunk_7"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unknown_semantic_id_is_counted_when_skipping() {
    let t = Arc::new(table());
    let lexical = Bm25Index::from_table(&t, Bm25Params::default());
    let semantic = FixedSearcher(vec![
        hit("ghost.json_chunk_7", 0.95),
        hit("guide.json_chunk_2", 0.9),
        hit("guide.json_chunk_1", 0.5),
    ]);
    let retriever = HybridRetriever::new(t, lexical, semantic, ConsistencyPolicy::Skip);
    let out = retriever.retrieve_detailed("redundancy pay", 3, 3).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].chunk_id, "guide.json_chunk_2");
    assert_eq!(out[0].semantic_score, 0.9);
    assert_eq!(retriever.inconsistencies(), 1);
    retriever.retrieve("redundancy pay", 3, 3).unwrap();
    assert_eq!(retriever.inconsistencies(), 2);
}

#[test]
fn chunk_of_only_headings_is_dropped() {
    let mut t = ChunkTable::new();
    t.push_text("a.json_chunk_0", "a.json", "Section: Redundancy pay.").unwrap();
    t.push_text("a.json_chunk_1", "a.json", "Section: Redundancy.\nRedundancy pay is owed.").unwrap();
    let t = Arc::new(t);
    let lexical = Bm25Index::from_table(&t, Bm25Params::default());
    let semantic = FixedSearcher(vec![hit("a.json_chunk_0", 0.9), hit("a.json_chunk_1", 0.8)]);
    let retriever = HybridRetriever::new(t, lexical, semantic, ConsistencyPolicy::Fail);
    assert_eq!(retriever.retrieve("redundancy pay", 2, 2).unwrap(), vec!["Redundancy pay is owed.".to_string()]);
}

#[test]
fn heading_only_chunk_does_not_use_up_the_last_slot() {
    let mut t = ChunkTable::new();
    t.push_text("a.json_chunk_0", "a.json", "Section: Redundancy pay.").unwrap();
    t.push_text("a.json_chunk_1", "a.json", "Section: Redundancy.\nRedundancy pay is owed to employees after long service.").unwrap();
    let t = Arc::new(t);
    let lexical = Bm25Index::from_table(&t, Bm25Params::default());
    // The heading-only chunk outranks the real one lexically.
    assert!(lexical.score_document("redundancy pay", 0) > lexical.score_document("redundancy pay", 1));
    let semantic = FixedSearcher(vec![hit("a.json_chunk_0", 0.9), hit("a.json_chunk_1", 0.8)]);
    let retriever = HybridRetriever::new(t, lexical, semantic, ConsistencyPolicy::Fail);

    let out = retriever.retrieve_detailed("redundancy pay", 2, 1).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].chunk_id, "a.json_chunk_1");
    assert_eq!(out[0].text, "Redundancy pay is owed to employees after long service.");
}

fn write_corpus(dir: &std::path::Path) {
    let records = serde_json::json!([
        {"Section": "Redundancy", "Subsection": null, "Content": [
            {"text": "An employee may claim redundancy pay.", "list": [
                {"text": "after two years of service", "list": []}
            ]}
        ], "topic": "redundancy"},
        {"Section": "Settlement", "Subsection": "Agreements", "Content": [
            {"text": "A settlement agreement ends employment by consent.", "list": []}
        ], "topic": "settlement"}
    ]);
    std::fs::write(dir.join("guide.json"), records.to_string()).unwrap();
}

#[test]
fn saved_bundle_reloads_and_answers_the_same() {
    let corpus = TempDir::new().unwrap();
    write_corpus(corpus.path());
    let out = TempDir::new().unwrap();

    let (bundle, report) = IndexBundle::build(corpus.path(), embedder(), &Settings::default()).unwrap();
    assert_eq!(report.chunks, 2);
    bundle.save(out.path()).unwrap();
    let stats = bundle.stats();
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.source_files, 1);
    assert_eq!(stats.dim, 64);

    let reloaded = IndexBundle::load(out.path(), embedder()).unwrap();
    assert_eq!(reloaded.stats(), stats);

    let before = bundle.into_retriever(ConsistencyPolicy::Fail).retrieve_detailed("redundancy pay", 2, 2).unwrap();
    let after = reloaded.into_retriever(ConsistencyPolicy::Fail).retrieve_detailed("redundancy pay", 2, 2).unwrap();
    assert_eq!(before, after);
    assert_eq!(after[0].chunk_id, "guide.json_chunk_0");
    assert!(after[0].text.starts_with("An employee"));
}

#[test]
fn bundle_with_stale_lexical_index_is_rejected() {
    let corpus = TempDir::new().unwrap();
    write_corpus(corpus.path());
    let out = TempDir::new().unwrap();
    let (bundle, _) = IndexBundle::build(corpus.path(), embedder(), &Settings::default()).unwrap();
    bundle.save(out.path()).unwrap();

    // Overwrite the lexical index with one built from a different corpus.
    let other = IndexBundle::from_table(table(), embedder(), Bm25Params::default(), 4).unwrap();
    lexsearch_text::save_index(&out.path().join("lexical.json"), &other.lexical, &other.table.fingerprint()).unwrap();

    let err = IndexBundle::load(out.path(), embedder()).err().expect("stale index");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::FingerprintMismatch { .. })));
}

#[test]
fn concurrent_queries_share_one_retriever() {
    let retriever = Arc::new(
        IndexBundle::from_table(table(), embedder(), Bm25Params::default(), 4)
            .unwrap()
            .into_retriever(ConsistencyPolicy::Fail),
    );
    let expected = retriever.retrieve("redundancy pay", 3, 2).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let r = Arc::clone(&retriever);
            thread::spawn(move || r.retrieve("redundancy pay", 3, 2).unwrap())
        })
        .collect();
    for h in handles { assert_eq!(h.join().unwrap(), expected); }
}
