use std::fs;
use std::sync::Arc;

use arrow_array::{ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, UInt64Array};
use arrow_ipc::writer::FileWriter;
use lexsearch_core::error::Error;
use lexsearch_core::traits::Embedder;
use lexsearch_core::ChunkTable;
use lexsearch_embed::HashEmbedder;
use lexsearch_vector::schema::{build_vectors_schema, vector_item_field};
use lexsearch_vector::{read_chunk_ids, read_texts, read_vectors, FlatIpIndex, SemanticIndex, SemanticManifest};
use tempfile::TempDir;

/// Returns vectors that are not unit length.
struct UnnormalizedEmbedder;

impl Embedder for UnnormalizedEmbedder {
    fn id(&self) -> &str { "test:unnormalized" }
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 128 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 1.0, 0.0, 0.0]).collect())
    }
}

/// Puts `bad` into the second component of the second text's vector.
struct NonFiniteEmbedder { bad: f32 }

impl Embedder for NonFiniteEmbedder {
    fn id(&self) -> &str { "test:non-finite" }
    fn dim(&self) -> usize { 2 }
    fn max_len(&self) -> usize { 128 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().enumerate().map(|(i, _)| if i == 1 { vec![1.0, self.bad] } else { vec![1.0, 0.0] }).collect())
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn id(&self) -> &str { "test:failing" }
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 128 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model unavailable")
    }
}

fn table() -> ChunkTable {
    let mut t = ChunkTable::new();
    let texts = [
        "Section: Redundancy.\nAn employee may claim redundancy pay.",
        "Section: Settlement.\nA settlement agreement ends employment by consent.",
        "Section: Redundancy.\nRedundancy pay depends on length of service.",
        "Section: Holidays.\nWorkers are entitled to paid annual leave.",
    ];
    for (i, text) in texts.iter().enumerate() {
        t.push_text(format!("guide.json_chunk_{i}"), "guide.json", *text).unwrap();
    }
    t
}

fn embedder() -> Arc<dyn Embedder> { Arc::new(HashEmbedder::new(64)) }

#[test]
fn built_vectors_are_unit_norm_and_aligned_with_ids() {
    let t = table();
    let index = SemanticIndex::build(&t, embedder(), 3).unwrap();
    assert_eq!(index.len(), 4);
    assert_eq!(index.dim(), 64);
    assert_eq!(index.chunk_ids(), t.ids().map(str::to_string).collect::<Vec<_>>().as_slice());
    assert_eq!(index.fingerprint(), t.fingerprint());
    for i in 0..index.len() {
        let v = index.vector(i).unwrap();
        let norm = v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-6);
    }
    assert_eq!(index.text(2), t.get(2).map(|c| c.raw_text.as_str()));
}

#[test]
fn build_fails_on_non_unit_embeddings() {
    let err = SemanticIndex::build(&table(), Arc::new(UnnormalizedEmbedder), 2).err().expect("build must fail");
    match err.downcast_ref::<Error>() {
        Some(Error::InvalidEmbedding { index, .. }) => assert_eq!(*index, 0),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn query_clamps_to_corpus_size_and_orders_by_score() {
    let index = SemanticIndex::build(&table(), embedder(), 8).unwrap();
    let hits = index.query("redundancy pay", 10).unwrap();
    assert_eq!(hits.len(), 4);
    for w in hits.windows(2) { assert!(w[0].score >= w[1].score); }
    assert_eq!(index.query("redundancy pay", 2).unwrap().len(), 2);
    assert!(index.query("redundancy pay", 0).unwrap().is_empty());
}

#[test]
fn empty_table_builds_an_empty_index() {
    let index = SemanticIndex::build(&ChunkTable::new(), embedder(), 4).unwrap();
    assert!(index.is_empty());
    assert!(index.query("anything", 5).unwrap().is_empty());
}

#[test]
fn flat_index_breaks_ties_by_position() {
    let mut flat = FlatIpIndex::new(2);
    flat.add(&[0.0, 1.0]);
    flat.add(&[1.0, 0.0]);
    flat.add(&[1.0, 0.0]);
    let hits = flat.search(&[1.0, 0.0], 5);
    let positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
    assert_eq!(positions, vec![1, 2, 0]);
    assert!(flat.search(&[1.0, 0.0, 0.0], 2).is_empty(), "wrong query dimension");
}

#[test]
fn reloaded_index_answers_bit_identically() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("semantic");
    let index = SemanticIndex::build(&table(), embedder(), 2).unwrap();
    index.save(&dir).unwrap();

    let loaded = SemanticIndex::load(&dir, embedder()).unwrap();
    assert_eq!(loaded.fingerprint(), index.fingerprint());
    assert_eq!(loaded.built_at(), index.built_at());
    for q in ["redundancy pay", "settlement agreement", "annual leave"] {
        let a = index.query(q, 3).unwrap();
        let b = loaded.query(q, 3).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.chunk_id, y.chunk_id);
            assert_eq!(x.score.to_bits(), y.score.to_bits());
        }
    }
}

#[test]
fn artifacts_load_independently() {
    let tmp = TempDir::new().unwrap();
    let t = table();
    let index = SemanticIndex::build(&t, embedder(), 4).unwrap();
    index.save(tmp.path()).unwrap();

    let manifest = SemanticManifest::read(tmp.path()).unwrap();
    assert_eq!(manifest.count, 4);
    assert_eq!(manifest.dim, 64);
    assert_eq!(manifest.embedder_id, "hash:xxh64:d64");
    assert!(manifest.has_texts);

    let vectors = read_vectors(&tmp.path().join("vectors.arrow"), 64).unwrap();
    assert_eq!(vectors[1].as_slice(), index.vector(1).unwrap());
    assert_eq!(read_chunk_ids(&tmp.path().join("chunk_ids.arrow")).unwrap(), index.chunk_ids());
    let texts = read_texts(&tmp.path().join("texts.arrow")).unwrap();
    assert_eq!(texts[3], t.get(3).unwrap().raw_text);
}

#[test]
fn index_without_texts_round_trips() {
    let tmp = TempDir::new().unwrap();
    let index = SemanticIndex::build(&table(), embedder(), 4).unwrap().without_texts();
    index.save(tmp.path()).unwrap();
    assert!(!tmp.path().join("texts.arrow").exists());
    let loaded = SemanticIndex::load(tmp.path(), embedder()).unwrap();
    assert_eq!(loaded.text(0), None);
    assert_eq!(loaded.len(), 4);
}

#[test]
fn loading_with_another_embedder_is_rejected() {
    let tmp = TempDir::new().unwrap();
    SemanticIndex::build(&table(), embedder(), 4).unwrap().save(tmp.path()).unwrap();
    let err = SemanticIndex::load(tmp.path(), Arc::new(HashEmbedder::new(32))).err().expect("mismatch");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmbedderMismatch { .. })));
}

#[test]
fn build_fails_on_nan_or_infinite_components() {
    for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        let err = SemanticIndex::build(&table(), Arc::new(NonFiniteEmbedder { bad }), 4).err().expect("build must fail");
        match err.downcast_ref::<Error>() {
            Some(Error::InvalidEmbedding { index, .. }) => assert_eq!(*index, 1, "component {bad}"),
            other => panic!("unexpected error for {bad}: {other:?}"),
        }
    }
}

#[test]
fn build_surfaces_embedder_errors() {
    let err = SemanticIndex::build(&table(), Arc::new(FailingEmbedder), 2).err().expect("build must fail");
    assert!(err.to_string().contains("model unavailable"));
}

#[test]
fn load_rejects_non_finite_vectors_on_disk() {
    let tmp = TempDir::new().unwrap();
    SemanticIndex::build(&table(), embedder(), 4).unwrap().save(tmp.path()).unwrap();

    // Rewrite vectors.arrow with an infinite component in row 2.
    let dim = 64;
    let mut values = vec![0.0f32; 4 * dim];
    for row in 0..4 { values[row * dim] = 1.0; }
    values[2 * dim + 3] = f32::INFINITY;
    let vectors = FixedSizeListArray::try_new(vector_item_field(), dim as i32, Arc::new(Float32Array::from(values)), None).unwrap();
    let positions: ArrayRef = Arc::new(UInt64Array::from_iter_values(0..4u64));
    let schema = build_vectors_schema(dim);
    let batch = RecordBatch::try_new(schema.clone(), vec![positions, Arc::new(vectors)]).unwrap();
    let file = fs::File::create(tmp.path().join("vectors.arrow")).unwrap();
    let mut writer = FileWriter::try_new(file, &schema).unwrap();
    writer.write(&batch).unwrap();
    writer.finish().unwrap();

    let err = SemanticIndex::load(tmp.path(), embedder()).err().expect("load must fail");
    match err.downcast_ref::<Error>() {
        Some(Error::InvalidEmbedding { index, .. }) => assert_eq!(*index, 2),
        other => panic!("unexpected error: {other:?}"),
    }
}
