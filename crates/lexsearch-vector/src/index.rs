use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use lexsearch_core::error::Error;
use lexsearch_core::traits::{Embedder, SemanticSearcher};
use lexsearch_core::types::{ChunkId, SemanticHit};
use lexsearch_core::ChunkTable;

use crate::flat::FlatIpIndex;
use crate::validate::{validate_embeddings, validate_vector};

/// Dense index over the chunk table: one unit-norm embedding per chunk,
/// addressed by corpus id.
pub struct SemanticIndex {
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) flat: FlatIpIndex,
    pub(crate) chunk_ids: Vec<ChunkId>,
    pub(crate) texts: Option<Vec<String>>,
    pub(crate) fingerprint: String,
    pub(crate) built_at: DateTime<Utc>,
}

impl SemanticIndex {
    /// Embed every chunk's flattened text in batches of `batch_size`.
    ///
    /// Fails on the first invalid vector; nothing is kept in that case.
    pub fn build(table: &ChunkTable, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        let dim = embedder.dim();
        let n = table.len();
        let batch_size = batch_size.max(1);
        info!(chunks = n, dim, embedder = embedder.id(), "building semantic index");

        let pb = ProgressBar::new(n as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
                .progress_chars("#>-"),
        );

        let mut flat = FlatIpIndex::with_capacity(dim, n);
        let chunks = table.chunks();
        for (b, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.raw_text.clone()).collect();
            let offset = b * batch_size;
            let vectors = match embedder.embed_batch(&texts) {
                Ok(vectors) => vectors,
                Err(e) => {
                    pb.abandon_with_message("embedding failed");
                    return Err(e);
                }
            };
            if vectors.len() != texts.len() {
                pb.abandon_with_message("embedding failed");
                return Err(Error::Operation(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                ))
                .into());
            }
            if let Err(e) = validate_embeddings(&vectors, dim, offset) {
                pb.abandon_with_message("invalid embedding");
                return Err(e.into());
            }
            for v in &vectors { flat.add(v); }
            pb.inc(batch.len() as u64);
            debug!(batch = b, rows = batch.len(), "embedded batch");
        }
        pb.finish_with_message("done");

        Ok(Self {
            embedder,
            flat,
            chunk_ids: table.ids().map(str::to_string).collect(),
            texts: Some(table.raw_texts().map(str::to_string).collect()),
            fingerprint: table.fingerprint(),
            built_at: Utc::now(),
        })
    }

    pub fn len(&self) -> usize { self.chunk_ids.len() }

    pub fn is_empty(&self) -> bool { self.chunk_ids.is_empty() }

    pub fn dim(&self) -> usize { self.flat.dim() }

    pub fn embedder_id(&self) -> &str { self.embedder.id() }

    /// Fingerprint of the chunk table the index was built from.
    pub fn fingerprint(&self) -> &str { &self.fingerprint }

    pub fn built_at(&self) -> DateTime<Utc> { self.built_at }

    pub fn chunk_ids(&self) -> &[ChunkId] { &self.chunk_ids }

    pub fn text(&self, position: usize) -> Option<&str> {
        self.texts.as_ref().and_then(|t| t.get(position)).map(String::as_str)
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> { self.flat.row(position) }

    /// Drop the stored chunk texts; a saved index then has no texts artifact.
    pub fn without_texts(mut self) -> Self {
        self.texts = None;
        self
    }

    /// Nearest chunks by inner product, at most `min(top_k, len)` of them.
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<SemanticHit>> {
        if top_k == 0 || self.is_empty() { return Ok(Vec::new()); }
        let mut vectors = self.embedder.embed_batch(&[text.to_string()])?;
        if vectors.len() != 1 {
            return Err(Error::Operation(format!("embedder returned {} vectors for one query", vectors.len())).into());
        }
        let q = vectors.remove(0);
        validate_vector(0, &q, self.dim())?;
        Ok(self
            .flat
            .search(&q, top_k)
            .into_iter()
            .map(|(position, score)| SemanticHit { score, chunk_id: self.chunk_ids[position].clone() })
            .collect())
    }
}

impl SemanticSearcher for SemanticIndex {
    fn query(&self, text: &str, top_k: usize) -> Result<Vec<SemanticHit>> { SemanticIndex::query(self, text, top_k) }
}
