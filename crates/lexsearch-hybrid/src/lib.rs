//! lexsearch-hybrid
//!
//! Two-stage retrieval: semantic recall proposes candidates, BM25 reranks
//! them. Candidate corpus ids are mapped to lexical positions through the
//! shared [`ChunkTable`].

pub mod bundle;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use lexsearch_core::config::ConsistencyPolicy;
use lexsearch_core::error::Error;
use lexsearch_core::flatten::strip_leading_sections;
use lexsearch_core::normalize::tokenize;
use lexsearch_core::traits::{LexicalRanker, SemanticSearcher};
use lexsearch_core::types::ChunkId;
use lexsearch_core::ChunkTable;

pub use bundle::{BundleStats, IndexBundle};

/// One reranked result with both scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: ChunkId,
    pub position: usize,
    pub bm25_score: f64,
    pub semantic_score: f32,
    /// Chunk text with leading `Section:` lines removed.
    pub text: String,
}

pub struct HybridRetriever<L, S> where L: LexicalRanker, S: SemanticSearcher {
    table: Arc<ChunkTable>,
    lexical: L,
    semantic: S,
    policy: ConsistencyPolicy,
    inconsistencies: AtomicUsize,
}

impl<L, S> HybridRetriever<L, S> where L: LexicalRanker, S: SemanticSearcher {
    pub fn new(table: Arc<ChunkTable>, lexical: L, semantic: S, policy: ConsistencyPolicy) -> Self {
        Self { table, lexical, semantic, policy, inconsistencies: AtomicUsize::new(0) }
    }

    pub fn table(&self) -> &ChunkTable { &self.table }

    pub fn lexical(&self) -> &L { &self.lexical }

    pub fn semantic(&self) -> &S { &self.semantic }

    pub fn policy(&self) -> ConsistencyPolicy { self.policy }

    /// Semantic hits skipped so far because the chunk table did not know them.
    pub fn inconsistencies(&self) -> usize { self.inconsistencies.load(Ordering::Relaxed) }

    /// Up to `top_k_final` cleaned chunk texts, best first.
    pub fn retrieve(&self, query: &str, top_k_semantic: usize, top_k_final: usize) -> Result<Vec<String>> {
        Ok(self.retrieve_detailed(query, top_k_semantic, top_k_final)?.into_iter().map(|r| r.text).collect())
    }

    pub fn retrieve_detailed(&self, query: &str, top_k_semantic: usize, top_k_final: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k_semantic == 0 || top_k_final == 0 || self.table.is_empty() { return Ok(Vec::new()); }
        if tokenize(query).is_empty() {
            debug!("query has no terms after normalization");
            return Ok(Vec::new());
        }

        let hits = self.semantic.query(query, top_k_semantic)?;
        let mut positions = Vec::with_capacity(hits.len());
        let mut semantic_scores: HashMap<usize, f32> = HashMap::with_capacity(hits.len());
        for hit in &hits {
            match self.table.position_of(&hit.chunk_id) {
                Some(p) => {
                    positions.push(p);
                    semantic_scores.entry(p).or_insert(hit.score);
                }
                None => match self.policy {
                    ConsistencyPolicy::Fail => {
                        return Err(Error::IndexInconsistency { chunk_id: hit.chunk_id.clone() }.into())
                    }
                    ConsistencyPolicy::Skip => {
                        self.inconsistencies.fetch_add(1, Ordering::Relaxed);
                        warn!(chunk_id = %hit.chunk_id, "semantic hit has no lexical counterpart; skipped");
                    }
                },
            }
        }

        // Rank every candidate: heading-only chunks are dropped below and must
        // not take a slot from a lower-ranked match.
        let ranked = self.lexical.score_subset(query, &positions, positions.len());
        debug!(semantic = hits.len(), candidates = positions.len(), reranked = ranked.len(), "hybrid retrieval");

        let mut out = Vec::with_capacity(top_k_final.min(ranked.len()));
        for hit in ranked {
            if out.len() == top_k_final { break; }
            let Some(chunk) = self.table.get(hit.position) else {
                warn!(position = hit.position, "reranked position outside the chunk table");
                continue;
            };
            let text = strip_leading_sections(&chunk.raw_text);
            if text.is_empty() { continue; }
            out.push(RetrievedChunk {
                chunk_id: chunk.corpus_id.clone(),
                position: hit.position,
                bm25_score: hit.score,
                semantic_score: semantic_scores.get(&hit.position).copied().unwrap_or_default(),
                text: text.to_string(),
            });
        }
        Ok(out)
    }
}
