use crate::types::{LexicalHit, SemanticHit};

/// A sentence-embedding model.
///
/// Implementations must return one L2-normalized vector of length `dim()` per
/// input text. A single instance is shared (behind an `Arc`) by the build and
/// query paths so both embed with exactly the same model.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model, recorded in persisted indices.
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Lexical scorer restricted to a candidate subset of chunk positions.
pub trait LexicalRanker: Send + Sync {
    fn score_subset(&self, query: &str, candidates: &[usize], top_k: usize) -> Vec<LexicalHit>;
}

/// Nearest-neighbour search over chunk embeddings, addressed by corpus id.
pub trait SemanticSearcher: Send + Sync {
    fn query(&self, text: &str, top_k: usize) -> anyhow::Result<Vec<SemanticHit>>;
}
