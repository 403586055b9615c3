//! The on-disk index directory: chunk table, lexical index and semantic
//! index, all stamped with the same corpus fingerprint.
//!
//! ```text
//! <dir>/chunks.json
//! <dir>/lexical.json
//! <dir>/semantic/{manifest.json, vectors.arrow, chunk_ids.arrow, texts.arrow}
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use lexsearch_core::config::{ConsistencyPolicy, Settings};
use lexsearch_core::corpus::{CorpusLoader, CorpusReport};
use lexsearch_core::error::Error;
use lexsearch_core::traits::Embedder;
use lexsearch_core::ChunkTable;
use lexsearch_text::{load_index, save_index, Bm25Index, Bm25Params};
use lexsearch_vector::SemanticIndex;

use crate::HybridRetriever;

pub const CHUNKS_FILE: &str = "chunks.json";
pub const LEXICAL_FILE: &str = "lexical.json";
pub const SEMANTIC_DIR: &str = "semantic";

pub struct IndexBundle {
    pub table: Arc<ChunkTable>,
    pub lexical: Bm25Index,
    pub semantic: SemanticIndex,
}

/// Summary of a bundle, printed by `lexsearch stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleStats {
    pub chunks: usize,
    pub source_files: usize,
    pub vocabulary: usize,
    pub average_document_length: f64,
    pub embedder_id: String,
    pub dim: usize,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

impl IndexBundle {
    /// Build both indices from one chunk table.
    pub fn from_table(table: ChunkTable, embedder: Arc<dyn Embedder>, params: Bm25Params, batch_size: usize) -> Result<Self> {
        let lexical = Bm25Index::from_table(&table, params);
        let semantic = SemanticIndex::build(&table, embedder, batch_size)?;
        Ok(Self { table: Arc::new(table), lexical, semantic })
    }

    /// Load `corpus_dir` and build both indices with `settings`.
    pub fn build(corpus_dir: &Path, embedder: Arc<dyn Embedder>, settings: &Settings) -> Result<(Self, CorpusReport)> {
        let (table, report) = CorpusLoader::new().load_dir(corpus_dir)?;
        let bundle = Self::from_table(table, embedder, Bm25Params::from(&settings.bm25), settings.embed.batch_size)?;
        Ok((bundle, report))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let fingerprint = self.table.fingerprint();
        self.table.save(&dir.join(CHUNKS_FILE))?;
        save_index(&dir.join(LEXICAL_FILE), &self.lexical, &fingerprint)?;
        self.semantic.save(&dir.join(SEMANTIC_DIR))?;
        info!(dir = %dir.display(), chunks = self.table.len(), %fingerprint, "index bundle saved");
        Ok(())
    }

    /// Load a saved bundle. All three parts must carry the chunk table's
    /// fingerprint, and the semantic index must match `embedder`.
    pub fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let table = ChunkTable::load(&dir.join(CHUNKS_FILE))?;
        let expected = table.fingerprint();

        let (lexical, lexical_fp) = load_index(&dir.join(LEXICAL_FILE))?;
        check_fingerprint("lexical index", &expected, &lexical_fp)?;
        if lexical.document_count() != table.len() {
            return Err(Error::Operation(format!(
                "lexical index covers {} chunks, table has {}",
                lexical.document_count(),
                table.len()
            ))
            .into());
        }

        let semantic = SemanticIndex::load(&dir.join(SEMANTIC_DIR), embedder)?;
        check_fingerprint("semantic index", &expected, semantic.fingerprint())?;

        info!(dir = %dir.display(), chunks = table.len(), "index bundle loaded");
        Ok(Self { table: Arc::new(table), lexical, semantic })
    }

    pub fn stats(&self) -> BundleStats {
        let mut files: Vec<&str> = self.table.chunks().iter().map(|c| c.source_file.as_str()).collect();
        files.sort_unstable();
        files.dedup();
        BundleStats {
            chunks: self.table.len(),
            source_files: files.len(),
            vocabulary: self.lexical.vocabulary_size(),
            average_document_length: self.lexical.average_document_length(),
            embedder_id: self.semantic.embedder_id().to_string(),
            dim: self.semantic.dim(),
            fingerprint: self.table.fingerprint(),
            built_at: self.semantic.built_at(),
        }
    }

    pub fn into_retriever(self, policy: ConsistencyPolicy) -> HybridRetriever<Bm25Index, SemanticIndex> {
        HybridRetriever::new(self.table, self.lexical, self.semantic, policy)
    }
}

fn check_fingerprint(what: &str, expected: &str, found: &str) -> Result<()> {
    if expected == found { return Ok(()); }
    Err(Error::FingerprintMismatch { what: what.to_string(), expected: expected.to_string(), found: found.to_string() }.into())
}
