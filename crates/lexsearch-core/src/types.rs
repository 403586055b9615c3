//! Domain types shared by the lexical and semantic engines.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// One structured record as produced by the document converter.
///
/// Every field is optional on the wire; missing text is treated as blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "Section", default)]
    pub section: Option<String>,
    #[serde(rename = "Subsection", default)]
    pub subsection: Option<String>,
    #[serde(rename = "Content", default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// A paragraph of text optionally followed by a nested bullet list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub list: Vec<ListItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListItem {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub list: Vec<ListItem>,
}

/// An immutable, independently retrievable unit of text.
///
/// - `position`: dense index in ingestion order (the lexical id space)
/// - `corpus_id`: `<file name>_chunk_<n>` (the semantic id space)
/// - `raw_text`: flattened text including heading lines
/// - `normalized_text`/`token_count`: what BM25 actually sees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub position: usize,
    pub corpus_id: ChunkId,
    pub source_file: String,
    pub raw_text: String,
    pub normalized_text: String,
    pub token_count: usize,
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub topic: Option<String>,
}

/// A nearest-neighbour hit: similarity (higher is better) and corpus id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub score: f32,
    pub chunk_id: ChunkId,
}

/// A BM25 hit addressed by chunk position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LexicalHit {
    pub position: usize,
    pub score: f64,
}
