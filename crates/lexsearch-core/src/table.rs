//! The authoritative chunk table.
//!
//! Both indices are built from one `ChunkTable`, and the hybrid retriever uses
//! it to map semantic hits (corpus ids) onto lexical positions. The table's
//! fingerprint is stamped into every persisted index so that indices built
//! from different corpus snapshots are rejected at load time.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::flatten::flatten_record;
use crate::normalize::{normalize, tokens};
use crate::types::{Chunk, ChunkId, ChunkRecord};

#[derive(Debug, Clone, Default)]
pub struct ChunkTable {
    chunks: Vec<Chunk>,
    by_id: HashMap<ChunkId, usize>,
}

#[derive(Serialize, Deserialize)]
struct PersistedTable {
    fingerprint: String,
    chunks: Vec<Chunk>,
}

impl ChunkTable {
    pub fn new() -> Self { Self::default() }

    /// Append a chunk built from raw (already flattened) text.
    ///
    /// The chunk's position is the current length of the table.
    pub fn push_text(
        &mut self,
        corpus_id: impl Into<ChunkId>,
        source_file: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Result<usize> {
        let raw_text = raw_text.into();
        let normalized_text = normalize(&raw_text);
        let token_count = tokens(&normalized_text).count();
        self.push(Chunk {
            position: self.chunks.len(),
            corpus_id: corpus_id.into(),
            source_file: source_file.into(),
            raw_text,
            normalized_text,
            token_count,
            section: None,
            subsection: None,
            topic: None,
        })
    }

    /// Flatten `record` and append it, keeping its metadata.
    ///
    /// Returns `Ok(None)` when the record flattens to nothing.
    pub fn push_record(
        &mut self,
        corpus_id: impl Into<ChunkId>,
        source_file: impl Into<String>,
        record: &ChunkRecord,
    ) -> Result<Option<usize>> {
        let raw_text = flatten_record(record);
        if raw_text.is_empty() { return Ok(None); }
        let position = self.push_text(corpus_id, source_file, raw_text)?;
        let chunk = &mut self.chunks[position];
        chunk.section = record.section.clone();
        chunk.subsection = record.subsection.clone();
        chunk.topic = record.topic.clone();
        Ok(Some(position))
    }

    fn push(&mut self, chunk: Chunk) -> Result<usize> {
        if self.by_id.contains_key(&chunk.corpus_id) {
            return Err(Error::DuplicateChunkId(chunk.corpus_id).into());
        }
        let position = chunk.position;
        self.by_id.insert(chunk.corpus_id.clone(), position);
        self.chunks.push(chunk);
        Ok(position)
    }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    pub fn get(&self, position: usize) -> Option<&Chunk> { self.chunks.get(position) }

    pub fn chunks(&self) -> &[Chunk] { &self.chunks }

    pub fn position_of(&self, corpus_id: &str) -> Option<usize> { self.by_id.get(corpus_id).copied() }

    pub fn by_id(&self, corpus_id: &str) -> Option<&Chunk> {
        self.position_of(corpus_id).and_then(|p| self.chunks.get(p))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> { self.chunks.iter().map(|c| c.corpus_id.as_str()) }

    pub fn raw_texts(&self) -> impl Iterator<Item = &str> { self.chunks.iter().map(|c| c.raw_text.as_str()) }

    /// BLAKE3 over every chunk's id and raw text, in position order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.chunks.len() as u64).to_le_bytes());
        for c in &self.chunks {
            for part in [c.corpus_id.as_bytes(), c.raw_text.as_bytes()] {
                hasher.update(&(part.len() as u64).to_le_bytes());
                hasher.update(part);
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let persisted = PersistedTable { fingerprint: self.fingerprint(), chunks: self.chunks.clone() };
        let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(std::io::BufWriter::new(file), &persisted)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Load a table saved by [`ChunkTable::save`], rejecting files whose
    /// contents no longer match their recorded fingerprint.
    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let persisted: PersistedTable = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("parsing {}", path.display()))?;
        let mut table = Self::new();
        for (expected, chunk) in persisted.chunks.into_iter().enumerate() {
            if chunk.position != expected {
                return Err(Error::Operation(format!(
                    "chunk '{}' stored at position {} but listed at {}",
                    chunk.corpus_id, chunk.position, expected
                )).into());
            }
            table.push(chunk)?;
        }
        let found = table.fingerprint();
        if found != persisted.fingerprint {
            return Err(Error::FingerprintMismatch {
                what: format!("chunk table {}", path.display()),
                expected: persisted.fingerprint,
                found,
            }.into());
        }
        Ok(table)
    }
}
