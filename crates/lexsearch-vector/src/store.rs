//! Arrow IPC persistence for [`SemanticIndex`].
//!
//! A saved index is a directory holding `vectors.arrow`, `chunk_ids.arrow`,
//! an optional `texts.arrow`, and `manifest.json`. Each Arrow file carries a
//! `position` column so it can be read on its own.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, UInt64Type};
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, StringArray, UInt64Array};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::Schema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use lexsearch_core::error::Error;
use lexsearch_core::traits::Embedder;

use crate::flat::FlatIpIndex;
use crate::index::SemanticIndex;
use crate::schema::{
    build_chunk_ids_schema, build_texts_schema, build_vectors_schema, vector_item_field, CHUNK_IDS_FILE,
    MANIFEST_FILE, TEXTS_FILE, VECTORS_FILE,
};
use crate::validate::validate_embeddings;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticManifest {
    pub format_version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub count: usize,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub has_texts: bool,
}

impl SemanticManifest {
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?)
    }
}

impl SemanticIndex {
    /// Write the index into `dir`, creating it if needed. The manifest is
    /// written last.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let dim = self.dim();
        let n = self.len();
        let positions = || -> ArrayRef { Arc::new(UInt64Array::from_iter_values(0..n as u64)) };

        let values: Vec<f32> = self.flat.rows().take(n).flatten().copied().collect();
        let vectors = FixedSizeListArray::try_new(vector_item_field(), dim as i32, Arc::new(Float32Array::from(values)), None)?;
        write_batch(&dir.join(VECTORS_FILE), build_vectors_schema(dim), vec![positions(), Arc::new(vectors)])?;

        let ids = StringArray::from_iter_values(self.chunk_ids.iter());
        write_batch(&dir.join(CHUNK_IDS_FILE), build_chunk_ids_schema(), vec![positions(), Arc::new(ids)])?;

        let texts_path = dir.join(TEXTS_FILE);
        match &self.texts {
            Some(texts) => {
                let texts = StringArray::from_iter_values(texts.iter());
                write_batch(&texts_path, build_texts_schema(), vec![positions(), Arc::new(texts)])?;
            }
            None if texts_path.exists() => fs::remove_file(&texts_path).with_context(|| format!("removing {}", texts_path.display()))?,
            None => {}
        }

        let manifest = SemanticManifest {
            format_version: FORMAT_VERSION,
            embedder_id: self.embedder_id().to_string(),
            dim,
            count: n,
            fingerprint: self.fingerprint.clone(),
            built_at: self.built_at,
            has_texts: self.texts.is_some(),
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("writing {}", manifest_path.display()))?;
        info!(dir = %dir.display(), vectors = n, dim, "semantic index saved");
        Ok(())
    }

    /// Restore an index saved by [`SemanticIndex::save`], to be queried with
    /// `embedder`. The embedder must be the one the index was built with.
    pub fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let manifest = SemanticManifest::read(dir)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::Operation(format!("{}: unsupported semantic index format {}", dir.display(), manifest.format_version)).into());
        }
        if manifest.embedder_id != embedder.id() {
            return Err(Error::EmbedderMismatch { built_with: manifest.embedder_id, current: embedder.id().to_string() }.into());
        }
        if manifest.dim != embedder.dim() {
            return Err(Error::DimensionMismatch { expected: manifest.dim, got: embedder.dim() }.into());
        }

        let vectors = read_vectors(&dir.join(VECTORS_FILE), manifest.dim)?;
        let chunk_ids = read_chunk_ids(&dir.join(CHUNK_IDS_FILE))?;
        let texts = if manifest.has_texts { Some(read_texts(&dir.join(TEXTS_FILE))?) } else { None };

        let counts_agree = vectors.len() == manifest.count
            && chunk_ids.len() == manifest.count
            && texts.as_ref().map_or(true, |t| t.len() == manifest.count);
        if !counts_agree {
            return Err(Error::Operation(format!(
                "{}: manifest says {} rows but found {} vectors and {} chunk ids",
                dir.display(),
                manifest.count,
                vectors.len(),
                chunk_ids.len()
            ))
            .into());
        }
        validate_embeddings(&vectors, manifest.dim, 0)?;

        let mut flat = FlatIpIndex::with_capacity(manifest.dim, vectors.len());
        for v in &vectors { flat.add(v); }
        info!(dir = %dir.display(), vectors = manifest.count, "semantic index loaded");
        Ok(Self { embedder, flat, chunk_ids, texts, fingerprint: manifest.fingerprint, built_at: manifest.built_at })
    }
}

fn write_batch(path: &Path, schema: Arc<Schema>, columns: Vec<ArrayRef>) -> Result<()> {
    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = FileWriter::try_new(file, &schema)?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = FileReader::try_new(file, None).with_context(|| format!("reading {}", path.display()))?;
    Ok(reader.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Check that a batch's `position` column continues the sequence at `next`.
fn check_positions(path: &Path, batch: &RecordBatch, next: usize) -> Result<()> {
    let col = batch.column_by_name("position").ok_or_else(|| anyhow!("{}: missing position column", path.display()))?;
    let positions = col.as_primitive_opt::<UInt64Type>().ok_or_else(|| anyhow!("{}: position is not u64", path.display()))?;
    for (i, p) in positions.values().iter().enumerate() {
        if *p as usize != next + i {
            return Err(Error::Operation(format!("{}: row {} has position {}", path.display(), next + i, p)).into());
        }
    }
    Ok(())
}

/// Read `vectors.arrow`; every row must have `dim` components.
pub fn read_vectors(path: &Path, dim: usize) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        check_positions(path, &batch, out.len())?;
        let col = batch.column_by_name("vector").ok_or_else(|| anyhow!("{}: missing vector column", path.display()))?;
        let list = col.as_fixed_size_list_opt().ok_or_else(|| anyhow!("{}: vector is not a fixed-size list", path.display()))?;
        if list.value_length() as usize != dim {
            return Err(Error::DimensionMismatch { expected: dim, got: list.value_length() as usize }.into());
        }
        for i in 0..list.len() {
            let row = list.value(i);
            let values = row.as_primitive_opt::<Float32Type>().ok_or_else(|| anyhow!("{}: vector items are not f32", path.display()))?;
            out.push(values.values().to_vec());
        }
    }
    Ok(out)
}

fn read_strings(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        check_positions(path, &batch, out.len())?;
        let col = batch.column_by_name(column).ok_or_else(|| anyhow!("{}: missing {} column", path.display(), column))?;
        let strings = col.as_string_opt::<i32>().ok_or_else(|| anyhow!("{}: {} is not utf8", path.display(), column))?;
        out.extend(strings.iter().map(|s| s.unwrap_or_default().to_string()));
    }
    Ok(out)
}

/// Read `chunk_ids.arrow`.
pub fn read_chunk_ids(path: &Path) -> Result<Vec<String>> { read_strings(path, "chunk_id") }

/// Read `texts.arrow`.
pub fn read_texts(path: &Path) -> Result<Vec<String>> { read_strings(path, "text") }
