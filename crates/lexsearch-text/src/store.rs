//! JSON persistence for [`Bm25Index`].
//!
//! Only the primary statistics (doc lengths, df, postings) and the params are
//! written; avgdl and idf are recomputed on load so they can never drift from
//! the postings they were derived from. The file is stamped with the corpus
//! fingerprint of the chunk table the index was built from.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use lexsearch_core::error::Error;

use crate::bm25::{Bm25Index, Bm25Params};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedLexical {
    format_version: u32,
    fingerprint: String,
    params: Bm25Params,
    doc_len: Vec<usize>,
    df: BTreeMap<String, usize>,
    postings: BTreeMap<String, BTreeMap<usize, u32>>,
}

pub fn save_index(path: &Path, index: &Bm25Index, fingerprint: &str) -> Result<()> {
    let persisted = PersistedLexical {
        format_version: FORMAT_VERSION,
        fingerprint: fingerprint.to_string(),
        params: index.params(),
        doc_len: index.document_lengths().to_vec(),
        df: index.document_frequencies().iter().map(|(t, &df)| (t.clone(), df)).collect(),
        postings: index
            .all_postings()
            .iter()
            .map(|(t, list)| (t.clone(), list.iter().map(|(&p, &tf)| (p, tf)).collect()))
            .collect(),
    };
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &persisted).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), documents = index.document_count(), "lexical index saved");
    Ok(())
}

/// Load an index and the corpus fingerprint it was stamped with.
pub fn load_index(path: &Path) -> Result<(Bm25Index, String)> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let persisted: PersistedLexical =
        serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))?;
    if persisted.format_version != FORMAT_VERSION {
        return Err(Error::Operation(format!(
            "{}: unsupported lexical index format {}",
            path.display(),
            persisted.format_version
        )).into());
    }
    let df: HashMap<String, usize> = persisted.df.into_iter().collect();
    let postings: HashMap<String, HashMap<usize, u32>> =
        persisted.postings.into_iter().map(|(t, list)| (t, list.into_iter().collect())).collect();
    let index = Bm25Index::from_parts(persisted.params, persisted.doc_len, df, postings)
        .with_context(|| format!("validating {}", path.display()))?;
    Ok((index, persisted.fingerprint))
}
