//! Loads a directory of converted JSON files into a [`ChunkTable`].
//!
//! A file that cannot be read or parsed is skipped and reported; a single
//! malformed entry is skipped and counted. Neither aborts the load.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::table::ChunkTable;
use crate::types::ChunkRecord;

/// What happened while loading a corpus directory.
#[derive(Debug, Clone, Default)]
pub struct CorpusReport {
    pub files_loaded: usize,
    pub files_skipped: Vec<(PathBuf, String)>,
    pub entries_malformed: usize,
    pub entries_empty: usize,
    pub chunks: usize,
}

#[derive(Debug, Default)]
pub struct CorpusLoader;

impl CorpusLoader {
    pub fn new() -> Self { Self }

    /// Load every `*.json` file directly under `dir`, in file-name order.
    pub fn load_dir(&self, dir: &Path) -> Result<(ChunkTable, CorpusReport)> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("corpus directory {}", dir.display())).into());
        }
        let files = self.list_json_files(dir);
        let mut table = ChunkTable::new();
        let mut report = CorpusReport::default();
        if files.is_empty() {
            warn!(dir = %dir.display(), "no .json files found");
            return Ok((table, report));
        }
        for (file_index, path) in files.iter().enumerate() {
            debug!(file = %path.display(), "loading {}/{}", file_index + 1, files.len());
            let entries = match self.read_entries(path) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable corpus file");
                    report.files_skipped.push((path.clone(), e.to_string()));
                    continue;
                }
            };
            let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let mut kept = 0usize;
            for (entry_index, value) in entries.into_iter().enumerate() {
                let record: ChunkRecord = match serde_json::from_value(value) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(file = %file_name, entry = entry_index, error = %e, "skipping malformed entry");
                        report.entries_malformed += 1;
                        continue;
                    }
                };
                let corpus_id = format!("{}_chunk_{}", file_name, kept);
                match table.push_record(corpus_id, file_name.clone(), &record)? {
                    Some(_) => kept += 1,
                    None => {
                        debug!(file = %file_name, entry = entry_index, "entry flattened to empty text");
                        report.entries_empty += 1;
                    }
                }
            }
            report.files_loaded += 1;
        }
        report.chunks = table.len();
        info!(
            files = report.files_loaded,
            skipped = report.files_skipped.len(),
            chunks = report.chunks,
            "corpus loaded from {}", dir.display()
        );
        Ok((table, report))
    }

    fn read_entries(&self, path: &Path) -> Result<Vec<serde_json::Value>> {
        let content = fs::read_to_string(path)?;
        let entries: Vec<serde_json::Value> = serde_json::from_str(&content)?;
        Ok(entries)
    }

    fn list_json_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut json_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            let is_json = path.extension().and_then(|s| s.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if is_json { json_files.push(path.to_path_buf()); }
        }
        json_files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        json_files
    }
}
