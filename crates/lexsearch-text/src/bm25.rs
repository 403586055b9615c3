use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lexsearch_core::config::{Bm25Settings, IdfScope};
use lexsearch_core::error::Error;
use lexsearch_core::normalize::{normalize, tokenize, tokens};
use lexsearch_core::traits::LexicalRanker;
use lexsearch_core::types::LexicalHit;
use lexsearch_core::ChunkTable;

/// Tunables for scoring. `k1` saturates term frequency, `b` scales length
/// normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub idf_scope: IdfScope,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 1.5, b: 0.75, idf_scope: IdfScope::Corpus } }
}

impl From<&Bm25Settings> for Bm25Params {
    fn from(s: &Bm25Settings) -> Self { Self { k1: s.k1, b: s.b, idf_scope: s.idf_scope } }
}

/// Term statistics over an ordered sequence of chunks.
///
/// Chunks are addressed by position (ingestion order). `postings`, `df` and
/// `idf` are always derived together from the full corpus; nothing mutates
/// them after construction.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    doc_len: Vec<usize>,
    avgdl: f64,
    df: HashMap<String, usize>,
    postings: HashMap<String, HashMap<usize, u32>>,
    idf: HashMap<String, f64>,
}

impl Bm25Index {
    /// Build from raw chunk texts; each text is normalized first.
    pub fn build<S: AsRef<str> + Sync>(raw_texts: &[S], params: Bm25Params) -> Self {
        let normalized: Vec<String> = raw_texts.par_iter().map(|t| normalize(t.as_ref())).collect();
        Self::from_normalized(&normalized, params)
    }

    /// Build from a chunk table, reusing the normalized text it already holds.
    pub fn from_table(table: &ChunkTable, params: Bm25Params) -> Self {
        let normalized: Vec<&str> = table.chunks().iter().map(|c| c.normalized_text.as_str()).collect();
        Self::from_normalized(&normalized, params)
    }

    fn from_normalized<S: AsRef<str> + Sync>(docs: &[S], params: Bm25Params) -> Self {
        // Per-chunk counting runs in parallel; the reduce below keeps ingestion order.
        let counted: Vec<(usize, HashMap<String, u32>)> = docs.par_iter().map(|d| count_terms(d.as_ref())).collect();

        let mut doc_len = Vec::with_capacity(counted.len());
        let mut df: HashMap<String, usize> = HashMap::new();
        let mut postings: HashMap<String, HashMap<usize, u32>> = HashMap::new();
        for (position, (len, tf_counts)) in counted.into_iter().enumerate() {
            doc_len.push(len);
            for (term, tf) in tf_counts {
                *df.entry(term.clone()).or_insert(0) += 1;
                postings.entry(term).or_default().insert(position, tf);
            }
        }
        let mut index = Self { params, doc_len, avgdl: 0.0, df, postings, idf: HashMap::new() };
        index.finalize();
        debug!(documents = index.document_count(), vocabulary = index.vocabulary_size(), avgdl = index.avgdl, "bm25 index built");
        index
    }

    /// Rebuild an index from persisted parts, recomputing avgdl and idf.
    pub fn from_parts(
        params: Bm25Params,
        doc_len: Vec<usize>,
        df: HashMap<String, usize>,
        postings: HashMap<String, HashMap<usize, u32>>,
    ) -> Result<Self> {
        let n = doc_len.len();
        if df.len() != postings.len() {
            return Err(Error::Operation(format!("df has {} terms but postings has {}", df.len(), postings.len())).into());
        }
        for (term, list) in &postings {
            if df.get(term) != Some(&list.len()) {
                return Err(Error::Operation(format!("df of '{}' disagrees with its postings", term)).into());
            }
            if let Some(bad) = list.keys().find(|&&p| p >= n) {
                return Err(Error::Operation(format!("postings of '{}' reference chunk {} of {}", term, bad, n)).into());
            }
        }
        let mut index = Self { params, doc_len, avgdl: 0.0, df, postings, idf: HashMap::new() };
        index.finalize();
        Ok(index)
    }

    fn finalize(&mut self) {
        let n = self.doc_len.len();
        let total: usize = self.doc_len.iter().sum();
        self.avgdl = if n == 0 { 0.0 } else { total as f64 / n as f64 };
        self.idf = self.df.iter().map(|(term, &df)| (term.clone(), idf(n, df))).collect();
    }

    pub fn params(&self) -> Bm25Params { self.params }

    pub fn document_count(&self) -> usize { self.doc_len.len() }

    pub fn vocabulary_size(&self) -> usize { self.df.len() }

    pub fn average_document_length(&self) -> f64 { self.avgdl }

    pub fn document_length(&self, position: usize) -> Option<usize> { self.doc_len.get(position).copied() }

    pub fn document_lengths(&self) -> &[usize] { &self.doc_len }

    /// Number of chunks containing `term` (already normalized); 0 if unseen.
    pub fn document_frequency(&self, term: &str) -> usize { self.df.get(term).copied().unwrap_or(0) }

    pub fn idf(&self, term: &str) -> Option<f64> { self.idf.get(term).copied() }

    pub fn postings(&self, term: &str) -> Option<&HashMap<usize, u32>> { self.postings.get(term) }

    pub fn document_frequencies(&self) -> &HashMap<String, usize> { &self.df }

    pub fn all_postings(&self) -> &HashMap<String, HashMap<usize, u32>> { &self.postings }

    fn term_weight(&self, idf: f64, tf: u32, dl: usize) -> f64 {
        if self.avgdl <= 0.0 { return 0.0; }
        let tf = f64::from(tf);
        let Bm25Params { k1, b, .. } = self.params;
        idf * tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * dl as f64 / self.avgdl))
    }

    /// Full-corpus BM25 score of one chunk; exactly 0 when it holds none of
    /// the query terms.
    pub fn score_document(&self, query: &str, position: usize) -> f64 {
        let Some(&dl) = self.doc_len.get(position) else { return 0.0 };
        let mut score = 0.0;
        for term in tokenize(query) {
            let Some(tf) = self.postings.get(&term).and_then(|p| p.get(&position)) else { continue };
            score += self.term_weight(self.idf.get(&term).copied().unwrap_or(0.0), *tf, dl);
        }
        score
    }

    /// Score `query` against the chunks in `candidates` only.
    ///
    /// Candidates holding no query term are left out. Results are ordered by
    /// descending score; equal scores keep candidate order. Repeated
    /// candidates are scored once and positions past the corpus are ignored.
    pub fn score_subset(&self, query: &str, candidates: &[usize], top_k: usize) -> Vec<LexicalHit> {
        if top_k == 0 || candidates.is_empty() || self.avgdl <= 0.0 { return Vec::new(); }
        let query_terms = tokenize(query);
        if query_terms.is_empty() { return Vec::new(); }

        let n = self.document_count();
        let mut seen = HashSet::with_capacity(candidates.len());
        let mut cands = Vec::with_capacity(candidates.len());
        for &p in candidates {
            if p >= n {
                warn!(position = p, documents = n, "candidate outside the lexical index ignored");
                continue;
            }
            if seen.insert(p) { cands.push(p); }
        }

        let subset_idf = match self.params.idf_scope {
            IdfScope::Corpus => None,
            IdfScope::Candidates => Some(self.subset_idf(&query_terms, &cands)),
        };

        let mut scores: Vec<Option<f64>> = vec![None; cands.len()];
        for term in &query_terms {
            let Some(list) = self.postings.get(term) else { continue };
            let idf = match &subset_idf {
                Some(m) => m.get(term).copied().unwrap_or(0.0),
                None => self.idf.get(term).copied().unwrap_or(0.0),
            };
            for (slot, &position) in cands.iter().enumerate() {
                if let Some(&tf) = list.get(&position) {
                    *scores[slot].get_or_insert(0.0) += self.term_weight(idf, tf, self.doc_len[position]);
                }
            }
        }

        let mut hits: Vec<LexicalHit> = cands
            .iter()
            .zip(scores)
            .filter_map(|(&position, score)| score.map(|score| LexicalHit { position, score }))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }

    fn subset_idf(&self, query_terms: &[String], cands: &[usize]) -> HashMap<String, f64> {
        let mut out = HashMap::new();
        for term in query_terms {
            if out.contains_key(term) { continue; }
            let Some(list) = self.postings.get(term) else { continue };
            let df = cands.iter().filter(|&&p| list.contains_key(&p)).count();
            out.insert(term.clone(), idf(cands.len(), df));
        }
        out
    }
}

impl LexicalRanker for Bm25Index {
    fn score_subset(&self, query: &str, candidates: &[usize], top_k: usize) -> Vec<LexicalHit> {
        Bm25Index::score_subset(self, query, candidates, top_k)
    }
}

/// `ln((N − df + 0.5) / (df + 0.5) + 1)`; always positive for df ≤ N.
pub fn idf(n: usize, df: usize) -> f64 {
    let (n, df) = (n as f64, df as f64);
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

fn count_terms(normalized: &str) -> (usize, HashMap<String, u32>) {
    let mut len = 0usize;
    let mut counts: HashMap<String, u32> = HashMap::new();
    for tok in tokens(normalized) {
        len += 1;
        *counts.entry(tok.to_string()).or_insert(0) += 1;
    }
    (len, counts)
}
