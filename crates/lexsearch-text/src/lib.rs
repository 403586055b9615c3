//! lexsearch-text
//!
//! In-memory BM25 over the chunk table. Scoring is a restricted rerank: only
//! the candidate positions handed in by the caller are scored, but weights
//! come from statistics over the whole corpus unless `IdfScope::Candidates`
//! is selected.

pub mod bm25;
pub mod store;

pub use bm25::{Bm25Index, Bm25Params};
pub use store::{load_index, save_index};
