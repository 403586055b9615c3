//! lexsearch-core
//!
//! Shared pieces for the lexical and semantic engines: the JSON corpus
//! loader, the single flattening routine both indices consume, query/document
//! normalization, the authoritative chunk table, configuration and errors.

pub mod config;
pub mod corpus;
pub mod error;
pub mod flatten;
pub mod normalize;
pub mod table;
pub mod traits;
pub mod types;

pub use error::Error;
pub use table::ChunkTable;
pub use types::{Chunk, ChunkId, ChunkRecord};
