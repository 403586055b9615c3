//! lexsearch-vector
//!
//! Exact flat inner-product index over chunk embeddings, and its Arrow IPC
//! persistence. Building and querying both go through the one shared
//! `Arc<dyn Embedder>`.

pub mod flat;
pub mod index;
pub mod schema;
pub mod store;
pub mod validate;

pub use flat::FlatIpIndex;
pub use index::SemanticIndex;
pub use store::{read_chunk_ids, read_texts, read_vectors, SemanticManifest};
pub use validate::{validate_embeddings, validate_vector, NORM_TOLERANCE};
