use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Duplicate chunk id: {0}")]
    DuplicateChunkId(String),

    /// An embedding was not unit-norm, had non-finite components or the wrong
    /// length. `index` is the row within the batch being validated.
    #[error("Invalid embedding at row {index}: {reason}")]
    InvalidEmbedding { index: usize, reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedder mismatch: index was built with '{built_with}', query embedder is '{current}'")]
    EmbedderMismatch { built_with: String, current: String },

    /// The semantic index returned a chunk id the chunk table does not know.
    #[error("Index inconsistency: semantic hit '{chunk_id}' has no lexical counterpart")]
    IndexInconsistency { chunk_id: String },

    #[error("Corpus fingerprint mismatch: {what} was built from {found}, expected {expected}")]
    FingerprintMismatch { what: String, expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, Error>;
