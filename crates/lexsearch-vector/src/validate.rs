use lexsearch_core::error::Error;

/// Largest allowed deviation of an embedding's L2 norm from 1.
pub const NORM_TOLERANCE: f64 = 1e-6;

/// Check one embedding: length `dim`, finite components, unit norm.
pub fn validate_vector(index: usize, v: &[f32], dim: usize) -> Result<(), Error> {
    if v.len() != dim {
        return Err(Error::DimensionMismatch { expected: dim, got: v.len() });
    }
    if let Some(j) = v.iter().position(|x| !x.is_finite()) {
        return Err(Error::InvalidEmbedding { index, reason: format!("component {} is {}", j, v[j]) });
    }
    let norm = v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if (norm - 1.0).abs() > NORM_TOLERANCE {
        return Err(Error::InvalidEmbedding { index, reason: format!("L2 norm {norm} is not 1") });
    }
    Ok(())
}

/// Validate a batch; `offset` is added to the reported row index.
pub fn validate_embeddings(vectors: &[Vec<f32>], dim: usize, offset: usize) -> Result<(), Error> {
    vectors.iter().enumerate().try_for_each(|(i, v)| validate_vector(offset + i, v, dim))
}
