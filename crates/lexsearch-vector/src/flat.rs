/// Exact inner-product index over row-major `f32` vectors.
///
/// Row `i` is the vector at position `i`. Search is brute force; with
/// unit-norm rows the score is cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dim: usize) -> Self { Self { dim, data: Vec::new() } }

    pub fn with_capacity(dim: usize, rows: usize) -> Self { Self { dim, data: Vec::with_capacity(dim * rows) } }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { if self.dim == 0 { 0 } else { self.data.len() / self.dim } }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Append one row. The caller guarantees `v.len() == dim`.
    pub fn add(&mut self, v: &[f32]) {
        debug_assert_eq!(v.len(), self.dim);
        self.data.extend_from_slice(v);
    }

    pub fn row(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> { self.data.chunks_exact(self.dim.max(1)) }

    /// The `min(k, len)` best `(position, score)` pairs, highest score first.
    /// Equal scores keep position order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.is_empty() || query.len() != self.dim { return Vec::new(); }
        let mut scored: Vec<(usize, f32)> = self.rows().map(|row| dot(row, query)).enumerate().collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }
