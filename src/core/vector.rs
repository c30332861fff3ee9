/// Cosine similarity of two vectors.
///
/// Mismatched dimensions or a zero-length vector give 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Dense row-major matrix of pairwise similarities.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl SimilarityMatrix {
    /// Cosine similarity of every row vector in `left` against every one in `right`.
    pub fn cosine<A, B>(left: &[A], right: &[B]) -> Self
    where
        A: AsRef<[f32]>,
        B: AsRef<[f32]>,
    {
        let mut values = Vec::with_capacity(left.len() * right.len());
        for a in left {
            for b in right {
                values.push(cosine_similarity(a.as_ref(), b.as_ref()));
            }
        }
        Self {
            rows: left.len(),
            cols: right.len(),
            values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            self.values.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    /// Largest entry with its `(row, col)` position, or `None` for an empty matrix.
    pub fn max(&self) -> Option<(usize, usize, f32)> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(idx, v)| (idx / self.cols, idx % self.cols, *v))
    }

    /// All entries as `(row, col, value)`.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(idx, v)| (idx / self.cols, idx % self.cols, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_matrix_shape_and_max() {
        let left = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let right = vec![vec![1.0, 1.0], vec![0.0, 1.0], vec![-1.0, 0.0]];
        let matrix = SimilarityMatrix::cosine(&left, &right);

        assert_eq!((matrix.rows(), matrix.cols()), (2, 3));
        assert_eq!(matrix.entries().count(), 6);
        let (row, col, value) = matrix.max().unwrap();
        assert_eq!((row, col), (1, 1));
        assert!((value - 1.0).abs() < 1e-6);
        assert_eq!(matrix.get(2, 0), None);
    }

    #[test]
    fn test_empty_matrix_has_no_max() {
        let left: Vec<Vec<f32>> = Vec::new();
        let matrix = SimilarityMatrix::cosine(&left, &[vec![1.0f32]]);
        assert_eq!(matrix.max(), None);
        assert_eq!(matrix.entries().count(), 0);
    }
}
