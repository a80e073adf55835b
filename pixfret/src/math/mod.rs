//! Numerical building blocks for the bleed-through fits.

pub mod cholesky;
pub mod lm_optimizer;
pub mod regression;

use std::ops::{Index, IndexMut};

/// Dense `n x n` matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SquareMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn from_rows<const N: usize>(rows: [[f64; N]; N]) -> Self {
        Self {
            n: N,
            data: rows.iter().flatten().copied().collect(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.n, "vector length must equal matrix size");
        (0..self.n)
            .map(|i| (0..self.n).map(|j| self[(i, j)] * v[j]).sum())
            .collect()
    }
}

impl Index<(usize, usize)> for SquareMatrix {
    type Output = f64;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.data[row * self.n + col]
    }
}

impl IndexMut<(usize, usize)> for SquareMatrix {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        &mut self.data[row * self.n + col]
    }
}
