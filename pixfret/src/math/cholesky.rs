//! Cholesky factorization and solve for symmetric positive-definite systems.
//!
//! The factorization is done in place: only the upper triangle of the input is read,
//! the strict lower triangle receives the factor `L` and its diagonal is returned
//! separately, so the upper triangle (the original matrix) stays intact.

use super::SquareMatrix;

/// Factors `a = L * L^T` in place. Returns `false` when `a` is not positive
/// definite (a pivot is `<= 0`); `a` and `diagonal` are then partially overwritten.
pub fn decompose(a: &mut SquareMatrix, diagonal: &mut [f64]) -> bool {
    let n = a.size();
    assert_eq!(diagonal.len(), n, "diagonal length must equal matrix size");

    for i in 0..n {
        for j in i..n {
            let mut sum = a[(i, j)];
            for k in 0..i {
                sum -= a[(i, k)] * a[(j, k)];
            }
            if i == j {
                if sum <= 0.0 || sum.is_nan() {
                    return false;
                }
                diagonal[i] = sum.sqrt();
            } else {
                a[(j, i)] = sum / diagonal[i];
            }
        }
    }
    true
}

/// Solves `a * x = b` given a factor produced by [`decompose`].
pub fn solve_decomposed(a: &SquareMatrix, diagonal: &[f64], b: &[f64], x: &mut [f64]) {
    let n = a.size();
    assert_eq!(b.len(), n, "right-hand side length must equal matrix size");
    assert_eq!(x.len(), n, "solution length must equal matrix size");

    // L * y = b
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= a[(i, k)] * x[k];
        }
        x[i] = sum / diagonal[i];
    }

    // L^T * x = y
    for i in (0..n).rev() {
        let mut sum = x[i];
        for k in i + 1..n {
            sum -= a[(k, i)] * x[k];
        }
        x[i] = sum / diagonal[i];
    }
}

/// Solves `a * x = b`, or returns `None` when `a` is not positive definite.
pub fn solve(a: &SquareMatrix, b: &[f64]) -> Option<Vec<f64>> {
    let n = a.size();
    let mut factor = a.clone();
    let mut diagonal = vec![0.0; n];
    if !decompose(&mut factor, &mut diagonal) {
        return None;
    }
    let mut x = vec![0.0; n];
    solve_decomposed(&factor, &diagonal, b, &mut x);
    Some(x)
}
