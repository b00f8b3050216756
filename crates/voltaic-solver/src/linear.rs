//! Dense linear solve: LU factorization with partial pivoting.
//!
//! Circuit matrices in this engine are small (tens to low hundreds of
//! unknowns) and dense after MNA augmentation, so a direct dense solve is
//! the right tool; an iterative solver would not earn its keep here.
//!
//! The factorization works in place on a clone of `A` and reports
//! [`CoreError::Singular`] when any pivot magnitude falls below
//! `1e-14 * max|A|`.

use nalgebra::{DMatrix, DVector};
use voltaic_core::error::{CoreError, Result};

/// Relative pivot threshold: pivots below `PIVOT_EPS * max|A|` are singular.
pub const PIVOT_EPS: f64 = 1e-14;

/// Solve `A x = b` by LU decomposition with partial pivoting.
pub fn solve_dense(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(CoreError::DimensionMismatch {
            expected: n,
            actual: a.ncols(),
        });
    }
    if b.len() != n {
        return Err(CoreError::DimensionMismatch {
            expected: n,
            actual: b.len(),
        });
    }
    if n == 0 {
        return Ok(DVector::zeros(0));
    }

    let max_abs = a.amax();
    if !max_abs.is_finite() {
        return Err(CoreError::Singular("matrix contains non-finite entries".into()));
    }
    if max_abs == 0.0 {
        return Err(CoreError::Singular("matrix is identically zero".into()));
    }
    let pivot_eps = PIVOT_EPS * max_abs;

    let mut lu = a.clone();
    let mut x = b.clone();

    for k in 0..n {
        // Partial pivoting: pick the largest magnitude in column k.
        let mut pivot_row = k;
        let mut pivot_mag = lu[(k, k)].abs();
        for i in (k + 1)..n {
            let mag = lu[(i, k)].abs();
            if mag > pivot_mag {
                pivot_mag = mag;
                pivot_row = i;
            }
        }
        if pivot_mag <= pivot_eps {
            return Err(CoreError::Singular(format!(
                "pivot {pivot_mag:.3e} at column {k} below threshold {pivot_eps:.3e}"
            )));
        }
        if pivot_row != k {
            lu.swap_rows(k, pivot_row);
            x.swap_rows(k, pivot_row);
        }

        // Eliminate below the pivot; forward-substitute the RHS as we go.
        let pivot = lu[(k, k)];
        for i in (k + 1)..n {
            let factor = lu[(i, k)] / pivot;
            if factor == 0.0 {
                continue;
            }
            lu[(i, k)] = factor;
            for j in (k + 1)..n {
                let lkj = lu[(k, j)];
                lu[(i, j)] -= factor * lkj;
            }
            let xk = x[k];
            x[i] -= factor * xk;
        }
    }

    // Back substitution.
    for k in (0..n).rev() {
        let mut sum = x[k];
        for j in (k + 1)..n {
            sum -= lu[(k, j)] * x[j];
        }
        x[k] = sum / lu[(k, k)];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_solve_simple() {
        // 2x + y = 5
        // x + 3y = 6
        // Solution: x = 1.8, y = 1.4
        let a = dmatrix![2.0, 1.0; 1.0, 3.0];
        let b = dvector![5.0, 6.0];

        let x = solve_dense(&a, &b).unwrap();

        assert!((x[0] - 1.8).abs() < 1e-10);
        assert!((x[1] - 1.4).abs() < 1e-10);
    }

    #[test]
    fn test_singular_matrix() {
        let a = dmatrix![1.0, 2.0; 2.0, 4.0]; // row 2 = 2 * row 1
        let b = dvector![1.0, 2.0];

        let result = solve_dense(&a, &b);
        assert!(matches!(result, Err(CoreError::Singular(_))));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = dmatrix![1.0, 2.0; 3.0, 4.0];
        let b = dvector![1.0, 2.0, 3.0];

        let result = solve_dense(&a, &b);
        assert!(matches!(result, Err(CoreError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_pivoting_handles_zero_diagonal() {
        // Without pivoting this would divide by zero at (0,0).
        let a = dmatrix![0.0, 1.0; 1.0, 0.0];
        let b = dvector![2.0, 3.0];
        let x = solve_dense(&a, &b).unwrap();
        assert!((x[0] - 3.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_residual_bound_on_random_systems() {
        // Diagonally dominant pseudo-random systems must satisfy the
        // documented residual bound.
        let mut state = 0x12345u64;
        let mut next = move || {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64 / u64::MAX as f64) * 2.0 - 1.0
        };

        for size in [3usize, 10, 40, 120] {
            let mut a = DMatrix::zeros(size, size);
            for i in 0..size {
                for j in 0..size {
                    a[(i, j)] = next();
                }
                a[(i, i)] += size as f64; // dominance keeps conditioning mild
            }
            let b = DVector::from_fn(size, |_, _| next());

            let x = solve_dense(&a, &b).unwrap();
            let residual = (&a * &x - &b).amax();
            let bound = 1e-9 * (1.0 + b.amax());
            assert!(
                residual <= bound,
                "size {size}: residual {residual:.3e} exceeds {bound:.3e}"
            );
        }
    }

    #[test]
    fn test_non_finite_matrix_is_singular() {
        let a = dmatrix![f64::INFINITY, 0.0; 0.0, 1.0];
        let b = dvector![1.0, 1.0];
        assert!(matches!(solve_dense(&a, &b), Err(CoreError::Singular(_))));
    }

    #[test]
    fn test_empty_system() {
        let a = DMatrix::<f64>::zeros(0, 0);
        let b = DVector::<f64>::zeros(0);
        assert_eq!(solve_dense(&a, &b).unwrap().len(), 0);
    }
}
