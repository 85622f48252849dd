//! Linear least squares solver.
//!
//! Small dense problems show up in two places:
//!
//! ```text
//! minimize || A x - b ||^2
//! ```
//!
//! - each Levenberg-Marquardt step solves a damped, augmented system
//! - the algebraic circle fit solves a 3-column regression
//!
//! Implementation choices:
//! - We use SVD so tall (non-square) systems are solved robustly.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Parameter counts are tiny (at most a dozen columns), so SVD cost is irrelevant.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
        return None;
    }
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-14, 1e-12, 1e-10] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Invert a small symmetric positive semi-definite matrix.
///
/// Used for covariance estimates (`(J^T J)^-1`). Returns `None` when the matrix
/// is singular, which callers report as "standard error unavailable".
pub fn invert_normal_matrix(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if m.nrows() != m.ncols() || m.nrows() == 0 {
        return None;
    }
    if let Some(chol) = m.clone().cholesky() {
        let inv = chol.inverse();
        if inv.iter().all(|v| v.is_finite()) {
            return Some(inv);
        }
    }
    let inv = m.clone().try_inverse()?;
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn least_squares_rejects_mismatched_shapes() {
        let x = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(solve_least_squares(&x, &y).is_none());
    }

    #[test]
    fn singular_normal_matrix_has_no_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(invert_normal_matrix(&m).is_none());

        let m = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 2.0]);
        let inv = invert_normal_matrix(&m).unwrap();
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
        assert!((inv[(1, 1)] - 0.5).abs() < 1e-12);
    }
}
