//! Dense linear-algebra helpers for the nonlinear least-squares solver.
//!
//! Every system solved here is tiny (3×3 for the growth model), so the focus is
//! robustness rather than speed:
//! - damped normal equations go through Cholesky, with an SVD fallback
//! - the covariance inverse is rejected if it is not finite or has a
//!   non-positive diagonal

use nalgebra::{DMatrix, DVector};

/// Floor for Marquardt diagonal scaling so flat directions stay solvable.
const DIAG_FLOOR: f64 = 1e-12;

/// Solve `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` for the step `δ`.
///
/// Returns `None` if the damped system cannot be solved to a finite step.
pub fn damped_step(normal: &DMatrix<f64>, gradient: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let mut m = normal.clone();
    for i in 0..m.nrows() {
        m[(i, i)] += lambda * normal[(i, i)].max(DIAG_FLOOR);
    }
    let rhs = -gradient;

    if let Some(chol) = m.clone().cholesky() {
        let step = chol.solve(&rhs);
        if step.iter().all(|v| v.is_finite()) {
            return Some(step);
        }
    }

    // Cholesky fails on numerically indefinite systems; SVD with a
    // progressively looser cutoff still gives a usable step.
    let svd = m.svd(true, true);
    for &tol in &[1e-14, 1e-10, 1e-8] {
        if let Ok(step) = svd.solve(&rhs, tol) {
            if step.iter().all(|v| v.is_finite()) {
                return Some(step);
            }
        }
    }
    None
}

/// Invert `JᵀJ` for a covariance estimate.
///
/// Returns `None` when the matrix is singular or the inverse is not a usable
/// covariance (non-finite entries or a non-positive diagonal).
pub fn invert_normal_matrix(normal: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let inv = normal.clone().try_inverse()?;
    let usable = inv.iter().all(|v| v.is_finite()) && (0..inv.nrows()).all(|i| inv[(i, i)] > 0.0);
    usable.then_some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn undamped_step_solves_linear_least_squares() {
        // Fit y = 2 + 3x on x = [0,1,2] from β = 0: residual r = Xβ - y = -y.
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let r = -DVector::from_row_slice(&[2.0, 5.0, 8.0]);
        let normal = x.transpose() * &x;
        let gradient = x.transpose() * r;

        let step = damped_step(&normal, &gradient, 0.0).unwrap();
        assert_relative_eq!(step[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(step[1], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn damping_shrinks_the_step() {
        let normal = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 1.0]);
        let gradient = DVector::from_row_slice(&[-4.0, -1.0]);
        let full = damped_step(&normal, &gradient, 0.0).unwrap();
        let damped = damped_step(&normal, &gradient, 1.0).unwrap();
        assert!(damped.norm() < full.norm());
    }

    #[test]
    fn singular_normal_matrix_has_no_covariance() {
        let normal = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(invert_normal_matrix(&normal).is_none());

        let normal = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let inv = invert_normal_matrix(&normal).unwrap();
        assert_relative_eq!(inv[(1, 1)], 0.25);
    }
}
