//! Parameter covariance and confidence bands.
//!
//! At the solution `p̂` with Jacobian `J` (`n × 3`, external parameters):
//!
//! ```text
//! Cov   = (JᵀJ)⁻¹ · χ² / (n - 3)
//! δ(t)  = t_q · sqrt( g(t)ᵀ · Cov · g(t) ),   g(t) = ∂value/∂(A, B, C)
//! ```
//!
//! where `t_q` is the two-sided Student-t quantile for the requested
//! confidence level with `n - 3` degrees of freedom.

use nalgebra::{DMatrix, DVector};

use crate::domain::{BandPoint, ConfidenceLevel, GrowthParameters, ParameterUncertainty, UncertaintyBand};
use crate::math::{invert_normal_matrix, student_t_quantile};
use crate::models::gradient;

const N_PARAMS: usize = 3;

/// Model Jacobian at every time point (`n × 3`).
pub fn model_jacobian(times: &[f64], p: &GrowthParameters) -> DMatrix<f64> {
    let mut jac = DMatrix::<f64>::zeros(times.len(), N_PARAMS);
    for (i, &t) in times.iter().enumerate() {
        let g = gradient(t, p);
        for j in 0..N_PARAMS {
            jac[(i, j)] = g[j];
        }
    }
    jac
}

/// Estimate the parameter covariance from the residual sum of squares.
///
/// Returns `None` when there are no residual degrees of freedom or `JᵀJ`
/// cannot be inverted to a usable covariance.
pub fn estimate_uncertainty(
    times: &[f64],
    p: &GrowthParameters,
    chi_square: f64,
) -> Option<ParameterUncertainty> {
    let dof = times.len().checked_sub(N_PARAMS).filter(|&d| d > 0)?;
    if !chi_square.is_finite() {
        return None;
    }

    let jac = model_jacobian(times, p);
    let normal = jac.transpose() * &jac;
    let inv = invert_normal_matrix(&normal)?;
    let cov = inv * (chi_square / dof as f64);

    let mut covariance = [[0.0; N_PARAMS]; N_PARAMS];
    let mut correlation = [[0.0; N_PARAMS]; N_PARAMS];
    let std_err: Vec<f64> = (0..N_PARAMS).map(|i| cov[(i, i)].max(0.0).sqrt()).collect();

    for i in 0..N_PARAMS {
        for j in 0..N_PARAMS {
            covariance[i][j] = cov[(i, j)];
            let denom = std_err[i] * std_err[j];
            correlation[i][j] = if i == j {
                1.0
            } else if denom > 0.0 {
                cov[(i, j)] / denom
            } else {
                0.0
            };
        }
    }

    Some(ParameterUncertainty {
        std_errors: GrowthParameters::new(std_err[0], std_err[1], std_err[2]),
        covariance,
        correlation,
    })
}

/// Propagate the covariance through the model at each time point.
///
/// Returns `None` if the Student-t quantile is undefined (no degrees of
/// freedom) or any half-width comes out non-finite.
pub fn confidence_band(
    times: &[f64],
    p: &GrowthParameters,
    uncertainty: &ParameterUncertainty,
    confidence: ConfidenceLevel,
    n_points: usize,
) -> Option<UncertaintyBand> {
    let dof = n_points.checked_sub(N_PARAMS).filter(|&d| d > 0)? as f64;
    let prob = confidence.probability();
    let scale = student_t_quantile((1.0 + prob) / 2.0, dof);
    if !scale.is_finite() {
        return None;
    }

    let cov = DMatrix::from_fn(N_PARAMS, N_PARAMS, |i, j| uncertainty.covariance[i][j]);
    let mut points = Vec::with_capacity(times.len());
    for &time in times {
        let g = DVector::from_row_slice(&gradient(time, p));
        let variance = g.dot(&(&cov * &g)).max(0.0);
        let half_width = scale * variance.sqrt();
        if !half_width.is_finite() {
            return None;
        }
        points.push(BandPoint { time, half_width });
    }

    Some(UncertaintyBand {
        confidence: prob,
        points,
    })
}
