//! Sigmoidal growth model (modified Gompertz form).
//!
//! ```text
//! value(t; A, B, C) = A · exp( −exp( (B·e / A)·(C − t) + 1 ) )
//! ```
//!
//! - `A`: asymptotic maximum
//! - `B`: maximum growth rate (slope at the inflection point)
//! - `C`: lag time; the inflection sits at `C + A/(B·e)` where value = `A/e`
//!
//! The fitter needs two primitives, both implemented here:
//! - evaluate the curve (residuals, best-fit curve)
//! - evaluate `∂value/∂(A, B, C)` (solver Jacobian, uncertainty band)

use std::f64::consts::E;

use crate::domain::{CurvePoint, GrowthParameters};

/// Evaluate the growth curve.
///
/// Returns NaN when the rate coefficient `B·e/A` is not finite (`A → 0`),
/// so the solver sees a failed evaluation instead of a flat zero curve.
/// Callers that need a checked value use [`try_value`].
pub fn value(t: f64, p: &GrowthParameters) -> f64 {
    let k = p.b * E / p.a;
    if !k.is_finite() {
        return f64::NAN;
    }
    p.a * (-(k * (p.c - t) + 1.0).exp()).exp()
}

/// Evaluate the growth curve, rejecting non-finite results.
pub fn try_value(t: f64, p: &GrowthParameters) -> Option<f64> {
    let v = value(t, p);
    v.is_finite().then_some(v)
}

/// Partial derivatives `[∂/∂A, ∂/∂B, ∂/∂C]` at time `t`.
pub fn gradient(t: f64, p: &GrowthParameters) -> [f64; 3] {
    let dt = p.c - t;
    let u = (p.b * E / p.a) * dt + 1.0;
    let eu = u.exp();
    if !eu.is_finite() {
        // Deep in the lag phase the curve is flat to machine precision.
        return [0.0; 3];
    }
    let g = (-eu).exp();

    [
        g + g * eu * p.b * E * dt / p.a,
        -g * eu * E * dt,
        -g * eu * p.b * E,
    ]
}

/// Evaluate the curve at each time point.
pub fn evaluate(times: &[f64], p: &GrowthParameters) -> Vec<CurvePoint> {
    times
        .iter()
        .map(|&time| CurvePoint {
            time,
            value: value(time, p),
        })
        .collect()
}
