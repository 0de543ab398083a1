//! Bounded Levenberg–Marquardt least squares.
//!
//! Minimizes `Σ r_i(x)²` subject to `x_j >= min_j`.
//!
//! Implementation choices:
//! - Bounds are handled by the smooth transform in [`crate::math::bounds`];
//!   the iteration itself is unconstrained in the internal parameters.
//! - Marquardt damping `JᵀJ + λ·diag(JᵀJ)`: λ shrinks ×10 after an accepted
//!   step and grows ×10 after a rejected one.
//! - A trial point with non-finite residuals is treated like a rejected step,
//!   so the solver backs off instead of propagating NaN.
//! - No randomness anywhere: identical inputs give identical iterates.

use nalgebra::{DMatrix, DVector};

use crate::domain::Termination;
use crate::error::ConvergenceFailure;
use crate::math::bounds::LowerBound;
use crate::math::linalg::damped_step;

const INITIAL_LAMBDA: f64 = 1e-3;
const MIN_LAMBDA: f64 = 1e-12;
const MAX_LAMBDA: f64 = 1e16;

/// A nonlinear least-squares problem `r(x) = model(x) - observed`.
pub trait LeastSquaresProblem {
    fn n_residuals(&self) -> usize;

    /// Fill `out` with residuals at external parameters `x`.
    fn residuals(&self, x: &[f64], out: &mut [f64]);

    /// Fill `out` (`n_residuals × x.len()`) with `∂r_i/∂x_j`.
    fn jacobian(&self, x: &[f64], out: &mut DMatrix<f64>);
}

/// Solver budget and stopping tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmOptions {
    pub max_evaluations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
}

/// A converged solution.
#[derive(Debug, Clone, PartialEq)]
pub struct LmOutcome {
    /// External (bounded) parameters.
    pub x: Vec<f64>,
    /// Sum of squared residuals.
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Minimize the problem from `x0` with per-parameter lower bounds.
pub fn minimize<P: LeastSquaresProblem>(
    problem: &P,
    x0: &[f64],
    lower: &[f64],
    opts: &LmOptions,
) -> Result<LmOutcome, ConvergenceFailure> {
    let p = x0.len();
    let n = problem.n_residuals();
    let bounds: Vec<LowerBound> = lower.iter().map(|&min| LowerBound::new(min)).collect();

    let mut u = DVector::from_iterator(p, x0.iter().zip(&bounds).map(|(&x, b)| b.to_internal(x)));
    let mut x = to_external(&bounds, &u);

    let mut r = DVector::<f64>::zeros(n);
    problem.residuals(&x, r.as_mut_slice());
    let mut evaluations = 1usize;
    if r.iter().any(|v| !v.is_finite()) {
        return Err(ConvergenceFailure::NonFiniteResiduals);
    }
    let mut cost = r.norm_squared();

    let mut lambda = INITIAL_LAMBDA;
    let mut jac = DMatrix::<f64>::zeros(n, p);
    let mut r_trial = DVector::<f64>::zeros(n);
    let mut iterations = 0usize;

    loop {
        if cost == 0.0 {
            return Ok(finish(x, cost, iterations, evaluations, Termination::ExactFit));
        }
        iterations += 1;

        // Jacobian w.r.t. internal parameters (chain rule through the bounds).
        problem.jacobian(&x, &mut jac);
        for (j, b) in bounds.iter().enumerate() {
            let scale = b.derivative(u[j]);
            jac.column_mut(j).scale_mut(scale);
        }
        // Overflowing exponentials only occur where the model is flat; a
        // zero entry is the correct limit there.
        jac.iter_mut().filter(|v| !v.is_finite()).for_each(|v| *v = 0.0);

        let jt = jac.transpose();
        let gradient = &jt * &r;
        let normal = &jt * &jac;

        if gradient.amax() <= opts.gtol {
            return Ok(finish(x, cost, iterations, evaluations, Termination::GradientTolerance));
        }

        // Inner loop: raise λ until a step reduces the cost.
        loop {
            if evaluations >= opts.max_evaluations {
                return Err(ConvergenceFailure::MaxEvaluations { evaluations });
            }

            let Some(step) = damped_step(&normal, &gradient, lambda) else {
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    return Err(ConvergenceFailure::NoProgress);
                }
                continue;
            };

            let u_trial = &u + &step;
            let x_trial = to_external(&bounds, &u_trial);
            problem.residuals(&x_trial, r_trial.as_mut_slice());
            evaluations += 1;
            let cost_trial = r_trial.norm_squared();

            // `!(a < b)` also rejects NaN.
            if !(cost_trial.is_finite() && cost_trial < cost) {
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    return Err(ConvergenceFailure::NoProgress);
                }
                continue;
            }

            let reduction = (cost - cost_trial) / cost;
            let step_ratio = step.norm() / (u.norm() + opts.xtol);

            u = u_trial;
            x = x_trial;
            std::mem::swap(&mut r, &mut r_trial);
            cost = cost_trial;
            lambda = (lambda / 10.0).max(MIN_LAMBDA);

            if cost == 0.0 {
                break;
            }
            if reduction <= opts.ftol {
                return Ok(finish(x, cost, iterations, evaluations, Termination::CostTolerance));
            }
            if step_ratio <= opts.xtol {
                return Ok(finish(x, cost, iterations, evaluations, Termination::StepTolerance));
            }
            break;
        }
    }
}

fn finish(
    x: Vec<f64>,
    cost: f64,
    iterations: usize,
    evaluations: usize,
    termination: Termination,
) -> LmOutcome {
    LmOutcome {
        x,
        cost,
        iterations,
        evaluations,
        termination,
    }
}

fn to_external(bounds: &[LowerBound], u: &DVector<f64>) -> Vec<f64> {
    bounds.iter().zip(u.iter()).map(|(b, &ui)| b.to_external(ui)).collect()
}
