//! Small statistics helpers: replicate summaries and Student-t quantiles.
//!
//! The t quantile is needed to turn a parameter covariance into a confidence
//! band with `n - p` degrees of freedom. It is computed by bisection on the
//! t CDF, which is expressed through the regularized incomplete beta function
//! (continued-fraction evaluation, modified Lentz).

/// Arithmetic mean (NaN for an empty slice).
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation with `n - 1` in the denominator.
///
/// Undefined (NaN) for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() as f64 - 1.0)).sqrt()
}

const CF_MAX_ITER: usize = 300;
const CF_EPS: f64 = 1e-15;
const CF_TINY: f64 = 1e-300;

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let guard = |v: f64| if v.abs() < CF_TINY { CF_TINY } else { v };

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=CF_MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        // Even step.
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        // Odd step.
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function `I_x(a, b)`.
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = libm::lgamma(a + b) - libm::lgamma(a) - libm::lgamma(b)
        + a * x.ln()
        + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fastest below the distribution mean;
    // use the symmetry relation above it.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// CDF of Student's t distribution with `dof` degrees of freedom.
pub fn student_t_cdf(t: f64, dof: f64) -> f64 {
    let x = dof / (dof + t * t);
    let tail = 0.5 * regularized_incomplete_beta(dof / 2.0, 0.5, x);
    if t >= 0.0 { 1.0 - tail } else { tail }
}

/// Quantile (inverse CDF) of Student's t distribution.
///
/// Returns NaN for `p` outside `(0, 1)` or non-positive degrees of freedom.
pub fn student_t_quantile(p: f64, dof: f64) -> f64 {
    if !(p > 0.0 && p < 1.0 && dof > 0.0) {
        return f64::NAN;
    }
    if p == 0.5 {
        return 0.0;
    }
    if p < 0.5 {
        return -student_t_quantile(1.0 - p, dof);
    }

    let mut hi = 1.0;
    while student_t_cdf(hi, dof) < p {
        hi *= 2.0;
        if !hi.is_finite() {
            return f64::INFINITY;
        }
    }

    let mut lo = 0.0;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if student_t_cdf(mid, dof) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-12 * hi.max(1.0) {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sample_std_uses_n_minus_one() {
        assert_abs_diff_eq!(sample_std(&[1.0, 2.0, 3.0, 4.0]), 1.2909944487, epsilon = 1e-9);
        assert!(sample_std(&[5.0]).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn t_quantiles_match_tables() {
        assert_abs_diff_eq!(student_t_quantile(0.975, 10.0), 2.228139, epsilon = 1e-5);
        assert_abs_diff_eq!(student_t_quantile(0.975, 1.0), 12.7062, epsilon = 1e-3);
        assert_abs_diff_eq!(student_t_quantile(0.995, 5.0), 4.032143, epsilon = 1e-5);
        assert_abs_diff_eq!(student_t_quantile(0.025, 10.0), -2.228139, epsilon = 1e-5);
    }

    #[test]
    fn t_quantile_approaches_normal_for_large_dof() {
        assert_abs_diff_eq!(student_t_quantile(0.975, 1000.0), 1.962339, epsilon = 1e-5);
    }

    #[test]
    fn t_quantile_rejects_bad_inputs() {
        assert!(student_t_quantile(1.0, 5.0).is_nan());
        assert!(student_t_quantile(0.9, 0.0).is_nan());
    }
}
