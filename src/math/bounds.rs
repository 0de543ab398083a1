//! Lower-bound parameter transform.
//!
//! The solver works on unconstrained *internal* parameters `u`; the model sees
//! *external* parameters
//!
//! ```text
//! x = min - 1 + sqrt(u² + 1)
//! ```
//!
//! which can never drop below `min`. The map is smooth, so the Jacobian with
//! respect to `u` is the model Jacobian scaled by `dx/du = u / sqrt(u² + 1)`.

/// A one-sided (lower) bound on a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowerBound {
    pub min: f64,
}

impl LowerBound {
    pub fn new(min: f64) -> Self {
        Self { min }
    }

    /// External → internal. Values below the bound are clamped onto it.
    pub fn to_internal(self, x: f64) -> f64 {
        let shifted = (x - self.min + 1.0).max(1.0);
        (shifted * shifted - 1.0).sqrt()
    }

    /// Internal → external.
    pub fn to_external(self, u: f64) -> f64 {
        self.min - 1.0 + (u * u + 1.0).sqrt()
    }

    /// `dx/du` at internal value `u`.
    pub fn derivative(self, u: f64) -> f64 {
        u / (u * u + 1.0).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transform_round_trips_above_bound() {
        let b = LowerBound::new(0.0);
        for &x in &[0.1, 1.0, 20.0, 1e4] {
            assert_relative_eq!(b.to_external(b.to_internal(x)), x, max_relative = 1e-12);
        }
    }

    #[test]
    fn external_never_drops_below_bound() {
        let b = LowerBound::new(2.5);
        for &u in &[-1e6, -3.0, 0.0, 0.5, 1e3] {
            assert!(b.to_external(u) >= 2.5);
        }
        assert_eq!(b.to_internal(1.0), 0.0);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let b = LowerBound::new(-1.0);
        let u = 0.7;
        let h = 1e-6;
        let fd = (b.to_external(u + h) - b.to_external(u - h)) / (2.0 * h);
        assert_relative_eq!(b.derivative(u), fd, max_relative = 1e-6);
    }
}
