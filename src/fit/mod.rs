//! Growth-curve fitting.
//!
//! Responsibilities:
//!
//! - fit the growth model to each requested channel (parallel over channels)
//! - estimate parameter covariance and the confidence band around the fit
//! - collect per-channel outcomes, keeping failures next to successes

pub mod fitter;
pub mod uncertainty;

pub use fitter::*;
pub use uncertainty::*;
