//! Numerical building blocks: bounded nonlinear least squares and statistics.

pub mod bounds;
pub mod linalg;
pub mod lm;
pub mod stats;

pub use bounds::*;
pub use linalg::*;
pub use lm::*;
pub use stats::*;
