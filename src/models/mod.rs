//! Growth-curve model.
//!
//! The system supports exactly one curve family, implemented as small pure
//! functions so the fitter and the uncertainty code can share them.

pub mod gompertz;

pub use gompertz::*;
