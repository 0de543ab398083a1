//! Reporting utilities: fit diagnostics and run summaries.

pub mod format;

pub use format::*;
