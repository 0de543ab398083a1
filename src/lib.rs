//! `growth-curves` library crate.
//!
//! The binary (`growth`) is a thin wrapper around this library so that:
//!
//! - normalization, aggregation and fitting are testable without spawning processes
//! - the fitter can be driven from other tools with in-memory tables
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
