//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the normalized series (`TimeSeries`) and its input rows (`RawReading`)
//! - dry-weight replicate summaries (`AggregatedSample`, `BiomassSeries`)
//! - growth-model parameters and fit outputs (`GrowthParameters`, `FitResult`)
//! - run configuration with documented defaults (`config`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
