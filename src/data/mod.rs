//! Data preparation: plate-reader normalization, dry-weight aggregation and
//! synthetic series.

pub mod biomass;
pub mod normalize;
pub mod synthetic;

pub use biomass::*;
pub use normalize::*;
pub use synthetic::*;
