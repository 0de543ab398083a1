//! Input/output helpers.
//!
//! - windowed reads from CSV "workbooks" (`table`)
//! - plate-reader export layout (`plate`)
//! - best-fit / report / series exports (`export`)
//! - fit-results JSON read/write (`results`)

pub mod export;
pub mod plate;
pub mod results;
pub mod table;

pub use export::*;
pub use plate::*;
pub use results::*;
pub use table::*;
