//! Run configuration.
//!
//! Every tunable default lives here as a named field. The CLI builds these
//! structs from flags; the core only ever receives them as arguments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{GrowthParameters, JoinMode, TimeUnit};
use crate::error::KineticsError;

/// Wells read per plate-reader sheet.
pub const DEFAULT_WELLS: usize = 4;
/// Spreadsheet columns holding the absorbance block.
pub const DEFAULT_PLATE_COLUMNS: &str = "A:AE";
/// Optical-density channels (wavelengths, nm).
pub const DEFAULT_OD_CHANNELS: [&str; 3] = ["440", "680", "800"];
/// Channels fitted when none are requested.
pub const DEFAULT_FIT_CHANNELS: [&str; 1] = ["800"];
/// Initial guess `(A, B, C)`.
pub const DEFAULT_INITIAL_GUESS: GrowthParameters = GrowthParameters::new(0.1, 0.1, 20.0);
/// Lower bounds `(A, B, C)`; there are no upper bounds.
pub const DEFAULT_LOWER_BOUNDS: GrowthParameters = GrowthParameters::new(0.0, 0.0, 0.0);
/// Two-sided probability of the uncertainty band (2σ).
pub const DEFAULT_CONFIDENCE: f64 = 0.9545;

/// An inclusive, 0-based range of spreadsheet columns (`"A:AE"`, `"B"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub first: usize,
    pub last: usize,
}

/// Convert spreadsheet column letters (`"A"`, `"AE"`) to a 0-based index.
pub fn column_index(letters: &str) -> Option<usize> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut idx = 0usize;
    for c in letters.chars() {
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        idx = idx.checked_mul(26)?.checked_add(digit)?;
    }
    Some(idx - 1)
}

/// Convert a 0-based column index back to spreadsheet letters.
pub fn column_letters(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.iter().rev().collect()
}

impl FromStr for ColumnRange {
    type Err = KineticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KineticsError::data_format("column range", s, "letters like `A:AE` or `B`");
        let (first, last) = match s.split_once(':') {
            Some((a, b)) => (column_index(a), column_index(b)),
            None => (column_index(s), column_index(s)),
        };
        match (first, last) {
            (Some(first), Some(last)) if first <= last => Ok(Self { first, last }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ColumnRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", column_letters(self.first))
        } else {
            write!(f, "{}:{}", column_letters(self.first), column_letters(self.last))
        }
    }
}

/// Fixed layout of a plate-reader export sheet.
///
/// Row indices are 0-based positions in the raw sheet grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateLayout {
    /// Number of well rows below the absorbance header.
    pub n_wells: usize,
    /// Columns of the absorbance block.
    pub columns: ColumnRange,
    /// Row holding the absorbance header (`Wavel.`, wavelengths...).
    pub header_row: usize,
    /// Row of the cell holding the read's date-time.
    pub timestamp_row: usize,
    /// Column of the cell holding the read's date-time.
    pub timestamp_column: usize,
    /// Header label of the well column in the raw export.
    pub well_header: String,
}

impl Default for PlateLayout {
    fn default() -> Self {
        Self {
            n_wells: DEFAULT_WELLS,
            columns: ColumnRange { first: 0, last: 30 },
            header_row: 31,
            timestamp_row: 28,
            timestamp_column: 1,
            well_header: "Wavel.".to_string(),
        }
    }
}

/// Location of the optional well → sample key block inside each sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyLayout {
    pub header_row: usize,
    pub n_rows: usize,
    pub columns: ColumnRange,
}

/// Settings for merging plate-reader batches into one series.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeConfig {
    /// Value columns to keep. Empty means "every column except the well".
    pub channels: Vec<String>,
    /// Grouping key shared by readings and the key block.
    pub well_column: String,
    /// Key-block column holding the sample identity.
    pub sample_column: String,
    pub join: JoinMode,
    pub time_unit: TimeUnit,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_OD_CHANNELS.iter().map(|c| c.to_string()).collect(),
            well_column: "well".to_string(),
            sample_column: "sample".to_string(),
            join: JoinMode::Left,
            time_unit: TimeUnit::Days,
        }
    }
}

/// Settings for the dry-weight replicate summary.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomassConfig {
    pub type_column: String,
    pub concentration_column: String,
    pub timestamp_column: String,
    /// Only rows of this sample type are aggregated (volatile suspended solids).
    pub sample_type: String,
    /// Unit of elapsed time; seconds unless the caller asks otherwise.
    pub time_unit: TimeUnit,
}

impl Default for BiomassConfig {
    fn default() -> Self {
        Self {
            type_column: "type".to_string(),
            concentration_column: "Biomass (g/L)".to_string(),
            timestamp_column: "date".to_string(),
            sample_type: "VSS".to_string(),
            time_unit: TimeUnit::Seconds,
        }
    }
}

/// Two-sided confidence probability for the uncertainty band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceLevel(f64);

impl ConfidenceLevel {
    pub fn from_probability(p: f64) -> Result<Self, KineticsError> {
        if p.is_finite() && p > 0.0 && p < 1.0 {
            Ok(Self(p))
        } else {
            Err(KineticsError::data_format(
                "confidence level",
                p.to_string(),
                "a probability in (0, 1)",
            ))
        }
    }

    /// Probability covered by `±sigma` of a normal distribution.
    pub fn from_sigma(sigma: f64) -> Result<Self, KineticsError> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(KineticsError::data_format(
                "confidence sigma",
                sigma.to_string(),
                "a positive number",
            ));
        }
        Self::from_probability(libm::erf(sigma / std::f64::consts::SQRT_2))
    }

    /// Values below 1 are probabilities, values from 1 up are sigma multiples.
    pub fn parse(value: f64) -> Result<Self, KineticsError> {
        if value < 1.0 {
            Self::from_probability(value)
        } else {
            Self::from_sigma(value)
        }
    }

    pub fn probability(self) -> f64 {
        self.0
    }
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE)
    }
}

/// Settings for the growth-curve fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub channels: Vec<String>,
    pub initial_guess: GrowthParameters,
    pub lower_bounds: GrowthParameters,
    pub confidence: ConfidenceLevel,
    /// Model evaluation budget for each channel.
    pub max_evaluations: usize,
    /// Relative sum-of-squares reduction tolerance.
    pub ftol: f64,
    /// Relative step-size tolerance.
    pub xtol: f64,
    /// Gradient (max-norm) tolerance.
    pub gtol: f64,
    /// Fit channels on the rayon pool.
    pub parallel: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_FIT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            initial_guess: DEFAULT_INITIAL_GUESS,
            lower_bounds: DEFAULT_LOWER_BOUNDS,
            confidence: ConfidenceLevel::default(),
            max_evaluations: 2000 * (3 + 1),
            ftol: 1.5e-8,
            xtol: 1.5e-8,
            gtol: 0.0,
            parallel: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn column_range_parses_default_plate_block() {
        let range: ColumnRange = DEFAULT_PLATE_COLUMNS.parse().unwrap();
        assert_eq!(range, ColumnRange { first: 0, last: 30 });
        assert_eq!(range.to_string(), "A:AE");
        assert_eq!(PlateLayout::default().columns, range);
    }

    #[test]
    fn column_range_single_and_invalid() {
        assert_eq!("b".parse::<ColumnRange>().unwrap(), ColumnRange { first: 1, last: 1 });
        assert!("C:A".parse::<ColumnRange>().is_err());
        assert!("A1:B2".parse::<ColumnRange>().is_err());
        assert_eq!(column_letters(column_index("ZZ").unwrap()), "ZZ");
    }

    #[test]
    fn confidence_from_two_sigma() {
        let level = ConfidenceLevel::from_sigma(2.0).unwrap();
        assert_abs_diff_eq!(level.probability(), 0.9545, epsilon = 1e-4);
        assert_eq!(ConfidenceLevel::parse(0.9545).unwrap(), ConfidenceLevel::default());
        assert!(ConfidenceLevel::from_probability(1.5).is_err());
    }
}
