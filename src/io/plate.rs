//! Plate-reader export layout.
//!
//! Each sheet of an export holds one read:
//! - the read's date-time in a single cell above the data
//! - an absorbance block (`Wavel.` header, one row per well)
//! - optionally a well → sample key block
//!
//! This module only cuts those pieces out of the raw grid; parsing and
//! validation happen in the normalizer so errors carry one taxonomy.

use std::path::PathBuf;

use log::info;

use crate::data::normalize::{RawBatch, WELL_COLUMN};
use crate::domain::{KeyLayout, PlateLayout};
use crate::error::AppError;
use crate::io::table::{ReadWindow, SheetSource, Table, open_sheet_source};

/// Cut one [`RawBatch`] out of every section of a source.
pub fn read_plate_batches(
    source: &dyn SheetSource,
    plate: &PlateLayout,
    keys: Option<&KeyLayout>,
) -> Result<Vec<RawBatch>, AppError> {
    let data_window = ReadWindow {
        header_row: plate.header_row,
        n_rows: Some(plate.n_wells),
        columns: Some(plate.columns),
    };
    let key_window = keys.map(|k| ReadWindow {
        header_row: k.header_row,
        n_rows: Some(k.n_rows),
        columns: Some(k.columns),
    });

    let mut batches = Vec::new();
    for section in source.sections() {
        let grid = source.grid(&section)?;

        // A missing cell is left empty and rejected by the normalizer.
        let timestamp = grid
            .get(plate.timestamp_row)
            .and_then(|row| row.get(plate.timestamp_column))
            .map(|cell| cell.trim().to_string())
            .unwrap_or_default();

        let mut readings = Table::from_grid(&grid, &data_window);
        readings.rename(&plate.well_header, WELL_COLUMN);

        batches.push(RawBatch {
            source: format!("{}:{section}", source.name()),
            timestamp,
            readings,
            keys: key_window.as_ref().map(|w| Table::from_grid(&grid, w)),
        });
    }
    Ok(batches)
}

/// Read every export workbook (`.xlsx`, `.csv` or a directory of sheets) and
/// pool the batches.
pub fn load_plate_exports(
    paths: &[PathBuf],
    plate: &PlateLayout,
    keys: Option<&KeyLayout>,
) -> Result<Vec<RawBatch>, AppError> {
    let mut batches = Vec::new();
    for path in paths {
        let workbook = open_sheet_source(path)?;
        let read = read_plate_batches(workbook.as_ref(), plate, keys)?;
        info!("{}: {} plate reads", path.display(), read.len());
        batches.extend(read);
    }
    Ok(batches)
}
