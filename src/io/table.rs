//! Windowed tabular reads.
//!
//! Instrument exports carry fixed-layout metadata blocks above and below the
//! data region, so reads select a header row, a row count and a column range
//! out of a raw cell grid.
//!
//! Design goals:
//! - **Untyped cells**: a `Table` holds strings; consumers parse them so a bad
//!   number becomes a `DataFormat` error with row/column context
//! - **Pluggable sources**: anything that yields named sections of cell grids
//!   implements [`SheetSource`]; CSV files (one per sheet) and spreadsheet
//!   workbooks (`.xlsx`, `.xls`, `.ods`) are built in

use std::fs::File;
use std::path::{Path, PathBuf};

use calamine::{Data, DataType, Reader, open_workbook_auto};

use crate::domain::{ColumnRange, format_timestamp};
use crate::error::{AppError, KineticsError};

/// Raw cell grid of one section (rows of cells, ragged rows allowed).
pub type Grid = Vec<Vec<String>>;

/// Header names plus string cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table; rows are padded or cut to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Select a window out of a raw grid.
    ///
    /// Columns with a blank header are dropped; rows that are blank across
    /// the whole window are skipped.
    pub fn from_grid(grid: &[Vec<String>], window: &ReadWindow) -> Self {
        let header_cells = grid.get(window.header_row).map(Vec::as_slice).unwrap_or(&[]);
        let last = match window.columns {
            Some(range) => range.last,
            None => grid.iter().map(Vec::len).max().unwrap_or(0).saturating_sub(1),
        };
        let first = window.columns.map(|r| r.first).unwrap_or(0);

        let kept: Vec<usize> = (first..=last)
            .filter(|&c| header_cells.get(c).is_some_and(|h| !h.trim().is_empty()))
            .collect();
        let headers = kept.iter().map(|&c| header_cells[c].trim().to_string()).collect();

        let rows = grid
            .iter()
            .skip(window.header_row + 1)
            .take(window.n_rows.unwrap_or(usize::MAX))
            .map(|row| {
                kept.iter()
                    .map(|&c| row.get(c).map(|v| v.trim().to_string()).unwrap_or_default())
                    .collect::<Vec<_>>()
            })
            .filter(|row| row.iter().any(|v| !v.is_empty()))
            .collect();

        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column that must exist.
    pub fn require_column(&self, name: &str, context: &str) -> Result<usize, KineticsError> {
        self.column(name).ok_or_else(|| KineticsError::schema(context, name))
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows[row][col].as_str()
    }

    /// Parse a numeric cell. Blank cells are missing values (NaN).
    pub fn number(&self, row: usize, col: usize, context: &str) -> Result<f64, KineticsError> {
        let raw = self.cell(row, col);
        if raw.is_empty() {
            return Ok(f64::NAN);
        }
        raw.parse::<f64>().map_err(|_| {
            KineticsError::data_format(
                format!("{context}, row {}, column `{}`", row + 1, self.headers[col]),
                raw,
                "a number",
            )
        })
    }

    /// Rename a header in place (no-op if absent).
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column(from) {
            self.headers[idx] = to.to_string();
        }
    }
}

/// Header-row offset, fixed row count and column range of a read.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadWindow {
    /// 0-based row holding the column names.
    pub header_row: usize,
    /// Data rows below the header (`None` = until the end of the grid).
    pub n_rows: Option<usize>,
    /// Columns to keep (`None` = all).
    pub columns: Option<ColumnRange>,
}

/// A source of named sections ("sheets"), each a raw cell grid.
pub trait SheetSource {
    /// Human-readable origin (for logs and error messages).
    fn name(&self) -> &str;

    /// Section names in read order.
    fn sections(&self) -> Vec<String>;

    fn grid(&self, section: &str) -> Result<Grid, AppError>;
}

/// A "workbook" of CSV files.
///
/// A single `.csv` file is a workbook with one section named after its stem;
/// a directory is a workbook whose sections are its `*.csv` files, sorted by
/// file name.
#[derive(Debug, Clone)]
pub struct CsvWorkbook {
    name: String,
    sections: Vec<(String, PathBuf)>,
}

impl CsvWorkbook {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let name = path.display().to_string();
        let sections = if path.is_dir() {
            let entries = std::fs::read_dir(path)
                .map_err(|e| AppError::new(2, format!("Failed to list workbook '{name}': {e}")))?;
            let mut files = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| AppError::new(2, format!("Failed to list workbook '{name}': {e}")))?;
                let p = entry.path();
                if p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
                    files.push((section_name(&p), p));
                }
            }
            files.sort();
            files
        } else {
            vec![(section_name(path), path.to_path_buf())]
        };

        if sections.is_empty() {
            return Err(AppError::new(2, format!("Workbook '{name}' contains no CSV sheets.")));
        }
        Ok(Self { name, sections })
    }
}

impl SheetSource for CsvWorkbook {
    fn name(&self) -> &str {
        &self.name
    }

    fn sections(&self) -> Vec<String> {
        self.sections.iter().map(|(s, _)| s.clone()).collect()
    }

    fn grid(&self, section: &str) -> Result<Grid, AppError> {
        let (_, path) = self
            .sections
            .iter()
            .find(|(s, _)| s == section)
            .ok_or_else(|| AppError::new(2, format!("Workbook '{}' has no sheet '{section}'.", self.name)))?;
        read_grid(path)
    }
}

fn section_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// File extensions read through [`ExcelWorkbook`].
const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// A spreadsheet workbook; sections are its sheets in workbook order.
///
/// Cells are rendered to strings the way a CSV export would hold them; date
/// cells use the instrument's timestamp pattern.
#[derive(Debug, Clone)]
pub struct ExcelWorkbook {
    name: String,
    path: PathBuf,
    sections: Vec<String>,
}

impl ExcelWorkbook {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let name = path.display().to_string();
        let workbook = open_workbook_auto(path)
            .map_err(|e| AppError::new(2, format!("Failed to open workbook '{name}': {e}")))?;
        let sections = workbook.sheet_names();
        if sections.is_empty() {
            return Err(AppError::new(2, format!("Workbook '{name}' contains no sheets.")));
        }
        Ok(Self {
            name,
            path: path.to_path_buf(),
            sections,
        })
    }
}

impl SheetSource for ExcelWorkbook {
    fn name(&self) -> &str {
        &self.name
    }

    fn sections(&self) -> Vec<String> {
        self.sections.clone()
    }

    fn grid(&self, section: &str) -> Result<Grid, AppError> {
        let mut workbook = open_workbook_auto(&self.path)
            .map_err(|e| AppError::new(2, format!("Failed to open workbook '{}': {e}", self.name)))?;
        let range = workbook
            .worksheet_range(section)
            .map_err(|e| AppError::new(2, format!("Failed to read sheet '{section}' of '{}': {e}", self.name)))?;

        // Ranges start at the first used cell; pad so indices match sheet positions.
        let Some((first_row, first_col)) = range.start() else {
            return Ok(Grid::new());
        };
        let mut grid: Grid = vec![Vec::new(); first_row as usize];
        for row in range.rows() {
            let mut cells = vec![String::new(); first_col as usize];
            cells.extend(row.iter().map(cell_text));
            grid.push(cells);
        }
        Ok(grid)
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|ts| format_timestamp(&ts))
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}

/// Open a path as a sheet source: spreadsheet files by extension, anything
/// else (a `.csv` file or a directory of them) as a [`CsvWorkbook`].
pub fn open_sheet_source(path: &Path) -> Result<Box<dyn SheetSource>, AppError> {
    let is_spreadsheet = path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SPREADSHEET_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)));
    if is_spreadsheet {
        Ok(Box::new(ExcelWorkbook::open(path)?))
    } else {
        Ok(Box::new(CsvWorkbook::open(path)?))
    }
}

/// Read a CSV file as a raw grid (no header interpretation).
pub fn read_grid(path: &Path) -> Result<Grid, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut grid = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            AppError::new(2, format!("Failed to read '{}' line {}: {e}", path.display(), line + 1))
        })?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

/// Read a plain CSV table whose first row is the header.
pub fn load_table(path: &Path) -> Result<Table, AppError> {
    let grid = read_grid(path)?;
    Ok(Table::from_grid(&grid, &ReadWindow::default()))
}

/// Read every section of a source with the same window.
pub fn read_sections(source: &dyn SheetSource, window: &ReadWindow) -> Result<Vec<(String, Table)>, AppError> {
    source
        .sections()
        .into_iter()
        .map(|section| {
            let grid = source.grid(&section)?;
            Ok((section, Table::from_grid(&grid, window)))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    pub(crate) fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("growth-curves-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn window_selects_header_rows_and_columns() {
        let g = grid(&[
            &["meta", "x", "", ""],
            &["", "Wavel.", "440", "800", "junk"],
            &["", "A1", "0.1", "0.2", "z"],
            &["", "A2", "0.3", "0.4", "z"],
            &["", "A3", "0.5", "0.6", "z"],
        ]);
        let window = ReadWindow {
            header_row: 1,
            n_rows: Some(2),
            columns: Some("B:D".parse().unwrap()),
        };
        let t = Table::from_grid(&g, &window);
        assert_eq!(t.headers(), &["Wavel.", "440", "800"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(1, 2), "0.4");
    }

    #[test]
    fn blank_headers_and_rows_are_dropped() {
        let g = grid(&[&["a", "", "b"], &["1", "x", "2"], &["", "", ""], &["3", "y"]]);
        let t = Table::from_grid(&g, &ReadWindow::default());
        assert_eq!(t.headers(), &["a", "b"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(1, 1), "");
    }

    #[test]
    fn number_reports_row_and_column() {
        let t = Table::new(vec!["800".into()], vec![vec!["0.5".into()], vec!["".into()], vec!["n/a".into()]]);
        assert_eq!(t.number(0, 0, "batch").unwrap(), 0.5);
        assert!(t.number(1, 0, "batch").unwrap().is_nan());
        let err = t.number(2, 0, "batch").unwrap_err();
        assert!(err.is_data_format());
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn require_column_is_a_schema_error() {
        let t = Table::new(vec!["well".into()], vec![]);
        assert_eq!(t.require_column("well", "keys").unwrap(), 0);
        assert!(t.require_column("800", "keys").unwrap_err().is_schema());
    }

    #[test]
    fn directory_workbook_lists_sorted_csv_sections() {
        let dir = temp_dir("workbook");
        std::fs::write(dir.join("b_read.csv"), "x,y\n1,2\n").unwrap();
        std::fs::write(dir.join("a_read.csv"), "x,y\n3,4\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let wb = CsvWorkbook::open(&dir).unwrap();
        assert_eq!(wb.sections(), vec!["a_read".to_string(), "b_read".to_string()]);

        let tables = read_sections(&wb, &ReadWindow::default()).unwrap();
        assert_eq!(tables[0].1.cell(0, 1), "4");

        let single = CsvWorkbook::open(&dir.join("b_read.csv")).unwrap();
        assert_eq!(single.sections(), vec!["b_read".to_string()]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn spreadsheet_cells_keep_their_sheet_positions() {
        let dir = temp_dir("xlsx");
        let path = dir.join("reads.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Read 1").unwrap();
        sheet.write_string(2, 1, "Wavel.").unwrap();
        sheet.write_number(2, 2, 440).unwrap();
        sheet.write_string(3, 1, "A1").unwrap();
        sheet.write_number(3, 2, 0.25).unwrap();
        workbook.add_worksheet().set_name("Read 2").unwrap();
        workbook.save(&path).unwrap();

        let source = open_sheet_source(&path).unwrap();
        assert_eq!(source.sections(), vec!["Read 1".to_string(), "Read 2".to_string()]);

        let g = source.grid("Read 1").unwrap();
        assert_eq!(g.len(), 4);
        assert!(g[0].is_empty());
        assert_eq!(g[2], vec!["", "Wavel.", "440"]);

        let window = ReadWindow {
            header_row: 2,
            n_rows: Some(1),
            columns: Some("B:C".parse().unwrap()),
        };
        let t = Table::from_grid(&g, &window);
        assert_eq!(t.headers(), &["Wavel.", "440"]);
        assert_eq!(t.number(0, 1, "read").unwrap(), 0.25);

        assert!(source.grid("Read 2").unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
