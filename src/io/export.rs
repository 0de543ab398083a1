//! CSV / workbook / text exports.
//!
//! - per-channel best-fit tables (CSV and one `.xlsx` sheet each) and
//!   diagnostic reports (`FitReportExporter`)
//! - the canonical normalized series (`date,time,well,sample,<channels>`),
//!   which can be read back for fitting

use std::fs::File;
use std::path::{Path, PathBuf};

use log::info;
use rust_xlsxwriter::{Workbook, XlsxError};

use crate::data::normalize::{DATE_COLUMN, SAMPLE_COLUMN, TIME_COLUMN, WELL_COLUMN, series_from_table};
use crate::domain::{ChannelFits, FitResult, TimeSeries, TimeUnit, format_timestamp};
use crate::error::AppError;
use crate::io::results::save_results;
use crate::io::table::load_table;

/// File name of the JSON written next to the per-channel exports.
pub const RESULTS_FILE: &str = "fit_results.json";
/// Workbook holding every converged channel's best-fit table.
pub const BEST_FIT_WORKBOOK: &str = "best_fit.xlsx";

const BEST_FIT_HEADER: [&str; 3] = ["time", "best_fit", "uncertainty"];
/// Excel's sheet-name length limit.
const MAX_SHEET_NAME: usize = 31;

/// Writes fit outputs into a directory.
///
/// Per converged channel:
/// - `best_fit_<channel>.csv` with `time,best_fit,uncertainty`
/// - `fit_<channel>_report.txt` with the optimizer report
///
/// plus `best_fit.xlsx` (the same tables, one sheet per channel) and one
/// `fit_results.json` holding every converged fit. Failed channels are
/// skipped; reporting them is the caller's job.
#[derive(Debug, Clone)]
pub struct FitReportExporter {
    out_dir: PathBuf,
}

impl FitReportExporter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Write every artifact; returns the paths written.
    pub fn export(&self, fits: &ChannelFits, unit: TimeUnit) -> Result<Vec<PathBuf>, AppError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to create output directory '{}': {e}", self.out_dir.display()),
            )
        })?;

        let converged: Vec<&FitResult> = fits.values().filter_map(|r| r.as_ref().ok()).collect();
        let mut written = Vec::new();
        for fit in &converged {
            let stem = file_stem(&fit.channel);

            let csv_path = self.out_dir.join(format!("best_fit_{stem}.csv"));
            write_best_fit_csv(&csv_path, fit)?;
            written.push(csv_path);

            let report_path = self.out_dir.join(format!("fit_{stem}_report.txt"));
            std::fs::write(&report_path, &fit.report).map_err(|e| {
                AppError::new(2, format!("Failed to write report '{}': {e}", report_path.display()))
            })?;
            written.push(report_path);
        }

        if !converged.is_empty() {
            let xlsx_path = self.out_dir.join(BEST_FIT_WORKBOOK);
            write_best_fit_workbook(&xlsx_path, &converged)?;
            written.push(xlsx_path);
        }

        let json_path = self.out_dir.join(RESULTS_FILE);
        save_results(&json_path, fits, unit)?;
        written.push(json_path);

        info!("exported {} files to {}", written.len(), self.out_dir.display());
        Ok(written)
    }
}

/// Channel names become part of file and sheet names; keep them portable.
fn file_stem(channel: &str) -> String {
    channel
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// `(time, best_fit, half_width)` rows of one fit; the half-width is absent
/// when no band could be estimated.
fn best_fit_rows(fit: &FitResult) -> impl Iterator<Item = (f64, f64, Option<f64>)> + '_ {
    fit.best_fit.iter().enumerate().map(|(i, point)| {
        let band = fit
            .uncertainty
            .as_ref()
            .and_then(|u| u.points.get(i))
            .map(|b| b.half_width);
        (point.time, point.value, band)
    })
}

fn csv_writer(path: &Path, what: &str) -> Result<csv::Writer<File>, AppError> {
    csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

/// Write `time,best_fit,uncertainty` for one fit.
pub fn write_best_fit_csv(path: &Path, fit: &FitResult) -> Result<(), AppError> {
    let mut writer = csv_writer(path, "export CSV")?;
    let row_err = |e: csv::Error| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display()));

    writer.write_record(BEST_FIT_HEADER).map_err(row_err)?;
    for (time, value, band) in best_fit_rows(fit) {
        let band = band.map(|b| b.to_string()).unwrap_or_default();
        writer
            .write_record([time.to_string(), value.to_string(), band])
            .map_err(row_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display())))
}

/// Write the best-fit tables of several fits into one workbook, one sheet per
/// channel.
pub fn write_best_fit_workbook(path: &Path, fits: &[&FitResult]) -> Result<(), AppError> {
    let xlsx_err = |e: XlsxError| AppError::new(2, format!("Failed to write workbook '{}': {e}", path.display()));

    let mut workbook = Workbook::new();
    for fit in fits {
        let sheet = workbook.add_worksheet();
        let name: String = file_stem(&fit.channel).chars().take(MAX_SHEET_NAME).collect();
        sheet.set_name(name).map_err(xlsx_err)?;

        for (col, header) in (0u16..).zip(BEST_FIT_HEADER) {
            sheet.write_string(0, col, header).map_err(xlsx_err)?;
        }
        for (row, (time, value, band)) in (1u32..).zip(best_fit_rows(fit)) {
            sheet.write_number(row, 0, time).map_err(xlsx_err)?;
            // Excel has no NaN; non-finite cells stay blank.
            if value.is_finite() {
                sheet.write_number(row, 1, value).map_err(xlsx_err)?;
            }
            if let Some(band) = band.filter(|b| b.is_finite()) {
                sheet.write_number(row, 2, band).map_err(xlsx_err)?;
            }
        }
    }
    workbook.save(path).map_err(xlsx_err)
}

/// Write a series as `date,time,well,sample,<channels...>`.
///
/// Missing timestamps, identities and non-finite values are written as empty
/// cells. Fields are quoted when needed, so sample names may hold commas.
pub fn write_time_series_csv(path: &Path, series: &TimeSeries) -> Result<(), AppError> {
    let mut writer = csv_writer(path, "series CSV")?;
    let row_err = |e: csv::Error| AppError::new(2, format!("Failed to write series CSV '{}': {e}", path.display()));

    let mut header = vec![DATE_COLUMN, TIME_COLUMN, WELL_COLUMN, SAMPLE_COLUMN];
    header.extend(series.channels().iter().map(String::as_str));
    writer.write_record(&header).map_err(row_err)?;

    for s in series.samples() {
        let mut cells = vec![
            s.timestamp().map(|t| format_timestamp(&t)).unwrap_or_default(),
            s.elapsed().to_string(),
            s.well().unwrap_or("").to_string(),
            s.sample_id().unwrap_or("").to_string(),
        ];
        cells.extend(
            s.values()
                .iter()
                .map(|v| if v.is_finite() { v.to_string() } else { String::new() }),
        );
        writer.write_record(&cells).map_err(row_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write series CSV '{}': {e}", path.display())))
}

/// Read a canonical series CSV (or any table with `date` or `time` plus
/// channel columns).
pub fn read_time_series_csv(path: &Path, channels: &[String], unit: TimeUnit) -> Result<TimeSeries, AppError> {
    let table = load_table(path)?;
    series_from_table(&table, channels, unit).map_err(|e| AppError::new(2, format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticConfig, generate_series};
    use crate::domain::FitConfig;
    use crate::fit::GrowthFitter;
    use crate::domain::RawReading;
    use crate::io::table::tests::temp_dir;
    use crate::io::table::{ExcelWorkbook, SheetSource};
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    #[test]
    fn series_csv_round_trips_through_dates() {
        let dir = temp_dir("series");
        let series = generate_series(&SyntheticConfig::default()).unwrap();
        let path = dir.join("series.csv");
        write_time_series_csv(&path, &series).unwrap();

        let back = read_time_series_csv(&path, &[], TimeUnit::Days).unwrap();
        assert_eq!(back.channels(), series.channels());
        assert_eq!(back.len(), series.len());
        for (a, b) in back.samples().iter().zip(series.samples()) {
            assert_abs_diff_eq!(a.elapsed(), b.elapsed(), epsilon = 1e-9);
            assert_eq!(a.values(), b.values());
            assert_eq!(a.sample_id(), Some("synthetic"));
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sample_names_with_commas_survive_the_series_csv() {
        let dir = temp_dir("series-quoting");
        let t0 = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap();
        let readings = vec![
            RawReading {
                timestamp: t0,
                well: Some("A1".to_string()),
                sample_id: Some("strain A, rep 1".to_string()),
                values: vec![0.5],
            },
            RawReading {
                timestamp: t0 + chrono::TimeDelta::hours(12),
                well: Some("A2".to_string()),
                sample_id: Some("say \"hi\"".to_string()),
                values: vec![0.75],
            },
        ];
        let series = TimeSeries::from_readings(vec!["800".to_string()], readings, TimeUnit::Days).unwrap();
        let path = dir.join("series.csv");
        write_time_series_csv(&path, &series).unwrap();

        let back = read_time_series_csv(&path, &[], TimeUnit::Days).unwrap();
        assert_eq!(back.channels(), &["800".to_string()]);
        assert_eq!(back.sample_ids(), vec!["strain A, rep 1".to_string(), "say \"hi\"".to_string()]);
        assert_eq!(back.samples()[1].values(), &[0.75]);
        assert_abs_diff_eq!(back.span(), 0.5, epsilon = 1e-9);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn exporter_writes_per_channel_artifacts() {
        let dir = temp_dir("export");
        let series = generate_series(&SyntheticConfig::default()).unwrap();
        let mut fits = GrowthFitter::new(FitConfig::default()).fit(&series, &["800".to_string()]);
        fits.insert(
            "999".to_string(),
            Err(crate::error::KineticsError::schema("time series", "999")),
        );

        let written = FitReportExporter::new(&dir)
            .export(&fits, series.unit())
            .unwrap();
        assert_eq!(written.len(), 4);

        let csv = std::fs::read_to_string(dir.join("best_fit_800.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("time,best_fit,uncertainty"));
        assert_eq!(lines.count(), series.len());

        let report = std::fs::read_to_string(dir.join("fit_800_report.txt")).unwrap();
        assert!(report.contains("[[Variables]]"));
        assert!(dir.join(RESULTS_FILE).exists());
        assert!(!dir.join("best_fit_999.csv").exists());

        let workbook = ExcelWorkbook::open(&dir.join(BEST_FIT_WORKBOOK)).unwrap();
        assert_eq!(workbook.sections(), vec!["800".to_string()]);
        let sheet = workbook.grid("800").unwrap();
        assert_eq!(sheet[0], vec!["time", "best_fit", "uncertainty"]);
        assert_eq!(sheet.len(), series.len() + 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_stem_replaces_separators() {
        assert_eq!(file_stem("800"), "800");
        assert_eq!(file_stem("OD 600/nm"), "OD_600_nm");
    }
}
