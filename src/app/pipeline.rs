//! Shared load -> normalize -> fit -> export flow.
//!
//! Every subcommand ends in the same place (a `TimeSeries` ready for fitting),
//! so the steps live here and the handlers in `app` only deal with flags and
//! printing.

use std::path::{Path, PathBuf};

use log::info;

use crate::data::biomass::BiomassAggregator;
use crate::data::normalize::TimeSeriesNormalizer;
use crate::domain::{BiomassConfig, BiomassSeries, ChannelFits, FitConfig, KeyLayout, NormalizeConfig, PlateLayout, TimeSeries, TimeUnit};
use crate::error::{AppError, KineticsError};
use crate::fit::GrowthFitter;
use crate::io::export::FitReportExporter;
use crate::io::plate::load_plate_exports;
use crate::io::table::{ReadWindow, open_sheet_source, read_sections};

/// All computed outputs of one fit run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub fits: ChannelFits,
    pub unit: TimeUnit,
    /// Files written when an output directory was requested.
    pub exported: Vec<PathBuf>,
}

impl FitRun {
    /// Requested channels the series does not have.
    pub fn missing_channels(&self) -> Vec<&str> {
        self.channels_failing_with(KineticsError::is_schema)
    }

    /// Channels whose fit did not converge.
    pub fn failed_channels(&self) -> Vec<&str> {
        self.channels_failing_with(KineticsError::is_fit_convergence)
    }

    fn channels_failing_with(&self, kind: fn(&KineticsError) -> bool) -> Vec<&str> {
        self.fits
            .iter()
            .filter(|(_, r)| r.as_ref().err().is_some_and(kind))
            .map(|(c, _)| c.as_str())
            .collect()
    }
}

/// Read plate exports and merge them into one series.
pub fn normalize_plates(
    paths: &[PathBuf],
    plate: &PlateLayout,
    keys: Option<&KeyLayout>,
    config: &NormalizeConfig,
) -> Result<TimeSeries, AppError> {
    let batches = load_plate_exports(paths, plate, keys)?;
    let series = TimeSeriesNormalizer::new(config.clone()).normalize(&batches)?;
    info!("normalized {} reads into {} rows", batches.len(), series.len());
    Ok(series)
}

/// Read every sheet of a dry-weight workbook and summarize the replicates.
pub fn aggregate_biomass(path: &Path, config: &BiomassConfig) -> Result<BiomassSeries, AppError> {
    let workbook = open_sheet_source(path)?;
    let tables: Vec<_> = read_sections(workbook.as_ref(), &ReadWindow::default())?
        .into_iter()
        .map(|(_, table)| table)
        .collect();
    Ok(BiomassAggregator::new(config.clone()).aggregate(&tables)?)
}

/// Fit the configured channels and optionally export the converged ones.
///
/// Missing channels and convergence failures stay in `FitRun::fits` next to
/// the successful fits; the caller decides the exit code.
pub fn run_fit(series: &TimeSeries, config: &FitConfig, out_dir: Option<&Path>) -> Result<FitRun, AppError> {
    let fits = GrowthFitter::new(config.clone()).fit(series, &config.channels);

    let exported = match out_dir {
        Some(dir) => FitReportExporter::new(dir).export(&fits, series.unit())?,
        None => Vec::new(),
    };

    Ok(FitRun {
        fits,
        unit: series.unit(),
        exported,
    })
}
