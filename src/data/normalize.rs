//! Plate-reader batch normalization.
//!
//! Turns raw instrument reads (one timestamp per read, many wells per read)
//! into a single time-ordered [`TimeSeries`]:
//!
//! 1. attach the batch timestamp to every row of the batch
//! 2. optionally join against the batch's well → sample key block
//! 3. pool every batch (from every file)
//! 4. stable-sort by timestamp
//! 5. measure elapsed time from the earliest read
//!
//! Failure modes:
//! - unparsable batch timestamp → `DataFormat`
//! - configured channel (or join column) absent from a batch → `Schema`

use std::collections::HashMap;

use log::{debug, info};

use crate::domain::{
    JoinMode, NormalizeConfig, RawReading, TimeSeries, TimeUnit, parse_timestamp,
};
use crate::error::KineticsError;
use crate::io::table::Table;

/// Canonical column names of a pre-normalized series table.
pub const DATE_COLUMN: &str = "date";
pub const TIME_COLUMN: &str = "time";
pub const WELL_COLUMN: &str = "well";
pub const SAMPLE_COLUMN: &str = "sample";

/// One instrument read: a table of per-well values sharing one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    /// Where the batch came from (`file:sheet`), used in error context.
    pub source: String,
    /// Raw timestamp cell, parsed during normalization.
    pub timestamp: String,
    pub readings: Table,
    /// Optional well → sample key block.
    pub keys: Option<Table>,
}

/// Merges raw batches into one [`TimeSeries`].
#[derive(Debug, Clone)]
pub struct TimeSeriesNormalizer {
    config: NormalizeConfig,
}

impl TimeSeriesNormalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    /// Channels to extract: the configured list, or every value column of the
    /// first batch when the list is empty.
    fn resolve_channels(&self, batches: &[RawBatch]) -> Vec<String> {
        if !self.config.channels.is_empty() {
            return self.config.channels.clone();
        }
        let cfg = &self.config;
        batches
            .first()
            .map(|b| {
                b.readings
                    .headers()
                    .iter()
                    .filter(|h| **h != cfg.well_column && **h != cfg.sample_column)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn normalize(&self, batches: &[RawBatch]) -> Result<TimeSeries, KineticsError> {
        let channels = self.resolve_channels(batches);
        let mut readings = Vec::new();

        for batch in batches {
            let rows = self.batch_readings(batch, &channels)?;
            debug!("batch '{}': {} rows", batch.source, rows.len());
            readings.extend(rows);
        }

        let series = TimeSeries::from_readings(channels, readings, self.config.time_unit)?;
        info!(
            "normalized {} batches into {} rows spanning {:.4}{}",
            batches.len(),
            series.len(),
            series.span(),
            series.unit().label()
        );
        Ok(series)
    }

    fn batch_readings(&self, batch: &RawBatch, channels: &[String]) -> Result<Vec<RawReading>, KineticsError> {
        let cfg = &self.config;
        let context = format!("batch '{}'", batch.source);
        let timestamp = parse_timestamp(&batch.timestamp, &context)?;

        let table = &batch.readings;
        let value_cols = channels
            .iter()
            .map(|ch| table.require_column(ch, &context))
            .collect::<Result<Vec<_>, _>>()?;

        let sample_of = match &batch.keys {
            Some(keys) => {
                let key_context = format!("{context} keys");
                let well = keys.require_column(&cfg.well_column, &key_context)?;
                let sample = keys.require_column(&cfg.sample_column, &key_context)?;
                let mut map: HashMap<&str, &str> = HashMap::new();
                for row in keys.rows() {
                    map.entry(row[well].as_str()).or_insert(row[sample].as_str());
                }
                Some(map)
            }
            None => None,
        };

        let well_col = match sample_of {
            Some(_) => Some(table.require_column(&cfg.well_column, &context)?),
            None => table.column(&cfg.well_column),
        };

        let mut out = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let well = well_col.map(|c| table.cell(row, c).to_string());
            let sample_id = match (&sample_of, &well) {
                (Some(map), Some(w)) => map.get(w.as_str()).map(|s| s.to_string()),
                _ => None,
            };
            if sample_of.is_some() && sample_id.is_none() && cfg.join == JoinMode::Inner {
                continue;
            }

            let values = value_cols
                .iter()
                .map(|&c| table.number(row, c, &context))
                .collect::<Result<Vec<_>, _>>()?;

            out.push(RawReading {
                timestamp,
                well,
                sample_id,
                values,
            });
        }
        Ok(out)
    }
}

/// Build a series from an already-normalized table.
///
/// Uses the `date` column when every row carries a parseable timestamp,
/// otherwise the numeric `time` column (shifted to start at `0`). With an
/// empty channel list every column except `date`/`time`/`well`/`sample` is a
/// channel.
pub fn series_from_table(
    table: &Table,
    channels: &[String],
    unit: TimeUnit,
) -> Result<TimeSeries, KineticsError> {
    let context = "series table";
    let channels: Vec<String> = if channels.is_empty() {
        table
            .headers()
            .iter()
            .filter(|h| ![DATE_COLUMN, TIME_COLUMN, WELL_COLUMN, SAMPLE_COLUMN].contains(&h.as_str()))
            .cloned()
            .collect()
    } else {
        channels.to_vec()
    };
    let value_cols = channels
        .iter()
        .map(|ch| table.require_column(ch, context))
        .collect::<Result<Vec<_>, _>>()?;
    let values_at = |row: usize| {
        value_cols
            .iter()
            .map(|&c| table.number(row, c, context))
            .collect::<Result<Vec<_>, _>>()
    };

    let date_col = table
        .column(DATE_COLUMN)
        .filter(|&c| (0..table.len()).all(|r| !table.cell(r, c).is_empty()));

    if let Some(date_col) = date_col {
        let well_col = table.column(WELL_COLUMN);
        let sample_col = table.column(SAMPLE_COLUMN);
        let optional = |row: usize, col: Option<usize>| {
            col.map(|c| table.cell(row, c))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut readings = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            readings.push(RawReading {
                timestamp: parse_timestamp(table.cell(row, date_col), context)?,
                well: optional(row, well_col),
                sample_id: optional(row, sample_col),
                values: values_at(row)?,
            });
        }
        return TimeSeries::from_readings(channels, readings, unit);
    }

    let time_col = table.require_column(TIME_COLUMN, context)?;
    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        rows.push((table.number(row, time_col, context)?, values_at(row)?));
    }
    TimeSeries::from_elapsed(channels, rows, unit)
}
