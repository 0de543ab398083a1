//! Dry-weight biomass aggregation.
//!
//! Replicate dry-weight measurements are filtered to one sample type
//! (volatile suspended solids by default), grouped by sampling time and
//! summarized as mean and sample standard deviation. Elapsed time is measured
//! from the earliest retained sampling time.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::{debug, info};

use crate::domain::{AggregatedSample, BiomassConfig, BiomassSeries, TIMESTAMP_FORMAT, TIMESTAMP_PATTERN};
use crate::error::KineticsError;
use crate::io::table::Table;
use crate::math::{mean, sample_std};

/// Date-time patterns accepted in dry-weight tables, tried in order.
const ACCEPTED_FORMATS: [&str; 3] = [TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Clone)]
pub struct BiomassAggregator {
    config: BiomassConfig,
}

impl BiomassAggregator {
    pub fn new(config: BiomassConfig) -> Self {
        Self { config }
    }

    /// Summarize every table (e.g. every sheet of a workbook) into one series.
    ///
    /// An empty result after filtering is a valid zero-row series.
    pub fn aggregate(&self, tables: &[Table]) -> Result<BiomassSeries, KineticsError> {
        let cfg = &self.config;
        let mut groups: BTreeMap<NaiveDateTime, Vec<f64>> = BTreeMap::new();

        for (i, table) in tables.iter().enumerate() {
            let context = format!("dry-weight table {}", i + 1);
            let type_col = table.require_column(&cfg.type_column, &context)?;
            let conc_col = table.require_column(&cfg.concentration_column, &context)?;
            let date_col = table.require_column(&cfg.timestamp_column, &context)?;

            for row in 0..table.len() {
                if table.cell(row, type_col) != cfg.sample_type {
                    continue;
                }
                let value = table.number(row, conc_col, &context)?;
                if value.is_nan() {
                    debug!("{context}: row {} has no concentration, skipped", row + 1);
                    continue;
                }
                let ts = parse_sampling_time(table.cell(row, date_col), &context)?;
                groups.entry(ts).or_default().push(value);
            }
        }

        let t0 = groups.keys().next().copied();
        let samples: Vec<AggregatedSample> = groups
            .into_iter()
            .map(|(timestamp, values)| AggregatedSample {
                timestamp,
                elapsed: t0.map(|t0| cfg.time_unit.from_duration(timestamp - t0)).unwrap_or(0.0),
                mean: mean(&values),
                std_dev: sample_std(&values),
                replicates: values.len(),
            })
            .collect();

        info!(
            "aggregated {} '{}' sampling times from {} tables",
            samples.len(),
            cfg.sample_type,
            tables.len()
        );
        Ok(BiomassSeries {
            unit: cfg.time_unit,
            samples,
        })
    }
}

fn parse_sampling_time(raw: &str, context: &str) -> Result<NaiveDateTime, KineticsError> {
    let raw = raw.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| {
            KineticsError::data_format(
                context,
                raw,
                format!("{TIMESTAMP_PATTERN} or YYYY-MM-DD hh:mm:ss"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeUnit;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn dry_weight(rows: &[(&str, &str, &str)]) -> Table {
        Table::new(
            vec!["type".into(), "Biomass (g/L)".into(), "date".into()],
            rows.iter()
                .map(|(t, c, d)| vec![t.to_string(), c.to_string(), d.to_string()])
                .collect(),
        )
    }

    #[test]
    fn groups_vss_replicates_by_time() {
        let table = dry_weight(&[
            ("VSS", "1.0", "03/02/2024 09:00:00 AM"),
            ("TSS", "9.0", "03/01/2024 09:00:00 AM"),
            ("VSS", "0.2", "03/01/2024 09:00:00 AM"),
            ("VSS", "1.4", "03/02/2024 09:00:00 AM"),
            ("VSS", "0.4", "03/01/2024 09:00:00 AM"),
        ]);
        let series = BiomassAggregator::new(BiomassConfig::default())
            .aggregate(&[table])
            .unwrap();

        assert_eq!(series.samples.len(), 2);
        let first = &series.samples[0];
        assert_eq!(first.elapsed, 0.0);
        assert_relative_eq!(first.mean, 0.3);
        assert_abs_diff_eq!(first.std_dev, 0.1414213562, epsilon = 1e-9);
        assert_eq!(first.replicates, 2);
        assert_eq!(series.samples[1].elapsed, 86_400.0);
        assert_relative_eq!(series.samples[1].mean, 1.2);
    }

    #[test]
    fn single_replicate_has_undefined_std() {
        let table = dry_weight(&[("VSS", "0.5", "2024-03-01 09:00:00")]);
        let series = BiomassAggregator::new(BiomassConfig::default())
            .aggregate(&[table])
            .unwrap();
        assert!(series.samples[0].std_dev.is_nan());
        assert_eq!(series.samples[0].mean, 0.5);
    }

    #[test]
    fn nothing_matching_is_an_empty_series() {
        let table = dry_weight(&[("TSS", "0.5", "03/01/2024 09:00:00 AM")]);
        let series = BiomassAggregator::new(BiomassConfig::default())
            .aggregate(&[table])
            .unwrap();
        assert!(series.samples.is_empty());
        assert!(series.to_time_series().unwrap().is_empty());
    }

    #[test]
    fn missing_concentration_column_is_a_schema_error() {
        let table = Table::new(vec!["type".into(), "date".into()], vec![]);
        let err = BiomassAggregator::new(BiomassConfig::default())
            .aggregate(&[table])
            .unwrap_err();
        assert_eq!(err, KineticsError::schema("dry-weight table 1", "Biomass (g/L)"));
    }

    #[test]
    fn pools_tables_and_honours_time_unit() {
        let a = dry_weight(&[("VSS", "0.2", "03/01/2024 12:00:00 AM")]);
        let b = dry_weight(&[("VSS", "0.6", "03/01/2024 06:00:00 AM")]);
        let config = BiomassConfig {
            time_unit: TimeUnit::Hours,
            ..BiomassConfig::default()
        };
        let series = BiomassAggregator::new(config).aggregate(&[a, b]).unwrap();
        assert_eq!(series.samples[1].elapsed, 6.0);

        let ts = series.to_time_series().unwrap();
        let (t, y) = ts.channel_points(BiomassSeries::MEAN_CHANNEL).unwrap();
        assert_eq!(t, vec![0.0, 6.0]);
        assert_eq!(y, vec![0.2, 0.6]);
    }
}
