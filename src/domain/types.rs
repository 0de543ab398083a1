//! Shared domain types.
//!
//! These types are kept serializable so they can be:
//!
//! - used in-memory during normalization and fitting
//! - exported to CSV/JSON
//! - reloaded later for plotting

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KineticsError;

/// Date-time pattern used by instrument exports: `MM/DD/YYYY hh:mm:ss AM/PM`.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// Human-readable form of [`TIMESTAMP_FORMAT`] for error messages.
pub const TIMESTAMP_PATTERN: &str = "MM/DD/YYYY hh:mm:ss AM/PM";

/// Unit of the elapsed-time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86_400.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }

    /// Express a duration in this unit (millisecond resolution).
    pub fn from_duration(self, delta: TimeDelta) -> f64 {
        delta.num_milliseconds() as f64 / 1000.0 / self.seconds_per_unit()
    }
}

/// How plate readings are joined with the well → sample key block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Keep every reading; wells without a key get no sample identity.
    Left,
    /// Drop readings whose well has no key.
    Inner,
}

/// Parse an instrument timestamp (`MM/DD/YYYY hh:mm:ss AM/PM`).
pub fn parse_timestamp(raw: &str, context: &str) -> Result<NaiveDateTime, KineticsError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| KineticsError::data_format(context, raw, TIMESTAMP_PATTERN))
}

/// Format a timestamp in the instrument pattern (used by CSV exports).
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// One row of an instrument export with its batch timestamp attached.
///
/// `values` is aligned with the channel list of the series being built.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub timestamp: NaiveDateTime,
    pub well: Option<String>,
    pub sample_id: Option<String>,
    pub values: Vec<f64>,
}

/// A single normalized observation row.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    timestamp: Option<NaiveDateTime>,
    elapsed: f64,
    well: Option<String>,
    sample_id: Option<String>,
    values: Vec<f64>,
}

impl Sample {
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    /// Time since the earliest row of the series, in the series' unit.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn well(&self) -> Option<&str> {
        self.well.as_deref()
    }

    pub fn sample_id(&self) -> Option<&str> {
        self.sample_id.as_deref()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// A time-ordered table of `elapsed time + named channel columns`.
///
/// Invariants (enforced by the constructors):
/// - samples are sorted by elapsed time (non-decreasing)
/// - the first sample has elapsed time `0`
/// - every sample carries one value per channel
///
/// A series is immutable once built; derived series are new values.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    channels: Vec<String>,
    unit: TimeUnit,
    samples: Vec<Sample>,
}

impl TimeSeries {
    /// An empty series with the given schema.
    pub fn empty(channels: Vec<String>, unit: TimeUnit) -> Self {
        Self {
            channels,
            unit,
            samples: Vec::new(),
        }
    }

    /// Build a series from timestamped readings.
    ///
    /// Rows are stable-sorted by timestamp and elapsed time is measured from
    /// the earliest timestamp.
    pub fn from_readings(
        channels: Vec<String>,
        mut readings: Vec<RawReading>,
        unit: TimeUnit,
    ) -> Result<Self, KineticsError> {
        check_widths(&channels, readings.iter().map(|r| r.values.len()))?;

        readings.sort_by_key(|r| r.timestamp);
        let Some(t0) = readings.first().map(|r| r.timestamp) else {
            return Ok(Self::empty(channels, unit));
        };

        let samples = readings
            .into_iter()
            .map(|r| Sample {
                timestamp: Some(r.timestamp),
                elapsed: unit.from_duration(r.timestamp - t0),
                well: r.well,
                sample_id: r.sample_id,
                values: r.values,
            })
            .collect();

        Ok(Self {
            channels,
            unit,
            samples,
        })
    }

    /// Build a series from rows that already carry an elapsed time.
    ///
    /// Rows are stable-sorted and shifted so the earliest row sits at `0`.
    pub fn from_elapsed(
        channels: Vec<String>,
        mut rows: Vec<(f64, Vec<f64>)>,
        unit: TimeUnit,
    ) -> Result<Self, KineticsError> {
        check_widths(&channels, rows.iter().map(|(_, v)| v.len()))?;
        if let Some((t, _)) = rows.iter().find(|(t, _)| !t.is_finite()) {
            return Err(KineticsError::data_format(
                "elapsed time",
                t.to_string(),
                "a finite number",
            ));
        }

        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        let Some(t0) = rows.first().map(|(t, _)| *t) else {
            return Ok(Self::empty(channels, unit));
        };

        let samples = rows
            .into_iter()
            .map(|(t, values)| Sample {
                timestamp: None,
                elapsed: t - t0,
                well: None,
                sample_id: None,
                values,
            })
            .collect();

        Ok(Self {
            channels,
            unit,
            samples,
        })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channel_index(&self, channel: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == channel)
    }

    /// Elapsed time of the last sample (0 for an empty series).
    pub fn span(&self) -> f64 {
        self.samples.last().map(|s| s.elapsed).unwrap_or(0.0)
    }

    /// Extract `(elapsed, value)` pairs for one channel.
    ///
    /// Non-finite values (e.g. an undefined standard deviation) are skipped.
    pub fn channel_points(&self, channel: &str) -> Result<(Vec<f64>, Vec<f64>), KineticsError> {
        let idx = self
            .channel_index(channel)
            .ok_or_else(|| KineticsError::schema("time series", channel))?;

        Ok(self
            .samples
            .iter()
            .filter(|s| s.values[idx].is_finite())
            .map(|s| (s.elapsed, s.values[idx]))
            .unzip())
    }

    /// Distinct sample identities, in first-seen order.
    pub fn sample_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for id in self.samples.iter().filter_map(|s| s.sample_id.as_deref()) {
            if !out.iter().any(|seen| seen == id) {
                out.push(id.to_string());
            }
        }
        out
    }

    /// A new series containing only the rows of one sample identity.
    ///
    /// Elapsed time is re-based on the earliest retained row.
    pub fn filter_sample(&self, sample_id: &str) -> TimeSeries {
        let kept: Vec<&Sample> = self
            .samples
            .iter()
            .filter(|s| s.sample_id.as_deref() == Some(sample_id))
            .collect();

        let t0 = kept.first().map(|s| s.elapsed).unwrap_or(0.0);
        let samples = kept
            .into_iter()
            .map(|s| Sample {
                elapsed: s.elapsed - t0,
                ..s.clone()
            })
            .collect();

        TimeSeries {
            channels: self.channels.clone(),
            unit: self.unit,
            samples,
        }
    }
}

fn check_widths(
    channels: &[String],
    widths: impl Iterator<Item = usize>,
) -> Result<(), KineticsError> {
    for width in widths {
        if width < channels.len() {
            return Err(KineticsError::schema("reading", &channels[width]));
        }
        if width > channels.len() {
            return Err(KineticsError::schema(
                "reading",
                format!("<unnamed column {}>", width - 1),
            ));
        }
    }
    Ok(())
}

/// Replicate summary for one dry-weight sampling time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSample {
    pub timestamp: NaiveDateTime,
    pub elapsed: f64,
    pub mean: f64,
    /// Sample standard deviation; NaN when only one replicate exists.
    pub std_dev: f64,
    pub replicates: usize,
}

/// Time-aligned replicate summaries for the dry-weight biomass pathway.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomassSeries {
    pub unit: TimeUnit,
    pub samples: Vec<AggregatedSample>,
}

impl BiomassSeries {
    /// Channel holding the per-timestamp mean concentration.
    pub const MEAN_CHANNEL: &'static str = "mean";
    /// Channel holding the per-timestamp standard deviation.
    pub const STD_CHANNEL: &'static str = "std";

    /// View the summaries as a regular series (`mean`, `std` channels) so the
    /// same fitter can consume them.
    pub fn to_time_series(&self) -> Result<TimeSeries, KineticsError> {
        let readings = self
            .samples
            .iter()
            .map(|s| RawReading {
                timestamp: s.timestamp,
                well: None,
                sample_id: None,
                values: vec![s.mean, s.std_dev],
            })
            .collect();

        TimeSeries::from_readings(
            vec![Self::MEAN_CHANNEL.to_string(), Self::STD_CHANNEL.to_string()],
            readings,
            self.unit,
        )
    }
}

/// Parameters of the sigmoidal growth model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthParameters {
    /// Asymptotic maximum value (`A`).
    #[serde(rename = "A")]
    pub a: f64,
    /// Maximum growth rate (`B`).
    #[serde(rename = "B")]
    pub b: f64,
    /// Time parameter (`C`): the lag time of the curve.
    #[serde(rename = "C")]
    pub c: f64,
}

impl GrowthParameters {
    pub const NAMES: [&'static str; 3] = ["A", "B", "C"];

    pub const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    pub fn from_array(x: [f64; 3]) -> Self {
        Self::new(x[0], x[1], x[2])
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Time of the inflection point, `C + A / (B·e)`.
    ///
    /// The curve passes through `A/e` there and grows fastest (slope `B`).
    pub fn inflection_time(&self) -> f64 {
        self.c + self.a / (self.b * std::f64::consts::E)
    }
}

/// A `(time, value)` point of an observed or fitted curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub time: f64,
    pub value: f64,
}

/// Confidence-interval half-width at one time point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPoint {
    pub time: f64,
    pub half_width: f64,
}

/// Uncertainty band around the best-fit curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyBand {
    /// Two-sided confidence probability (e.g. `0.9545`).
    pub confidence: f64,
    pub points: Vec<BandPoint>,
}

/// Why the solver stopped after a successful fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Residuals vanished exactly.
    ExactFit,
    /// Relative reduction of the sum of squares fell below `ftol`.
    CostTolerance,
    /// Relative step size fell below `xtol`.
    StepTolerance,
    /// Gradient norm fell below `gtol`.
    GradientTolerance,
}

impl Termination {
    pub fn description(self) -> &'static str {
        match self {
            Termination::ExactFit => "residuals are exactly zero",
            Termination::CostTolerance => "relative reduction in sum of squares is at most ftol",
            Termination::StepTolerance => "relative step size is at most xtol",
            Termination::GradientTolerance => "gradient is at most gtol",
        }
    }
}

/// Goodness-of-fit and solver diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    pub n_points: usize,
    pub n_variables: usize,
    pub evaluations: usize,
    pub iterations: usize,
    pub termination: Termination,
    pub chi_square: f64,
    pub reduced_chi_square: f64,
    pub aic: f64,
    pub bic: f64,
}

/// Standard errors and correlations derived from the parameter covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterUncertainty {
    pub std_errors: GrowthParameters,
    pub covariance: [[f64; 3]; 3],
    pub correlation: [[f64; 3]; 3],
}

/// Fit output for a single channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub channel: String,
    pub parameters: GrowthParameters,
    pub initial_guess: GrowthParameters,
    pub lower_bounds: GrowthParameters,
    /// Observations the fit was computed from.
    pub observed: Vec<CurvePoint>,
    /// Model evaluated at every observed time point.
    pub best_fit: Vec<CurvePoint>,
    /// `None` when the covariance could not be estimated.
    pub parameter_uncertainty: Option<ParameterUncertainty>,
    /// `None` when the covariance could not be estimated.
    pub uncertainty: Option<UncertaintyBand>,
    pub statistics: FitStatistics,
    /// Free-form optimizer diagnostic report.
    pub report: String,
}

/// Per-channel fit outcome; failed channels keep their error.
pub type ChannelFits = BTreeMap<String, Result<FitResult, KineticsError>>;

/// A saved fit-results file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResultsFile {
    pub tool: String,
    pub time_unit: TimeUnit,
    pub fits: Vec<FitResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn parse_timestamp_accepts_instrument_pattern() {
        let t = parse_timestamp("03/01/2024 01:30:00 PM", "test").unwrap();
        assert_eq!(t, ts(13, 30));
        assert_eq!(format_timestamp(&t), "03/01/2024 01:30:00 PM");
    }

    #[test]
    fn parse_timestamp_rejects_iso() {
        let err = parse_timestamp("2024-03-01 13:30:00", "batch").unwrap_err();
        assert!(err.is_data_format());
    }

    #[test]
    fn from_readings_sorts_and_starts_at_zero() {
        let readings = vec![
            RawReading { timestamp: ts(18, 0), well: None, sample_id: None, values: vec![2.0] },
            RawReading { timestamp: ts(6, 0), well: None, sample_id: None, values: vec![1.0] },
        ];
        let series = TimeSeries::from_readings(vec!["800".into()], readings, TimeUnit::Days).unwrap();
        assert_eq!(series.samples()[0].elapsed(), 0.0);
        assert_relative_eq!(series.samples()[1].elapsed(), 0.5);
        assert_eq!(series.samples()[0].values(), &[1.0]);
    }

    #[test]
    fn from_readings_rejects_short_rows() {
        let readings = vec![RawReading { timestamp: ts(6, 0), well: None, sample_id: None, values: vec![1.0] }];
        let err = TimeSeries::from_readings(vec!["440".into(), "800".into()], readings, TimeUnit::Days)
            .unwrap_err();
        assert_eq!(err, KineticsError::schema("reading", "800"));
    }

    #[test]
    fn from_elapsed_shifts_to_zero() {
        let series = TimeSeries::from_elapsed(
            vec!["od".into()],
            vec![(3.0, vec![0.3]), (1.0, vec![0.1])],
            TimeUnit::Hours,
        )
        .unwrap();
        assert_eq!(series.samples()[0].elapsed(), 0.0);
        assert_eq!(series.span(), 2.0);
    }

    #[test]
    fn channel_points_skips_non_finite_and_reports_missing() {
        let series = TimeSeries::from_elapsed(
            vec!["a".into()],
            vec![(0.0, vec![1.0]), (1.0, vec![f64::NAN]), (2.0, vec![3.0])],
            TimeUnit::Days,
        )
        .unwrap();
        let (t, y) = series.channel_points("a").unwrap();
        assert_eq!(t, vec![0.0, 2.0]);
        assert_eq!(y, vec![1.0, 3.0]);

        assert!(series.channel_points("999").unwrap_err().is_schema());
    }

    #[test]
    fn filter_sample_rebases_elapsed_time() {
        let readings = vec![
            RawReading { timestamp: ts(6, 0), well: Some("A1".into()), sample_id: Some("ctrl".into()), values: vec![0.1] },
            RawReading { timestamp: ts(12, 0), well: Some("A2".into()), sample_id: Some("algae".into()), values: vec![0.2] },
            RawReading { timestamp: ts(18, 0), well: Some("A2".into()), sample_id: Some("algae".into()), values: vec![0.4] },
        ];
        let series = TimeSeries::from_readings(vec!["800".into()], readings, TimeUnit::Days).unwrap();
        assert_eq!(series.sample_ids(), vec!["ctrl".to_string(), "algae".to_string()]);

        let algae = series.filter_sample("algae");
        assert_eq!(algae.len(), 2);
        assert_eq!(algae.samples()[0].elapsed(), 0.0);
        assert_relative_eq!(algae.samples()[1].elapsed(), 0.25);
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn inflection_time_matches_closed_form() {
        let p = GrowthParameters::new(1.0, 0.5, 10.0);
        assert_relative_eq!(p.inflection_time(), 10.0 + 2.0 / std::f64::consts::E);
    }
}
