//! Synthetic growth-curve generation (demos and tests).
//!
//! Values follow the growth model for each channel plus Gaussian noise from a
//! seeded RNG, so the same settings always produce the same series.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{GrowthParameters, RawReading, TimeSeries, TimeUnit};
use crate::error::AppError;
use crate::models::value;

/// Settings for a synthetic plate run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// Channel name and the true parameters of its curve.
    pub channels: Vec<(String, GrowthParameters)>,
    pub start: NaiveDateTime,
    /// Spacing between reads, in `unit`.
    pub step: f64,
    pub n_points: usize,
    /// Standard deviation of the additive noise.
    pub noise_sd: f64,
    pub seed: u64,
    pub unit: TimeUnit,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap_or_default();
        Self {
            channels: vec![
                ("440".to_string(), GrowthParameters::new(1.6, 0.12, 6.0)),
                ("680".to_string(), GrowthParameters::new(1.2, 0.10, 6.5)),
                ("800".to_string(), GrowthParameters::new(0.9, 0.08, 7.0)),
            ],
            start,
            step: 0.5,
            n_points: 61,
            noise_sd: 0.01,
            seed: 42,
            unit: TimeUnit::Days,
        }
    }
}

/// Generate a noisy series with one timestamped read per time step.
pub fn generate_series(config: &SyntheticConfig) -> Result<TimeSeries, AppError> {
    if config.n_points == 0 {
        return Err(AppError::new(2, "Synthetic point count must be > 0."));
    }
    if !(config.step.is_finite() && config.step > 0.0) {
        return Err(AppError::new(2, "Synthetic time step must be a positive number."));
    }
    if !(config.noise_sd.is_finite() && config.noise_sd >= 0.0) {
        return Err(AppError::new(2, "Synthetic noise must be a non-negative number."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, config.noise_sd)
        .map_err(|e| AppError::new(2, format!("Noise distribution error: {e}")))?;

    let mut readings = Vec::with_capacity(config.n_points);
    for i in 0..config.n_points {
        let t = i as f64 * config.step;
        let millis = (t * config.unit.seconds_per_unit() * 1000.0).round() as i64;
        let timestamp = TimeDelta::try_milliseconds(millis)
            .and_then(|offset| config.start.checked_add_signed(offset))
            .ok_or_else(|| AppError::new(2, format!("Synthetic read {i} at t={t} is outside the date-time range.")))?;
        let values = config
            .channels
            .iter()
            .map(|(_, p)| value(t, p) + normal.sample(&mut rng))
            .collect();
        readings.push(RawReading {
            timestamp,
            well: Some("A1".to_string()),
            sample_id: Some("synthetic".to_string()),
            values,
        });
    }

    let names = config.channels.iter().map(|(name, _)| name.clone()).collect();
    TimeSeries::from_readings(names, readings, config.unit).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn same_seed_same_series() {
        let cfg = SyntheticConfig::default();
        assert_eq!(generate_series(&cfg).unwrap(), generate_series(&cfg).unwrap());

        let other = SyntheticConfig { seed: 7, ..cfg.clone() };
        assert_ne!(generate_series(&cfg).unwrap(), generate_series(&other).unwrap());
    }

    #[test]
    fn noiseless_series_follows_the_model() {
        let cfg = SyntheticConfig {
            noise_sd: 0.0,
            ..SyntheticConfig::default()
        };
        let series = generate_series(&cfg).unwrap();
        assert_eq!(series.len(), cfg.n_points);
        assert_abs_diff_eq!(series.span(), 30.0, epsilon = 1e-6);

        let (t, y) = series.channel_points("800").unwrap();
        let p = cfg.channels[2].1;
        for (ti, yi) in t.iter().zip(&y) {
            assert_abs_diff_eq!(*yi, value(*ti, &p), epsilon = 1e-6);
        }
    }

    #[test]
    fn rejects_bad_settings() {
        let cfg = SyntheticConfig {
            noise_sd: -1.0,
            ..SyntheticConfig::default()
        };
        assert_eq!(generate_series(&cfg).unwrap_err().exit_code(), 2);

        let cfg = SyntheticConfig {
            n_points: 0,
            ..SyntheticConfig::default()
        };
        assert!(generate_series(&cfg).is_err());

        let cfg = SyntheticConfig {
            noise_sd: f64::NAN,
            ..SyntheticConfig::default()
        };
        assert!(generate_series(&cfg).is_err());
    }

    #[test]
    fn time_axis_past_the_calendar_is_an_error() {
        let cfg = SyntheticConfig {
            step: 1e12,
            n_points: 3,
            ..SyntheticConfig::default()
        };
        let err = generate_series(&cfg).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("outside the date-time range"));
    }
}
