//! Per-channel growth-curve fitting.
//!
//! For each requested channel we:
//! - extract `(elapsed, value)` pairs from the series
//! - run the bounded Levenberg–Marquardt solver from the configured initial
//!   guess, with every parameter kept above its lower bound
//! - evaluate the best-fit curve at every observed time point
//! - estimate the covariance and propagate it into an uncertainty band
//!
//! Channels are independent; with `FitConfig::parallel` they are fitted on
//! the rayon pool. Results are keyed by channel in a `BTreeMap`, so output
//! does not depend on scheduling.

use log::{debug, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::domain::{ChannelFits, CurvePoint, FitConfig, FitResult, FitStatistics, GrowthParameters, TimeSeries};
use crate::error::{ConvergenceFailure, KineticsError};
use crate::fit::uncertainty::{confidence_band, estimate_uncertainty};
use crate::math::{LeastSquaresProblem, LmOptions, minimize};
use crate::models::{evaluate, gradient, value};
use crate::report::fit_report;

const N_PARAMS: usize = 3;

/// Squared residuals of the growth model against one channel.
struct GrowthProblem<'a> {
    times: &'a [f64],
    values: &'a [f64],
}

impl LeastSquaresProblem for GrowthProblem<'_> {
    fn n_residuals(&self) -> usize {
        self.times.len()
    }

    fn residuals(&self, x: &[f64], out: &mut [f64]) {
        let p = GrowthParameters::new(x[0], x[1], x[2]);
        for (i, (&t, &y)) in self.times.iter().zip(self.values).enumerate() {
            out[i] = value(t, &p) - y;
        }
    }

    fn jacobian(&self, x: &[f64], out: &mut DMatrix<f64>) {
        let p = GrowthParameters::new(x[0], x[1], x[2]);
        for (i, &t) in self.times.iter().enumerate() {
            let g = gradient(t, &p);
            for j in 0..N_PARAMS {
                out[(i, j)] = g[j];
            }
        }
    }
}

/// Fits the growth model to the channels of a [`TimeSeries`].
#[derive(Debug, Clone)]
pub struct GrowthFitter {
    config: FitConfig,
}

impl GrowthFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Fit every requested channel.
    ///
    /// A failing channel (missing column, no convergence) yields an `Err`
    /// entry; the remaining channels are still fitted.
    pub fn fit(&self, series: &TimeSeries, channels: &[String]) -> ChannelFits {
        if self.config.parallel && channels.len() > 1 {
            channels
                .par_iter()
                .map(|ch| (ch.clone(), self.fit_channel(series, ch)))
                .collect::<Vec<_>>()
                .into_iter()
                .collect()
        } else {
            channels
                .iter()
                .map(|ch| (ch.clone(), self.fit_channel(series, ch)))
                .collect()
        }
    }

    /// Fit a single channel of a series.
    pub fn fit_channel(&self, series: &TimeSeries, channel: &str) -> Result<FitResult, KineticsError> {
        let (times, values) = series.channel_points(channel)?;
        let dropped = series.len() - times.len();
        if dropped > 0 {
            warn!("channel {channel}: {dropped} of {} readings are blank or non-finite and were left out", series.len());
        }
        let out = self.fit_points(channel, &times, &values);
        match &out {
            Ok(fit) => debug!(
                "channel {channel}: A={:.6} B={:.6} C={:.6} after {} evaluations",
                fit.parameters.a, fit.parameters.b, fit.parameters.c, fit.statistics.evaluations
            ),
            Err(err) => warn!("{err}"),
        }
        out
    }

    /// Fit raw `(time, value)` observations.
    pub fn fit_points(&self, channel: &str, times: &[f64], values: &[f64]) -> Result<FitResult, KineticsError> {
        let n = times.len().min(values.len());
        let (times, values) = (&times[..n], &values[..n]);
        if n <= N_PARAMS {
            return Err(KineticsError::convergence(
                channel,
                ConvergenceFailure::InsufficientData {
                    points: n,
                    parameters: N_PARAMS,
                },
            ));
        }

        let cfg = &self.config;
        let problem = GrowthProblem { times, values };
        let opts = LmOptions {
            max_evaluations: cfg.max_evaluations,
            ftol: cfg.ftol,
            xtol: cfg.xtol,
            gtol: cfg.gtol,
        };
        let outcome = minimize(
            &problem,
            &cfg.initial_guess.to_array(),
            &cfg.lower_bounds.to_array(),
            &opts,
        )
        .map_err(|reason| KineticsError::convergence(channel, reason))?;

        let parameters = GrowthParameters::new(outcome.x[0], outcome.x[1], outcome.x[2]);
        if !parameters.is_finite() {
            return Err(KineticsError::convergence(
                channel,
                ConvergenceFailure::NonFiniteParameters,
            ));
        }

        let chi_square = outcome.cost;
        let statistics = FitStatistics {
            n_points: n,
            n_variables: N_PARAMS,
            evaluations: outcome.evaluations,
            iterations: outcome.iterations,
            termination: outcome.termination,
            chi_square,
            reduced_chi_square: chi_square / (n - N_PARAMS) as f64,
            aic: information_criterion(chi_square, n, 2.0 * N_PARAMS as f64),
            bic: information_criterion(chi_square, n, N_PARAMS as f64 * (n as f64).ln()),
        };

        let parameter_uncertainty = estimate_uncertainty(times, &parameters, chi_square);
        let uncertainty = parameter_uncertainty
            .as_ref()
            .and_then(|unc| confidence_band(times, &parameters, unc, cfg.confidence, n));
        if uncertainty.is_none() {
            debug!("channel {channel}: covariance not estimable, no uncertainty band");
        }

        let observed = times
            .iter()
            .zip(values)
            .map(|(&time, &value)| CurvePoint { time, value })
            .collect();

        let mut result = FitResult {
            channel: channel.to_string(),
            parameters,
            initial_guess: cfg.initial_guess,
            lower_bounds: cfg.lower_bounds,
            observed,
            best_fit: evaluate(times, &parameters),
            parameter_uncertainty,
            uncertainty,
            statistics,
            report: String::new(),
        };
        result.report = fit_report(&result);
        Ok(result)
    }
}

/// `n·ln(χ²/n) + penalty`, with χ² floored so exact fits stay finite.
fn information_criterion(chi_square: f64, n: usize, penalty: f64) -> f64 {
    let n = n as f64;
    n * (chi_square.max(1e-250) / n).ln() + penalty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeUnit;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    const TRUE: GrowthParameters = GrowthParameters::new(2.0, 0.8, 15.0);

    fn grid() -> Vec<f64> {
        (0..61).map(|i| i as f64 * 0.5).collect()
    }

    fn noisy(p: &GrowthParameters, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.01).unwrap();
        grid().iter().map(|&t| value(t, p) + noise.sample(&mut rng)).collect()
    }

    fn two_channel_series() -> TimeSeries {
        let slow = GrowthParameters::new(1.0, 0.2, 10.0);
        let fast = noisy(&TRUE, 11);
        let rows = grid()
            .into_iter()
            .zip(fast)
            .map(|(t, y)| (t, vec![value(t, &slow), y]))
            .collect();
        TimeSeries::from_elapsed(vec!["440".into(), "800".into()], rows, TimeUnit::Days).unwrap()
    }

    fn fitter(parallel: bool) -> GrowthFitter {
        GrowthFitter::new(FitConfig {
            parallel,
            ..FitConfig::default()
        })
    }

    #[test]
    fn blank_readings_are_left_out_of_the_fit() {
        let rows = grid()
            .into_iter()
            .zip(noisy(&TRUE, 7))
            .enumerate()
            .map(|(i, (t, y))| (t, vec![if i == 10 || i == 40 { f64::NAN } else { y }]))
            .collect();
        let series = TimeSeries::from_elapsed(vec!["800".into()], rows, TimeUnit::Days).unwrap();

        let fit = fitter(false).fit_channel(&series, "800").unwrap();
        assert_eq!(fit.statistics.n_points, 59);
        assert_eq!(fit.observed.len(), 59);
        assert!(fit.observed.iter().all(|p| p.value.is_finite()));
        assert_relative_eq!(fit.parameters.a, TRUE.a, max_relative = 0.05);
    }

    #[test]
    fn recovers_parameters_from_noisy_sigmoid() {
        let t = grid();
        let y = noisy(&TRUE, 7);
        let fit = fitter(false).fit_points("800", &t, &y).unwrap();

        assert_relative_eq!(fit.parameters.a, TRUE.a, max_relative = 0.05);
        assert_relative_eq!(fit.parameters.b, TRUE.b, max_relative = 0.05);
        assert_relative_eq!(fit.parameters.c, TRUE.c, max_relative = 0.05);
        assert!(fit.uncertainty.is_some());
        assert!(fit.statistics.reduced_chi_square < 1e-3);
    }

    #[test]
    fn best_fit_curve_matches_model_reevaluation() {
        let t = grid();
        let y = noisy(&TRUE, 3);
        let fit = fitter(false).fit_points("800", &t, &y).unwrap();

        assert_eq!(fit.best_fit.len(), t.len());
        for point in &fit.best_fit {
            assert_relative_eq!(point.value, value(point.time, &fit.parameters), max_relative = 1e-12);
        }
        let band = fit.uncertainty.unwrap();
        assert_eq!(band.points.len(), t.len());
        assert_relative_eq!(band.confidence, 0.9545);
    }

    #[test]
    fn parameters_respect_lower_bounds() {
        let t = grid();
        let y = noisy(&TRUE, 5);
        let fitter = GrowthFitter::new(FitConfig {
            lower_bounds: GrowthParameters::new(0.0, 0.0, 16.0),
            ..FitConfig::default()
        });
        let fit = fitter.fit_points("800", &t, &y).unwrap();
        assert!(fit.parameters.c >= 16.0);
        assert!(fit.parameters.a >= 0.0 && fit.parameters.b >= 0.0);
    }

    #[test]
    fn constant_data_does_not_crash() {
        let t = grid();
        let y = vec![0.5; t.len()];
        match fitter(false).fit_points("800", &t, &y) {
            Ok(fit) => assert!(fit.parameters.is_finite()),
            Err(err) => assert!(err.is_fit_convergence()),
        }
    }

    #[test]
    fn too_few_points_is_a_convergence_error() {
        let err = fitter(false)
            .fit_points("800", &[0.0, 1.0, 2.0], &[0.1, 0.2, 0.3])
            .unwrap_err();
        assert_eq!(
            err,
            KineticsError::convergence(
                "800",
                ConvergenceFailure::InsufficientData { points: 3, parameters: 3 }
            )
        );
    }

    #[test]
    fn missing_channel_does_not_abort_others() {
        let series = two_channel_series();
        let fits = fitter(true).fit(&series, &["800".to_string(), "999".to_string()]);

        assert!(fits["999"].as_ref().unwrap_err().is_schema());
        let fit = fits["800"].as_ref().unwrap();
        assert_relative_eq!(fit.parameters.a, TRUE.a, max_relative = 0.05);
    }

    #[test]
    fn parallel_and_sequential_results_are_identical() {
        let series = two_channel_series();
        let channels = vec!["440".to_string(), "800".to_string()];
        let par = fitter(true).fit(&series, &channels);
        let seq = fitter(false).fit(&series, &channels);
        assert_eq!(par, seq);
        assert_eq!(par.keys().cloned().collect::<Vec<_>>(), channels);
    }

    #[test]
    fn repeated_fits_are_deterministic() {
        let t = grid();
        let y = noisy(&TRUE, 9);
        let a = fitter(false).fit_points("800", &t, &y).unwrap();
        let b = fitter(false).fit_points("800", &t, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tiny_budget_reports_max_evaluations() {
        let t = grid();
        let y = noisy(&TRUE, 1);
        let fitter = GrowthFitter::new(FitConfig {
            max_evaluations: 3,
            ..FitConfig::default()
        });
        let err = fitter.fit_points("800", &t, &y).unwrap_err();
        assert!(matches!(
            err,
            KineticsError::FitConvergence { reason: ConvergenceFailure::MaxEvaluations { .. }, .. }
        ));
    }
}
