//! Formatted text output: per-channel fit reports and run summaries.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{BiomassSeries, ChannelFits, FitResult, GrowthParameters, TimeSeries, format_timestamp};

/// Correlations weaker than this are left out of the report.
pub const MIN_REPORTED_CORRELATION: f64 = 0.1;

/// Optimizer diagnostic report for one converged channel.
pub fn fit_report(fit: &FitResult) -> String {
    let s = &fit.statistics;
    let mut out = String::new();

    out.push_str("[[Model]]\n");
    out.push_str("    Model(gompertz): A * exp(-exp((B * e / A) * (C - t) + 1))\n");

    out.push_str("[[Fit Statistics]]\n");
    out.push_str(&format!("    # channel          = {}\n", fit.channel));
    out.push_str("    # fitting method   = levenberg-marquardt\n");
    out.push_str(&format!("    # function evals   = {}\n", s.evaluations));
    out.push_str(&format!("    # iterations       = {}\n", s.iterations));
    out.push_str(&format!("    # data points      = {}\n", s.n_points));
    out.push_str(&format!("    # variables        = {}\n", s.n_variables));
    out.push_str(&format!("    termination        = {}\n", s.termination.description()));
    out.push_str(&format!("    chi-square         = {}\n", fmt_g(s.chi_square)));
    out.push_str(&format!("    reduced chi-square = {}\n", fmt_g(s.reduced_chi_square)));
    out.push_str(&format!("    Akaike info crit   = {}\n", fmt_g(s.aic)));
    out.push_str(&format!("    Bayesian info crit = {}\n", fmt_g(s.bic)));

    out.push_str("[[Variables]]\n");
    let values = fit.parameters.to_array();
    let inits = fit.initial_guess.to_array();
    let bounds = fit.lower_bounds.to_array();
    let errors = fit.parameter_uncertainty.as_ref().map(|u| u.std_errors.to_array());
    for (i, name) in GrowthParameters::NAMES.iter().enumerate() {
        let stderr = match errors {
            Some(err) => {
                let rel = if values[i] != 0.0 {
                    format!(" ({:.2}%)", (err[i] / values[i]).abs() * 100.0)
                } else {
                    String::new()
                };
                format!(" +/- {}{rel}", fmt_g(err[i]))
            }
            None => String::new(),
        };
        out.push_str(&format!(
            "    {name}:  {}{stderr} (init = {}, min = {})\n",
            fmt_g(values[i]),
            fmt_g(inits[i]),
            fmt_g(bounds[i]),
        ));
    }

    match &fit.parameter_uncertainty {
        Some(unc) => {
            let mut pairs = Vec::new();
            for i in 0..3 {
                for j in (i + 1)..3 {
                    let r = unc.correlation[i][j];
                    if r.abs() >= MIN_REPORTED_CORRELATION {
                        pairs.push((GrowthParameters::NAMES[i], GrowthParameters::NAMES[j], r));
                    }
                }
            }
            if !pairs.is_empty() {
                pairs.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
                out.push_str(&format!(
                    "[[Correlations]] (unreported correlations are < {MIN_REPORTED_CORRELATION:.3})\n"
                ));
                for (a, b, r) in pairs {
                    out.push_str(&format!("    C({a}, {b}) = {r:+.4}\n"));
                }
            }
        }
        None => out.push_str("    ## uncertainties could not be estimated\n"),
    }

    if let Some(band) = &fit.uncertainty {
        let widest = band.points.iter().map(|b| b.half_width).fold(0.0, f64::max);
        out.push_str(&format!(
            "    # band: {:.2}% confidence, widest half-width {}\n",
            band.confidence * 100.0,
            fmt_g(widest)
        ));
    }

    out
}

/// Summary of a normalized series (size, span, channels, samples).
pub fn format_series_summary(series: &TimeSeries) -> String {
    let mut out = String::new();

    out.push_str("=== growth - normalized time series ===\n");
    out.push_str(&format!(
        "Rows: n={} | span={:.4}{} | channels=[{}]\n",
        series.len(),
        series.span(),
        series.unit().label(),
        series.channels().join(", "),
    ));

    let first = series.samples().first().and_then(|s| s.timestamp());
    let last = series.samples().last().and_then(|s| s.timestamp());
    if let (Some(first), Some(last)) = (first, last) {
        out.push_str(&format!(
            "Reads: {} .. {}\n",
            format_timestamp(&first),
            format_timestamp(&last)
        ));
    }

    let ids = series.sample_ids();
    if !ids.is_empty() {
        out.push_str(&format!("Samples: {}\n", ids.join(", ")));
    }

    out
}

/// Table of replicate summaries for the dry-weight pathway.
pub fn format_biomass_summary(series: &BiomassSeries) -> String {
    let mut out = String::new();

    out.push_str("=== growth - dry-weight biomass ===\n");
    out.push_str(&format!(
        "{:<22} {:>12} {:>10} {:>10} {:>4}\n",
        "date",
        format!("elapsed[{}]", series.unit.label()),
        "mean",
        "std",
        "n"
    ));
    out.push_str(&format!("{:-<22} {:-<12} {:-<10} {:-<10} {:-<4}\n", "", "", "", "", ""));

    for s in &series.samples {
        let std = if s.std_dev.is_finite() {
            format!("{:.4}", s.std_dev)
        } else {
            "-".to_string()
        };
        out.push_str(
            format!(
                "{:<22} {:>12.1} {:>10.4} {:>10} {:>4}\n",
                format_timestamp(&s.timestamp),
                s.elapsed,
                s.mean,
                std,
                s.replicates
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// One line per channel: parameters or the failure reason.
pub fn format_fit_summary(fits: &ChannelFits) -> String {
    let mut out = String::new();

    out.push_str("Fit summary:\n");
    out.push_str(&format!(
        "{:<10} {:>12} {:>12} {:>12} {:>12} {:>12}\n",
        "channel", "A", "B", "C", "t_inflect", "red.chi2"
    ));
    out.push_str(&format!(
        "{:-<10} {:-<12} {:-<12} {:-<12} {:-<12} {:-<12}\n",
        "", "", "", "", "", ""
    ));

    for (channel, outcome) in fits {
        match outcome {
            Ok(fit) => {
                let p = &fit.parameters;
                out.push_str(&format!(
                    "{:<10} {:>12.6} {:>12.6} {:>12.4} {:>12.4} {:>12}\n",
                    truncate(channel, 10),
                    p.a,
                    p.b,
                    p.c,
                    p.inflection_time(),
                    fmt_g(fit.statistics.reduced_chi_square)
                ));
            }
            Err(err) => {
                out.push_str(&format!("{:<10} FAILED: {err}\n", truncate(channel, 10)));
            }
        }
    }

    out
}

/// Compact number formatting: fixed for moderate magnitudes, scientific otherwise.
fn fmt_g(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    let a = v.abs();
    if a == 0.0 || (1e-3..1e6).contains(&a) {
        format!("{v:.6}")
    } else {
        format!("{v:.6e}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
