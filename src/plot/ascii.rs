//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed points: `o`
//! - fitted curve: `-` line
//! - uncertainty band edges: `.`

use crate::domain::{CurvePoint, FitResult, GrowthParameters, TimeUnit};
use crate::models::try_value;

/// Render observations, best fit and (if present) the uncertainty band.
pub fn render_fit_plot(fit: &FitResult, unit: TimeUnit, width: usize, height: usize) -> String {
    let (t_min, t_max) = time_range(&fit.observed).unwrap_or((0.0, 1.0));
    let curve = sample_curve(&fit.parameters, t_min, t_max, width.max(2));

    let band: Vec<(f64, f64, f64)> = match &fit.uncertainty {
        Some(u) => u
            .points
            .iter()
            .zip(&fit.best_fit)
            .map(|(b, c)| (b.time, c.value - b.half_width, c.value + b.half_width))
            .collect(),
        None => Vec::new(),
    };

    let title = format!("{} [{}]", fit.channel, unit.label());
    render_plot(&title, &fit.observed, &curve, &band, t_min, t_max, width, height)
}

#[allow(clippy::too_many_arguments)]
fn render_plot(
    title: &str,
    observed: &[CurvePoint],
    curve: &[(f64, f64)],
    band: &[(f64, f64, f64)],
    t_min: f64,
    t_max: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (y_min, y_max) = y_range(observed, curve, band).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first, then band edges in the gaps, then points on top.
    draw_curve(&mut grid, curve, t_min, t_max, y_min, y_max);

    for &(t, lo, hi) in band {
        let x = map_x(t, t_min, t_max, width);
        for y in [lo, hi] {
            let row = map_y(y, y_min, y_max, height);
            if grid[row][x] == ' ' {
                grid[row][x] = '.';
            }
        }
    }

    for p in observed {
        let x = map_x(p.time, t_min, t_max, width);
        let y = map_y(p.value, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {title} | t=[{t_min:.3}, {t_max:.3}] | y=[{y_min:.4}, {y_max:.4}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn time_range(points: &[CurvePoint]) -> Option<(f64, f64)> {
    let mut min_t = f64::INFINITY;
    let mut max_t = f64::NEG_INFINITY;
    for p in points {
        min_t = min_t.min(p.time);
        max_t = max_t.max(p.time);
    }
    if min_t.is_finite() && max_t.is_finite() && max_t > min_t {
        Some((min_t, max_t))
    } else {
        None
    }
}

fn sample_curve(p: &GrowthParameters, t_min: f64, t_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let t = t_min + u * (t_max - t_min);
        if let Some(y) = try_value(t, p) {
            out.push((t, y));
        }
    }
    out
}

fn y_range(observed: &[CurvePoint], curve: &[(f64, f64)], band: &[(f64, f64, f64)]) -> Option<(f64, f64)> {
    let ys = observed
        .iter()
        .map(|p| p.value)
        .chain(curve.iter().map(|&(_, y)| y))
        .chain(band.iter().flat_map(|&(_, lo, hi)| [lo, hi]));

    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for y in ys.filter(|y| y.is_finite()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BandPoint, FitStatistics, Termination, UncertaintyBand};
    use crate::models::value;

    fn step_fit(with_band: bool) -> FitResult {
        // Very steep curve: ~0 before t=5, ~1 after.
        let parameters = GrowthParameters::new(1.0, 50.0, 5.0);
        let times = [0.0, 10.0];
        let best_fit: Vec<CurvePoint> = times
            .iter()
            .map(|&time| CurvePoint { time, value: value(time, &parameters) })
            .collect();
        let uncertainty = with_band.then(|| UncertaintyBand {
            confidence: 0.9545,
            points: times.iter().map(|&time| BandPoint { time, half_width: 0.5 }).collect(),
        });
        FitResult {
            channel: "800".to_string(),
            parameters,
            initial_guess: parameters,
            lower_bounds: GrowthParameters::new(0.0, 0.0, 0.0),
            observed: vec![CurvePoint { time: 0.0, value: 0.0 }, CurvePoint { time: 10.0, value: 1.0 }],
            best_fit,
            parameter_uncertainty: None,
            uncertainty,
            statistics: FitStatistics {
                n_points: 2,
                n_variables: 3,
                evaluations: 1,
                iterations: 1,
                termination: Termination::ExactFit,
                chi_square: 0.0,
                reduced_chi_square: 0.0,
                aic: 0.0,
                bic: 0.0,
            },
            report: String::new(),
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let txt = render_fit_plot(&step_fit(false), TimeUnit::Days, 10, 5);
        let expected = concat!(
            "Plot: 800 [d] | t=[0.000, 10.000] | y=[-0.0500, 1.0500]\n",
            "     ----o\n",
            "     -    \n",
            "     -    \n",
            "    -     \n",
            "o----     \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn band_edges_widen_the_y_range() {
        let txt = render_fit_plot(&step_fit(true), TimeUnit::Days, 10, 5);
        assert!(txt.starts_with("Plot: 800 [d] | t=[0.000, 10.000] | y=[-0.6000, 1.6000]\n"));
        let band_marks: usize = txt.lines().skip(1).map(|l| l.matches('.').count()).sum();
        assert_eq!(band_marks, 4);
        let points: usize = txt.lines().skip(1).map(|l| l.matches('o').count()).sum();
        assert_eq!(points, 2);
    }
}
