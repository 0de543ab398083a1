//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments into run configuration
//! - runs the normalize/aggregate/fit pipeline
//! - prints summaries, reports and plots
//! - maps failures to exit codes (2 = input, 4 = a channel did not fit)

use clap::Parser;
use log::debug;

use crate::cli::{BiomassArgs, Cli, Command, FitCmdArgs, FitOptions, FitOutputOptions, PlateArgs, PlotArgs, SimulateArgs};
use crate::data::synthetic::{SyntheticConfig, generate_series};
use crate::domain::{
    BiomassConfig, BiomassSeries, ColumnRange, ConfidenceLevel, FitConfig, GrowthParameters, KeyLayout, NormalizeConfig,
    PlateLayout, TimeSeries, column_index,
};
use crate::error::AppError;
use crate::io::export::{read_time_series_csv, write_time_series_csv};
use crate::io::results::load_results;
use crate::report::{fit_report, format_biomass_summary, format_fit_summary, format_series_summary};

pub mod pipeline;

/// Entry point for the `growth` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    execute(Cli::parse())
}

/// Run one parsed command.
pub fn execute(cli: Cli) -> Result<(), AppError> {
    debug!("{:?}", cli.command);
    match cli.command {
        Command::Plate(args) => handle_plate(args),
        Command::Biomass(args) => handle_biomass(args),
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_plate(args: PlateArgs) -> Result<(), AppError> {
    let plate = plate_layout_from_args(&args)?;
    let keys = key_layout_from_args(&args)?;
    let config = normalize_config_from_args(&args);

    let mut series = pipeline::normalize_plates(&args.files, &plate, keys.as_ref(), &config)?;
    if let Some(sample) = &args.sample {
        series = series.filter_sample(sample);
    }
    println!("{}", format_series_summary(&series));

    if let Some(path) = &args.output {
        write_time_series_csv(path, &series)?;
        println!("Wrote {}", path.display());
    }

    if args.fit {
        let config = fit_config_from_args(&args.fit_options)?;
        fit_and_report(&series, &config, &args.fit_output)?;
    }
    Ok(())
}

fn handle_biomass(args: BiomassArgs) -> Result<(), AppError> {
    let config = biomass_config_from_args(&args);
    let biomass = pipeline::aggregate_biomass(&args.file, &config)?;
    println!("{}", format_biomass_summary(&biomass));

    let series = biomass.to_time_series()?;
    if let Some(path) = &args.output {
        write_time_series_csv(path, &series)?;
        println!("Wrote {}", path.display());
    }

    if args.fit {
        let mut fit_config = fit_config_from_args(&args.fit_options)?;
        if args.fit_options.channels.is_none() {
            fit_config.channels = vec![BiomassSeries::MEAN_CHANNEL.to_string()];
        }
        fit_and_report(&series, &fit_config, &args.fit_output)?;
    }
    Ok(())
}

fn handle_fit(args: FitCmdArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args.fit_options)?;
    let mut series = read_time_series_csv(&args.series, &[], args.time_unit)?;
    if let Some(sample) = &args.sample {
        series = series.filter_sample(sample);
    }
    println!("{}", format_series_summary(&series));
    fit_and_report(&series, &config, &args.fit_output)
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = SyntheticConfig {
        seed: args.seed,
        n_points: args.points,
        step: args.step,
        noise_sd: args.noise,
        ..SyntheticConfig::default()
    };
    let series = generate_series(&config)?;
    write_time_series_csv(&args.output, &series)?;
    println!("{}", format_series_summary(&series));
    println!("Wrote {}", args.output.display());
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let results = load_results(&args.results)?;
    let fit = results.channel(&args.channel)?;
    println!("{}", crate::plot::render_fit_plot(fit, results.time_unit, args.width, args.height));
    Ok(())
}

/// Fit, print, export. After every converged channel has been written, a
/// missing channel turns into exit code 2 and a failed fit into exit code 4.
fn fit_and_report(series: &TimeSeries, config: &FitConfig, output: &FitOutputOptions) -> Result<(), AppError> {
    let run = pipeline::run_fit(series, config, output.out_dir.as_deref())?;

    println!("{}", format_fit_summary(&run.fits));

    for fit in run.fits.values().filter_map(|r| r.as_ref().ok()) {
        if output.report {
            println!("{}", fit_report(fit));
        }
        if output.plot {
            println!("{}", crate::plot::render_fit_plot(fit, run.unit, output.width, output.height));
        }
    }

    if let Some(dir) = &output.out_dir {
        println!("Wrote {} files to {}", run.exported.len(), dir.display());
    }

    let missing = run.missing_channels();
    if !missing.is_empty() {
        return Err(AppError::new(
            2,
            format!("channel(s) not in the series: {}", missing.join(", ")),
        ));
    }

    let failed = run.failed_channels();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(AppError::new(
            4,
            format!(
                "{} of {} channel(s) failed to fit: {}",
                failed.len(),
                run.fits.len(),
                failed.join(", ")
            ),
        ))
    }
}

pub fn fit_config_from_args(opts: &FitOptions) -> Result<FitConfig, AppError> {
    let mut config = FitConfig::default();
    if let Some(channels) = &opts.channels {
        config.channels = channels.clone();
    }
    if let Some(values) = &opts.initial_guess {
        config.initial_guess = parameters_from_values(values, "--initial-guess")?;
    }
    if let Some(values) = &opts.lower_bounds {
        config.lower_bounds = parameters_from_values(values, "--lower-bounds")?;
    }
    if let Some(confidence) = opts.confidence {
        config.confidence = ConfidenceLevel::parse(confidence)?;
    }
    if let Some(max_evals) = opts.max_evals {
        if max_evals == 0 {
            return Err(AppError::new(2, "--max-evals must be > 0."));
        }
        config.max_evaluations = max_evals;
    }
    config.parallel = !opts.sequential;
    Ok(config)
}

fn parameters_from_values(values: &[f64], flag: &str) -> Result<GrowthParameters, AppError> {
    match values {
        [a, b, c] if values.iter().all(|v| v.is_finite()) => Ok(GrowthParameters::new(*a, *b, *c)),
        _ => Err(AppError::new(2, format!("{flag} expects three finite numbers `A,B,C`."))),
    }
}

pub fn plate_layout_from_args(args: &PlateArgs) -> Result<PlateLayout, AppError> {
    let mut plate = PlateLayout::default();
    if let Some(wells) = args.wells {
        plate.n_wells = wells;
    }
    if let Some(columns) = &args.columns {
        plate.columns = columns.parse::<ColumnRange>()?;
    }
    if let Some(row) = args.header_row {
        plate.header_row = row;
    }
    if let Some(row) = args.timestamp_row {
        plate.timestamp_row = row;
    }
    if let Some(letters) = &args.timestamp_column {
        plate.timestamp_column = column_index(letters)
            .ok_or_else(|| AppError::new(2, format!("--timestamp-column: '{letters}' is not a column letter.")))?;
    }
    Ok(plate)
}

pub fn key_layout_from_args(args: &PlateArgs) -> Result<Option<KeyLayout>, AppError> {
    match (args.key_header_row, args.key_rows, &args.key_columns) {
        (Some(header_row), Some(n_rows), Some(columns)) => Ok(Some(KeyLayout {
            header_row,
            n_rows,
            columns: columns.parse()?,
        })),
        (None, _, _) => Ok(None),
        _ => Err(AppError::new(
            2,
            "--key-header-row needs --key-rows and --key-columns.",
        )),
    }
}

pub fn normalize_config_from_args(args: &PlateArgs) -> NormalizeConfig {
    let mut config = NormalizeConfig::default();
    match args.od_channels.as_deref() {
        Some([all]) if all == "all" => config.channels.clear(),
        Some(channels) => config.channels = channels.to_vec(),
        None => {}
    }
    if let Some(join) = args.join {
        config.join = join;
    }
    if let Some(unit) = args.time_unit {
        config.time_unit = unit;
    }
    config
}

pub fn biomass_config_from_args(args: &BiomassArgs) -> BiomassConfig {
    let mut config = BiomassConfig::default();
    if let Some(column) = &args.type_column {
        config.type_column = column.clone();
    }
    if let Some(column) = &args.concentration_column {
        config.concentration_column = column.clone();
    }
    if let Some(column) = &args.date_column {
        config.timestamp_column = column.clone();
    }
    if let Some(sample_type) = &args.sample_type {
        config.sample_type = sample_type.clone();
    }
    if let Some(unit) = args.time_unit {
        config.time_unit = unit;
    }
    config
}
