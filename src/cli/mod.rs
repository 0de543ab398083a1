//! Command-line parsing for the growth-curve toolkit.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the normalization/fitting code. Defaults that belong to the
//! core live in `domain::config`; flags left unset here fall back to them.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{JoinMode, TimeUnit};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "growth", version, about = "Microbial growth-curve normalization and fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Normalize plate-reader exports into one time series (optionally fit it).
    Plate(PlateArgs),
    /// Aggregate dry-weight replicates (optionally fit the mean).
    Biomass(BiomassArgs),
    /// Fit channels of a normalized series CSV.
    Fit(FitCmdArgs),
    /// Write a seeded synthetic series for demos.
    Simulate(SimulateArgs),
    /// Plot a fit saved in a results JSON file.
    Plot(PlotArgs),
}

/// Growth-model fit options shared by every fitting command.
#[derive(Debug, Args, Clone)]
pub struct FitOptions {
    /// Channels to fit (comma-separated). Default: 800.
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<String>>,

    /// Initial guess `A,B,C`. Default: 0.1,0.1,20.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub initial_guess: Option<Vec<f64>>,

    /// Lower bounds `A,B,C`. Default: 0,0,0.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub lower_bounds: Option<Vec<f64>>,

    /// Band confidence: a probability (< 1, e.g. 0.9545) or a sigma multiple (>= 1).
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Function-evaluation budget per channel.
    #[arg(long)]
    pub max_evals: Option<usize>,

    /// Fit channels one after another instead of in parallel.
    #[arg(long)]
    pub sequential: bool,
}

/// Output options for commands that fit.
#[derive(Debug, Args, Clone)]
pub struct FitOutputOptions {
    /// Directory for best-fit CSVs, `best_fit.xlsx`, reports and `fit_results.json`.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print the full optimizer report of every converged channel.
    #[arg(long)]
    pub report: bool,

    /// Render an ASCII plot per converged channel.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Options for `growth plate`.
#[derive(Debug, Parser, Clone)]
pub struct PlateArgs {
    /// Export workbooks (`.xlsx`, `.csv`) or directories of per-sheet CSVs.
    #[arg(required = true, value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Wells per sheet.
    #[arg(long)]
    pub wells: Option<usize>,

    /// Absorbance block columns (spreadsheet letters, e.g. A:AE).
    #[arg(long)]
    pub columns: Option<String>,

    /// 0-based row of the absorbance header.
    #[arg(long)]
    pub header_row: Option<usize>,

    /// 0-based row of the read date-time cell.
    #[arg(long)]
    pub timestamp_row: Option<usize>,

    /// Column (letters) of the read date-time cell.
    #[arg(long)]
    pub timestamp_column: Option<String>,

    /// 0-based header row of the well -> sample key block.
    #[arg(long, requires_all = ["key_rows", "key_columns"])]
    pub key_header_row: Option<usize>,

    /// Rows in the key block.
    #[arg(long)]
    pub key_rows: Option<usize>,

    /// Columns (letters) of the key block.
    #[arg(long)]
    pub key_columns: Option<String>,

    /// How readings are joined with the key block.
    #[arg(long, value_enum)]
    pub join: Option<JoinMode>,

    /// Channels to keep (comma-separated). Default: 440,680,800. Pass `all` to keep every column.
    #[arg(long = "od-channels", value_delimiter = ',')]
    pub od_channels: Option<Vec<String>>,

    /// Unit of the elapsed-time axis.
    #[arg(long, value_enum)]
    pub time_unit: Option<TimeUnit>,

    /// Keep only rows of this sample identity.
    #[arg(long)]
    pub sample: Option<String>,

    /// Write the normalized series to this CSV.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fit the growth model right away.
    #[arg(long)]
    pub fit: bool,

    #[command(flatten)]
    pub fit_options: FitOptions,

    #[command(flatten)]
    pub fit_output: FitOutputOptions,
}

/// Options for `growth biomass`.
#[derive(Debug, Parser, Clone)]
pub struct BiomassArgs {
    /// Dry-weight workbook (`.xlsx`, `.csv`), or a directory of per-sheet CSVs.
    pub file: PathBuf,

    /// Column holding the sample type.
    #[arg(long)]
    pub type_column: Option<String>,

    /// Column holding the concentration.
    #[arg(long)]
    pub concentration_column: Option<String>,

    /// Column holding the sampling date-time.
    #[arg(long)]
    pub date_column: Option<String>,

    /// Sample type to keep. Default: VSS.
    #[arg(long)]
    pub sample_type: Option<String>,

    /// Unit of the elapsed-time axis. Default: seconds.
    #[arg(long, value_enum)]
    pub time_unit: Option<TimeUnit>,

    /// Write the summary series (`mean`, `std` channels) to this CSV.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fit the growth model to the mean concentration.
    #[arg(long)]
    pub fit: bool,

    #[command(flatten)]
    pub fit_options: FitOptions,

    #[command(flatten)]
    pub fit_output: FitOutputOptions,
}

/// Options for `growth fit`.
#[derive(Debug, Parser, Clone)]
pub struct FitCmdArgs {
    /// Normalized series CSV (`date` or `time` column plus channel columns).
    pub series: PathBuf,

    /// Unit of the elapsed-time axis.
    #[arg(long, value_enum, default_value_t = TimeUnit::Days)]
    pub time_unit: TimeUnit,

    /// Keep only rows of this sample identity.
    #[arg(long)]
    pub sample: Option<String>,

    #[command(flatten)]
    pub fit_options: FitOptions,

    #[command(flatten)]
    pub fit_output: FitOutputOptions,
}

/// Options for `growth simulate`.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Where to write the series CSV.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of reads.
    #[arg(long, default_value_t = 61)]
    pub points: usize,

    /// Spacing between reads, in days.
    #[arg(long, default_value_t = 0.5)]
    pub step: f64,

    /// Standard deviation of the additive noise.
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,
}

/// Options for plotting a saved fit.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Results JSON produced by `--out-dir`.
    #[arg(value_name = "JSON")]
    pub results: PathBuf,

    /// Channel to plot.
    #[arg(long, default_value = "800")]
    pub channel: String,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}
