//! Command-line parsing for the waveplate calibration tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the acquisition/fitting code. Settings a bench rarely changes
//! (sensor resource, wavelength, data directory) fall back to `WPCAL_*`
//! environment variables, which may come from a `.env` file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::device::ell14::DEFAULT_PULSES_PER_DEGREE;
use crate::domain::{ModelKind, PowerUnit};
use crate::io::{DEFAULT_DATA_DIR, DEFAULT_EXPORT_DIGITS};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "wpcal", version, about = "Waveplate calibration: sweep, fit HWP/QWP models, export")]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sweep the waveplate, fit both models, export the winner.
    Calibrate(CalibrateArgs),
    /// Fit (or refit) a stored run and export the result.
    Fit(FitArgs),
    /// Plot a stored run, overlaying its fit record if one exists.
    Plot(PlotArgs),
    /// List stored runs for a waveplate.
    Runs(RunsArgs),
}

/// Where runs are stored.
#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// Root directory of the calibration store.
    #[arg(long, env = "WPCAL_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Waveplate name (first path component of every run).
    #[arg(short = 'w', long = "waveplate")]
    pub waveplate: String,
}

/// Terminal plot options.
#[derive(Debug, Args, Clone)]
pub struct PlotOptions {
    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Levenberg–Marquardt options.
#[derive(Debug, Args, Clone)]
pub struct FitTuning {
    /// Initial offset guess.
    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    pub init_offset: f64,

    /// Initial amplitude guess.
    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    pub init_amplitude: f64,

    /// Initial phase guess (degrees).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub init_phase: f64,

    /// Solver evaluation budget factor.
    #[arg(long, default_value_t = 100)]
    pub patience: usize,

    /// Significant digits of parameters in the fit record.
    #[arg(long, default_value_t = DEFAULT_EXPORT_DIGITS)]
    pub digits: usize,
}

#[derive(Debug, Args, Clone)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Run id (defaults to the local time, %Y%m%d_%H%M%S).
    #[arg(long)]
    pub run: Option<String>,

    /// Sensor resource: TCPIP::<host>::<port>::SOCKET, /dev/usbtmcN,
    /// USB0::<vid>::<pid>::<serial>::0::INSTR, or `sim`.
    #[arg(short = 's', long, env = "WPCAL_SENSOR")]
    pub sensor: String,

    /// Wavelength correction (nm).
    #[arg(long, env = "WPCAL_WAVELENGTH_NM", default_value_t = 1310)]
    pub wavelength_nm: u32,

    /// Power unit.
    #[arg(long, value_enum, default_value_t = PowerUnit::Watts)]
    pub unit: PowerUnit,

    /// Sensor averaging count.
    #[arg(long, default_value_t = 1000)]
    pub averaging: u32,

    /// Sensor I/O timeout (ms).
    #[arg(long, default_value_t = 3000)]
    pub timeout_ms: u64,

    /// ELL14 serial port; without it the plate is assumed to be turned externally.
    #[arg(long, env = "WPCAL_ACTUATOR_PORT")]
    pub actuator_port: Option<String>,

    /// ELL14 bus address.
    #[arg(long, default_value_t = '0')]
    pub actuator_address: char,

    /// ELL14 pulses per degree.
    #[arg(long, default_value_t = DEFAULT_PULSES_PER_DEGREE)]
    pub pulses_per_degree: f64,

    /// First angle (degrees, inclusive).
    #[arg(long, default_value_t = 0)]
    pub start: i32,

    /// End angle (degrees, exclusive).
    #[arg(long, default_value_t = 360)]
    pub end: i32,

    /// Angle step (degrees).
    #[arg(long, default_value_t = 1)]
    pub step: i32,

    /// Pause between rotating and measuring (ms).
    #[arg(long, default_value_t = 0)]
    pub settle_ms: u64,

    /// Simulated plate type (with `--sensor sim`).
    #[arg(long, value_enum, default_value_t = ModelKind::HalfWave)]
    pub sim_model: ModelKind,

    /// Simulated offset.
    #[arg(long, default_value_t = 0.5, allow_hyphen_values = true)]
    pub sim_offset: f64,

    /// Simulated amplitude.
    #[arg(long, default_value_t = 0.3, allow_hyphen_values = true)]
    pub sim_amplitude: f64,

    /// Simulated phase (degrees).
    #[arg(long, default_value_t = 10.0, allow_hyphen_values = true)]
    pub sim_phase: f64,

    /// Simulated Gaussian noise sigma.
    #[arg(long, default_value_t = 0.002)]
    pub sim_noise: f64,

    /// Simulated noise seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[command(flatten)]
    pub fit: FitTuning,

    #[command(flatten)]
    pub plot: PlotOptions,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Run id (defaults to the most recent run).
    #[arg(long)]
    pub run: Option<String>,

    /// Replace an existing fit record.
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub fit: FitTuning,

    #[command(flatten)]
    pub plot: PlotOptions,
}

#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Run id (defaults to the most recent run).
    #[arg(long)]
    pub run: Option<String>,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[derive(Debug, Args, Clone)]
pub struct RunsArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}
