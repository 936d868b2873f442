//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the sweep, the store and the fitter
//! - exported to JSON/CSV
//! - reloaded later for plotting or refits

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Run id format: local wall-clock time at the start of the sweep.
pub const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Waveplate response model.
///
/// The integer tag is what lands in exported fit records, so the mapping
/// must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Response period of 180 degrees.
    #[value(name = "hwp")]
    HalfWave,
    /// Response period of 90 degrees.
    #[value(name = "qwp")]
    QuarterWave,
}

impl ModelKind {
    /// Selection order; the first entry wins exact ties.
    pub const ALL: [ModelKind; 2] = [ModelKind::HalfWave, ModelKind::QuarterWave];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::HalfWave => "HWP",
            ModelKind::QuarterWave => "QWP",
        }
    }

    /// Tag written to fit records (`waveplate_type`).
    pub fn tag(self) -> u8 {
        match self {
            ModelKind::HalfWave => 0,
            ModelKind::QuarterWave => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ModelKind::HalfWave),
            1 => Some(ModelKind::QuarterWave),
            _ => None,
        }
    }

    /// Number of response cycles per full turn of the plate.
    pub fn harmonic(self) -> f64 {
        match self {
            ModelKind::HalfWave => 2.0,
            ModelKind::QuarterWave => 4.0,
        }
    }

    /// Response period in degrees.
    pub fn period_deg(self) -> f64 {
        360.0 / self.harmonic()
    }
}

/// Parameters of `P(θ) = offset + amplitude · sin(h · (θ − phase))`.
///
/// `amplitude` keeps whatever sign the optimizer settles on and `phase` is
/// not wrapped into `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveplateParams {
    pub offset: f64,
    pub amplitude: f64,
    /// Degrees.
    pub phase: f64,
}

impl WaveplateParams {
    pub const fn new(offset: f64, amplitude: f64, phase: f64) -> Self {
        Self {
            offset,
            amplitude,
            phase,
        }
    }
}

/// Addresses one calibration run on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub waveplate_name: String,
    pub run_id: String,
}

impl RunKey {
    /// Build a key, rejecting components that could escape the data directory.
    pub fn new(waveplate_name: impl Into<String>, run_id: impl Into<String>) -> Result<Self, AppError> {
        let waveplate_name = waveplate_name.into();
        let run_id = run_id.into();
        validate_component("waveplate name", &waveplate_name)?;
        validate_component("run id", &run_id)?;
        Ok(Self {
            waveplate_name,
            run_id,
        })
    }

    /// New key with a run id derived from the current local time.
    pub fn generate(waveplate_name: impl Into<String>) -> Result<Self, AppError> {
        let run_id = Local::now().format(RUN_ID_FORMAT).to_string();
        Self::new(waveplate_name, run_id)
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.waveplate_name, self.run_id)
    }
}

fn validate_component(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::usage(format!("The {label} must not be empty.")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(AppError::usage(format!(
            "Invalid {label} '{value}': path separators and dot segments are not allowed."
        )));
    }
    Ok(())
}

/// One power reading at one plate angle.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSample {
    /// Degrees, `[0, 360)`.
    pub angle: i32,
    /// Sensor units (watts unless configured otherwise).
    pub power: f64,
    pub waveplate_name: String,
    pub run_id: String,
}

impl SweepSample {
    pub fn new(key: &RunKey, angle: i32, power: f64) -> Self {
        Self {
            angle,
            power,
            waveplate_name: key.waveplate_name.clone(),
            run_id: key.run_id.clone(),
        }
    }
}

/// All samples of one run, in acquisition order.
#[derive(Debug, Clone)]
pub struct CalibrationRun {
    pub key: RunKey,
    pub samples: Vec<SweepSample>,
}

impl CalibrationRun {
    pub fn angles(&self) -> Vec<f64> {
        self.samples.iter().map(|s| f64::from(s.angle)).collect()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.power).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Angular range of a sweep: `[start, end)` in `step` increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPlan {
    pub start: i32,
    pub end: i32,
    pub step: i32,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            start: 0,
            end: 360,
            step: 1,
        }
    }
}

impl SweepPlan {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.step <= 0 {
            return Err(AppError::usage(format!("Angle step must be > 0 (got {}).", self.step)));
        }
        if self.start < 0 || self.end > 360 {
            return Err(AppError::usage(format!(
                "Angle range [{}, {}) must lie within [0, 360).",
                self.start, self.end
            )));
        }
        if self.start >= self.end {
            return Err(AppError::usage(format!(
                "Angle start ({}) must be below angle end ({}).",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Angles visited by the sweep, increasing.
    pub fn angles(&self) -> impl Iterator<Item = i32> {
        // `validate` guards against a zero step; clamp so the iterator is always finite.
        let step = self.step.max(1) as usize;
        (self.start..self.end).step_by(step)
    }

    pub fn len(&self) -> usize {
        self.angles().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sensor reading unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum PowerUnit {
    #[value(name = "W")]
    Watts,
    #[value(name = "DBM")]
    Dbm,
}

impl PowerUnit {
    pub fn scpi_token(self) -> &'static str {
        match self {
            PowerUnit::Watts => "W",
            PowerUnit::Dbm => "DBM",
        }
    }
}

/// Everything needed to open and configure the power sensor.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Resource string (`TCPIP::host::port::SOCKET`, `/dev/usbtmcN` or
    /// `USB0::vid::pid::serial::0::INSTR`).
    pub resource: String,
    pub wavelength_nm: u32,
    pub unit: PowerUnit,
    pub averaging_count: u32,
    pub timeout: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            resource: String::new(),
            wavelength_nm: 1310,
            unit: PowerUnit::Watts,
            averaging_count: 1000,
            timeout: Duration::from_millis(3000),
        }
    }
}

/// Which rotation stage drives the plate.
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorConfig {
    /// Nothing moves; angles are recorded as commanded.
    Noop,
    /// Thorlabs Elliptec ELL14 rotation mount on a serial port.
    Ell14 {
        port: String,
        address: char,
        pulses_per_degree: f64,
    },
}

/// A synthetic bench used instead of real hardware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub model: ModelKind,
    pub params: WaveplateParams,
    /// Standard deviation of additive Gaussian noise, in sensor units.
    pub noise_sigma: f64,
    pub seed: u64,
}

/// Levenberg–Marquardt settings shared by both candidate fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub initial: WaveplateParams,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Evaluation budget factor (the solver allows `patience * (params + 1)` evaluations).
    pub patience: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            initial: WaveplateParams::new(1.0, 1.0, 0.0),
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            patience: 100,
        }
    }
}

/// Best fit for a single model kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFit {
    pub model: ModelKind,
    pub params: WaveplateParams,
    pub sse: f64,
    pub rmse: f64,
    pub evaluations: usize,
}

/// Outcome of model selection for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub model: ModelKind,
    pub params: WaveplateParams,
    pub half_wave_sse: f64,
    pub quarter_wave_sse: f64,
}

impl FitResult {
    pub fn sse_for(&self, model: ModelKind) -> f64 {
        match model {
            ModelKind::HalfWave => self.half_wave_sse,
            ModelKind::QuarterWave => self.quarter_wave_sse,
        }
    }
}

/// A full calibration's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus environment and defaults).
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub data_dir: PathBuf,
    pub waveplate_name: String,
    /// Explicit run id; generated from the clock when absent.
    pub run_id: Option<String>,
    pub sensor: SensorConfig,
    pub actuator: ActuatorConfig,
    /// When set, sensor and actuator are replaced by a simulated bench.
    pub simulation: Option<SimulationConfig>,
    pub plan: SweepPlan,
    /// Pause between rotating and measuring.
    pub settle: Duration,
    pub fit: FitOptions,
    /// Significant digits of parameters in the fit record.
    pub export_digits: usize,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}
