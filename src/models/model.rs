//! Model evaluation for the half-wave and quarter-wave responses.
//!
//! The fitter relies on two primitive operations:
//! - predict `P(θ)` given parameters (for residuals/plots)
//! - the partial derivatives of `P(θ)` with respect to each parameter (for the solver)
//!
//! Both models share the form `P(θ) = d + A · sin(h · (θ − φ))` with `h = 2`
//! (half-wave, 180° period) or `h = 4` (quarter-wave, 90° period). Angles and
//! phase are in degrees; conversion to radians happens here and nowhere else.

use crate::domain::{ModelKind, WaveplateParams};

/// Argument of the sine in radians.
fn phase_arg(model: ModelKind, angle_deg: f64, phase_deg: f64) -> f64 {
    model.harmonic() * (angle_deg - phase_deg).to_radians()
}

/// Predict transmitted power at `angle_deg`.
pub fn predict(model: ModelKind, angle_deg: f64, params: &WaveplateParams) -> f64 {
    params.offset + params.amplitude * phase_arg(model, angle_deg, params.phase).sin()
}

/// Predict transmitted power at every angle.
pub fn predict_all(model: ModelKind, angles_deg: &[f64], params: &WaveplateParams) -> Vec<f64> {
    angles_deg.iter().map(|&a| predict(model, a, params)).collect()
}

/// Half-wave response, `d + A · sin(4π(θ − φ)/360)`.
pub fn half_wave(angle_deg: f64, params: &WaveplateParams) -> f64 {
    predict(ModelKind::HalfWave, angle_deg, params)
}

/// Quarter-wave response, `d + A · sin(8π(θ − φ)/360)`.
pub fn quarter_wave(angle_deg: f64, params: &WaveplateParams) -> f64 {
    predict(ModelKind::QuarterWave, angle_deg, params)
}

/// `[∂P/∂d, ∂P/∂A, ∂P/∂φ]` at `angle_deg`, with `φ` in degrees.
pub fn jacobian_row(model: ModelKind, angle_deg: f64, params: &WaveplateParams) -> [f64; 3] {
    let x = phase_arg(model, angle_deg, params.phase);
    let d_phase = -params.amplitude * x.cos() * model.harmonic() * std::f64::consts::PI / 180.0;
    [1.0, x.sin(), d_phase]
}
