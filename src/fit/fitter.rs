//! Low-level fitting routine for a single model kind.
//!
//! Given:
//! - plate angles `θ_i` (degrees)
//! - observed powers `y_i`
//! - an initial parameter guess
//!
//! we run Levenberg–Marquardt on `[offset, amplitude, phase]` and report the
//! fitted parameters together with the residual sum of squares.

use tracing::debug;

use crate::domain::{FitOptions, ModelFit, ModelKind};
use crate::error::{AppError, ErrorKind};
use crate::math::{rmse, solve, sse};
use crate::models::predict_all;

/// Minimum number of samples: one per free parameter.
pub const MIN_SAMPLES: usize = 3;

/// Fit a single model kind to `(angle, power)` pairs.
pub fn fit_model(
    model: ModelKind,
    angles: &[f64],
    powers: &[f64],
    opts: &FitOptions,
) -> Result<ModelFit, AppError> {
    validate_inputs(angles, powers)?;

    let report = solve(model, angles, powers, opts);
    if !report.converged {
        return Err(AppError::new(
            ErrorKind::FitConvergence,
            format!(
                "{} fit did not converge after {} evaluations ({}).",
                model.display_name(),
                report.evaluations,
                report.termination
            ),
        ));
    }

    let fitted = predict_all(model, angles, &report.params);
    let sse = sse(powers, &fitted);
    if !sse.is_finite() {
        return Err(AppError::new(
            ErrorKind::FitConvergence,
            format!("{} fit produced a non-finite residual sum.", model.display_name()),
        ));
    }

    debug!(
        model = model.display_name(),
        offset = report.params.offset,
        amplitude = report.params.amplitude,
        phase = report.params.phase,
        sse,
        evaluations = report.evaluations,
        termination = %report.termination,
        "model fit converged"
    );

    Ok(ModelFit {
        model,
        params: report.params,
        sse,
        rmse: rmse(sse, angles.len()),
        evaluations: report.evaluations,
    })
}

pub(crate) fn validate_inputs(angles: &[f64], powers: &[f64]) -> Result<(), AppError> {
    if angles.len() != powers.len() {
        return Err(AppError::new(
            ErrorKind::InvalidData,
            format!(
                "Angle/power length mismatch ({} angles, {} powers).",
                angles.len(),
                powers.len()
            ),
        ));
    }
    if angles.len() < MIN_SAMPLES {
        return Err(AppError::new(
            ErrorKind::InvalidData,
            format!(
                "Need at least {MIN_SAMPLES} samples to fit a waveplate model, got {}.",
                angles.len()
            ),
        ));
    }
    if let Some(i) = angles
        .iter()
        .zip(powers.iter())
        .position(|(a, p)| !(a.is_finite() && p.is_finite()))
    {
        return Err(AppError::new(
            ErrorKind::InvalidData,
            format!("Non-finite sample at index {i} (angle={}, power={}).", angles[i], powers[i]),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WaveplateParams;
    use crate::models::predict;

    fn synthetic(model: ModelKind, params: &WaveplateParams) -> (Vec<f64>, Vec<f64>) {
        let angles: Vec<f64> = (0..360).map(f64::from).collect();
        let powers = predict_all(model, &angles, params);
        (angles, powers)
    }

    #[test]
    fn fit_model_recovers_noiseless_half_wave() {
        let truth = WaveplateParams::new(0.5, 0.3, 10.0);
        let (angles, powers) = synthetic(ModelKind::HalfWave, &truth);

        let fit = fit_model(ModelKind::HalfWave, &angles, &powers, &FitOptions::default()).unwrap();
        assert!(fit.sse < 1e-12, "sse={}", fit.sse);
        assert!((fit.params.offset - 0.5).abs() < 1e-6);
        // Compare in the sign/phase-invariant form A·cos(hφ), A·sin(hφ).
        let h = ModelKind::HalfWave.harmonic();
        let canon = |p: &WaveplateParams| {
            let x = (h * p.phase).to_radians();
            (p.amplitude * x.cos(), p.amplitude * x.sin())
        };
        let (c0, s0) = canon(&truth);
        let (c1, s1) = canon(&fit.params);
        assert!((c0 - c1).abs() < 1e-6 && (s0 - s1).abs() < 1e-6);
    }

    #[test]
    fn wrong_model_leaves_large_residual() {
        let truth = WaveplateParams::new(0.5, 0.3, 10.0);
        let (angles, powers) = synthetic(ModelKind::HalfWave, &truth);

        let fit = fit_model(ModelKind::QuarterWave, &angles, &powers, &FitOptions::default()).unwrap();
        // Orthogonal harmonics: the best quarter-wave curve is roughly flat at the offset.
        let variance: f64 = powers.iter().map(|p| (p - 0.5).powi(2)).sum();
        assert!(fit.sse > 0.9 * variance, "sse={} variance={variance}", fit.sse);
        assert!((predict(ModelKind::QuarterWave, 0.0, &fit.params) - 0.5).abs() < 0.05);
    }

    #[test]
    fn fit_model_rejects_too_few_samples() {
        let err = fit_model(ModelKind::HalfWave, &[0.0, 1.0], &[1.0, 1.0], &FitOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn fit_model_rejects_non_finite_power() {
        let err = fit_model(
            ModelKind::HalfWave,
            &[0.0, 1.0, 2.0],
            &[1.0, f64::NAN, 1.0],
            &FitOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn exhausted_budget_is_a_convergence_error() {
        let truth = WaveplateParams::new(0.5, 0.3, 10.0);
        let (angles, powers) = synthetic(ModelKind::HalfWave, &truth);
        let opts = FitOptions {
            initial: WaveplateParams::new(100.0, -40.0, 77.0),
            patience: 1,
            ..FitOptions::default()
        };
        let err = fit_model(ModelKind::HalfWave, &angles, &powers, &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FitConvergence);
    }
}
