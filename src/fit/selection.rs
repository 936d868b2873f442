//! Model selection (half-wave vs quarter-wave) by residual comparison.
//!
//! A raw power-vs-angle trace cannot tell the two plate types apart on its own,
//! so we fit both candidate models and keep the one that explains the data
//! better:
//!
//! 1. Fit the half-wave model (LM from the configured initial guess)
//! 2. Fit the quarter-wave model the same way
//! 3. Pick the strictly smaller SSE; an exact tie goes to half-wave
//!
//! Convergence failures of either fit propagate; no fallback model is substituted.

use tracing::info;

use crate::domain::{CalibrationRun, FitOptions, FitResult, ModelFit, ModelKind};
use crate::error::AppError;
use crate::fit::fitter::{fit_model, validate_inputs};

/// Output of fitting + selection.
#[derive(Debug, Clone)]
pub struct FitSelection {
    pub result: FitResult,
    /// Both candidate fits, half-wave first.
    pub fits: [ModelFit; 2],
}

impl FitSelection {
    pub fn best(&self) -> &ModelFit {
        self.fit_for(self.result.model)
    }

    pub fn fit_for(&self, model: ModelKind) -> &ModelFit {
        match model {
            ModelKind::HalfWave => &self.fits[0],
            ModelKind::QuarterWave => &self.fits[1],
        }
    }
}

/// Fit both models to a stored run and select the better one.
pub fn fit_run(run: &CalibrationRun, opts: &FitOptions) -> Result<FitSelection, AppError> {
    fit_and_select(&run.angles(), &run.powers(), opts)
}

/// Fit both models to `(angle, power)` pairs and select the better one.
pub fn fit_and_select(angles: &[f64], powers: &[f64], opts: &FitOptions) -> Result<FitSelection, AppError> {
    validate_inputs(angles, powers)?;

    // The two fits share nothing; run them side by side.
    let (half, quarter) = rayon::join(
        || fit_model(ModelKind::HalfWave, angles, powers, opts),
        || fit_model(ModelKind::QuarterWave, angles, powers, opts),
    );
    let (half, quarter) = (half?, quarter?);

    let model = select(half.sse, quarter.sse);
    let params = match model {
        ModelKind::HalfWave => half.params,
        ModelKind::QuarterWave => quarter.params,
    };

    info!(
        selected = model.display_name(),
        hwp_sse = half.sse,
        qwp_sse = quarter.sse,
        n = angles.len(),
        "model selected"
    );

    Ok(FitSelection {
        result: FitResult {
            model,
            params,
            half_wave_sse: half.sse,
            quarter_wave_sse: quarter.sse,
        },
        fits: [half, quarter],
    })
}

/// Deterministic selection rule: strictly smaller SSE wins, ties go to half-wave.
pub fn select(half_wave_sse: f64, quarter_wave_sse: f64) -> ModelKind {
    if quarter_wave_sse < half_wave_sse {
        ModelKind::QuarterWave
    } else {
        ModelKind::HalfWave
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunKey, SweepSample, WaveplateParams};
    use crate::error::ErrorKind;
    use crate::models::predict;

    fn run_from(model: ModelKind, params: &WaveplateParams) -> CalibrationRun {
        let key = RunKey::new("WP", "20250101_000000").unwrap();
        let samples = (0..360)
            .map(|a| SweepSample::new(&key, a, predict(model, f64::from(a), params)))
            .collect();
        CalibrationRun { key, samples }
    }

    #[test]
    fn tie_goes_to_half_wave() {
        assert_eq!(select(1.0, 1.0), ModelKind::HalfWave);
        assert_eq!(select(0.0, 0.0), ModelKind::HalfWave);
        assert_eq!(select(1.0, 0.5), ModelKind::QuarterWave);
        assert_eq!(select(0.5, 1.0), ModelKind::HalfWave);
    }

    #[test]
    fn selects_half_wave_on_half_wave_data() {
        let truth = WaveplateParams::new(0.5, 0.3, 10.0);
        let run = run_from(ModelKind::HalfWave, &truth);
        let selection = fit_run(&run, &FitOptions::default()).unwrap();

        assert_eq!(selection.result.model, ModelKind::HalfWave);
        assert!(selection.result.half_wave_sse < selection.result.quarter_wave_sse);
        assert!((selection.result.params.offset - 0.5).abs() < 1e-6);
        for a in [0.0, 33.0, 90.0, 271.0] {
            let got = predict(ModelKind::HalfWave, a, &selection.result.params);
            let want = predict(ModelKind::HalfWave, a, &truth);
            assert!((got - want).abs() < 1e-6, "angle={a}: got={got} want={want}");
        }
        assert_eq!(selection.best().model, ModelKind::HalfWave);
    }

    #[test]
    fn selects_quarter_wave_on_quarter_wave_data() {
        let truth = WaveplateParams::new(1.2, 0.4, 7.0);
        let run = run_from(ModelKind::QuarterWave, &truth);
        let selection = fit_run(&run, &FitOptions::default()).unwrap();

        assert_eq!(selection.result.model, ModelKind::QuarterWave);
        assert!(selection.result.quarter_wave_sse < selection.result.half_wave_sse);
        assert_eq!(
            selection.result.sse_for(ModelKind::HalfWave),
            selection.fit_for(ModelKind::HalfWave).sse
        );
    }

    #[test]
    fn empty_run_is_invalid_data() {
        let run = CalibrationRun {
            key: RunKey::new("WP", "r").unwrap(),
            samples: Vec::new(),
        };
        let err = fit_run(&run, &FitOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
