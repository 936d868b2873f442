//! Levenberg–Marquardt solve for the three-parameter waveplate models.
//!
//! We wrap a `(model, angles, powers)` triple in the `LeastSquaresProblem`
//! interface of the `levenberg-marquardt` crate and hand it analytic Jacobians
//! from `models::jacobian_row`. Parameter vector layout: `[offset, amplitude, phase]`.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{DMatrix, DVector, Dyn, storage::Owned};

use crate::domain::{FitOptions, ModelKind, WaveplateParams};
use crate::models::{jacobian_row, predict};

/// What the solver reported after minimizing.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub params: WaveplateParams,
    pub evaluations: usize,
    pub converged: bool,
    /// Solver termination reason, for diagnostics.
    pub termination: String,
}

struct WaveplateProblem<'a> {
    model: ModelKind,
    angles: &'a [f64],
    powers: &'a [f64],
    params: DVector<f64>,
}

impl WaveplateProblem<'_> {
    fn current(&self) -> WaveplateParams {
        to_params(&self.params)
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for WaveplateProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let p = self.current();
        let r = DVector::from_iterator(
            self.angles.len(),
            self.angles
                .iter()
                .zip(self.powers.iter())
                .map(|(&a, &y)| predict(self.model, a, &p) - y),
        );
        let finite = r.iter().all(|v| v.is_finite());
        finite.then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let p = self.current();
        let mut jac = DMatrix::<f64>::zeros(self.angles.len(), 3);
        for (i, &a) in self.angles.iter().enumerate() {
            let row = jacobian_row(self.model, a, &p);
            for (j, v) in row.into_iter().enumerate() {
                jac[(i, j)] = v;
            }
        }
        let finite = jac.iter().all(|v| v.is_finite());
        finite.then_some(jac)
    }
}

fn to_params(x: &DVector<f64>) -> WaveplateParams {
    WaveplateParams::new(x[0], x[1], x[2])
}

/// Minimize `Σ (P(θ_i) − y_i)²` for one model kind.
///
/// Callers are expected to have validated that `angles` and `powers` have the
/// same length and contain only finite values.
pub fn solve(model: ModelKind, angles: &[f64], powers: &[f64], opts: &FitOptions) -> SolveReport {
    let init = opts.initial;
    let problem = WaveplateProblem {
        model,
        angles,
        powers,
        params: DVector::from_vec(vec![init.offset, init.amplitude, init.phase]),
    };

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.patience.max(1));

    let (problem, report) = lm.minimize(problem);

    SolveReport {
        params: problem.current(),
        evaluations: report.number_of_evaluations,
        converged: report.termination.was_successful(),
        termination: format!("{:?}", report.termination),
    }
}
