//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the acquisition/fitting code stays clean and testable
//! - output changes are localized

use std::path::Path;

use crate::data::SweepSummary;
use crate::domain::{CalibrationRun, FitResult, RunKey};
use crate::error::AppError;
use crate::fit::FitSelection;
use crate::io::FitRecord;
use crate::math::format_significant;
use crate::models::predict;

/// Largest absolute residual of the selected model over a run.
pub fn max_abs_residual(run: &CalibrationRun, result: &FitResult) -> f64 {
    run.samples
        .iter()
        .map(|s| (s.power - predict(result.model, f64::from(s.angle), &result.params)).abs())
        .fold(0.0, f64::max)
}

/// Acquisition header: which device, which run, what was swept.
pub fn format_acquisition(key: &RunKey, sensor_idn: &str, summary: &SweepSummary) -> String {
    let mut out = String::new();

    out.push_str("=== wpcal - Waveplate Calibration ===\n");
    out.push_str(&format!("Run: {key}\n"));
    out.push_str(&format!("Sensor: {sensor_idn}\n"));
    match (summary.first_angle, summary.last_angle) {
        (Some(first), Some(last)) => out.push_str(&format!(
            "Sweep: n={} | angle=[{first}, {last}] deg\n",
            summary.samples
        )),
        _ => out.push_str("Sweep: no samples\n"),
    }

    out
}

/// Fit diagnostics for both candidates plus the chosen model.
pub fn format_fit_summary(run: &CalibrationRun, selection: &FitSelection, digits: usize) -> String {
    let mut out = String::new();
    let chosen = selection.result.model;

    out.push_str(&format!("Run: {} | samples={}\n", run.key, run.len()));
    out.push_str("\nModel diagnostics:\n");
    for fit in &selection.fits {
        let mark = if fit.model == chosen { "*" } else { " " };
        out.push_str(&format!(
            "{mark} {:<4} SSE={:.6e} RMSE={:.6e} evals={}\n",
            fit.model.display_name(),
            fit.sse,
            fit.rmse,
            fit.evaluations
        ));
    }

    let p = &selection.result.params;
    out.push_str("\nChosen model:\n");
    out.push_str(&format!(
        "- {} (waveplate_type={})\n",
        chosen.display_name(),
        chosen.tag()
    ));
    out.push_str(&format!(
        "- offset={} amplitude={} phase={} deg\n",
        format_significant(p.offset, digits),
        format_significant(p.amplitude, digits),
        format_significant(p.phase, digits)
    ));
    out.push_str(&format!(
        "- max |residual| = {:.3e}\n",
        max_abs_residual(run, &selection.result)
    ));

    out
}

pub fn format_export(path: &Path) -> String {
    format!("Fit record: {}\n", path.display())
}

/// One line per stored run: id, sample count and the exported model (if any).
/// One line of the `wpcal runs` table.
#[derive(Debug, Clone)]
pub struct RunRow {
    pub run_id: String,
    /// Sample count and exported fit, or why the run could not be read.
    pub contents: Result<(usize, Option<FitRecord>), AppError>,
}

pub fn format_runs(waveplate: &str, runs: &[RunRow]) -> String {
    if runs.is_empty() {
        return format!("No runs stored for '{waveplate}'.\n");
    }

    let mut out = format!("Runs for '{waveplate}':\n");
    out.push_str(&format!("{:<20} {:>7}  {}\n", "RUN", "SAMPLES", "FIT"));
    for row in runs {
        let run_id = &row.run_id;
        let (samples, fit) = match &row.contents {
            Ok((samples, Some(r))) => (
                samples.to_string(),
                format!(
                    "{} offset={} amplitude={} phase={}",
                    r.model, r.fit_offset, r.fit_amplitude, r.fit_phase
                ),
            ),
            Ok((samples, None)) => (samples.to_string(), "-".to_string()),
            Err(err) => ("?".to_string(), format!("unreadable: {err}")),
        };
        out.push_str(&format!("{run_id:<20} {samples:>7}  {fit}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelKind, SweepSample, WaveplateParams};

    #[test]
    fn residual_is_zero_on_model_data() {
        let key = RunKey::new("HWP", "r").unwrap();
        let params = WaveplateParams::new(0.5, 0.3, 10.0);
        let samples = (0..360)
            .map(|a| SweepSample::new(&key, a, predict(ModelKind::HalfWave, f64::from(a), &params)))
            .collect();
        let run = CalibrationRun { key, samples };
        let result = FitResult {
            model: ModelKind::HalfWave,
            params,
            half_wave_sse: 0.0,
            quarter_wave_sse: 1.0,
        };
        assert!(max_abs_residual(&run, &result) < 1e-12);
    }

    #[test]
    fn acquisition_header_names_run_and_range() {
        let key = RunKey::new("QWP-3", "20250101_000000").unwrap();
        let text = format_acquisition(
            &key,
            "Thorlabs,PM100D",
            &SweepSummary {
                samples: 360,
                first_angle: Some(0),
                last_angle: Some(359),
            },
        );
        assert!(text.contains("QWP-3/20250101_000000"));
        assert!(text.contains("n=360 | angle=[0, 359]"));
    }

    #[test]
    fn empty_run_list() {
        assert_eq!(format_runs("X", &[]), "No runs stored for 'X'.\n");
    }

    #[test]
    fn unreadable_run_is_listed_with_its_error() {
        let rows = [
            RunRow {
                run_id: "20250101_000000".into(),
                contents: Err(AppError::storage("bad row 3")),
            },
            RunRow {
                run_id: "20250102_000000".into(),
                contents: Ok((360, None)),
            },
        ];
        let text = format_runs("X", &rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("20250101_000000"));
        assert!(lines[2].ends_with("?  unreadable: bad row 3"));
        assert!(lines[3].ends_with("360  -"));
    }
}
