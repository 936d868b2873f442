//! Shared calibration pipeline logic used by the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! connect -> identify -> configure -> sweep -> fit -> select -> export
//!
//! The CLI handlers can then focus on presentation (printing summaries and plots).

use std::path::PathBuf;

use tracing::{info, warn};

use crate::data::{Sweep, SweepSummary};
use crate::device::{DeviceSession, open_actuator, open_scpi_meter, simulated_bench};
use crate::domain::{CalibrationConfig, CalibrationRun, FitOptions, RunKey};
use crate::error::AppError;
use crate::fit::{FitSelection, fit_run};
use crate::io::{CalibrationStore, export, load_fit_record};
use crate::report::RunRow;

/// All computed outputs of fitting one stored run.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub run: CalibrationRun,
    pub selection: FitSelection,
    pub record_path: PathBuf,
}

/// All computed outputs of a `wpcal calibrate` run.
#[derive(Debug, Clone)]
pub struct CalibrationOutput {
    pub key: RunKey,
    pub sensor_idn: String,
    pub sweep: SweepSummary,
    pub fit: FitOutput,
}

/// Open the configured sensor and actuator (or the simulated bench).
pub fn open_session(config: &CalibrationConfig) -> Result<DeviceSession, AppError> {
    if let Some(sim) = &config.simulation {
        let (meter, stage) = simulated_bench(sim)?;
        info!(model = sim.model.display_name(), "using simulated bench");
        return Ok(DeviceSession::new(Box::new(meter), Box::new(stage)));
    }

    let sensor = open_scpi_meter(&config.sensor)?;
    let actuator = open_actuator(&config.actuator, config.sensor.timeout)?;
    Ok(DeviceSession::new(sensor, actuator))
}

/// Execute the full calibration: devices are opened from `config`.
pub fn run_calibration(config: &CalibrationConfig) -> Result<CalibrationOutput, AppError> {
    let key = prepare_run(config)?;
    let session = open_session(config)?;
    calibrate(config, key, session)
}

/// Execute the full calibration with already opened devices.
pub fn run_calibration_with(config: &CalibrationConfig, session: DeviceSession) -> Result<CalibrationOutput, AppError> {
    let key = prepare_run(config)?;
    calibrate(config, key, session)
}

/// Everything that can be rejected before touching a device.
fn prepare_run(config: &CalibrationConfig) -> Result<RunKey, AppError> {
    config.plan.validate()?;

    let key = match &config.run_id {
        Some(run_id) => RunKey::new(config.waveplate_name.clone(), run_id.clone())?,
        None => RunKey::generate(config.waveplate_name.clone())?,
    };

    let store = CalibrationStore::new(&config.data_dir);
    if store.exists(&key) {
        return Err(AppError::usage(format!(
            "Run {key} already has sweep data; pick a new run id."
        )));
    }
    Ok(key)
}

fn calibrate(config: &CalibrationConfig, key: RunKey, mut session: DeviceSession) -> Result<CalibrationOutput, AppError> {
    let store = CalibrationStore::new(&config.data_dir);

    // 1) Confirm and configure the sensor.
    let sensor_idn = session.sensor.identify()?;
    info!(idn = %sensor_idn, "sensor identified");
    session.sensor.beep()?;
    session.sensor.configure(&config.sensor)?;

    // 2) Sweep.
    let sweep = Sweep::new(&store, session.sensor.as_mut(), session.actuator.as_mut())
        .with_settle(config.settle)
        .run(&key, &config.plan)?;

    // Devices are not needed for fitting.
    drop(session);

    // 3) Fit, select, export.
    let fit = fit_stored_run(&store, &key, &config.fit, config.export_digits, false)?;

    Ok(CalibrationOutput {
        key,
        sensor_idn,
        sweep,
        fit,
    })
}

/// Fit a stored run, select the model and export its record.
///
/// An existing record is only replaced when `overwrite` is set.
pub fn fit_stored_run(
    store: &CalibrationStore,
    key: &RunKey,
    opts: &FitOptions,
    digits: usize,
    overwrite: bool,
) -> Result<FitOutput, AppError> {
    let run = store.load_run(key)?;
    if !overwrite && store.fit_path(key).is_file() {
        return Err(AppError::usage(format!(
            "Run {key} already has a fit record; pass --force to replace it."
        )));
    }

    let selection = fit_run(&run, opts)?;
    let record_path = export(store, key, &selection.result, digits)?;

    Ok(FitOutput {
        run,
        selection,
        record_path,
    })
}

/// Every stored run of `waveplate` with its sample count and fit record.
///
/// A run that cannot be read is reported in its row instead of failing the listing.
pub fn list_runs(store: &CalibrationStore, waveplate: &str) -> Result<Vec<RunRow>, AppError> {
    let mut rows = Vec::new();
    for run_id in store.list_runs(waveplate)? {
        let key = RunKey::new(waveplate, run_id.as_str())?;
        let contents = store
            .load(&key)
            .and_then(|samples| Ok((samples.len(), load_fit_record(store, &key)?)));
        if let Err(err) = &contents {
            warn!(run = %key, "unreadable run: {err}");
        }
        rows.push(RunRow { run_id, contents });
    }
    Ok(rows)
}

/// The explicit run if given, otherwise the most recent stored run.
pub fn resolve_run(store: &CalibrationStore, waveplate: &str, run_id: Option<&str>) -> Result<RunKey, AppError> {
    match run_id {
        Some(id) => RunKey::new(waveplate, id),
        None => store.latest_run(waveplate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ActuatorConfig, ModelKind, SensorConfig, SimulationConfig, SweepPlan, WaveplateParams,
    };
    use crate::error::ErrorKind;
    use std::time::Duration;

    fn config(dir: &std::path::Path, model: ModelKind) -> CalibrationConfig {
        CalibrationConfig {
            data_dir: dir.to_path_buf(),
            waveplate_name: "WP-1".into(),
            run_id: Some("20250101_000000".into()),
            sensor: SensorConfig {
                resource: "sim".into(),
                ..SensorConfig::default()
            },
            actuator: ActuatorConfig::Noop,
            simulation: Some(SimulationConfig {
                model,
                params: WaveplateParams::new(0.5, 0.3, 10.0),
                noise_sigma: 0.0,
                seed: 3,
            }),
            plan: SweepPlan::default(),
            settle: Duration::ZERO,
            fit: FitOptions::default(),
            export_digits: 2,
            plot: false,
            plot_width: 80,
            plot_height: 20,
        }
    }

    #[test]
    fn simulated_calibration_selects_the_simulated_model() {
        let dir = tempfile::tempdir().unwrap();
        for model in ModelKind::ALL {
            let mut cfg = config(dir.path(), model);
            cfg.waveplate_name = model.display_name().into();
            let out = run_calibration(&cfg).unwrap();
            assert_eq!(out.sweep.samples, 360);
            assert_eq!(out.fit.selection.result.model, model);
            assert!(out.fit.record_path.is_file());
        }
    }

    #[test]
    fn existing_run_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ModelKind::HalfWave);
        run_calibration(&cfg).unwrap();
        assert_eq!(run_calibration(&cfg).unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn bad_plan_fails_before_opening_devices() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), ModelKind::HalfWave);
        cfg.simulation = None;
        cfg.sensor.resource = "TCPIP::256.0.0.1::5025::SOCKET".into();
        cfg.plan.step = 0;
        assert_eq!(run_calibration(&cfg).unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn refit_keeps_the_record_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ModelKind::HalfWave);
        let out = run_calibration(&cfg).unwrap();
        let store = CalibrationStore::new(dir.path());
        let key = out.key;
        let before = std::fs::read_to_string(store.fit_path(&key)).unwrap();

        let err = fit_stored_run(&store, &key, &FitOptions::default(), 4, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.to_string().contains("--force"));
        assert_eq!(std::fs::read_to_string(store.fit_path(&key)).unwrap(), before);

        fit_stored_run(&store, &key, &FitOptions::default(), 4, true).unwrap();
        assert_ne!(std::fs::read_to_string(store.fit_path(&key)).unwrap(), before);
    }

    #[test]
    fn malformed_run_does_not_hide_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), ModelKind::HalfWave);
        cfg.run_id = Some("20250102_000000".into());
        cfg.plan = SweepPlan { start: 0, end: 90, step: 1 };
        run_calibration(&cfg).unwrap();

        let store = CalibrationStore::new(dir.path());
        let broken = RunKey::new("WP-1", "20250101_000000").unwrap();
        store.ensure_run_dir(&broken).unwrap();
        std::fs::write(store.sweep_path(&broken), "angle,power\n0,not-a-number\n").unwrap();

        let rows = list_runs(&store, "WP-1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].run_id, "20250101_000000");
        assert_eq!(rows[0].contents.as_ref().unwrap_err().kind(), ErrorKind::Storage);
        let (samples, record) = rows[1].contents.as_ref().unwrap();
        assert_eq!(*samples, 90);
        assert!(record.is_some());
    }

    #[test]
    fn resolve_run_prefers_explicit_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path());
        assert_eq!(resolve_run(&store, "W", Some("x")).unwrap().run_id, "x");
        assert_eq!(resolve_run(&store, "W", None).unwrap_err().kind(), ErrorKind::StoreNotFound);
    }
}
