//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - initializes logging
//! - maps arguments into an explicit `CalibrationConfig`
//! - runs the acquisition/fit pipeline
//! - prints summaries and plots

use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{CalibrateArgs, Cli, Command, FitArgs, FitTuning, PlotArgs, RunsArgs};
use crate::device::sim::SIM_RESOURCE;
use crate::domain::{
    ActuatorConfig, CalibrationConfig, FitOptions, SensorConfig, SimulationConfig, SweepPlan,
    WaveplateParams,
};
use crate::error::AppError;
use crate::io::{CalibrationStore, load_fit_record};

pub mod pipeline;

/// Entry point for the `wpcal` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env file is normal.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Calibrate(args) => handle_calibrate(args),
        Command::Fit(args) => handle_fit(args),
        Command::Plot(args) => handle_plot(args),
        Command::Runs(args) => handle_runs(args),
    };
    if let Err(err) = &result {
        report_failure(err);
    }
    result
}

fn report_failure(err: &AppError) {
    error!(kind = ?err.kind(), "{err}");
}

/// Both the library and the `wpcal` binary targets.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "waveplate_cal=debug,wpcal=debug"
    } else {
        "waveplate_cal=info,wpcal=info"
    }
}

/// Log to stderr so stdout carries only the report.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    // Ignore a second initialization (tests may call `run` more than once).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_calibrate(args: CalibrateArgs) -> Result<(), AppError> {
    let config = calibration_config_from_args(&args);
    let out = pipeline::run_calibration(&config)?;

    println!(
        "{}",
        crate::report::format_acquisition(&out.key, &out.sensor_idn, &out.sweep)
    );
    println!(
        "{}",
        crate::report::format_fit_summary(&out.fit.run, &out.fit.selection, config.export_digits)
    );
    print!("{}", crate::report::format_export(&out.fit.record_path));

    if config.plot {
        let result = &out.fit.selection.result;
        let plot = crate::plot::render_ascii_plot(
            &out.fit.run,
            Some((result.model, &result.params)),
            config.plot_width,
            config.plot_height,
        );
        println!("\n{plot}");
    }

    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let store = CalibrationStore::new(&args.store.data_dir);
    let key = pipeline::resolve_run(&store, &args.store.waveplate, args.run.as_deref())?;
    let opts = fit_options_from_args(&args.fit);

    let out = pipeline::fit_stored_run(&store, &key, &opts, args.fit.digits, args.force)?;

    println!(
        "{}",
        crate::report::format_fit_summary(&out.run, &out.selection, args.fit.digits)
    );
    print!("{}", crate::report::format_export(&out.record_path));

    if !args.plot.no_plot {
        let result = &out.selection.result;
        let plot = crate::plot::render_ascii_plot(
            &out.run,
            Some((result.model, &result.params)),
            args.plot.width,
            args.plot.height,
        );
        println!("\n{plot}");
    }

    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let store = CalibrationStore::new(&args.store.data_dir);
    let key = pipeline::resolve_run(&store, &args.store.waveplate, args.run.as_deref())?;
    let run = store.load_run(&key)?;

    // Overlay the exported (rounded) fit when there is one.
    let record = load_fit_record(&store, &key)?;
    let fit = match &record {
        Some(r) => Some((r.model_kind()?, r.params()?)),
        None => None,
    };

    println!("Run: {key}");
    let plot = crate::plot::render_ascii_plot(
        &run,
        fit.as_ref().map(|(model, params)| (*model, params)),
        args.width,
        args.height,
    );
    println!("{plot}");
    Ok(())
}

fn handle_runs(args: RunsArgs) -> Result<(), AppError> {
    let store = CalibrationStore::new(&args.store.data_dir);
    let waveplate = &args.store.waveplate;

    let rows = pipeline::list_runs(&store, waveplate)?;
    print!("{}", crate::report::format_runs(waveplate, &rows));
    Ok(())
}

pub fn fit_options_from_args(args: &FitTuning) -> FitOptions {
    FitOptions {
        initial: WaveplateParams::new(args.init_offset, args.init_amplitude, args.init_phase),
        patience: args.patience,
        ..FitOptions::default()
    }
}

pub fn calibration_config_from_args(args: &CalibrateArgs) -> CalibrationConfig {
    let sensor = SensorConfig {
        resource: args.sensor.clone(),
        wavelength_nm: args.wavelength_nm,
        unit: args.unit,
        averaging_count: args.averaging,
        timeout: Duration::from_millis(args.timeout_ms),
    };

    let simulation = args.sensor.eq_ignore_ascii_case(SIM_RESOURCE).then(|| SimulationConfig {
        model: args.sim_model,
        params: WaveplateParams::new(args.sim_offset, args.sim_amplitude, args.sim_phase),
        noise_sigma: args.sim_noise,
        seed: args.seed,
    });

    let actuator = match &args.actuator_port {
        Some(port) => ActuatorConfig::Ell14 {
            port: port.clone(),
            address: args.actuator_address,
            pulses_per_degree: args.pulses_per_degree,
        },
        None => ActuatorConfig::Noop,
    };

    CalibrationConfig {
        data_dir: args.store.data_dir.clone(),
        waveplate_name: args.store.waveplate.clone(),
        run_id: args.run.clone(),
        sensor,
        actuator,
        simulation,
        plan: SweepPlan {
            start: args.start,
            end: args.end,
            step: args.step,
        },
        settle: Duration::from_millis(args.settle_ms),
        fit: fit_options_from_args(&args.fit),
        export_digits: args.fit.digits,
        plot: !args.plot.no_plot,
        plot_width: args.plot.width,
        plot_height: args.plot.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use crate::error::ErrorKind;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture_with_default_filter(emit: impl FnOnce()) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(default_filter(false)))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, emit);
        out.text()
    }

    #[test]
    fn failures_are_printed_under_the_default_filter() {
        let err = AppError::new(ErrorKind::StoreNotFound, "No sweep stored for WP/20250101_000000.");
        let text = capture_with_default_filter(|| report_failure(&err));
        assert!(text.contains("ERROR"));
        assert!(text.contains("No sweep stored for WP/20250101_000000."));
        assert!(text.contains("StoreNotFound"));
    }

    #[test]
    fn binary_target_is_enabled_by_default() {
        let text = capture_with_default_filter(|| {
            tracing::error!(target: "wpcal", "sensor unplugged");
            tracing::debug!(target: "wpcal", "hidden detail");
        });
        assert!(text.contains("sensor unplugged"));
        assert!(!text.contains("hidden detail"));
    }

    fn parse(argv: &[&str]) -> CalibrateArgs {
        match Cli::parse_from(argv).command {
            Command::Calibrate(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn sim_sensor_enables_simulation() {
        let args = parse(&[
            "wpcal", "calibrate", "-w", "Q1", "--sensor", "sim", "--sim-model", "qwp", "--no-plot",
        ]);
        let cfg = calibration_config_from_args(&args);
        let sim = cfg.simulation.unwrap();
        assert_eq!(sim.model, ModelKind::QuarterWave);
        assert_eq!(cfg.actuator, ActuatorConfig::Noop);
        assert!(!cfg.plot);
        assert_eq!(cfg.plan, SweepPlan::default());
    }

    #[test]
    fn hardware_config_maps_sensor_and_actuator() {
        let args = parse(&[
            "wpcal",
            "calibrate",
            "-w",
            "H1",
            "--sensor",
            "TCPIP::10.0.0.5::5025::SOCKET",
            "--wavelength-nm",
            "1550",
            "--actuator-port",
            "/dev/ttyUSB0",
            "--step",
            "2",
            "--init-amplitude",
            "0.5",
        ]);
        let cfg = calibration_config_from_args(&args);
        assert!(cfg.simulation.is_none());
        assert_eq!(cfg.sensor.wavelength_nm, 1550);
        assert_eq!(cfg.plan.step, 2);
        assert_eq!(cfg.fit.initial.amplitude, 0.5);
        assert!(matches!(cfg.actuator, ActuatorConfig::Ell14 { ref port, address: '0', .. } if port == "/dev/ttyUSB0"));
    }
}
