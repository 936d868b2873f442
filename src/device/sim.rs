//! Simulated bench: a stage and a power meter sharing the commanded angle.
//!
//! The meter reports `predict(model, angle, params)` plus seeded Gaussian
//! noise, so dry runs and tests exercise the full acquisition and fit path
//! without hardware.

use std::cell::Cell;
use std::rc::Rc;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use tracing::trace;

use crate::device::{Actuator, PowerSensor};
use crate::domain::{SensorConfig, SimulationConfig};
use crate::error::AppError;
use crate::models::predict;

pub const SIM_RESOURCE: &str = "sim";

pub struct SimulatedPowerMeter {
    angle: Rc<Cell<i32>>,
    config: SimulationConfig,
    rng: StdRng,
    noise: Normal<f64>,
    readings: usize,
    fail_at_reading: Option<usize>,
}

impl SimulatedPowerMeter {
    /// Make the n-th reading (0-based) fail with a device error.
    pub fn fail_at_reading(mut self, n: usize) -> Self {
        self.fail_at_reading = Some(n);
        self
    }

    pub fn readings(&self) -> usize {
        self.readings
    }
}

impl PowerSensor for SimulatedPowerMeter {
    fn configure(&mut self, config: &SensorConfig) -> Result<(), AppError> {
        trace!(wavelength_nm = config.wavelength_nm, "simulated sensor configured");
        Ok(())
    }

    fn measure_power(&mut self) -> Result<f64, AppError> {
        let n = self.readings;
        self.readings += 1;
        if self.fail_at_reading == Some(n) {
            return Err(AppError::device_io(format!("simulated sensor failure at reading {n}")));
        }
        let angle = f64::from(self.angle.get());
        let clean = predict(self.config.model, angle, &self.config.params);
        Ok(clean + self.noise.sample(&mut self.rng))
    }

    fn identify(&mut self) -> Result<String, AppError> {
        Ok(format!(
            "Simulated,PowerMeter,{},{}",
            self.config.model.display_name(),
            env!("CARGO_PKG_VERSION")
        ))
    }
}

pub struct SimulatedStage {
    angle: Rc<Cell<i32>>,
    fail_at_angle: Option<i32>,
}

impl SimulatedStage {
    pub fn fail_at_angle(mut self, angle_deg: i32) -> Self {
        self.fail_at_angle = Some(angle_deg);
        self
    }

    pub fn angle(&self) -> i32 {
        self.angle.get()
    }
}

impl Actuator for SimulatedStage {
    fn rotate_to(&mut self, angle_deg: i32) -> Result<(), AppError> {
        if self.fail_at_angle == Some(angle_deg) {
            return Err(AppError::device_io(format!("simulated stage stalled at {angle_deg} deg")));
        }
        self.angle.set(angle_deg);
        Ok(())
    }
}

/// Build a connected sensor/stage pair.
pub fn simulated_bench(config: &SimulationConfig) -> Result<(SimulatedPowerMeter, SimulatedStage), AppError> {
    let noise = Normal::new(0.0, config.noise_sigma)
        .map_err(|e| AppError::usage(format!("Invalid simulated noise sigma {}: {e}", config.noise_sigma)))?;
    let angle = Rc::new(Cell::new(0));

    let meter = SimulatedPowerMeter {
        angle: angle.clone(),
        config: *config,
        rng: StdRng::seed_from_u64(config.seed),
        noise,
        readings: 0,
        fail_at_reading: None,
    };
    let stage = SimulatedStage {
        angle,
        fail_at_angle: None,
    };
    Ok((meter, stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelKind, WaveplateParams};
    use crate::error::ErrorKind;

    fn config(noise_sigma: f64) -> SimulationConfig {
        SimulationConfig {
            model: ModelKind::HalfWave,
            params: WaveplateParams::new(0.5, 0.25, 10.0),
            noise_sigma,
            seed: 7,
        }
    }

    #[test]
    fn meter_follows_stage() {
        let (mut meter, mut stage) = simulated_bench(&config(0.0)).unwrap();
        stage.rotate_to(55).unwrap();
        assert_eq!(stage.angle(), 55);
        // sin(2 * (55 - 10) deg) = 1
        assert!((meter.measure_power().unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn same_seed_same_noise() {
        let (mut a, _) = simulated_bench(&config(0.01)).unwrap();
        let (mut b, _) = simulated_bench(&config(0.01)).unwrap();
        for _ in 0..5 {
            assert_eq!(a.measure_power().unwrap(), b.measure_power().unwrap());
        }
    }

    #[test]
    fn injected_failures() {
        let (meter, stage) = simulated_bench(&config(0.0)).unwrap();
        let mut meter = meter.fail_at_reading(1);
        let mut stage = stage.fail_at_angle(3);
        assert!(meter.measure_power().is_ok());
        assert_eq!(meter.measure_power().unwrap_err().kind(), ErrorKind::DeviceIo);
        assert_eq!(meter.readings(), 2);
        assert_eq!(stage.rotate_to(3).unwrap_err().kind(), ErrorKind::DeviceIo);
    }

    #[test]
    fn negative_sigma_is_rejected() {
        assert_eq!(simulated_bench(&config(-1.0)).err().unwrap().kind(), ErrorKind::Usage);
    }
}
