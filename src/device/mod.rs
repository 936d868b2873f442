//! Instrument adapters.
//!
//! The acquisition loop only talks to two small traits:
//!
//! - [`PowerSensor`]: configure, identify, measure (blocking, one request in flight)
//! - [`Actuator`]: rotate the plate to an integer angle
//!
//! Implementations:
//!
//! - `scpi`: SCPI optical power meters (PM100 command set) over TCP or USBTMC
//! - `ell14`: Thorlabs Elliptec ELL14 rotation mount over a serial port
//! - `sim`: a simulated bench (sensor + stage sharing the commanded angle)
//! - [`NoopActuator`]: records nothing, moves nothing

use tracing::{debug, trace};

use crate::domain::{ActuatorConfig, SensorConfig};
use crate::error::AppError;

pub mod ell14;
pub mod scpi;
pub mod sim;

pub use ell14::Ell14Rotator;
pub use scpi::{ScpiPowerMeter, open_scpi_meter};
pub use sim::{SimulatedPowerMeter, SimulatedStage, simulated_bench};

/// An optical power sensor.
pub trait PowerSensor {
    /// Apply wavelength correction, unit and averaging.
    fn configure(&mut self, config: &SensorConfig) -> Result<(), AppError>;

    /// Take one blocking power reading.
    fn measure_power(&mut self) -> Result<f64, AppError>;

    /// Identification string (`*IDN?` for SCPI devices).
    fn identify(&mut self) -> Result<String, AppError>;

    /// Audible confirmation that the right device is connected.
    fn beep(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Something that rotates the waveplate.
pub trait Actuator {
    fn rotate_to(&mut self, angle_deg: i32) -> Result<(), AppError>;

    fn close(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Actuator used when no rotation hardware is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActuator;

impl Actuator for NoopActuator {
    fn rotate_to(&mut self, angle_deg: i32) -> Result<(), AppError> {
        trace!(angle_deg, "no-op actuator: rotation skipped");
        Ok(())
    }
}

/// Open devices for one calibration. Both are closed when this is dropped,
/// on success and error paths alike.
pub struct DeviceSession {
    pub sensor: Box<dyn PowerSensor>,
    pub actuator: Box<dyn Actuator>,
}

impl DeviceSession {
    pub fn new(sensor: Box<dyn PowerSensor>, actuator: Box<dyn Actuator>) -> Self {
        Self { sensor, actuator }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        // Teardown is best effort; a failing close cannot be acted on here.
        if let Err(e) = self.actuator.close() {
            debug!(error = %e, "ignoring actuator close failure");
        }
        if let Err(e) = self.sensor.close() {
            debug!(error = %e, "ignoring sensor close failure");
        }
    }
}

/// Build the configured actuator.
pub fn open_actuator(config: &ActuatorConfig, timeout: std::time::Duration) -> Result<Box<dyn Actuator>, AppError> {
    match config {
        ActuatorConfig::Noop => Ok(Box::new(NoopActuator)),
        ActuatorConfig::Ell14 {
            port,
            address,
            pulses_per_degree,
        } => Ok(Box::new(Ell14Rotator::open(port, *address, *pulses_per_degree, timeout)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingSensor {
        closed: Rc<Cell<u32>>,
    }

    impl PowerSensor for CountingSensor {
        fn configure(&mut self, _config: &SensorConfig) -> Result<(), AppError> {
            Ok(())
        }

        fn measure_power(&mut self) -> Result<f64, AppError> {
            Ok(1.0)
        }

        fn identify(&mut self) -> Result<String, AppError> {
            Ok("counting".into())
        }

        fn close(&mut self) -> Result<(), AppError> {
            self.closed.set(self.closed.get() + 1);
            Err(AppError::device_io("already gone"))
        }
    }

    struct CountingActuator {
        closed: Rc<Cell<u32>>,
    }

    impl Actuator for CountingActuator {
        fn rotate_to(&mut self, _angle_deg: i32) -> Result<(), AppError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), AppError> {
            self.closed.set(self.closed.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn session_closes_both_devices_and_swallows_close_errors() {
        let closed = Rc::new(Cell::new(0));
        {
            let _session = DeviceSession::new(
                Box::new(CountingSensor { closed: closed.clone() }),
                Box::new(CountingActuator { closed: closed.clone() }),
            );
        }
        assert_eq!(closed.get(), 2);
    }

    #[test]
    fn noop_actuator_accepts_any_angle() {
        let mut a = open_actuator(&ActuatorConfig::Noop, std::time::Duration::from_millis(1)).unwrap();
        for angle in [0, 90, 359] {
            a.rotate_to(angle).unwrap();
        }
    }
}
