//! Angle sweep acquisition.
//!
//! One blocking step at a time: rotate, settle, measure, persist. The sweep
//! aborts at the first device or storage failure; everything appended before
//! that point stays in the store.

use std::time::Duration;

use tracing::{debug, info};

use crate::device::{Actuator, PowerSensor};
use crate::domain::{RunKey, SweepPlan, SweepSample};
use crate::error::AppError;
use crate::io::store::CalibrationStore;

/// What a finished sweep wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub samples: usize,
    pub first_angle: Option<i32>,
    pub last_angle: Option<i32>,
}

/// Drives a sensor and an actuator through a `SweepPlan`.
pub struct Sweep<'a> {
    store: &'a CalibrationStore,
    sensor: &'a mut dyn PowerSensor,
    actuator: &'a mut dyn Actuator,
    settle: Duration,
}

impl<'a> Sweep<'a> {
    pub fn new(
        store: &'a CalibrationStore,
        sensor: &'a mut dyn PowerSensor,
        actuator: &'a mut dyn Actuator,
    ) -> Self {
        Self {
            store,
            sensor,
            actuator,
            settle: Duration::ZERO,
        }
    }

    /// Pause between rotating and measuring.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn run(&mut self, key: &RunKey, plan: &SweepPlan) -> Result<SweepSummary, AppError> {
        plan.validate()?;

        let total = plan.len();
        let tenth = (total / 10).max(1);
        let mut summary = SweepSummary {
            samples: 0,
            first_angle: None,
            last_angle: None,
        };

        info!(run = %key, start = plan.start, end = plan.end, step = plan.step, total, "sweep started");

        for angle in plan.angles() {
            self.actuator.rotate_to(angle)?;
            if !self.settle.is_zero() {
                std::thread::sleep(self.settle);
            }
            let power = self.sensor.measure_power()?;
            self.store.append(&SweepSample::new(key, angle, power))?;

            summary.samples += 1;
            summary.first_angle.get_or_insert(angle);
            summary.last_angle = Some(angle);

            debug!(angle, power, "sample");
            if summary.samples % tenth == 0 || summary.samples == total {
                info!(
                    done = summary.samples,
                    total,
                    percent = summary.samples * 100 / total,
                    "sweep progress"
                );
            }
        }

        info!(run = %key, samples = summary.samples, "sweep finished");
        Ok(summary)
    }
}

/// Run one sweep with no settle delay.
pub fn run_sweep(
    store: &CalibrationStore,
    key: &RunKey,
    plan: &SweepPlan,
    sensor: &mut dyn PowerSensor,
    actuator: &mut dyn Actuator,
) -> Result<SweepSummary, AppError> {
    Sweep::new(store, sensor, actuator).run(key, plan)
}
