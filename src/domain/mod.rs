//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - run addressing and samples (`RunKey`, `SweepSample`, `CalibrationRun`)
//! - the two waveplate response models (`ModelKind`, `WaveplateParams`)
//! - fit outputs (`ModelFit`, `FitResult`)
//! - the explicit configuration handed to the pipeline (`CalibrationConfig`)

pub mod types;

pub use types::*;
