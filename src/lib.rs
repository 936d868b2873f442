//! `waveplate-cal` library crate.
//!
//! The binary (`wpcal`) is a thin wrapper around this library so that:
//!
//! - the sweep, store and fit logic is testable without spawning processes
//!   or attaching instruments (see `device::sim`)
//! - each stage of the pipeline can be reused on its own (refit a stored run,
//!   plot an old sweep)

pub mod app;
pub mod cli;
pub mod data;
pub mod device;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
