//! Data acquisition.
//!
//! - drive sensor + actuator through an angular sweep, persisting each sample (`sweep`)

pub mod sweep;

pub use sweep::*;
