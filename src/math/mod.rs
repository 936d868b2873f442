//! Mathematical utilities: the nonlinear least-squares solve and residual statistics.

pub mod lm;
pub mod stats;

pub use lm::*;
pub use stats::*;
