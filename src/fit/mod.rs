//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - fit one waveplate model with Levenberg–Marquardt (`fitter`)
//! - fit both models and select by residual sum of squares (`selection`)

pub mod fitter;
pub mod selection;

pub use fitter::*;
pub use selection::*;
