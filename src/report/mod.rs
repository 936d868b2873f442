//! Reporting utilities: run summaries and fit diagnostics for stdout.

pub mod format;

pub use format::*;
