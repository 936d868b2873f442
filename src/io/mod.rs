//! Input/output helpers.
//!
//! - per-run sweep persistence (`store`)
//! - fit record JSON read/write (`export`)

pub mod export;
pub mod store;

pub use export::*;
pub use store::*;
