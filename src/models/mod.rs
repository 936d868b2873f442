//! Waveplate response models.
//!
//! Models are implemented as small, pure functions so that fitting and plotting
//! code can stay generic over `ModelKind`.

pub mod model;

pub use model::*;
