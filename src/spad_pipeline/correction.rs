//! Correction module
//!
//! Maps each pixel's bins onto the common time grid and redistributes its photon
//! counts, in parallel over the whole image.

mod borders;
mod executor;
mod redistribute;
mod types;

pub use borders::BinBorders;
pub use executor::{CorrectionOutcome, correct_transients};
pub use redistribute::{PhotonSampler, correct_transient, redistribute};
pub use types::{CorrectionConfig, CorrectionConfigBuilder};
