//! Calibration module
//!
//! Peak location, the three calibrators (bin widths, timebase shifts, timebase
//! scales) and the calibration set that owns their results and persists them.

mod bin_width;
mod context;
mod peak;
mod store;
mod timebase_scales;
mod timebase_shifts;

pub use bin_width::BinWidthFactors;
pub use context::CalibrationSet;
pub use peak::find_peak;
pub use timebase_scales::{NOT_CALIBRATED, TimebaseScales};
pub use timebase_shifts::TimebaseShifts;
