//! Pipeline conversions module
//!
//! Orchestration of the two end-to-end runs: deriving a calibration from
//! reference acquisitions, and applying it to batches of new acquisitions.

mod calibrate;
mod correct;


pub use calibrate::{
    BIN_WIDTH_FACTORS_FILE, CalibrationConfig, CalibrationPipeline, CalibrationReport,
    TIMEBASE_SCALES_FILE, TIMEBASE_SHIFTS_FILE,
};
pub use correct::{CalibrationSources, CorrectionPipeline};
