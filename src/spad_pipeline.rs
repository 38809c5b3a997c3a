//! SPAD transient correction pipeline
//!
//! Calibrates per-pixel timing non-linearities of a time-resolved SPAD array and
//! redistributes photon counts of new acquisitions onto a common time grid.

pub mod common;
pub mod image;
pub mod calibration;
pub mod correction;
pub mod conversions;

pub use common::{
    ImageLayout,
    PipelineTimings,
    Result,
    SpadError,
};

pub use image::{
    ImageMetadata,
    SpadImage,
    SpadImageReader,
    SpadImageWriter,
    StackCompression,
    TiffStackReader,
    TiffStackWriter,
};

pub use calibration::{
    BinWidthFactors,
    CalibrationSet,
    TimebaseScales,
    TimebaseShifts,
    find_peak,
};

pub use correction::{
    BinBorders,
    CorrectionConfig,
    CorrectionConfigBuilder,
    CorrectionOutcome,
    PhotonSampler,
    correct_transients,
};

pub use conversions::{
    CalibrationConfig,
    CalibrationPipeline,
    CalibrationReport,
    CalibrationSources,
    CorrectionPipeline,
};
