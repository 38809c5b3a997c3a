use thiserror::Error;

use crate::spad_pipeline::common::layout::ImageLayout;

#[derive(Error, Debug)]
pub enum SpadError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Start bin {start_bin} outside 0..{timebins}")]
    StartBinOutOfRange { start_bin: usize, timebins: usize },

    #[error("Stop bin {stop_bin} outside 0..{timebins}")]
    StopBinOutOfRange { stop_bin: usize, timebins: usize },

    #[error("Start bin {start_bin} is after stop bin {stop_bin}")]
    StartBinAfterStopBin { start_bin: usize, stop_bin: usize },

    #[error("Failed to allocate {elements} elements")]
    AllocationFailed { elements: usize },

    #[error("Timebase scales require timebase shifts to be calibrated first")]
    ShiftsNotCalibrated,

    #[error("Peak positions from {0} calibration are not available")]
    PeakPositionsMissing(&'static str),

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        expected: ImageLayout,
        found: ImageLayout,
    },

    #[error("No {0} stored")]
    MissingCalibration(&'static str),

    #[error("Invalid calibration data: {0}")]
    InvalidCalibration(String),

    #[error("Calibration file {path} holds {found} bytes, expected {expected}")]
    CalibrationFileSize {
        path: String,
        expected: u64,
        found: u64,
    },

    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Bin factor {0} is not a power of two")]
    InvalidBinFactor(usize),

    #[error("No input files match {0}")]
    NoInputFiles(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SpadError {
    /// Negative status code for callers that report failures numerically.
    pub fn code(&self) -> i32 {
        match self {
            SpadError::InvalidImage(_) => -1,
            SpadError::StartBinOutOfRange { .. } => -2,
            SpadError::StopBinOutOfRange { .. } => -3,
            SpadError::StartBinAfterStopBin { .. } => -4,
            SpadError::AllocationFailed { .. } => -5,
            SpadError::ShiftsNotCalibrated => -6,
            SpadError::PeakPositionsMissing(_) => -7,
            SpadError::DimensionMismatch { .. } => -8,
            SpadError::MissingCalibration(_) => -9,
            SpadError::CalibrationFileSize { .. } => -10,
            SpadError::InputReadError(_) => -11,
            SpadError::OutputWriteError(_) => -12,
            SpadError::DecodeError(_) => -13,
            SpadError::EncodeError(_) => -14,
            SpadError::UnsupportedFormat(_) => -15,
            SpadError::InvalidBinFactor(_) => -16,
            SpadError::NoInputFiles(_) => -17,
            SpadError::WorkerPool(_) => -18,
            SpadError::IoError(_) => -19,
            SpadError::InvalidCalibration(_) => -20,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpadError>;
