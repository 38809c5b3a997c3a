//! Common utilities module
//!
//! This module contains shared utilities used across the SPAD pipeline.

pub mod error;
pub mod layout;
pub mod timing;

pub use error::{Result, SpadError};
pub use layout::ImageLayout;
pub use timing::{PipelineTimings, StepTimer, StepTiming};
