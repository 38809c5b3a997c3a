//! Time-resolved SPAD image module
//!
//! This module holds the in-memory image type, the container codec traits with a
//! TIFF-stack implementation, and spatial box binning.

mod binning;
mod reader;
mod tiff_stack;
pub mod types;
mod writer;

pub use reader::SpadImageReader;
pub use tiff_stack::{TiffStackReader, TiffStackWriter};
pub use types::{ImageMetadata, SpadImage, StackCompression};
pub use writer::SpadImageWriter;
