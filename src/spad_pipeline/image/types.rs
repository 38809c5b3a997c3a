//! SPAD image data types

use std::slice::ChunksExact;

use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::common::layout::{ImageLayout, filled_buffer};

/// Physical scale carried alongside the counts. Zero means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageMetadata {
    /// Time per histogram bin in nanoseconds
    pub ns_per_bin: f64,
    /// Edge length of one pixel in micrometres
    pub microns_per_pixel: f64,
}

/// A width × height grid of transients stored in one contiguous buffer,
/// time bin fastest, then column, then row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpadImage {
    layout: ImageLayout,
    data: Vec<u16>,
    pub metadata: ImageMetadata,
}

impl SpadImage {
    pub fn new(layout: ImageLayout, data: Vec<u16>, metadata: ImageMetadata) -> Result<Self> {
        layout.check_buffer_len(data.len())?;
        Ok(Self {
            layout,
            data,
            metadata,
        })
    }

    pub fn zeros(layout: ImageLayout) -> Result<Self> {
        let data = filled_buffer(layout.len(), 0u16)?;
        Ok(Self {
            layout,
            data,
            metadata: ImageMetadata::default(),
        })
    }

    /// Builds an image where every pixel holds a copy of `transient`.
    pub fn from_transient(width: usize, height: usize, transient: &[u16]) -> Result<Self> {
        let layout = ImageLayout::new(width, height, transient.len())?;
        let mut image = Self::zeros(layout)?;
        for pixel in image.data.chunks_exact_mut(layout.timebins) {
            pixel.copy_from_slice(transient);
        }
        Ok(image)
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn width(&self) -> usize {
        self.layout.width
    }

    pub fn height(&self) -> usize {
        self.layout.height
    }

    pub fn timebins(&self) -> usize {
        self.layout.timebins
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u16] {
        &mut self.data
    }

    pub fn transient(&self, pixel: usize) -> &[u16] {
        self.layout.transient(&self.data, pixel)
    }

    pub fn transient_mut(&mut self, pixel: usize) -> &mut [u16] {
        self.layout.transient_mut(&mut self.data, pixel)
    }

    pub fn transients(&self) -> ChunksExact<'_, u16> {
        self.data.chunks_exact(self.layout.timebins)
    }

    pub fn total_counts(&self) -> u64 {
        self.data.iter().map(|&v| v as u64).sum()
    }

    /// Sum of every pixel's transient, bin by bin.
    pub fn summed_transient(&self) -> Vec<u64> {
        let mut sum = vec![0u64; self.layout.timebins];
        for transient in self.transients() {
            for (acc, &count) in sum.iter_mut().zip(transient) {
                *acc += count as u64;
            }
        }
        sum
    }

    /// Element-wise saturating sum of two images of identical layout.
    pub fn saturating_add(&self, other: &SpadImage) -> Result<SpadImage> {
        self.layout.ensure_matches(&other.layout)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a.saturating_add(b))
            .collect();
        Ok(SpadImage {
            layout: self.layout,
            data,
            metadata: self.metadata,
        })
    }

    pub(crate) fn replace_layout(&mut self, layout: ImageLayout) -> Result<()> {
        if layout.len() > self.data.len() {
            return Err(SpadError::InvalidImage(format!(
                "layout {} larger than buffer of {} counts",
                layout,
                self.data.len()
            )));
        }
        self.data.truncate(layout.len());
        self.layout = layout;
        Ok(())
    }
}

/// Output compression for saved image stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackCompression {
    /// No compression (fastest, largest file)
    None,
    /// LZW compression
    Lzw,
    /// Deflate compression - fast level
    #[default]
    DeflateFast,
    /// Deflate compression - balanced
    DeflateBalanced,
    /// Deflate compression - best compression (slower)
    DeflateBest,
}

impl StackCompression {
    /// Maps a gzip style level (0 = none, 1 = fast .. 9 = best, negative = default).
    pub fn from_level(level: i32) -> Self {
        match level {
            0 => StackCompression::None,
            1..=3 => StackCompression::DeflateFast,
            4..=6 => StackCompression::DeflateBalanced,
            7.. => StackCompression::DeflateBest,
            _ => StackCompression::default(),
        }
    }
}
