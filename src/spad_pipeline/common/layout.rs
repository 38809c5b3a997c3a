//! Strided view over flat width × height × timebins buffers.
//!
//! Every per-pixel buffer in the pipeline (photon counts, bin-width factors) uses the
//! same order: time bin fastest, then column, then row. `ImageLayout` computes the
//! offsets once so callers address transients by pixel index instead of walking
//! pointers.

use std::fmt;
use std::ops::Range;

use crate::spad_pipeline::common::error::{Result, SpadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageLayout {
    pub width: usize,
    pub height: usize,
    pub timebins: usize,
}

impl ImageLayout {
    pub fn new(width: usize, height: usize, timebins: usize) -> Result<Self> {
        if width == 0 || height == 0 || timebins == 0 {
            return Err(SpadError::InvalidImage(format!(
                "zero sized dimension {}x{}x{}",
                width, height, timebins
            )));
        }
        Ok(Self {
            width,
            height,
            timebins,
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Total number of elements in a per-bin buffer.
    pub fn len(&self) -> usize {
        self.pixel_count() * self.timebins
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements spanned by one image row.
    pub fn row_len(&self) -> usize {
        self.width * self.timebins
    }

    pub fn pixel_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    pub fn transient_range(&self, pixel: usize) -> Range<usize> {
        let start = pixel * self.timebins;
        start..start + self.timebins
    }

    pub fn transient<'a, T>(&self, data: &'a [T], pixel: usize) -> &'a [T] {
        &data[self.transient_range(pixel)]
    }

    pub fn transient_mut<'a, T>(&self, data: &'a mut [T], pixel: usize) -> &'a mut [T] {
        &mut data[self.transient_range(pixel)]
    }

    /// Fails unless `len` matches a full width × height × timebins buffer.
    pub fn check_buffer_len(&self, len: usize) -> Result<()> {
        if len != self.len() {
            return Err(SpadError::InvalidImage(format!(
                "buffer holds {} counts, layout {} needs {}",
                len,
                self,
                self.len()
            )));
        }
        Ok(())
    }

    /// Fails with a dimension mismatch unless `other` describes the same grid.
    pub fn ensure_matches(&self, other: &ImageLayout) -> Result<()> {
        if self != other {
            return Err(SpadError::DimensionMismatch {
                expected: *self,
                found: *other,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ImageLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.timebins)
    }
}

/// Allocates `len` copies of `value`, reporting failure instead of aborting.
pub(crate) fn filled_buffer<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| SpadError::AllocationFailed { elements: len })?;
    buffer.resize(len, value);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            ImageLayout::new(0, 4, 8),
            Err(SpadError::InvalidImage(_))
        ));
        assert!(ImageLayout::new(2, 3, 0).is_err());
    }

    #[test]
    fn test_transient_offsets() {
        let layout = ImageLayout::new(3, 2, 4).unwrap();
        let data: Vec<u16> = (0..layout.len() as u16).collect();

        assert_eq!(layout.pixel_count(), 6);
        assert_eq!(layout.row_len(), 12);
        assert_eq!(layout.pixel_index(1, 1), 4);
        assert_eq!(layout.transient(&data, 4), &[16, 17, 18, 19]);
        assert_eq!(layout.transient(&data, 0), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_transient_mut_writes_only_its_pixel() {
        let layout = ImageLayout::new(2, 1, 3).unwrap();
        let mut data = vec![0u16; layout.len()];
        layout.transient_mut(&mut data, 1).fill(7);
        assert_eq!(data, vec![0, 0, 0, 7, 7, 7]);
    }

    #[test]
    fn test_dimension_checks() {
        let a = ImageLayout::new(2, 2, 8).unwrap();
        let b = ImageLayout::new(2, 1, 8).unwrap();
        assert!(a.check_buffer_len(32).is_ok());
        assert!(a.check_buffer_len(31).is_err());
        assert!(a.ensure_matches(&a).is_ok());
        let err = a.ensure_matches(&b).unwrap_err();
        assert_eq!(err.to_string(), "Dimension mismatch: expected 2x2x8, found 2x1x8");
    }

    #[test]
    fn test_filled_buffer() {
        assert_eq!(filled_buffer(3, 1.5f64).unwrap(), vec![1.5, 1.5, 1.5]);
        assert!(matches!(
            filled_buffer(usize::MAX, 0u64),
            Err(SpadError::AllocationFailed { .. })
        ));
    }
}
