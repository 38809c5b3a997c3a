use tracing::debug;

use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::common::layout::ImageLayout;
use crate::spad_pipeline::image::types::SpadImage;

impl SpadImage {
    /// Sums each 2×2 block of pixels into one, in place. Time bins are untouched.
    /// An odd trailing row or column is discarded.
    pub fn bin_by_2(&mut self) -> Result<()> {
        let layout = self.layout();
        let (width, timebins) = (layout.width, layout.timebins);
        let new_layout = ImageLayout::new(width / 2, layout.height / 2, timebins)?;
        let row_len = layout.row_len();
        let data = self.data_mut();

        // The destination offset never exceeds the first source offset, so the
        // forward sweep only overwrites values already consumed.
        for y in 0..new_layout.height {
            let top = 2 * y * row_len;
            let bottom = top + row_len;
            for x in 0..new_layout.width {
                let a = top + 2 * x * timebins;
                let b = a + timebins;
                let c = bottom + 2 * x * timebins;
                let d = c + timebins;
                let out = (y * new_layout.width + x) * timebins;
                for t in 0..timebins {
                    data[out + t] = data[a + t]
                        .saturating_add(data[b + t])
                        .saturating_add(data[c + t])
                        .saturating_add(data[d + t]);
                }
            }
        }

        self.replace_layout(new_layout)?;
        self.metadata.microns_per_pixel *= 2.0;
        Ok(())
    }

    /// Bins by `factor` × `factor` through repeated 2×2 binning.
    pub fn bin(&mut self, factor: usize) -> Result<()> {
        if factor == 0 || !factor.is_power_of_two() {
            return Err(SpadError::InvalidBinFactor(factor));
        }

        let mut remaining = factor;
        while remaining > 1 {
            self.bin_by_2()?;
            remaining /= 2;
        }

        debug!(
            factor,
            width = self.width(),
            height = self.height(),
            "Binned image"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spad_pipeline::image::types::ImageMetadata;

    fn ramp_image(width: usize, height: usize, timebins: usize) -> SpadImage {
        let layout = ImageLayout::new(width, height, timebins).unwrap();
        let data = (0..layout.len()).map(|v| v as u16).collect();
        let metadata = ImageMetadata {
            ns_per_bin: 0.1,
            microns_per_pixel: 3.0,
        };
        SpadImage::new(layout, data, metadata).unwrap()
    }

    #[test]
    fn test_bin_by_2_sums_neighbourhoods() {
        let mut image = ramp_image(2, 2, 2);
        // pixels: (0,1) (2,3) / (4,5) (6,7)
        image.bin_by_2().unwrap();
        assert_eq!(image.layout(), ImageLayout::new(1, 1, 2).unwrap());
        assert_eq!(image.data(), &[12, 16]);
        assert_eq!(image.metadata.microns_per_pixel, 6.0);
        assert_eq!(image.metadata.ns_per_bin, 0.1);
    }

    #[test]
    fn test_bin_preserves_counts_for_even_sizes() {
        let mut image = SpadImage::from_transient(4, 4, &[1, 2, 3]).unwrap();
        let before = image.total_counts();
        image.bin(4).unwrap();
        assert_eq!(image.layout(), ImageLayout::new(1, 1, 3).unwrap());
        assert_eq!(image.total_counts(), before);
        assert_eq!(image.data(), &[16, 32, 48]);
    }

    #[test]
    fn test_bin_discards_odd_edge() {
        let mut image = SpadImage::from_transient(3, 3, &[1]).unwrap();
        image.bin(2).unwrap();
        assert_eq!(image.layout(), ImageLayout::new(1, 1, 1).unwrap());
        assert_eq!(image.data(), &[4]);
    }

    #[test]
    fn test_bin_saturates() {
        let mut image = SpadImage::from_transient(2, 2, &[u16::MAX / 2]).unwrap();
        image.bin(2).unwrap();
        assert_eq!(image.data(), &[u16::MAX]);
    }

    #[test]
    fn test_bin_factor_validation() {
        let mut image = ramp_image(4, 4, 2);
        assert!(matches!(image.bin(3), Err(SpadError::InvalidBinFactor(3))));
        assert!(matches!(image.bin(0), Err(SpadError::InvalidBinFactor(0))));
        image.bin(1).unwrap();
        assert_eq!(image.width(), 4);
    }
}
