//! Differential non-linearity (DNL) calibration.
//!
//! Under constant illumination every bin of an ideal pixel collects the same
//! expected count, so a bin's count relative to the pixel's mean is its relative
//! width. The mean is taken between the two calibration peaks so the factors stay
//! consistent with the time calibration derived from those peaks.

use std::ops::Range;

use tracing::{info, instrument, warn};

use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::common::layout::{ImageLayout, filled_buffer};
use crate::spad_pipeline::image::SpadImage;

/// Per-pixel, per-bin width factors, laid out like the image (pixel-major).
#[derive(Debug, Clone, PartialEq)]
pub struct BinWidthFactors {
    layout: ImageLayout,
    factors: Vec<f64>,
}

impl BinWidthFactors {
    /// All factors 1.0: every bin has its nominal width.
    pub fn neutral(layout: ImageLayout) -> Result<Self> {
        Ok(Self {
            layout,
            factors: filled_buffer(layout.len(), 1.0)?,
        })
    }

    pub fn from_vec(layout: ImageLayout, factors: Vec<f64>) -> Result<Self> {
        if factors.len() != layout.len() {
            return Err(SpadError::InvalidCalibration(format!(
                "{} bin width factors for layout {} (expected {})",
                factors.len(),
                layout,
                layout.len()
            )));
        }
        Ok(Self { layout, factors })
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.factors
    }

    pub fn pixel(&self, pixel: usize) -> &[f64] {
        self.layout.transient(&self.factors, pixel)
    }

    /// Derives factors from a constant-light image. Bins outside
    /// `start_bin..stop_bin` keep factor 1.0.
    #[instrument(skip(image, peak1, peak2), fields(layout = %image.layout()))]
    pub(crate) fn calibrate(
        image: &SpadImage,
        peak1: &[f64],
        peak2: &[f64],
        start_bin: usize,
        stop_bin: usize,
    ) -> Result<Self> {
        let layout = image.layout();
        check_bin_range(start_bin, stop_bin, layout.timebins)?;

        let mut calibrated = Self::neutral(layout)?;
        let mut degenerate = 0usize;

        for (pixel, (transient, factors)) in image
            .transients()
            .zip(calibrated.factors.chunks_exact_mut(layout.timebins))
            .enumerate()
        {
            let window = integration_window(peak1[pixel], peak2[pixel], layout.timebins);
            let mean = mean_count(&transient[window]);

            // zero-width window or no photons: leave the pixel neutral
            if mean <= 0.0 {
                degenerate += 1;
                continue;
            }

            for (factor, &count) in factors[start_bin..stop_bin]
                .iter_mut()
                .zip(&transient[start_bin..stop_bin])
            {
                *factor = count as f64 / mean;
            }
        }

        if degenerate > 0 {
            warn!(
                pixels = degenerate,
                "Pixels without signal between calibration peaks left at factor 1.0"
            );
        }
        info!(start_bin, stop_bin, "Bin width factors calibrated");

        Ok(calibrated)
    }
}

/// Validates `0 <= start_bin <= stop_bin <= timebins - 1`.
pub(crate) fn check_bin_range(start_bin: usize, stop_bin: usize, timebins: usize) -> Result<()> {
    if start_bin >= timebins {
        return Err(SpadError::StartBinOutOfRange {
            start_bin,
            timebins,
        });
    }
    if stop_bin >= timebins {
        return Err(SpadError::StopBinOutOfRange { stop_bin, timebins });
    }
    if start_bin > stop_bin {
        return Err(SpadError::StartBinAfterStopBin {
            start_bin,
            stop_bin,
        });
    }
    Ok(())
}

/// Bins from the earlier peak up to and including the later one, clipped to the
/// transient.
fn integration_window(peak1: f64, peak2: f64, timebins: usize) -> Range<usize> {
    // truncation towards zero; negative or NaN positions clamp to bin 0
    let a = peak1.max(0.0) as usize;
    let b = peak2.max(0.0) as usize;
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    lo.min(timebins)..(hi + 1).min(timebins)
}

fn mean_count(counts: &[u16]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    counts.iter().map(|&c| c as f64).sum::<f64>() / counts.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_range_errors_are_distinct() {
        assert!(check_bin_range(0, 7, 8).is_ok());
        assert!(check_bin_range(3, 3, 8).is_ok());
        assert!(matches!(
            check_bin_range(8, 7, 8),
            Err(SpadError::StartBinOutOfRange { start_bin: 8, .. })
        ));
        assert!(matches!(
            check_bin_range(0, 8, 8),
            Err(SpadError::StopBinOutOfRange { stop_bin: 8, .. })
        ));
        assert!(matches!(
            check_bin_range(5, 4, 8),
            Err(SpadError::StartBinAfterStopBin { .. })
        ));
    }

    #[test]
    fn test_integration_window_orders_and_clips() {
        assert_eq!(integration_window(2.4, 5.9, 10), 2..6);
        assert_eq!(integration_window(5.9, 2.4, 10), 2..6);
        assert_eq!(integration_window(3.0, 3.0, 10), 3..4);
        assert_eq!(integration_window(8.5, 12.0, 10), 8..10);
        assert_eq!(integration_window(-1.0, 1.2, 10), 0..2);
        assert_eq!(integration_window(11.0, 12.0, 10), 10..10);
    }

    #[test]
    fn test_factors_relative_to_window_mean() {
        let image = SpadImage::from_transient(1, 1, &[1, 8, 10, 12, 10, 6, 30, 2]).unwrap();
        // window 2..=4 -> mean of [10, 12, 10] = 32/3
        let factors = BinWidthFactors::calibrate(&image, &[2.0], &[4.0], 1, 7).unwrap();
        let mean = 32.0 / 3.0;
        let expected = [
            1.0,
            8.0 / mean,
            10.0 / mean,
            12.0 / mean,
            10.0 / mean,
            6.0 / mean,
            30.0 / mean,
            1.0,
        ];
        for (got, want) in factors.pixel(0).iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_flat_light_gives_unit_factors() {
        let image = SpadImage::from_transient(3, 2, &[50; 16]).unwrap();
        let peaks1 = vec![4.0; 6];
        let peaks2 = vec![9.5; 6];
        let factors = BinWidthFactors::calibrate(&image, &peaks1, &peaks2, 2, 14).unwrap();
        assert!(factors.as_slice().iter().all(|&f| f == 1.0));
    }

    #[test]
    fn test_dark_window_stays_neutral() {
        let image = SpadImage::from_transient(1, 1, &[5, 5, 0, 0, 5, 5]).unwrap();
        let factors = BinWidthFactors::calibrate(&image, &[2.0], &[3.0], 0, 5).unwrap();
        assert_eq!(factors.pixel(0), &[1.0; 6]);
    }

    #[test]
    fn test_window_beyond_transient_stays_neutral() {
        let image = SpadImage::from_transient(1, 1, &[5; 6]).unwrap();
        let factors = BinWidthFactors::calibrate(&image, &[7.0], &[9.0], 0, 5).unwrap();
        assert_eq!(factors.pixel(0), &[1.0; 6]);
    }

    #[test]
    fn test_from_vec_length_check() {
        let layout = ImageLayout::new(2, 1, 3).unwrap();
        assert!(BinWidthFactors::from_vec(layout, vec![1.0; 6]).is_ok());
        assert!(matches!(
            BinWidthFactors::from_vec(layout, vec![1.0; 5]),
            Err(SpadError::InvalidCalibration(_))
        ));
    }
}
