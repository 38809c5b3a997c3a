use tracing::{info, instrument, warn};

use crate::spad_pipeline::calibration::timebase_shifts::peak_positions;
use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::common::layout::{ImageLayout, filled_buffer};
use crate::spad_pipeline::image::SpadImage;

/// Trailing-slot value meaning no nanoseconds-per-bin calibration is stored.
/// Any non-positive value read back from a file is treated the same way.
pub const NOT_CALIBRATED: f64 = 0.0;

/// Per-pixel time-axis scale factors, followed by one trailing slot holding the
/// calibrated nanoseconds per bin (or [`NOT_CALIBRATED`]).
#[derive(Debug, Clone, PartialEq)]
pub struct TimebaseScales {
    values: Vec<f64>,
}

impl TimebaseScales {
    pub fn neutral(layout: ImageLayout) -> Result<Self> {
        let pixels = layout.pixel_count();
        let mut values = filled_buffer(pixels + 1, 1.0)?;
        values[pixels] = NOT_CALIBRATED;
        Ok(Self { values })
    }

    pub fn from_vec(layout: ImageLayout, values: Vec<f64>) -> Result<Self> {
        if values.len() != layout.pixel_count() + 1 {
            return Err(SpadError::InvalidCalibration(format!(
                "{} timebase scales for {} pixels (expected {})",
                values.len(),
                layout.pixel_count(),
                layout.pixel_count() + 1
            )));
        }
        Ok(Self { values })
    }

    pub fn pixel_count(&self) -> usize {
        self.values.len() - 1
    }

    pub fn scale(&self, pixel: usize) -> f64 {
        self.values[pixel]
    }

    pub fn scales(&self) -> &[f64] {
        &self.values[..self.pixel_count()]
    }

    /// Full array including the trailing timebase slot, as persisted.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Nanoseconds per bin derived from a known peak delay, if one was stored.
    pub fn calibrated_ns_per_bin(&self) -> Option<f64> {
        let value = self.values[self.pixel_count()];
        (value.is_finite() && value > 0.0).then_some(value)
    }

    pub fn set_calibrated_ns_per_bin(&mut self, ns_per_bin: Option<f64>) {
        let last = self.pixel_count();
        self.values[last] = ns_per_bin.unwrap_or(NOT_CALIBRATED);
    }

    /// Derives scales from a second short-lifetime image delayed against the one
    /// that produced `peak1`. `delta` is the known delay in nanoseconds, or
    /// non-positive when unknown. Returns the scales, the second set of peak
    /// positions and the median peak separation in bins.
    #[instrument(skip(image, peak1), fields(layout = %image.layout()))]
    pub(crate) fn calibrate(
        image: &SpadImage,
        peak1: &[f64],
        delta: f64,
    ) -> Result<(Self, Vec<f64>, f64)> {
        let layout = image.layout();
        let pixels = layout.pixel_count();
        let peak2 = peak_positions(image);

        let mut values = filled_buffer(pixels + 1, 0.0)?;
        for ((slot, &p2), &p1) in values.iter_mut().zip(&peak2).zip(peak1) {
            *slot = (p2 - p1).abs();
        }

        let separation = median(&values[..pixels]);

        let mut degenerate = 0usize;
        for slot in values[..pixels].iter_mut() {
            if *slot > 0.0 && separation > 0.0 {
                *slot = separation / *slot;
            } else {
                degenerate += 1;
                *slot = 1.0;
            }
        }
        if degenerate > 0 {
            warn!(
                pixels = degenerate,
                "Pixels with zero peak separation left at scale 1.0"
            );
        }

        values[pixels] = if delta > 0.0 && separation > 0.0 {
            info!(
                separation_bins = separation,
                delta_ns = delta,
                "Using median peak delta and calibrating timebase"
            );
            delta / separation
        } else {
            info!(separation_bins = separation, "Using median peak delta");
            NOT_CALIBRATED
        };

        Ok((Self { values }, peak2, separation))
    }
}

/// Median of `values`; the mean of the two middle values for even lengths.
pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse_image(centres: &[usize], nbins: usize) -> SpadImage {
        let layout = ImageLayout::new(centres.len(), 1, nbins).unwrap();
        let mut data = vec![0u16; layout.len()];
        for (pixel, &c) in centres.iter().enumerate() {
            let t = layout.transient_mut(&mut data, pixel);
            t[c - 1] = 20;
            t[c] = 40;
            t[c + 1] = 20;
        }
        SpadImage::new(layout, data, Default::default()).unwrap()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[3.0]), 3.0);
        assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_median_ignores_single_outlier() {
        let deltas = [4.0, 4.2, 3.9, 4.1, 400.0];
        let m = median(&deltas);
        assert!((3.9..=4.2).contains(&m));
    }

    #[test]
    fn test_outlier_pixel_does_not_move_separation() {
        let peak1 = vec![4.0; 5];
        // deltas 4, 5, 4, 5 and one stuck pixel at 31
        let image = pulse_image(&[8, 9, 8, 9, 35], 40);
        let (scales, _, separation) = TimebaseScales::calibrate(&image, &peak1, 0.0).unwrap();

        assert!((4.0..=5.0).contains(&separation));
        for &scale in &scales.scales()[..4] {
            assert!((0.8..=1.25).contains(&scale), "scale {}", scale);
        }
        assert!(scales.scale(4) < 0.2);
    }

    #[test]
    fn test_scales_are_median_over_delta() {
        let peak1 = vec![4.0, 4.0, 4.0, 4.0];
        let image = pulse_image(&[8, 8, 12, 6], 20);
        let (scales, peak2, separation) = TimebaseScales::calibrate(&image, &peak1, 0.0).unwrap();

        assert_eq!(peak2, vec![8.0, 8.0, 12.0, 6.0]);
        // deltas 4, 4, 8, 2 -> median 4
        assert_eq!(separation, 4.0);
        assert_eq!(scales.scales(), &[1.0, 1.0, 0.5, 2.0]);
        assert_eq!(scales.calibrated_ns_per_bin(), None);
    }

    #[test]
    fn test_known_delay_sets_timebase() {
        let peak1 = vec![3.0, 3.0];
        let image = pulse_image(&[13, 13], 20);
        let (scales, _, separation) = TimebaseScales::calibrate(&image, &peak1, 2.5).unwrap();
        assert_eq!(separation, 10.0);
        assert_eq!(scales.calibrated_ns_per_bin(), Some(0.25));
    }

    #[test]
    fn test_zero_separation_pixel_stays_neutral() {
        let peak1 = vec![5.0, 5.0, 5.0];
        let image = pulse_image(&[9, 5, 9], 20);
        let (scales, _, _) = TimebaseScales::calibrate(&image, &peak1, 0.0).unwrap();
        assert_eq!(scales.scales(), &[1.0, 1.0, 1.0]);
        assert!(scales.scales().iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_timebase_sentinels() {
        let layout = ImageLayout::new(1, 1, 8).unwrap();
        let neutral = TimebaseScales::neutral(layout).unwrap();
        assert_eq!(neutral.as_slice(), &[1.0, NOT_CALIBRATED]);
        assert_eq!(neutral.calibrated_ns_per_bin(), None);

        // arrays written by older tools mark "not calibrated" with -1.0
        let legacy = TimebaseScales::from_vec(layout, vec![1.0, -1.0]).unwrap();
        assert_eq!(legacy.calibrated_ns_per_bin(), None);

        let mut scales = TimebaseScales::from_vec(layout, vec![1.0, 0.05]).unwrap();
        assert_eq!(scales.calibrated_ns_per_bin(), Some(0.05));
        scales.set_calibrated_ns_per_bin(None);
        assert_eq!(scales.as_slice()[1], NOT_CALIBRATED);
    }
}
