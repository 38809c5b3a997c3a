use rayon::prelude::*;
use tracing::{info, instrument};

use crate::spad_pipeline::calibration::peak::find_peak;
use crate::spad_pipeline::calibration::timebase_scales::TimebaseScales;
use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::common::layout::{ImageLayout, filled_buffer};
use crate::spad_pipeline::image::SpadImage;

/// Per-pixel time-origin offsets in bins, followed by one trailing slot holding
/// the mean peak position measured during calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct TimebaseShifts {
    values: Vec<f64>,
}

impl TimebaseShifts {
    /// Zero shift everywhere; the mean peak position defaults to a sixth of the
    /// transient.
    pub fn neutral(layout: ImageLayout) -> Result<Self> {
        let pixels = layout.pixel_count();
        let mut values = filled_buffer(pixels + 1, 0.0)?;
        values[pixels] = layout.timebins as f64 / 6.0;
        Ok(Self { values })
    }

    pub fn from_vec(layout: ImageLayout, values: Vec<f64>) -> Result<Self> {
        if values.len() != layout.pixel_count() + 1 {
            return Err(SpadError::InvalidCalibration(format!(
                "{} timebase shifts for {} pixels (expected {})",
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

    pub fn shift(&self, pixel: usize) -> f64 {
        self.values[pixel]
    }

    pub fn shifts(&self) -> &[f64] {
        &self.values[..self.pixel_count()]
    }

    pub fn mean_peak_position(&self) -> f64 {
        self.values[self.pixel_count()]
    }

    /// Full array including the trailing mean, as persisted.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Locates every pixel's peak and stores its offset from the mean peak.
    /// Returns the shifts together with the raw peak positions.
    #[instrument(skip(image), fields(layout = %image.layout()))]
    pub(crate) fn calibrate(image: &SpadImage) -> Result<(Self, Vec<f64>)> {
        let layout = image.layout();
        let peaks = peak_positions(image);

        let mean = peaks.iter().sum::<f64>() / peaks.len() as f64;

        let mut values = filled_buffer(layout.pixel_count() + 1, 0.0)?;
        for (shift, &peak) in values.iter_mut().zip(&peaks) {
            *shift = peak - mean;
        }
        values[layout.pixel_count()] = mean;

        info!(mean_peak = mean, "Timebase shifts calibrated");
        Ok((Self { values }, peaks))
    }

    /// Moves the shifts into the frame stretched by `scales`:
    /// `shift = scale * (mean + shift) - mean`.
    pub(crate) fn rescale(&mut self, scales: &TimebaseScales) {
        let mean = self.mean_peak_position();
        let pixels = self.pixel_count();
        for (shift, &scale) in self.values[..pixels].iter_mut().zip(scales.scales()) {
            *shift = scale * (mean + *shift) - mean;
        }
    }
}

/// Centroid peak position of every pixel's transient, in pixel order.
pub(crate) fn peak_positions(image: &SpadImage) -> Vec<f64> {
    image
        .data()
        .par_chunks_exact(image.timebins())
        .map(find_peak::<u16>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(nbins: usize, centre: usize) -> Vec<u16> {
        let mut transient = vec![0u16; nbins];
        transient[centre - 1] = 50;
        transient[centre] = 100;
        transient[centre + 1] = 50;
        transient
    }

    fn image_with_peaks(centres: &[usize], nbins: usize) -> SpadImage {
        let layout = ImageLayout::new(centres.len(), 1, nbins).unwrap();
        let data = centres.iter().flat_map(|&c| pulse(nbins, c)).collect();
        SpadImage::new(layout, data, Default::default()).unwrap()
    }

    #[test]
    fn test_neutral_values() {
        let layout = ImageLayout::new(2, 2, 24).unwrap();
        let shifts = TimebaseShifts::neutral(layout).unwrap();
        assert_eq!(shifts.as_slice().len(), 5);
        assert_eq!(shifts.shifts(), &[0.0; 4]);
        assert_eq!(shifts.mean_peak_position(), 4.0);
    }

    #[test]
    fn test_shifts_relative_to_mean_peak() {
        let image = image_with_peaks(&[4, 6, 8, 10], 16);
        let (shifts, peaks) = TimebaseShifts::calibrate(&image).unwrap();

        assert_eq!(peaks, vec![4.0, 6.0, 8.0, 10.0]);
        assert_eq!(shifts.mean_peak_position(), 7.0);
        assert_eq!(shifts.shifts(), &[-3.0, -1.0, 1.0, 3.0]);
    }

    #[test]
    fn test_pixels_are_located_independently() {
        // a later pixel must not see counts from earlier ones
        let image = image_with_peaks(&[12, 3], 16);
        let peaks = peak_positions(&image);
        assert_eq!(peaks, vec![12.0, 3.0]);
    }

    #[test]
    fn test_rescale_uses_trailing_mean() {
        let layout = ImageLayout::new(2, 1, 16).unwrap();
        let mut shifts = TimebaseShifts::from_vec(layout, vec![-1.0, 1.0, 5.0]).unwrap();
        let scales = TimebaseScales::from_vec(layout, vec![2.0, 0.5, 0.0]).unwrap();
        shifts.rescale(&scales);
        // 2 * (5 - 1) - 5 = 3 ; 0.5 * (5 + 1) - 5 = -2
        assert_eq!(shifts.shifts(), &[3.0, -2.0]);
        assert_eq!(shifts.mean_peak_position(), 5.0);
    }

    #[test]
    fn test_from_vec_length_check() {
        let layout = ImageLayout::new(2, 2, 8).unwrap();
        assert!(TimebaseShifts::from_vec(layout, vec![0.0; 4]).is_err());
        assert!(TimebaseShifts::from_vec(layout, vec![0.0; 5]).is_ok());
    }
}
