use std::path::Path;

use tracing::{debug, info, instrument};

use crate::spad_pipeline::calibration::bin_width::{BinWidthFactors, check_bin_range};
use crate::spad_pipeline::calibration::store::{dump_rows, read_values, write_values};
use crate::spad_pipeline::calibration::timebase_scales::TimebaseScales;
use crate::spad_pipeline::calibration::timebase_shifts::TimebaseShifts;
use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::common::layout::ImageLayout;
use crate::spad_pipeline::image::SpadImage;

/// Calibration state for one detector geometry.
///
/// Owns the three calibration arrays together with the peak positions that the
/// calibrators hand to each other. Any array may be absent; correction treats an
/// absent array as neutral. Every image passed in must match the set's layout.
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    layout: ImageLayout,
    bin_widths: Option<BinWidthFactors>,
    shifts: Option<TimebaseShifts>,
    scales: Option<TimebaseScales>,
    peak1: Option<Vec<f64>>,
    peak2: Option<Vec<f64>>,
}

impl CalibrationSet {
    pub fn new(layout: ImageLayout) -> Self {
        Self {
            layout,
            bin_widths: None,
            shifts: None,
            scales: None,
            peak1: None,
            peak2: None,
        }
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// True when no calibration array is present at all.
    pub fn is_empty(&self) -> bool {
        self.bin_widths.is_none() && self.shifts.is_none() && self.scales.is_none()
    }

    pub fn bin_width_factors(&self) -> Option<&BinWidthFactors> {
        self.bin_widths.as_ref()
    }

    pub fn timebase_shifts(&self) -> Option<&TimebaseShifts> {
        self.shifts.as_ref()
    }

    pub fn timebase_scales(&self) -> Option<&TimebaseScales> {
        self.scales.as_ref()
    }

    pub fn peak1_positions(&self) -> Option<&[f64]> {
        self.peak1.as_deref()
    }

    pub fn peak2_positions(&self) -> Option<&[f64]> {
        self.peak2.as_deref()
    }

    pub fn reset_bin_width_factors(&mut self) {
        self.bin_widths = None;
    }

    pub fn reset_timebase_shifts(&mut self) {
        self.shifts = None;
        self.peak1 = None;
    }

    pub fn reset_timebase_scales(&mut self) {
        self.scales = None;
        self.peak2 = None;
    }

    pub fn reset(&mut self) {
        self.reset_bin_width_factors();
        self.reset_timebase_shifts();
        self.reset_timebase_scales();
    }

    /// Substitutes neutral values for every absent array.
    pub fn fill_missing_with_neutral(&mut self) -> Result<()> {
        if self.bin_widths.is_none() {
            debug!("Bin width factors absent, using neutral values");
            self.bin_widths = Some(BinWidthFactors::neutral(self.layout)?);
        }
        if self.shifts.is_none() {
            debug!("Timebase shifts absent, using neutral values");
            self.shifts = Some(TimebaseShifts::neutral(self.layout)?);
        }
        if self.scales.is_none() {
            debug!("Timebase scales absent, using neutral values");
            self.scales = Some(TimebaseScales::neutral(self.layout)?);
        }
        Ok(())
    }

    /// Calibrates per-pixel time origins from a short-lifetime image.
    #[instrument(skip(self, image))]
    pub fn calibrate_timebase_shifts(&mut self, image: &SpadImage) -> Result<()> {
        self.layout.ensure_matches(&image.layout())?;

        let (shifts, peak1) = TimebaseShifts::calibrate(image)?;
        self.shifts = Some(shifts);
        self.peak1 = Some(peak1);
        Ok(())
    }

    /// Calibrates per-pixel time scales from a second short-lifetime image delayed
    /// against the one used for the shifts, then moves the shifts into the scaled
    /// frame. `delta` is the known delay in nanoseconds; pass zero if unknown.
    ///
    /// Fails without touching any state when the shifts have not been calibrated.
    #[instrument(skip(self, image))]
    pub fn calibrate_timebase_scales(&mut self, image: &SpadImage, delta: f64) -> Result<()> {
        self.layout.ensure_matches(&image.layout())?;
        if self.shifts.is_none() {
            return Err(SpadError::ShiftsNotCalibrated);
        }
        let Some(peak1) = self.peak1.as_deref() else {
            return Err(SpadError::PeakPositionsMissing("timebase shift"));
        };

        let (scales, peak2, _) = TimebaseScales::calibrate(image, peak1, delta)?;
        if let Some(shifts) = self.shifts.as_mut() {
            shifts.rescale(&scales);
        }
        self.scales = Some(scales);
        self.peak2 = Some(peak2);
        Ok(())
    }

    /// Calibrates bin widths from a constant-light image, integrating each pixel
    /// between the peak positions of the two timebase calibrations.
    #[instrument(skip(self, image))]
    pub fn calibrate_bin_width_factors(
        &mut self,
        image: &SpadImage,
        start_bin: usize,
        stop_bin: usize,
    ) -> Result<()> {
        self.layout.ensure_matches(&image.layout())?;
        check_bin_range(start_bin, stop_bin, self.layout.timebins)?;
        let peak1 = self
            .peak1
            .as_deref()
            .ok_or(SpadError::PeakPositionsMissing("timebase shift"))?;
        let peak2 = self
            .peak2
            .as_deref()
            .ok_or(SpadError::PeakPositionsMissing("timebase scale"))?;

        let factors = BinWidthFactors::calibrate(image, peak1, peak2, start_bin, stop_bin)?;
        self.bin_widths = Some(factors);
        Ok(())
    }

    /// Nanoseconds per bin measured from a known peak delay, if available.
    pub fn calibrated_ns_per_bin(&self) -> Option<f64> {
        self.scales
            .as_ref()
            .and_then(TimebaseScales::calibrated_ns_per_bin)
    }

    pub fn set_calibrated_ns_per_bin(&mut self, ns_per_bin: Option<f64>) -> Result<()> {
        let scales = self
            .scales
            .as_mut()
            .ok_or(SpadError::MissingCalibration("timebase scales"))?;
        scales.set_calibrated_ns_per_bin(ns_per_bin);
        Ok(())
    }

    pub fn load_bin_width_factors(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let values = read_values(path, self.layout.len())?;
        self.bin_widths = Some(BinWidthFactors::from_vec(self.layout, values)?);
        info!(path = %path.display(), "Loaded bin width factors");
        Ok(())
    }

    pub fn load_timebase_shifts(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let values = read_values(path, self.layout.pixel_count() + 1)?;
        self.shifts = Some(TimebaseShifts::from_vec(self.layout, values)?);
        info!(path = %path.display(), "Loaded timebase shifts");
        Ok(())
    }

    pub fn load_timebase_scales(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let values = read_values(path, self.layout.pixel_count() + 1)?;
        let scales = TimebaseScales::from_vec(self.layout, values)?;
        info!(
            path = %path.display(),
            ns_per_bin = ?scales.calibrated_ns_per_bin(),
            "Loaded timebase scales"
        );
        self.scales = Some(scales);
        Ok(())
    }

    pub fn save_bin_width_factors(&self, path: impl AsRef<Path>) -> Result<()> {
        write_values(path.as_ref(), self.require_bin_widths()?.as_slice())
    }

    pub fn save_timebase_shifts(&self, path: impl AsRef<Path>) -> Result<()> {
        write_values(path.as_ref(), self.require_shifts()?.as_slice())
    }

    pub fn save_timebase_scales(&self, path: impl AsRef<Path>) -> Result<()> {
        write_values(path.as_ref(), self.require_scales()?.as_slice())
    }

    /// One line of comma separated factors per pixel.
    pub fn dump_bin_width_factors(&self, path: impl AsRef<Path>) -> Result<()> {
        dump_rows(
            path.as_ref(),
            self.require_bin_widths()?.as_slice(),
            self.layout.timebins,
        )
    }

    /// One shift per line; the trailing mean peak position is not written.
    pub fn dump_timebase_shifts(&self, path: impl AsRef<Path>) -> Result<()> {
        dump_rows(path.as_ref(), self.require_shifts()?.shifts(), 1)
    }

    /// One scale per line; the trailing ns/bin slot is not written.
    pub fn dump_timebase_scales(&self, path: impl AsRef<Path>) -> Result<()> {
        dump_rows(path.as_ref(), self.require_scales()?.scales(), 1)
    }

    fn require_bin_widths(&self) -> Result<&BinWidthFactors> {
        self.bin_widths
            .as_ref()
            .ok_or(SpadError::MissingCalibration("bin width factors"))
    }

    fn require_shifts(&self) -> Result<&TimebaseShifts> {
        self.shifts
            .as_ref()
            .ok_or(SpadError::MissingCalibration("timebase shifts"))
    }

    fn require_scales(&self) -> Result<&TimebaseScales> {
        self.scales
            .as_ref()
            .ok_or(SpadError::MissingCalibration("timebase scales"))
    }
}
