use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::spad_pipeline::{
    calibration::{CalibrationSet, find_peak},
    common::error::{Result, SpadError},
    common::timing::PipelineTimings,
    correction::{CorrectionConfig, correct_transients},
    image::{SpadImage, SpadImageReader, SpadImageWriter, StackCompression, TiffStackReader, TiffStackWriter},
};

pub const BIN_WIDTH_FACTORS_FILE: &str = "binwidth_factors.dat";
pub const TIMEBASE_SHIFTS_FILE: &str = "timebase_shifts.dat";
pub const TIMEBASE_SCALES_FILE: &str = "timebase_scales.dat";
const BIN_WIDTH_FACTORS_DUMP: &str = "binwidth_factors_dump.txt";
const TIMEBASE_SHIFTS_DUMP: &str = "timebase_shifts_dump.txt";
const TIMEBASE_SCALES_DUMP: &str = "timebase_scales_dump.txt";
const PEAKS_AFTER_IMAGE: &str = "detector_peaks_after.tif";

#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// First time bin carrying signal
    pub start_bin: usize,
    /// Last time bin carrying signal
    pub stop_bin: usize,
    /// Known delay between the two peak images in nanoseconds; non-positive when
    /// the timebase should not be calibrated.
    pub delta: f64,
    pub output_dir: PathBuf,
    /// Also write text dumps and the corrected peak image for inspection.
    pub test_dump: bool,
    pub workers: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            start_bin: 10,
            stop_bin: 245,
            delta: -1.0,
            output_dir: PathBuf::from("."),
            test_dump: false,
            workers: None,
            seed: None,
        }
    }
}

/// Result of a calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub calibration: CalibrationSet,
    pub timings: PipelineTimings,
    /// Every file written, in order.
    pub written: Vec<PathBuf>,
}

pub struct CalibrationPipeline<R: SpadImageReader, W: SpadImageWriter> {
    reader: R,
    writer: W,
    config: CalibrationConfig,
}

impl CalibrationPipeline<TiffStackReader, TiffStackWriter> {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            reader: TiffStackReader,
            writer: TiffStackWriter,
            config,
        }
    }
}

impl<R: SpadImageReader, W: SpadImageWriter> CalibrationPipeline<R, W> {
    pub fn with_custom(reader: R, writer: W, config: CalibrationConfig) -> Self {
        Self {
            reader,
            writer,
            config,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    fn correction_config(&self) -> CorrectionConfig {
        CorrectionConfig::builder()
            .workers(self.config.workers)
            .seed(self.config.seed)
            .build()
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(name)
    }

    fn load(&self, path: &Path) -> Result<SpadImage> {
        let _span = tracing::info_span!("load_image", path = %path.display()).entered();
        let data = std::fs::read(path)
            .map_err(|e| SpadError::InputReadError(format!("{}: {}", path.display(), e)))?;
        self.reader.read_image(&data)
    }

    /// Loads the three calibration images and runs [`Self::calibrate_images`].
    #[instrument(skip_all, fields(peak1 = %peak1.as_ref().display()))]
    pub fn calibrate_files<P: AsRef<Path>, Q: AsRef<Path>, S: AsRef<Path>>(
        &self,
        peak1: P,
        peak2: Q,
        white: S,
    ) -> Result<CalibrationReport> {
        let mut timings = PipelineTimings::new();
        let peak1 = timings.time("load_peak1", || self.load(peak1.as_ref()))?;
        let peak2 = timings.time("load_peak2", || self.load(peak2.as_ref()))?;
        let white = timings.time("load_white", || self.load(white.as_ref()))?;

        let mut report = self.calibrate_images(&peak1, &peak2, &white)?;
        for step in report.timings.steps() {
            timings.add_step(step.name.clone(), step.duration);
        }
        report.timings = timings;
        Ok(report)
    }

    /// Derives all three calibration arrays from a peak image, a delayed peak
    /// image and a constant-light image, writing them to the output directory.
    ///
    /// The timebase is calibrated twice: once on the raw peak images to locate
    /// the integration windows for the bin widths, then again on peak images
    /// already corrected for bin widths.
    #[instrument(skip_all, fields(layout = %peak1.layout()))]
    pub fn calibrate_images(
        &self,
        peak1: &SpadImage,
        peak2: &SpadImage,
        white: &SpadImage,
    ) -> Result<CalibrationReport> {
        let config = &self.config;
        let correction = self.correction_config();
        let mut timings = PipelineTimings::new();
        let mut written = Vec::new();
        let mut set = CalibrationSet::new(peak1.layout());

        info!(
            start_bin = config.start_bin,
            stop_bin = config.stop_bin,
            delta = config.delta,
            "Starting calibration"
        );

        timings.time("timebase_shifts", || set.calibrate_timebase_shifts(peak1))?;
        timings.time("timebase_scales", || {
            set.calibrate_timebase_scales(peak2, config.delta)
        })?;

        timings.time("bin_width_factors", || {
            set.calibrate_bin_width_factors(white, config.start_bin, config.stop_bin)
        })?;
        let path = self.output_path(BIN_WIDTH_FACTORS_FILE);
        set.save_bin_width_factors(&path)?;
        written.push(path);
        if config.test_dump {
            let path = self.output_path(BIN_WIDTH_FACTORS_DUMP);
            set.dump_bin_width_factors(&path)?;
            written.push(path);
        }

        // timebase again on peaks corrected for bin widths only
        set.reset_timebase_shifts();
        set.reset_timebase_scales();
        let mut corrected1 = peak1.clone();
        let mut corrected2 = peak2.clone();
        timings.time("correct_bin_widths", || -> Result<()> {
            correct_transients(&mut set, &mut corrected1, &correction)?;
            correct_transients(&mut set, &mut corrected2, &correction)?;
            Ok(())
        })?;

        timings.time("timebase_shifts_refined", || {
            set.calibrate_timebase_shifts(&corrected1)
        })?;
        let path = self.output_path(TIMEBASE_SHIFTS_FILE);
        set.save_timebase_shifts(&path)?;
        written.push(path);
        if config.test_dump {
            let path = self.output_path(TIMEBASE_SHIFTS_DUMP);
            set.dump_timebase_shifts(&path)?;
            written.push(path);
        }

        timings.time("timebase_scales_refined", || {
            set.calibrate_timebase_scales(&corrected2, config.delta)
        })?;
        let scales_path = self.output_path(TIMEBASE_SCALES_FILE);
        set.save_timebase_scales(&scales_path)?;
        written.push(scales_path.clone());
        if config.test_dump {
            let path = self.output_path(TIMEBASE_SCALES_DUMP);
            set.dump_timebase_scales(&path)?;
            written.push(path);
        }

        // fully corrected peaks to check the global timebase
        let mut final1 = peak1.clone();
        let mut final2 = peak2.clone();
        timings.time("correct_full", || -> Result<()> {
            correct_transients(&mut set, &mut final1, &correction)?;
            correct_transients(&mut set, &mut final2, &correction)?;
            Ok(())
        })?;

        if config.delta > 0.0 {
            let separation = (global_peak(&final2) - global_peak(&final1)).abs();
            if separation > 0.0 {
                let calibrated = config.delta / separation;
                info!(
                    from = ?set.calibrated_ns_per_bin(),
                    to = calibrated,
                    "Time calibration tweaked (ns/bin)"
                );
                set.set_calibrated_ns_per_bin(Some(calibrated))?;
                set.save_timebase_scales(&scales_path)?;
            } else {
                warn!("Corrected peaks coincide, keeping per-pixel timebase");
            }
        }

        if config.test_dump {
            let mut sum = final1.saturating_add(&final2)?;
            sum.metadata.microns_per_pixel = white.metadata.microns_per_pixel;
            sum.metadata.ns_per_bin = set
                .calibrated_ns_per_bin()
                .unwrap_or(white.metadata.ns_per_bin);
            let path = self.output_path(PEAKS_AFTER_IMAGE);
            timings.time("save_peaks_after", || {
                self.save(&sum, &path, StackCompression::from_level(5))
            })?;
            written.push(path);
        }

        timings.log_summary();
        info!(
            ns_per_bin = ?set.calibrated_ns_per_bin(),
            files = written.len(),
            "Calibration complete"
        );

        Ok(CalibrationReport {
            calibration: set,
            timings,
            written,
        })
    }

    fn save(&self, image: &SpadImage, path: &Path, compression: StackCompression) -> Result<()> {
        let mut file = std::fs::File::create(path)
            .map_err(|e| SpadError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
        self.writer.write_image(image, &mut file, compression)
    }
}

/// Peak position of the sum of all transients in `image`.
fn global_peak(image: &SpadImage) -> f64 {
    let summed: Vec<f64> = image
        .summed_transient()
        .into_iter()
        .map(|count| count as f64)
        .collect();
    find_peak(&summed)
}
