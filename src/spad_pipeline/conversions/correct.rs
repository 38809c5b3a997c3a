use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{error, info, instrument};

use crate::spad_pipeline::{
    calibration::CalibrationSet,
    common::error::{Result, SpadError},
    common::layout::ImageLayout,
    common::timing::PipelineTimings,
    conversions::calibrate::{BIN_WIDTH_FACTORS_FILE, TIMEBASE_SCALES_FILE, TIMEBASE_SHIFTS_FILE},
    correction::{CorrectionConfig, CorrectionOutcome, correct_transients},
    image::{SpadImageReader, SpadImageWriter, TiffStackReader, TiffStackWriter},
};

/// Where the correction pipeline loads its calibration arrays from.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSources {
    pub bin_width_factors: PathBuf,
    pub timebase_shifts: PathBuf,
    pub timebase_scales: PathBuf,
}

impl CalibrationSources {
    /// The standard file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            bin_width_factors: dir.join(BIN_WIDTH_FACTORS_FILE),
            timebase_shifts: dir.join(TIMEBASE_SHIFTS_FILE),
            timebase_scales: dir.join(TIMEBASE_SCALES_FILE),
        }
    }
}

impl Default for CalibrationSources {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

/// Applies one calibration to any number of acquisitions.
///
/// Calibration arrays are loaded lazily, against the dimensions of the first
/// image corrected, and reused for every later image.
pub struct CorrectionPipeline<R: SpadImageReader, W: SpadImageWriter> {
    reader: R,
    writer: W,
    config: CorrectionConfig,
    sources: CalibrationSources,
    calibration: Option<CalibrationSet>,
}

impl CorrectionPipeline<TiffStackReader, TiffStackWriter> {
    pub fn new(config: CorrectionConfig, sources: CalibrationSources) -> Self {
        Self::with_custom(TiffStackReader, TiffStackWriter, config, sources)
    }
}

impl<R: SpadImageReader, W: SpadImageWriter> CorrectionPipeline<R, W> {
    pub fn with_custom(
        reader: R,
        writer: W,
        config: CorrectionConfig,
        sources: CalibrationSources,
    ) -> Self {
        Self {
            reader,
            writer,
            config,
            sources,
            calibration: None,
        }
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    pub fn calibration(&self) -> Option<&CalibrationSet> {
        self.calibration.as_ref()
    }

    /// Output path for `input`: same directory, stem plus the configured suffix.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        input.with_file_name(format!("{}{}.tif", stem, self.config.output_suffix))
    }

    fn load_calibration(&self, layout: ImageLayout) -> Result<CalibrationSet> {
        let _span = tracing::info_span!("load_calibration", %layout).entered();
        let mut set = CalibrationSet::new(layout);

        if !self.config.applies_any() {
            info!("All corrections disabled");
            return Ok(set);
        }
        if self.config.apply_bin_widths {
            set.load_bin_width_factors(&self.sources.bin_width_factors)?;
        }
        if self.config.apply_shifts {
            set.load_timebase_shifts(&self.sources.timebase_shifts)?;
        }
        if self.config.apply_scales {
            set.load_timebase_scales(&self.sources.timebase_scales)?;
        }
        Ok(set)
    }

    /// Decodes one image, corrects it, bins it and encodes the result.
    #[instrument(skip(self, input_data, output), fields(input_size = input_data.len()))]
    pub fn correct(
        &mut self,
        input_data: &[u8],
        output: &mut dyn Write,
    ) -> Result<(CorrectionOutcome, PipelineTimings)> {
        let mut timings = PipelineTimings::new();

        let mut image = timings.time("decode", || self.reader.read_image(input_data))?;

        let set = match self.calibration.take() {
            Some(set) => set,
            None => timings.time("load_calibration", || {
                self.load_calibration(image.layout())
            })?,
        };
        let set = self.calibration.insert(set);
        let calibrated_ns_per_bin = set.calibrated_ns_per_bin();

        let outcome = timings.time("correct_transients", || {
            correct_transients(set, &mut image, &self.config)
        })?;

        if let Some(ns_per_bin) = calibrated_ns_per_bin {
            image.metadata.ns_per_bin = ns_per_bin;
        }

        if self.config.bin_factor > 1 {
            timings.time("bin", || image.bin(self.config.bin_factor))?;
        }

        timings.time("encode", || {
            self.writer
                .write_image(&image, output, self.config.compression)
        })?;

        info!(
            width = image.width(),
            height = image.height(),
            timebins = image.timebins(),
            ns_per_bin = image.metadata.ns_per_bin,
            "Image corrected"
        );
        Ok((outcome, timings))
    }

    #[instrument(skip(self, input_path, output_path))]
    pub fn correct_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input_path: P,
        output_path: Q,
    ) -> Result<(CorrectionOutcome, PipelineTimings)> {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            "Correcting file"
        );

        let input_data = {
            let _span = tracing::info_span!("read_input_file").entered();
            std::fs::read(input_path).map_err(|e| {
                SpadError::InputReadError(format!("{}: {}", input_path.display(), e))
            })?
        };

        let mut output_file = {
            let _span = tracing::info_span!("create_output_file").entered();
            std::fs::File::create(output_path).map_err(|e| {
                SpadError::OutputWriteError(format!("{}: {}", output_path.display(), e))
            })?
        };

        self.correct(&input_data, &mut output_file)
    }

    /// Corrects every file matching `pattern`, in sorted order, writing each
    /// result next to its input. Stops at the first failure and returns it.
    #[instrument(skip(self))]
    pub fn run_batch(&mut self, pattern: &str) -> Result<Vec<PathBuf>> {
        let mut inputs: Vec<PathBuf> = glob::glob(pattern)
            .map_err(|e| SpadError::InputReadError(format!("{}: {}", pattern, e)))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        inputs.sort();

        if inputs.is_empty() {
            return Err(SpadError::NoInputFiles(pattern.to_string()));
        }

        let total = inputs.len();
        let mut outputs = Vec::with_capacity(total);
        for (index, input) in inputs.iter().enumerate() {
            let output = self.output_path(input);
            info!("{}/{}: {}", index + 1, total, input.display());
            if let Err(e) = self.correct_file(input, &output) {
                error!(
                    input = %input.display(),
                    code = e.code(),
                    remaining = total - index - 1,
                    "Correction failed, aborting batch: {}", e
                );
                return Err(e);
            }
            outputs.push(output);
        }

        info!(files = total, "Batch complete");
        Ok(outputs)
    }
}
