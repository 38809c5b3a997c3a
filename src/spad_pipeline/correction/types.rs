use crate::spad_pipeline::image::StackCompression;

#[derive(Debug, Clone)]
pub struct CorrectionConfig {
    /// Worker threads; `None` uses the available hardware parallelism.
    pub workers: Option<usize>,
    /// Base seed for the per-worker generators; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub apply_bin_widths: bool,
    pub apply_shifts: bool,
    pub apply_scales: bool,
    /// Spatial binning applied after correction, a power of two.
    pub bin_factor: usize,
    pub output_suffix: String,
    pub compression: StackCompression,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            workers: None,
            seed: None,
            apply_bin_widths: true,
            apply_shifts: true,
            apply_scales: true,
            bin_factor: 1,
            output_suffix: "_corrected".to_string(),
            compression: StackCompression::default(),
        }
    }
}

impl CorrectionConfig {
    pub fn builder() -> CorrectionConfigBuilder {
        CorrectionConfigBuilder::default()
    }

    /// True when at least one calibration array is to be applied.
    pub fn applies_any(&self) -> bool {
        self.apply_bin_widths || self.apply_shifts || self.apply_scales
    }
}

#[derive(Default)]
pub struct CorrectionConfigBuilder {
    workers: Option<Option<usize>>,
    seed: Option<Option<u64>>,
    apply_bin_widths: Option<bool>,
    apply_shifts: Option<bool>,
    apply_scales: Option<bool>,
    bin_factor: Option<usize>,
    output_suffix: Option<String>,
    compression: Option<StackCompression>,
}

impl CorrectionConfigBuilder {
    pub fn workers(mut self, workers: Option<usize>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn apply_bin_widths(mut self, apply: bool) -> Self {
        self.apply_bin_widths = Some(apply);
        self
    }

    pub fn apply_shifts(mut self, apply: bool) -> Self {
        self.apply_shifts = Some(apply);
        self
    }

    pub fn apply_scales(mut self, apply: bool) -> Self {
        self.apply_scales = Some(apply);
        self
    }

    pub fn bin_factor(mut self, factor: usize) -> Self {
        self.bin_factor = Some(factor);
        self
    }

    pub fn output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.output_suffix = Some(suffix.into());
        self
    }

    pub fn compression(mut self, compression: StackCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn build(self) -> CorrectionConfig {
        let default = CorrectionConfig::default();
        CorrectionConfig {
            workers: self.workers.unwrap_or(default.workers),
            seed: self.seed.unwrap_or(default.seed),
            apply_bin_widths: self.apply_bin_widths.unwrap_or(default.apply_bin_widths),
            apply_shifts: self.apply_shifts.unwrap_or(default.apply_shifts),
            apply_scales: self.apply_scales.unwrap_or(default.apply_scales),
            bin_factor: self.bin_factor.unwrap_or(default.bin_factor),
            output_suffix: self.output_suffix.unwrap_or(default.output_suffix),
            compression: self.compression.unwrap_or(default.compression),
        }
    }
}
