//! Whole-image correction across a pool of workers.
//!
//! Rows are split into one contiguous range per worker. Workers read the shared
//! calibration arrays and write only their own rows, so the image needs no
//! locking. Each worker owns its border buffers, scratch transient and sampler.

use std::num::NonZeroUsize;
use std::ops::Range;

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::spad_pipeline::calibration::{
    BinWidthFactors, CalibrationSet, TimebaseScales, TimebaseShifts,
};
use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::correction::borders::BinBorders;
use crate::spad_pipeline::correction::redistribute::{PhotonSampler, correct_transient};
use crate::spad_pipeline::correction::types::CorrectionConfig;
use crate::spad_pipeline::image::SpadImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// No calibration array was present; the image is untouched.
    Skipped,
    Corrected { pixels: usize, workers: usize },
}

/// Splits `height` rows into `workers` contiguous ranges; the last range takes
/// the remainder.
pub(crate) fn partition_rows(height: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.clamp(1, height.max(1));
    let rows_per_worker = height / workers;
    (0..workers)
        .map(|w| {
            let start = w * rows_per_worker;
            let stop = if w + 1 == workers {
                height
            } else {
                start + rows_per_worker
            };
            start..stop
        })
        .collect()
}

fn worker_count(config: &CorrectionConfig, height: usize) -> usize {
    let requested = config.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    });
    requested.clamp(1, height.max(1))
}

/// Corrects every transient of `image` in place with the arrays in `set`.
///
/// Absent arrays are replaced by neutral ones first. With no array present at all
/// the call logs a warning and leaves the image alone. Blocks until every worker
/// has finished.
#[instrument(skip_all, fields(layout = %image.layout()))]
pub fn correct_transients(
    set: &mut CalibrationSet,
    image: &mut SpadImage,
    config: &CorrectionConfig,
) -> Result<CorrectionOutcome> {
    let layout = image.layout();
    set.layout().ensure_matches(&layout)?;

    if set.is_empty() {
        warn!("No calibration set, correction skipped");
        return Ok(CorrectionOutcome::Skipped);
    }
    set.fill_missing_with_neutral()?;

    let widths = set
        .bin_width_factors()
        .ok_or(SpadError::MissingCalibration("bin width factors"))?;
    let shifts = set
        .timebase_shifts()
        .ok_or(SpadError::MissingCalibration("timebase shifts"))?;
    let scales = set
        .timebase_scales()
        .ok_or(SpadError::MissingCalibration("timebase scales"))?;

    let workers = worker_count(config, layout.height);
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let ranges = partition_rows(layout.height, workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("spad-correct-{}", i))
        .build()
        .map_err(|e| SpadError::WorkerPool(e.to_string()))?;

    let row_len = layout.row_len();
    let mut rest = image.data_mut();
    pool.scope(|scope| {
        for (worker, rows) in ranges.into_iter().enumerate() {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(rows.len() * row_len);
            rest = tail;
            let first_pixel = rows.start * layout.width;
            scope.spawn(move |_| {
                debug!(worker, ?rows, "Correcting rows");
                let sampler = PhotonSampler::for_worker(seed, worker);
                correct_rows(chunk, first_pixel, widths, shifts, scales, sampler);
            });
        }
    });

    info!(pixels = layout.pixel_count(), workers, "Transients corrected");
    Ok(CorrectionOutcome::Corrected {
        pixels: layout.pixel_count(),
        workers,
    })
}

fn correct_rows(
    rows: &mut [u16],
    first_pixel: usize,
    widths: &BinWidthFactors,
    shifts: &TimebaseShifts,
    scales: &TimebaseScales,
    mut sampler: PhotonSampler,
) {
    let timebins = widths.layout().timebins;
    let mut borders = BinBorders::new(timebins);
    let mut scratch = Vec::with_capacity(timebins);

    for (offset, transient) in rows.chunks_exact_mut(timebins).enumerate() {
        let pixel = first_pixel + offset;
        borders.compute(widths.pixel(pixel), shifts.shift(pixel), scales.scale(pixel));
        correct_transient(transient, &borders, &mut sampler, &mut scratch);
    }
}
