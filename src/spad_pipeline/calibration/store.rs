//! Calibration array persistence.
//!
//! Arrays are stored as raw native-endian `f64` values with no header; the element
//! count is implied by the image dimensions the file is loaded against. Text dumps
//! are for inspection only and are never read back.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::common::layout::filled_buffer;

pub(crate) fn write_values(path: &Path, values: &[f64]) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| SpadError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
    file.write_all(bytemuck::cast_slice(values))
        .map_err(|e| SpadError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), values = values.len(), "Calibration array saved");
    Ok(())
}

/// Reads exactly `count` values, failing if the file holds any other amount.
pub(crate) fn read_values(path: &Path, count: usize) -> Result<Vec<f64>> {
    let mut file = File::open(path)
        .map_err(|e| SpadError::InputReadError(format!("{}: {}", path.display(), e)))?;

    let expected = (count * std::mem::size_of::<f64>()) as u64;
    let found = file.metadata()?.len();
    if found != expected {
        return Err(SpadError::CalibrationFileSize {
            path: path.display().to_string(),
            expected,
            found,
        });
    }

    let mut values = filled_buffer(count, 0.0f64)?;
    file.read_exact(bytemuck::cast_slice_mut(&mut values))
        .map_err(|e| SpadError::InputReadError(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), values = count, "Calibration array loaded");
    Ok(values)
}

/// Writes `values` as comma separated rows of `row_len` entries.
pub(crate) fn dump_rows(path: &Path, values: &[f64], row_len: usize) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| SpadError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
    let mut out = BufWriter::new(file);
    for row in values.chunks(row_len.max(1)) {
        let line = row
            .iter()
            .map(|v| format!("{:.6}", v))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}
