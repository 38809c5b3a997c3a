use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spad_correct_rs::logger;
use spad_correct_rs::spad_pipeline::{
    CalibrationConfig, CalibrationPipeline, CalibrationSources, CorrectionConfig,
    CorrectionPipeline, StackCompression,
};
use tracing::info;

/// SPAD transient DNL/INL calibration and correction
#[derive(Parser, Debug)]
#[command(name = "spad_correct")]
#[command(version)]
struct Args {
    /// Worker threads (default: available parallelism)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Seed for the photon redistribution generators (default: random)
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive calibration arrays from two peak images and a constant-light image
    Calibrate {
        /// Image with the peak in its normal position
        #[arg(long = "p1", value_name = "PEAK1_IMAGE")]
        peak1: PathBuf,

        /// Image with the peak delayed
        #[arg(long = "p2", value_name = "PEAK2_IMAGE")]
        peak2: PathBuf,

        /// Image acquired under constant light
        #[arg(short, long)]
        white: PathBuf,

        /// First time bin carrying signal
        #[arg(long)]
        start_bin: usize,

        /// Last time bin carrying signal
        #[arg(long)]
        stop_bin: usize,

        /// Delay between the peaks in ns; calibrates the time axis when positive
        #[arg(short, long, default_value_t = -1.0, allow_hyphen_values = true)]
        delta: f64,

        /// Directory for the calibration files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Also write text dumps and the corrected peak image
        #[arg(short, long)]
        test_files: bool,
    },

    /// Correct every acquisition matching a glob pattern
    Correct {
        /// Input files, wildcards allowed
        #[arg(short, long)]
        input: String,

        /// Output filename suffix
        #[arg(short, long, default_value = "_corrected")]
        suffix: String,

        /// Directory holding the calibration files
        #[arg(long, default_value = ".")]
        calibration_dir: PathBuf,

        /// Bin width factors file (overrides the calibration directory)
        #[arg(long)]
        binwidth_factors_file: Option<PathBuf>,

        /// Timebase shifts file (overrides the calibration directory)
        #[arg(long)]
        timebase_shifts_file: Option<PathBuf>,

        /// Timebase scales file (overrides the calibration directory)
        #[arg(long)]
        timebase_scales_file: Option<PathBuf>,

        /// Turn off the bin width correction
        #[arg(long)]
        no_binwidth_factors: bool,

        /// Turn off the timebase shift correction
        #[arg(long)]
        no_timebase_shifts: bool,

        /// Turn off the timebase scale correction
        #[arg(long)]
        no_timebase_scales: bool,

        /// Bin b x b after correction (power of two)
        #[arg(short, long, default_value_t = 1)]
        binning: usize,

        /// Deflate level of the output, 0 for none
        #[arg(long, default_value_t = 1)]
        compression: i32,
    },
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();

    match args.command {
        Command::Calibrate {
            peak1,
            peak2,
            white,
            start_bin,
            stop_bin,
            delta,
            output_dir,
            test_files,
        } => {
            let config = CalibrationConfig {
                start_bin,
                stop_bin,
                delta,
                output_dir,
                test_dump: test_files,
                workers: args.workers,
                seed: args.seed,
            };
            let pipeline = CalibrationPipeline::new(config);
            let report = pipeline
                .calibrate_files(&peak1, &peak2, &white)
                .context("calibration failed")?;
            info!(
                ns_per_bin = ?report.calibration.calibrated_ns_per_bin(),
                files = report.written.len(),
                "Calibration written"
            );
        }
        Command::Correct {
            input,
            suffix,
            calibration_dir,
            binwidth_factors_file,
            timebase_shifts_file,
            timebase_scales_file,
            no_binwidth_factors,
            no_timebase_shifts,
            no_timebase_scales,
            binning,
            compression,
        } => {
            let mut sources = CalibrationSources::in_dir(&calibration_dir);
            if let Some(path) = binwidth_factors_file {
                sources.bin_width_factors = path;
            }
            if let Some(path) = timebase_shifts_file {
                sources.timebase_shifts = path;
            }
            if let Some(path) = timebase_scales_file {
                sources.timebase_scales = path;
            }

            let config = CorrectionConfig::builder()
                .workers(args.workers)
                .seed(args.seed)
                .apply_bin_widths(!no_binwidth_factors)
                .apply_shifts(!no_timebase_shifts)
                .apply_scales(!no_timebase_scales)
                .bin_factor(binning.max(1))
                .output_suffix(suffix)
                .compression(StackCompression::from_level(compression))
                .build();

            let mut pipeline = CorrectionPipeline::new(config, sources);
            let outputs = pipeline
                .run_batch(&input)
                .with_context(|| format!("correcting {}", input))?;
            info!(files = outputs.len(), "Correction finished");
        }
    }

    Ok(())
}
