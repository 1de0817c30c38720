use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use stereo_rig::cloud::PlyFormat;
use stereo_rig::{
    calibrate_rig, images, reconstruct_pair, CalibrationReport, StereoRigConfig, ViewSet,
};

/// Stereo rig calibration and dense reconstruction.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Log level for the stderr logger. Builds with the `tracing` feature
    /// read `RUST_LOG` instead.
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate both cameras and the rig from detected pattern points.
    Calibrate {
        /// JSON view set: image size and per-capture left/right points.
        #[arg(long)]
        views: PathBuf,
        /// JSON pipeline configuration. Defaults are used if omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Where to write the calibration report.
        #[arg(long)]
        output: PathBuf,
    },
    /// Match a stereo pair and write a colored point cloud.
    Reconstruct {
        /// Calibration report written by `calibrate`.
        #[arg(long)]
        report: PathBuf,
        #[arg(long)]
        left: PathBuf,
        #[arg(long)]
        right: PathBuf,
        /// The images are already rectified.
        #[arg(long)]
        rectified: bool,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output PLY file.
        #[arg(long)]
        output: PathBuf,
        /// Write binary little-endian PLY instead of ASCII.
        #[arg(long)]
        binary: bool,
        /// Also save the normalized disparity image.
        #[arg(long)]
        disparity: Option<PathBuf>,
        /// Color the disparity image with the JET ramp instead of gray.
        #[arg(long, requires = "disparity")]
        colormap: bool,
    },
    /// Write the default configuration as a starting point.
    InitConfig {
        #[arg(long)]
        output: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<StereoRigConfig, Box<dyn Error>> {
    Ok(match path {
        Some(path) => StereoRigConfig::load_json(path)?,
        None => StereoRigConfig::default(),
    })
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelFilter) -> Result<(), Box<dyn Error>> {
    stereo_rig::core::init_with_level(level)?;
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(_level: LevelFilter) -> Result<(), Box<dyn Error>> {
    stereo_rig::core::init_tracing(false);
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = init_logging(args.log_level).and_then(|()| run(args.command)) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Calibrate {
            views,
            config,
            output,
        } => {
            let config = load_config(config.as_ref())?;
            let views = ViewSet::load_json(&views)?;
            let report = calibrate_rig(&views, &config)?;
            report.write_json(&output)?;
            println!(
                "rms left {:.4} px, right {:.4} px, stereo {:.4} px, epipolar {:.4} px",
                report.left.rms_error,
                report.right.rms_error,
                report.stereo.rms_error,
                report.stereo.epipolar_error
            );
        }
        Command::Reconstruct {
            report,
            left,
            right,
            rectified,
            config,
            output,
            binary,
            disparity,
            colormap,
        } => {
            let config = load_config(config.as_ref())?;
            let report = CalibrationReport::load_json(&report)?;
            let left = images::load_color(&left)?;
            let right = images::load_color(&right)?;
            let out = reconstruct_pair(&report, &left, &right, &config, rectified)?;
            if let Some(path) = disparity {
                if colormap {
                    images::save_rgb(&path, &out.disparity.to_rgb_jet())?;
                } else {
                    images::save_gray(&path, &out.disparity.to_gray_normalized())?;
                }
                info!("disparity image written to {}", path.display());
            }
            let format = if binary {
                PlyFormat::BinaryLittleEndian
            } else {
                PlyFormat::Ascii
            };
            out.cloud.write_ply(&output, format)?;
            println!("{} points written to {}", out.cloud.len(), output.display());
        }
        Command::InitConfig { output } => {
            StereoRigConfig::default().write_json(&output)?;
        }
    }
    Ok(())
}
