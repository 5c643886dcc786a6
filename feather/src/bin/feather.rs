use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use feather::{
    compare, feather_cube, feather_plane, CompareConfig, CubeSource, FeatherSettings, PlaneSource,
};
use log::info;
use shared::io::fits::{read_image_plane, write_image_plane, write_spectral_cube};
use shared::units::{Angle, AngleExt};

/// Combine interferometric and single-dish images in the Fourier domain
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON settings file; missing fields take their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feather two 2D images
    Plane {
        #[command(flatten)]
        inputs: Inputs,

        /// Output FITS file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Feather two spectral cubes channel by channel
    Cube {
        #[command(flatten)]
        inputs: Inputs,

        /// Output FITS file
        #[arg(short, long)]
        output: PathBuf,

        /// Process matching spectral blocks in parallel
        #[arg(long)]
        blockwise: bool,
    },
    /// Compare the inputs over a band of angular scales and print JSON
    Compare {
        #[command(flatten)]
        inputs: Inputs,

        /// Smallest angular scale in arcseconds
        #[arg(long)]
        sas_arcsec: f64,

        /// Largest angular scale in arcseconds
        #[arg(long)]
        las_arcsec: f64,

        /// Do not divide the low-resolution spectrum by its beam
        #[arg(long)]
        no_beam_divide: bool,

        /// Print every sample in the band instead of summary statistics
        #[arg(long)]
        samples: bool,
    },
}

#[derive(Args, Debug)]
struct Inputs {
    /// High-resolution (interferometer) FITS file
    #[arg(long)]
    hires: PathBuf,

    /// Low-resolution (single-dish) FITS file
    #[arg(long)]
    lores: PathBuf,

    /// HDU index of the high-resolution image
    #[arg(long, default_value_t = 0)]
    hires_ext: usize,

    /// HDU index of the low-resolution image
    #[arg(long, default_value_t = 0)]
    lores_ext: usize,

    /// Low-resolution beam FWHM in arcseconds, overriding the image beam
    #[arg(long)]
    lowres_fwhm_arcsec: Option<f64>,
}

fn load_settings(path: Option<&Path>) -> Result<FeatherSettings> {
    match path {
        Some(path) => FeatherSettings::load_from_file(path)
            .with_context(|| format!("reading settings from {}", path.display())),
        None => Ok(FeatherSettings::default()),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Plane { inputs, output } => {
            if inputs.lowres_fwhm_arcsec.is_some() {
                settings.lowres_fwhm_arcsec = inputs.lowres_fwhm_arcsec;
            }
            let config = settings.plane_config()?;
            let result = feather_plane(
                PlaneSource::FilePath {
                    path: inputs.hires,
                    extension: inputs.hires_ext,
                },
                PlaneSource::FilePath {
                    path: inputs.lores,
                    extension: inputs.lores_ext,
                },
                &config,
            )?;
            write_image_plane(&output, &result.image)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Wrote feathered plane to {}", output.display());
        }
        Command::Cube {
            inputs,
            output,
            blockwise,
        } => {
            if inputs.lowres_fwhm_arcsec.is_some() {
                settings.lowres_fwhm_arcsec = inputs.lowres_fwhm_arcsec;
            }
            settings.use_blockwise |= blockwise;
            let config = settings.cube_config()?;
            let cube = feather_cube(
                CubeSource::FilePath {
                    path: inputs.hires,
                    extension: inputs.hires_ext,
                },
                CubeSource::FilePath {
                    path: inputs.lores,
                    extension: inputs.lores_ext,
                },
                &config,
            )?;
            write_spectral_cube(&output, &cube)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Wrote feathered cube to {}", output.display());
        }
        Command::Compare {
            inputs,
            sas_arcsec,
            las_arcsec,
            no_beam_divide,
            samples,
        } => {
            let hires = read_image_plane(&inputs.hires, inputs.hires_ext)
                .with_context(|| format!("reading {}", inputs.hires.display()))?;
            let lores = read_image_plane(&inputs.lores, inputs.lores_ext)
                .with_context(|| format!("reading {}", inputs.lores.display()))?;

            let lowres_fwhm = inputs
                .lowres_fwhm_arcsec
                .or(settings.lowres_fwhm_arcsec)
                .map(Angle::from_arcseconds)
                .or_else(|| lores.beam().map(|b| b.major))
                .context("no low-resolution FWHM given and the low-resolution image has no beam")?;

            let config = CompareConfig {
                beam_divide_lores: !no_beam_divide,
                min_beam_fraction: settings.min_beam_fraction,
                return_samples: samples,
                ..Default::default()
            };
            let comparison = compare(
                &hires,
                &lores,
                Angle::from_arcseconds(sas_arcsec),
                Angle::from_arcseconds(las_arcsec),
                lowres_fwhm,
                &config,
            )?;
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
    }
    Ok(())
}
