//! Cube feathering.
//!
//! Two strategies combine a pair of spectral cubes:
//!
//! - **sequential**: extract one plane from each cube per channel and run the
//!   plane combiner, writing into memory or a disk buffer.
//! - **blockwise**: split both cubes into matching spectral blocks of full
//!   planes and combine the blocks in parallel.
//!
//! [`feather_cube`] picks block-wise execution only when it is enabled in
//! [`CubeFeatherConfig`] and both cubes carry a chunk layout.

pub mod blockwise;
pub mod disk_buffer;
pub mod sequential;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use shared::image_proc::{ChannelsPerChunk, SpectralCube};

use crate::error::{FeatherError, Result};
use crate::plane::PlaneFeatherConfig;

pub use blockwise::Blockwise;
pub use sequential::Sequential;

/// Where a cube comes from
#[derive(Debug, Clone)]
pub enum CubeSource {
    FilePath { path: PathBuf, extension: usize },
    Loaded(SpectralCube),
}

impl CubeSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        CubeSource::FilePath {
            path: path.into(),
            extension: 0,
        }
    }

    /// Load the cube. File-backed cubes are chunked when `chunk_files` is set.
    pub fn resolve(self, chunk_files: Option<ChannelsPerChunk>) -> Result<SpectralCube> {
        match self {
            CubeSource::FilePath { path, extension } => {
                let cube = load_cube(path, extension)?;
                match chunk_files {
                    Some(channels) => Ok(cube.rechunk(channels)?),
                    None => Ok(cube),
                }
            }
            CubeSource::Loaded(cube) => Ok(cube),
        }
    }
}

impl From<SpectralCube> for CubeSource {
    fn from(cube: SpectralCube) -> Self {
        CubeSource::Loaded(cube)
    }
}

#[cfg(feature = "fits")]
fn load_cube(path: PathBuf, extension: usize) -> Result<SpectralCube> {
    log::debug!("Loading cube from {} [{}]", path.display(), extension);
    Ok(shared::io::fits::read_spectral_cube(&path, extension)?)
}

#[cfg(not(feature = "fits"))]
fn load_cube(path: PathBuf, _extension: usize) -> Result<SpectralCube> {
    Err(FeatherError::UnsupportedInput(format!(
        "cannot read {}: built without the `fits` feature",
        path.display()
    )))
}

/// Options for [`feather_cube`]
#[derive(Debug, Clone)]
pub struct CubeFeatherConfig {
    /// Per-plane options, applied to every channel
    pub plane: PlaneFeatherConfig,
    /// Resample the low-resolution spectral axis when it differs
    pub allow_spectral_resample: bool,
    /// Lift the size guard on cube-wide operations
    pub allow_huge_operations: bool,
    /// Sequential path: write output planes to a temporary file
    pub use_disk_buffer: bool,
    /// Use block-wise execution when both cubes are chunked
    pub use_blockwise: bool,
    /// Block-wise path: rechunk both cubes to full planes first
    pub force_spatial_rechunk: bool,
    pub channels_per_chunk: ChannelsPerChunk,
    /// Block-wise path: reproject the low-resolution cube when grids differ
    pub allow_lores_reproject: bool,
    /// Checked between planes of the sequential path
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for CubeFeatherConfig {
    fn default() -> Self {
        Self {
            plane: PlaneFeatherConfig::default(),
            allow_spectral_resample: true,
            allow_huge_operations: false,
            use_disk_buffer: true,
            use_blockwise: false,
            force_spatial_rechunk: true,
            channels_per_chunk: ChannelsPerChunk::Auto,
            allow_lores_reproject: true,
            cancel: None,
        }
    }
}

impl CubeFeatherConfig {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// One way of combining two spectrally aligned cubes
pub trait CubeStrategy {
    fn name(&self) -> &'static str;

    /// Combine `hires` and `lores`, which already share a spectral axis
    fn run(
        &self,
        hires: SpectralCube,
        lores: SpectralCube,
        config: &CubeFeatherConfig,
    ) -> Result<SpectralCube>;
}

/// Block-wise when enabled and both cubes are chunked, otherwise sequential
pub fn select_strategy(
    hires: &SpectralCube,
    lores: &SpectralCube,
    config: &CubeFeatherConfig,
) -> Box<dyn CubeStrategy> {
    if config.use_blockwise && hires.is_chunked() && lores.is_chunked() {
        Box::new(Blockwise)
    } else {
        Box::new(Sequential)
    }
}

/// Feather every channel of `hires` with the matching channel of `lores`.
///
/// The result carries the high-resolution cube's header.
///
/// # Errors
/// * [`FeatherError::UnsupportedInput`] for a low-resolution cube with varying
///   beams on the block-wise path
/// * [`FeatherError::SpectralMismatch`] when the spectral axes differ and
///   resampling is not allowed
/// * anything the chosen strategy raises
pub fn feather_cube(
    hires: impl Into<CubeSource>,
    lores: impl Into<CubeSource>,
    config: &CubeFeatherConfig,
) -> Result<SpectralCube> {
    let chunk_files = config.use_blockwise.then_some(config.channels_per_chunk);
    let mut hires = hires.into().resolve(chunk_files)?;
    let mut lores = lores.into().resolve(chunk_files)?;
    hires.set_allow_huge_operations(config.allow_huge_operations);
    lores.set_allow_huge_operations(config.allow_huge_operations);

    let strategy = select_strategy(&hires, &lores, config);
    info!(
        "Feathering {:?} cube with {:?} cube using the {} strategy",
        hires.shape(),
        lores.shape(),
        strategy.name()
    );

    if strategy.name() == Blockwise.name() && lores.has_varying_beams() {
        return Err(FeatherError::UnsupportedInput(
            "low-resolution cube has per-channel varying beams, which block-wise feathering \
             does not support"
                .to_string(),
        ));
    }

    if !hires.spectral_axis_matches(&lores) {
        if !config.allow_spectral_resample {
            return Err(FeatherError::SpectralMismatch(format!(
                "high-resolution cube has {} channels, low-resolution cube has {}; \
                 enable spectral resampling to match them",
                hires.nchan(),
                lores.nchan()
            )));
        }
        warn!(
            "Resampling low-resolution spectral axis ({} channels) onto {} channels",
            lores.nchan(),
            hires.nchan()
        );
        lores = lores.spectral_interpolate(hires.spectral_axis())?;
    }

    strategy.run(hires, lores, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use shared::image_proc::{Beam, CelestialWcs, ChunkShape, CubeBeams, CubeHeader};
    use shared::units::{Angle, AngleExt, FluxUnit};

    fn cube(axis: Vec<f64>, beams: CubeBeams) -> SpectralCube {
        let nchan = axis.len();
        let data = Array3::from_shape_fn((nchan, 16, 16), |(c, r, x)| {
            let dr = r as f64 - 8.0;
            let dx = x as f64 - 8.0;
            (1.0 + c as f64) * (-(dr * dr + dx * dx) / 10.0).exp()
        });
        let header = CubeHeader {
            wcs: CelestialWcs::centered((16, 16), (0.0, 0.0), Angle::from_arcseconds(1.0)),
            spectral_axis: axis,
            unit: FluxUnit::jansky_per_beam(),
            beams,
            rest_frequency_hz: None,
        };
        SpectralCube::new(data, header).unwrap()
    }

    fn single_beam() -> CubeBeams {
        CubeBeams::Single(Beam::circular(Angle::from_arcseconds(4.0)))
    }

    #[test]
    fn test_spectral_mismatch_without_resampling() {
        let hi = cube(vec![1.0e9, 1.1e9], single_beam());
        let lo = cube(vec![1.0e9, 1.2e9], single_beam());
        let config = CubeFeatherConfig {
            allow_spectral_resample: false,
            use_disk_buffer: false,
            ..Default::default()
        };
        assert!(matches!(
            feather_cube(hi, lo, &config),
            Err(FeatherError::SpectralMismatch(_))
        ));
    }

    #[test]
    fn test_spectral_resampling_when_allowed() {
        let hi = cube(vec![1.0e9, 1.1e9], single_beam());
        let lo = cube(vec![0.9e9, 1.0e9, 1.1e9, 1.2e9], single_beam());
        let config = CubeFeatherConfig {
            use_disk_buffer: false,
            ..Default::default()
        };
        let out = feather_cube(hi, lo, &config).unwrap();
        assert_eq!(out.shape(), (2, 16, 16));
    }

    #[test]
    fn test_varying_beams_rejected_on_blockwise_path() {
        let chunks = ChunkShape::new(1, 16, 16).unwrap();
        let hi = cube(vec![1.0e9, 1.1e9], single_beam()).with_chunks(chunks);
        let lo = cube(
            vec![1.0e9, 1.1e9],
            CubeBeams::PerChannel(vec![
                Beam::circular(Angle::from_arcseconds(4.0)),
                Beam::circular(Angle::from_arcseconds(5.0)),
            ]),
        )
        .with_chunks(chunks);
        let config = CubeFeatherConfig {
            use_blockwise: true,
            ..Default::default()
        };
        assert!(matches!(
            feather_cube(hi, lo, &config),
            Err(FeatherError::UnsupportedInput(_))
        ));
    }

    #[test]
    fn test_strategy_selection() {
        let chunks = ChunkShape::new(1, 16, 16).unwrap();
        let plain = cube(vec![1.0], single_beam());
        let chunked = plain.clone().with_chunks(chunks);
        let blockwise = CubeFeatherConfig {
            use_blockwise: true,
            ..Default::default()
        };

        assert_eq!(select_strategy(&chunked, &chunked, &blockwise).name(), "blockwise");
        assert_eq!(select_strategy(&plain, &chunked, &blockwise).name(), "sequential");
        assert_eq!(
            select_strategy(&chunked, &chunked, &CubeFeatherConfig::default()).name(),
            "sequential"
        );
    }

    #[test]
    fn test_cancellation_between_planes() {
        let hi = cube(vec![1.0e9, 1.1e9, 1.2e9], single_beam());
        let config = CubeFeatherConfig {
            use_disk_buffer: false,
            cancel: Some(Arc::new(AtomicBool::new(true))),
            ..Default::default()
        };
        assert!(matches!(
            feather_cube(hi.clone(), hi, &config),
            Err(FeatherError::Cancelled {
                completed: 0,
                total: 3
            })
        ));
    }
}
