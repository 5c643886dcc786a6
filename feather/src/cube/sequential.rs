//! Channel-by-channel cube feathering.
//!
//! Runs on the calling thread in spectral order. A failure on any channel
//! aborts the whole cube.

use log::debug;
use shared::image_proc::SpectralCube;

use super::disk_buffer::OutputBuffer;
use super::{CubeFeatherConfig, CubeStrategy};
use crate::error::{FeatherError, Result};
use crate::plane::feather_plane;

#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl CubeStrategy for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn run(
        &self,
        hires: SpectralCube,
        lores: SpectralCube,
        config: &CubeFeatherConfig,
    ) -> Result<SpectralCube> {
        let total = hires.nchan();
        let mut output = OutputBuffer::new(hires.shape(), config.use_disk_buffer)?;

        for channel in 0..total {
            if config.is_cancelled() {
                return Err(FeatherError::Cancelled {
                    completed: channel,
                    total,
                });
            }

            let feathered =
                feather_plane(hires.plane(channel)?, lores.plane(channel)?, &config.plane)?;
            output.write_plane(channel, &feathered.image.data().view())?;
            debug!("Feathered channel {}/{}", channel + 1, total);
        }

        let mut cube = SpectralCube::new(output.into_array()?, hires.header().clone())?;
        cube.set_allow_huge_operations(hires.allow_huge_operations());
        Ok(match hires.chunks() {
            Some(chunks) => cube.with_chunks(chunks),
            None => cube,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Axis};
    use shared::image_proc::{Beam, CelestialWcs, CubeBeams, CubeHeader};
    use shared::units::{Angle, AngleExt, FluxUnit};

    fn cube(scale: f64) -> SpectralCube {
        let data = Array3::from_shape_fn((3, 12, 12), |(c, r, x)| {
            scale * ((r as f64 * 0.7).sin() + (x as f64 * 0.3 + c as f64).cos())
        });
        let header = CubeHeader {
            wcs: CelestialWcs::centered((12, 12), (0.0, 0.0), Angle::from_arcseconds(1.0)),
            spectral_axis: vec![1.0, 2.0, 3.0],
            unit: FluxUnit::jansky_per_beam(),
            beams: CubeBeams::Single(Beam::circular(Angle::from_arcseconds(3.0))),
            rest_frequency_hz: None,
        };
        SpectralCube::new(data, header).unwrap()
    }

    #[test]
    fn test_matches_per_plane_loop() {
        let hi = cube(1.0);
        let lo = cube(0.5);
        let config = CubeFeatherConfig {
            use_disk_buffer: false,
            ..Default::default()
        };
        let out = Sequential.run(hi.clone(), lo.clone(), &config).unwrap();

        for channel in 0..3 {
            let expected = feather_plane(
                hi.plane(channel).unwrap(),
                lo.plane(channel).unwrap(),
                &config.plane,
            )
            .unwrap();
            assert_eq!(
                out.data().index_axis(Axis(0), channel),
                expected.image.data()
            );
        }
        assert_eq!(out.header(), hi.header());
    }

    #[test]
    fn test_disk_buffer_gives_same_result() {
        let memory = CubeFeatherConfig {
            use_disk_buffer: false,
            ..Default::default()
        };
        let disk = CubeFeatherConfig::default();
        let a = Sequential.run(cube(1.0), cube(0.3), &memory).unwrap();
        let b = Sequential.run(cube(1.0), cube(0.3), &disk).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_plane_failure_aborts() {
        let config = CubeFeatherConfig {
            use_disk_buffer: false,
            plane: crate::plane::PlaneFeatherConfig {
                weights: Some(ndarray::Array2::ones((5, 5))),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            Sequential.run(cube(1.0), cube(1.0), &config),
            Err(FeatherError::ShapeMismatch { .. })
        ));
    }
}
