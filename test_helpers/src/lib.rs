//! Test helpers for the feather workspace
//!
//! Synthetic sky images with celestial headers.

use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use shared::image_proc::{
    Beam, CelestialWcs, CubeBeams, CubeHeader, ImageHeader, ImagePlane, SpectralCube,
};
use shared::units::{Angle, AngleExt, FluxUnit};

/// A `Jy/beam` header centred on (180, 30) deg with a circular beam
pub fn jy_beam_header(shape: (usize, usize), pixel_arcsec: f64, beam_arcsec: f64) -> ImageHeader {
    ImageHeader::new(
        shape,
        CelestialWcs::centered(shape, (180.0, 30.0), Angle::from_arcseconds(pixel_arcsec)),
        FluxUnit::jansky_per_beam(),
    )
    .with_beam(Beam::circular(Angle::from_arcseconds(beam_arcsec)))
}

/// Circular Gaussian of unit peak at `center` with the given sigma in pixels
pub fn gaussian_blob(shape: (usize, usize), center: (f64, f64), sigma_pix: f64) -> Array2<f64> {
    let two_sigma_sq = 2.0 * sigma_pix * sigma_pix;
    Array2::from_shape_fn(shape, |(r, c)| {
        let dr = r as f64 - center.0;
        let dc = c as f64 - center.1;
        (-(dr * dr + dc * dc) / two_sigma_sq).exp()
    })
}

/// Gaussian white noise smoothed by a periodic box of `2 * radius + 1` pixels
/// and shifted to zero mean
pub fn smoothed_noise(shape: (usize, usize), radius: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).expect("unit normal is valid");
    let noise = Array2::from_shape_simple_fn(shape, || normal.sample(&mut rng));

    let (rows, cols) = shape;
    let width = (2 * radius + 1) as f64;
    let box_along = |input: &Array2<f64>, axis: usize| {
        Array2::from_shape_fn(shape, |(r, c)| {
            (0..=2 * radius)
                .map(|k| {
                    let offset = k as isize - radius as isize;
                    if axis == 0 {
                        input[[(r as isize + offset).rem_euclid(rows as isize) as usize, c]]
                    } else {
                        input[[r, (c as isize + offset).rem_euclid(cols as isize) as usize]]
                    }
                })
                .sum::<f64>()
                / width
        })
    };
    let smoothed = box_along(&box_along(&noise, 0), 1);
    let mean = smoothed.mean().unwrap_or(0.0);
    smoothed.mapv(|v| v - mean)
}

/// Wrap an array in an [`ImagePlane`]
pub fn plane(data: Array2<f64>, header: ImageHeader) -> ImagePlane {
    ImagePlane::new(data, header).expect("data matches header shape")
}

/// Stack planes into a cube sharing `header`'s grid and unit.
///
/// The spectral axis runs `1e9, 1e9 + 1e6, ...` Hz. When `beams` has one
/// entry per plane the cube carries per-channel beams, otherwise the header
/// beam.
pub fn cube_from_planes(
    planes: &[Array2<f64>],
    header: &ImageHeader,
    beams: Option<Vec<Beam>>,
) -> SpectralCube {
    let views: Vec<_> = planes.iter().map(|p| p.view()).collect();
    let data: Array3<f64> = ndarray::stack(Axis(0), &views).expect("planes share a shape");
    let spectral_axis = (0..planes.len()).map(|c| 1e9 + c as f64 * 1e6).collect();
    let beams = match (beams, header.beam) {
        (Some(per_channel), _) => CubeBeams::PerChannel(per_channel),
        (None, Some(beam)) => CubeBeams::Single(beam),
        (None, None) => CubeBeams::None,
    };
    SpectralCube::new(
        data,
        CubeHeader {
            wcs: header.wcs.clone(),
            spectral_axis,
            unit: header.unit,
            beams,
            rest_frequency_hz: header.rest_frequency_hz,
        },
    )
    .expect("cube header matches data")
}
