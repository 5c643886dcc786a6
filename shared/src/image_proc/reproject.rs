//! Bilinear resampling of images between pixel grids.
//!
//! Each target pixel centre is mapped to world coordinates, then into the
//! source grid, and sampled with bilinear weights. Target pixels that fall
//! outside the source footprint are NaN.

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use super::CelestialWcs;

/// Slack allowed when a sample position lands exactly on the outer pixel row
const EDGE_TOLERANCE: f64 = 1e-9;

/// Sample `data` at fractional `(row, col)`.
///
/// Terms with zero weight are skipped so that sampling exactly on a pixel
/// centre never picks up NaN from a neighbour.
pub fn sample_bilinear(data: &ArrayView2<f64>, row: f64, col: f64) -> f64 {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return f64::NAN;
    }

    let max_row = (rows - 1) as f64;
    let max_col = (cols - 1) as f64;
    if !(row >= -EDGE_TOLERANCE
        && row <= max_row + EDGE_TOLERANCE
        && col >= -EDGE_TOLERANCE
        && col <= max_col + EDGE_TOLERANCE)
    {
        return f64::NAN;
    }

    let r = row.clamp(0.0, max_row);
    let c = col.clamp(0.0, max_col);
    let r0 = r.floor() as usize;
    let c0 = c.floor() as usize;
    let r1 = (r0 + 1).min(rows - 1);
    let c1 = (c0 + 1).min(cols - 1);
    let fr = r - r0 as f64;
    let fc = c - c0 as f64;

    let taps = [
        ((r0, c0), (1.0 - fr) * (1.0 - fc)),
        ((r0, c1), (1.0 - fr) * fc),
        ((r1, c0), fr * (1.0 - fc)),
        ((r1, c1), fr * fc),
    ];

    taps.iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(idx, w)| data[[idx.0, idx.1]] * w)
        .sum()
}

/// Resample `src` (on `src_wcs`) onto a grid of `dst_shape` described by `dst_wcs`
pub fn reproject_bilinear(
    src: &ArrayView2<f64>,
    src_wcs: &CelestialWcs,
    dst_wcs: &CelestialWcs,
    dst_shape: (usize, usize),
) -> Array2<f64> {
    let mut out = Array2::from_elem(dst_shape, f64::NAN);

    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut line)| {
            for (col, value) in line.iter_mut().enumerate() {
                let (lon, lat) = dst_wcs.pixel_to_world(row as f64, col as f64);
                let (src_row, src_col) = src_wcs.world_to_pixel(lon, lat);
                *value = sample_bilinear(src, src_row, src_col);
            }
        });

    out
}
