//! Two-dimensional FFT helpers on ndarray arrays.
//!
//! The 2D transform is computed separably: a 1D FFT along every row, then
//! along every column. Rows and columns are processed in parallel with rayon;
//! each 1D transform is independent, so results do not depend on scheduling.
//! The inverse transform is normalised by `1 / (rows * cols)`.

use ndarray::{Array2, ArrayView2, ArrayViewMut1, Axis};
use rayon::prelude::*;
use rustfft::{num_complex::Complex64, Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// Forward 2D DFT of a real image
pub fn fft2(image: &ArrayView2<f64>) -> Array2<Complex64> {
    let spectrum = image.mapv(|v| Complex64::new(v, 0.0));
    transform_2d(spectrum, FftDirection::Forward)
}

/// Inverse 2D DFT, normalised so that `ifft2(fft2(x)) == x`
pub fn ifft2(spectrum: &ArrayView2<Complex64>) -> Array2<Complex64> {
    let (rows, cols) = spectrum.dim();
    let mut image = transform_2d(spectrum.to_owned(), FftDirection::Inverse);
    if rows > 0 && cols > 0 {
        let norm = 1.0 / (rows * cols) as f64;
        image.mapv_inplace(|c| c * norm);
    }
    image
}

fn transform_2d(mut data: Array2<Complex64>, direction: FftDirection) -> Array2<Complex64> {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return data;
    }

    let mut planner = FftPlanner::new();
    let row_fft = planner.plan_fft(cols, direction);
    let col_fft = planner.plan_fft(rows, direction);

    transform_lanes(&mut data, Axis(0), &row_fft);
    transform_lanes(&mut data, Axis(1), &col_fft);
    data
}

/// Apply `fft` to every 1D lane obtained by iterating over `axis`
fn transform_lanes(data: &mut Array2<Complex64>, axis: Axis, fft: &Arc<dyn Fft<f64>>) {
    data.axis_iter_mut(axis)
        .into_par_iter()
        .for_each(|mut lane: ArrayViewMut1<Complex64>| {
            match lane.as_slice_mut() {
                Some(slice) => fft.process(slice),
                None => {
                    let mut buffer = lane.to_vec();
                    fft.process(&mut buffer);
                    for (dst, src) in lane.iter_mut().zip(buffer) {
                        *dst = src;
                    }
                }
            }
        });
}

/// Move the zero-frequency bin to the centre of the array
pub fn fftshift<T: Clone>(array: &ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = array.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        array[[(r + rows - rows / 2) % rows, (c + cols - cols / 2) % cols]].clone()
    })
}

/// Inverse of [`fftshift`]; differs from it only for odd lengths
pub fn ifftshift<T: Clone>(array: &ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = array.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        array[[(r + rows / 2) % rows, (c + cols / 2) % cols]].clone()
    })
}

/// Copy with every non-finite sample replaced by zero
pub fn nan_to_zero(image: &ArrayView2<f64>) -> Array2<f64> {
    image.mapv(|v| if v.is_finite() { v } else { 0.0 })
}
