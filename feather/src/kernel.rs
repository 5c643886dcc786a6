//! Fourier-domain weighting kernels derived from the low-resolution beam.
//!
//! `kfft` is the normalised amplitude spectrum of a Gaussian matching the
//! low-resolution beam. It is 1 at zero spatial frequency and falls off towards
//! high frequencies, so it weights the single-dish spectrum. Its complement
//! `ikfft = 1 - kfft` weights the interferometer spectrum.

use log::debug;
use ndarray::{Array2, ArrayView2};
use shared::units::{Angle, AngleExt};

use crate::error::{FeatherError, Result};
use crate::fft::{fft2, fftshift, ifftshift};

/// Conversion from Gaussian FWHM to standard deviation: `sqrt(8 ln 2)`
pub fn fwhm_to_sigma_factor() -> f64 {
    (8.0 * std::f64::consts::LN_2).sqrt()
}

/// Angular size of one pixel.
///
/// A bare number is interpreted as degrees, the unit FITS headers use for
/// `CDELT`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelScale(pub Angle);

impl From<Angle> for PixelScale {
    fn from(angle: Angle) -> Self {
        PixelScale(angle)
    }
}

impl From<f64> for PixelScale {
    fn from(degrees: f64) -> Self {
        PixelScale(Angle::from_degrees(degrees))
    }
}

/// Complementary weighting arrays with `kfft + ikfft == 1` everywhere.
///
/// Arrays are in unshifted FFT order (zero frequency at `[0, 0]`). A kernel is
/// never modified after construction.
#[derive(Debug, Clone)]
pub struct FeatherKernel {
    kfft: Array2<f64>,
    ikfft: Array2<f64>,
}

impl FeatherKernel {
    /// Low-resolution weights
    pub fn kfft(&self) -> ArrayView2<'_, f64> {
        self.kfft.view()
    }

    /// High-resolution weights, `1 - kfft`
    pub fn ikfft(&self) -> ArrayView2<'_, f64> {
        self.ikfft.view()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.kfft.dim()
    }

    /// Both arrays with zero frequency moved to the centre
    pub fn shifted(&self) -> (Array2<f64>, Array2<f64>) {
        (fftshift(&self.kfft.view()), fftshift(&self.ikfft.view()))
    }
}

/// Build the kernel pair for a `height x width` image.
///
/// # Arguments
/// * `height`, `width` - Image shape in pixels
/// * `lowres_fwhm` - FWHM of the low-resolution beam
/// * `pixel_scale` - Pixel size, as an [`Angle`] or a bare number of degrees
///
/// # Errors
/// [`FeatherError::Numerical`] when the Gaussian width is degenerate (a zero
/// or NaN sigma), which shows up as NaN or an all-zero spectrum.
pub fn build_kernel(
    height: usize,
    width: usize,
    lowres_fwhm: Angle,
    pixel_scale: impl Into<PixelScale>,
) -> Result<FeatherKernel> {
    let PixelScale(scale) = pixel_scale.into();
    let sigma = lowres_fwhm.as_radians() / fwhm_to_sigma_factor() / scale.as_radians();

    debug!(
        "Building {}x{} feather kernel: fwhm = {:.3}\", pixel = {:.4}\", sigma = {:.3} px",
        height,
        width,
        lowres_fwhm.as_arcseconds(),
        scale.as_arcseconds(),
        sigma
    );

    // Pixel offsets from the array centre, which may fall between pixels
    let cy = (height as f64 - 1.0) / 2.0;
    let cx = (width as f64 - 1.0) / 2.0;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let gaussian = Array2::from_shape_fn((height, width), |(r, c)| {
        let dy = r as f64 - cy;
        let dx = c as f64 - cx;
        (-(dx * dx + dy * dy) / two_sigma_sq).exp()
    });

    // Move the peak to the origin; only the amplitude is kept so the phase of
    // a half-pixel offset does not matter
    let origin_centred = ifftshift(&gaussian.view());
    let amplitude = fft2(&origin_centred.view()).mapv(|c| c.norm());

    if amplitude.iter().any(|v| v.is_nan()) {
        return Err(FeatherError::Numerical(format!(
            "NaN in kernel spectrum (fwhm = {:.3}\", pixel scale = {:.4}\")",
            lowres_fwhm.as_arcseconds(),
            scale.as_arcseconds()
        )));
    }

    let peak = amplitude.iter().copied().fold(0.0_f64, f64::max);
    if !(peak > 0.0 && peak.is_finite()) {
        return Err(FeatherError::Numerical(format!(
            "kernel spectrum has no usable peak (max = {peak})"
        )));
    }

    let kfft = amplitude.mapv(|v| v / peak);
    let ikfft = kfft.mapv(|v| 1.0 - v);
    Ok(FeatherKernel { kfft, ikfft })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn kernel(fwhm_arcsec: f64) -> FeatherKernel {
        build_kernel(
            64,
            48,
            Angle::from_arcseconds(fwhm_arcsec),
            Angle::from_arcseconds(1.0),
        )
        .unwrap()
    }

    #[test]
    fn test_complementary_and_bounded() {
        let k = kernel(10.0);
        for (a, b) in k.kfft().iter().zip(k.ikfft().iter()) {
            assert_relative_eq!(a + b, 1.0, epsilon = 1e-15);
            assert!((0.0..=1.0).contains(a));
            assert!((0.0..=1.0).contains(b));
        }
        let max = k.kfft().iter().copied().fold(f64::MIN, f64::max);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_zero_frequency_is_peak() {
        let k = kernel(10.0);
        assert_relative_eq!(k.kfft()[[0, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wider_beam_narrows_passband() {
        let count_above_half =
            |k: &FeatherKernel| k.kfft().iter().filter(|v| **v > 0.5).count();
        let narrow_beam = kernel(5.0);
        let wide_beam = kernel(15.0);
        assert!(count_above_half(&wide_beam) < count_above_half(&narrow_beam));
    }

    #[test]
    fn test_bare_number_pixel_scale_is_degrees() {
        let fwhm = Angle::from_arcseconds(12.0);
        let from_degrees = build_kernel(32, 32, fwhm, 1.0 / 3600.0).unwrap();
        let from_angle = build_kernel(32, 32, fwhm, Angle::from_arcseconds(1.0)).unwrap();
        for (a, b) in from_degrees.kfft().iter().zip(from_angle.kfft().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_deterministic() {
        let a = kernel(8.0);
        let b = kernel(8.0);
        assert_eq!(a.kfft(), b.kfft());
    }

    #[test]
    fn test_degenerate_sigma_is_numerical_error() {
        // Odd shape puts a pixel exactly at the centre: 0 / 0 gives NaN
        let result = build_kernel(
            33,
            33,
            Angle::from_arcseconds(0.0),
            Angle::from_arcseconds(1.0),
        );
        assert!(matches!(result, Err(FeatherError::Numerical(_))));

        let result = build_kernel(
            32,
            32,
            Angle::from_arcseconds(f64::NAN),
            Angle::from_arcseconds(1.0),
        );
        assert!(matches!(result, Err(FeatherError::Numerical(_))));
    }
}
