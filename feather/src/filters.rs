//! Stand-alone Fourier filters built from the feather kernel.
//!
//! Neither is a general deconvolution method; both are quick looks at what the
//! kernel does to a single image.

use ndarray::Zip;
use shared::image_proc::ImagePlane;
use shared::units::Angle;

use crate::error::Result;
use crate::fft::{fft2, ifft2, nan_to_zero};
use crate::kernel::build_kernel;

/// Kernel floor used by [`deconvolve_single_dish`] unless told otherwise
pub const DEFAULT_DECONVOLVE_FLOOR: f64 = 0.1;

/// Divide the spectrum of a single-dish image by its beam kernel.
///
/// Only bins where `kfft > min_value` are divided; the rest pass through
/// unchanged. The pixel scale is the square root of the celestial pixel area.
pub fn deconvolve_single_dish(
    plane: &ImagePlane,
    lowres_fwhm: Angle,
    min_value: f64,
) -> Result<ImagePlane> {
    let (rows, cols) = plane.shape();
    let kernel = build_kernel(rows, cols, lowres_fwhm, plane.wcs().pixel_scale())?;

    let spectrum = fft2(&nan_to_zero(&plane.data().view()).view());
    let deconvolved = Zip::from(&spectrum)
        .and(&kernel.kfft())
        .map_collect(|&f, &k| if k > min_value { f / k } else { f });

    let image = ifft2(&deconvolved.view()).mapv(|c| c.re);
    Ok(plane.with_data(image)?)
}

/// Suppress large scales by weighting the spectrum with `ikfft = 1 - kfft`
pub fn fourier_unsharp_mask(plane: &ImagePlane, lowres_fwhm: Angle) -> Result<ImagePlane> {
    let (rows, cols) = plane.shape();
    let kernel = build_kernel(rows, cols, lowres_fwhm, plane.wcs().pixel_scale())?;

    let spectrum = fft2(&nan_to_zero(&plane.data().view()).view());
    let masked = Zip::from(&spectrum)
        .and(&kernel.ikfft())
        .map_collect(|&f, &w| f * w);

    let image = ifft2(&masked.view()).mapv(|c| c.re);
    Ok(plane.with_data(image)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use shared::image_proc::{CelestialWcs, ImageHeader};
    use shared::units::{AngleExt, FluxUnit};

    fn plane(data: Array2<f64>) -> ImagePlane {
        let shape = data.dim();
        let header = ImageHeader::new(
            shape,
            CelestialWcs::centered(shape, (0.0, 0.0), Angle::from_arcseconds(1.0)),
            FluxUnit::jansky_per_beam(),
        );
        ImagePlane::new(data, header).unwrap()
    }

    fn texture() -> Array2<f64> {
        Array2::from_shape_fn((24, 24), |(r, c)| ((r * 31 + c * 17) % 23) as f64 / 23.0)
    }

    #[test]
    fn test_deconvolution_undoes_beam_smoothing() {
        let fwhm = Angle::from_arcseconds(3.0);
        let original = texture();
        let kernel = build_kernel(24, 24, fwhm, Angle::from_arcseconds(1.0)).unwrap();
        // Smooth only where the kernel is strong so division restores every bin
        let smoothed_spectrum = Zip::from(&fft2(&original.view()))
            .and(&kernel.kfft())
            .map_collect(|&f, &k| if k > 0.05 { f * k } else { f });
        let smoothed = ifft2(&smoothed_spectrum.view()).mapv(|c| c.re);

        let restored = deconvolve_single_dish(&plane(smoothed), fwhm, 0.05).unwrap();
        for (a, b) in restored.data().iter().zip(original.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unsharp_mask_removes_constant() {
        let data = Array2::from_elem((16, 16), 3.0);
        let masked = fourier_unsharp_mask(&plane(data), Angle::from_arcseconds(4.0)).unwrap();
        for v in masked.data().iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_unsharp_plus_lowpass_is_identity() {
        let fwhm = Angle::from_arcseconds(4.0);
        let original = texture();
        let kernel = build_kernel(24, 24, fwhm, Angle::from_arcseconds(1.0)).unwrap();
        let lowpass = ifft2(
            &Zip::from(&fft2(&original.view()))
                .and(&kernel.kfft())
                .map_collect(|&f, &k| f * k)
                .view(),
        )
        .mapv(|c| c.re);

        let highpass = fourier_unsharp_mask(&plane(original.clone()), fwhm).unwrap();
        for ((h, l), o) in highpass.data().iter().zip(lowpass.iter()).zip(original.iter()) {
            assert_abs_diff_eq!(h + l, *o, epsilon = 1e-10);
        }
    }
}
