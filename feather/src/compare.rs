//! Agreement between the two inputs over a band of angular scales.
//!
//! Both images are transformed on the high-resolution grid and compared only
//! in frequency bins whose angular scale lies strictly between the small and
//! large angular scale and where the low-resolution beam still carries at
//! least `min_beam_fraction` of its peak response.
//!
//! [`compare`] works on Fourier amplitudes; [`image_domain_ratio`] transforms
//! the selected ring back to the image plane and compares intensities there.

use log::debug;
use ndarray::{Array2, Zip};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use shared::algo::{nan_mean, nan_median, nan_std, sigma_clipped_stats, ClippedStats};
use shared::image_proc::ImagePlane;
use shared::units::{Angle, AngleExt};

use crate::error::{FeatherError, Result};
use crate::fft::{fft2, fftshift, ifft2, ifftshift, nan_to_zero};
use crate::kernel::build_kernel;
use crate::merge::DEFAULT_MIN_BEAM_FRACTION;

/// Rejection threshold for the clipped statistics, in standard deviations
pub const CLIP_SIGMA: f64 = 3.0;
/// Maximum clipping passes
pub const CLIP_MAX_ITERS: usize = 5;

/// Options for [`compare`] and [`image_domain_ratio`]
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// Divide the low-resolution spectrum by the beam before comparing
    pub beam_divide_lores: bool,
    /// Bins with a weaker beam response are excluded from the comparison
    pub min_beam_fraction: f64,
    /// Bins with a weaker beam response are blanked in the deconvolved spectrum
    pub plot_min_beam_fraction: f64,
    /// Taper applied to both images before transforming
    pub weights: Option<Array2<f64>>,
    /// Return per-bin samples instead of summary statistics
    pub return_samples: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            beam_divide_lores: true,
            min_beam_fraction: DEFAULT_MIN_BEAM_FRACTION,
            plot_min_beam_fraction: 1e-3,
            weights: None,
            return_samples: false,
        }
    }
}

/// Statistics of the high/low amplitude ratio over the overlap band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioSummary {
    pub median: f64,
    pub mean: f64,
    pub std: f64,
    pub clipped_mean: f64,
    pub clipped_median: f64,
    pub clipped_std: f64,
}

impl RatioSummary {
    fn from_ratios(ratio: &[f64]) -> Self {
        // Infinite ratios count towards the plain moments but not the clipped ones
        let finite: Vec<f64> = ratio.iter().copied().filter(|v| v.is_finite()).collect();
        let ClippedStats { mean, median, std } =
            sigma_clipped_stats(&finite, CLIP_SIGMA, CLIP_MAX_ITERS);
        Self {
            median: nan_median(ratio),
            mean: nan_mean(ratio),
            std: nan_std(ratio),
            clipped_mean: mean,
            clipped_median: median,
            clipped_std: std,
        }
    }
}

/// Per-bin values inside the overlap band, in row-major bin order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlapSamples {
    pub angular_scale_arcsec: Vec<f64>,
    pub ratio: Vec<f64>,
    pub hires_amplitude: Vec<f64>,
    pub lores_amplitude: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Summary(RatioSummary),
    Samples(OverlapSamples),
}

/// Shifted spectra of both images and the overlap mask
struct OverlapSpectra {
    hires: Array2<Complex64>,
    lores: Array2<Complex64>,
    lores_deconvolved: Array2<Complex64>,
    angular_scale_arcsec: Array2<f64>,
    mask: Array2<bool>,
}

fn overlap_spectra(
    hires: &ImagePlane,
    lores: &ImagePlane,
    small_scale: Angle,
    large_scale: Angle,
    lowres_fwhm: Angle,
    config: &CompareConfig,
) -> Result<OverlapSpectra> {
    if large_scale.as_radians() <= small_scale.as_radians() {
        return Err(FeatherError::InvalidParameter(format!(
            "largest angular scale ({:.3}\") must exceed the smallest ({:.3}\")",
            large_scale.as_arcseconds(),
            small_scale.as_arcseconds()
        )));
    }

    let (rows, cols) = hires.shape();
    if let Some(weights) = &config.weights {
        if weights.dim() != (rows, cols) {
            return Err(FeatherError::shape_mismatch(
                "weights",
                &[rows, cols],
                weights.shape(),
            ));
        }
    }

    let lores = if lores.header().shares_grid_with(hires.header()) {
        lores.clone()
    } else {
        lores.reproject(hires.header())
    };

    let pixel_scale = hires.wcs().pixel_scales().0;
    let (kfft, _) = build_kernel(rows, cols, lowres_fwhm, pixel_scale)?.shifted();

    let cy = (rows as f64 - 1.0) / 2.0;
    let cx = (cols as f64 - 1.0) / 2.0;
    let pixel_arcsec = pixel_scale.as_arcseconds();
    let angular_scale_arcsec = Array2::from_shape_fn((rows, cols), |(r, c)| {
        let radius = ((c as f64 - cx).powi(2) + (r as f64 - cy).powi(2)).sqrt();
        cols as f64 / radius * pixel_arcsec
    });

    let spectrum = |image: &Array2<f64>| {
        let weighted = match &config.weights {
            Some(weights) => image * weights,
            None => image.clone(),
        };
        fftshift(&fft2(&nan_to_zero(&weighted.view()).view()).view())
    };
    let fft_hi = spectrum(hires.data());
    let fft_lo = spectrum(lores.data());

    let blank = Complex64::new(f64::NAN, f64::NAN);
    let lores_deconvolved = Zip::from(&fft_lo).and(&kfft).map_collect(|&f, &k| {
        if k < config.plot_min_beam_fraction {
            blank
        } else if config.beam_divide_lores {
            f / k
        } else {
            f
        }
    });

    let (sas, las) = (small_scale.as_arcseconds(), large_scale.as_arcseconds());
    let mask = Zip::from(&angular_scale_arcsec)
        .and(&kfft)
        .map_collect(|&scale, &k| scale > sas && scale < las && k >= config.min_beam_fraction);

    let selected = mask.iter().filter(|m| **m).count();
    if selected == 0 {
        return Err(FeatherError::EmptyOverlap(format!(
            "no bins between {sas:.3}\" and {las:.3}\" with beam response >= {}",
            config.min_beam_fraction
        )));
    }
    debug!(
        "Comparing {} of {} frequency bins between {:.3}\" and {:.3}\"",
        selected,
        rows * cols,
        sas,
        las
    );

    Ok(OverlapSpectra {
        hires: fft_hi,
        lores: fft_lo,
        lores_deconvolved,
        angular_scale_arcsec,
        mask,
    })
}

/// Compare Fourier amplitudes of the two images over `(small_scale, large_scale)`.
///
/// The low-resolution image is regridded onto the high-resolution grid
/// first. Units are compared as given.
///
/// # Errors
/// * [`FeatherError::InvalidParameter`] when `large_scale <= small_scale`
/// * [`FeatherError::ShapeMismatch`] for weights of the wrong shape
/// * [`FeatherError::EmptyOverlap`] when no frequency bin qualifies
pub fn compare(
    hires: &ImagePlane,
    lores: &ImagePlane,
    small_scale: Angle,
    large_scale: Angle,
    lowres_fwhm: Angle,
    config: &CompareConfig,
) -> Result<Comparison> {
    let spectra = overlap_spectra(hires, lores, small_scale, large_scale, lowres_fwhm, config)?;

    let mut samples = OverlapSamples::default();
    Zip::from(&spectra.mask)
        .and(&spectra.angular_scale_arcsec)
        .and(&spectra.hires)
        .and(&spectra.lores_deconvolved)
        .for_each(|&selected, &scale, hi, lo| {
            if selected {
                let (hi, lo) = (hi.norm(), lo.norm());
                samples.angular_scale_arcsec.push(scale);
                samples.ratio.push(hi / lo);
                samples.hires_amplitude.push(hi);
                samples.lores_amplitude.push(lo);
            }
        });

    if config.return_samples {
        Ok(Comparison::Samples(samples))
    } else {
        Ok(Comparison::Summary(RatioSummary::from_ratios(&samples.ratio)))
    }
}

/// Intensity-weighted high/low ratio of the images filtered to the overlap band.
///
/// Both spectra are masked to the band and transformed back. The result is
/// `Σ lo·hi / Σ lo²` over the real parts, the mean of `hi / lo` weighted by
/// `lo²`.
pub fn image_domain_ratio(
    hires: &ImagePlane,
    lores: &ImagePlane,
    small_scale: Angle,
    large_scale: Angle,
    lowres_fwhm: Angle,
    config: &CompareConfig,
) -> Result<f64> {
    let spectra = overlap_spectra(hires, lores, small_scale, large_scale, lowres_fwhm, config)?;
    let zero = Complex64::new(0.0, 0.0);

    let ring = |spectrum: &Array2<Complex64>| {
        let masked = Zip::from(spectrum).and(&spectra.mask).map_collect(|&f, &m| {
            let value = if m { f } else { zero };
            Complex64::new(finite_or_zero(value.re), finite_or_zero(value.im))
        });
        ifft2(&ifftshift(&masked.view()).view()).mapv(|c| c.re)
    };

    let hi_ring = ring(&spectra.hires);
    let lo_ring = if config.beam_divide_lores {
        ring(&spectra.lores_deconvolved)
    } else {
        ring(&spectra.lores)
    };

    let (cross, power) = Zip::from(&hi_ring)
        .and(&lo_ring)
        .fold((0.0, 0.0), |(cross, power), &hi, &lo| {
            (cross + lo * hi, power + lo * lo)
        });

    if power == 0.0 || !power.is_finite() {
        return Err(FeatherError::Numerical(format!(
            "low-resolution ring image has no usable power ({power})"
        )));
    }
    Ok(cross / power)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
